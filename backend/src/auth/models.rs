use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Client id
    pub exp: usize,
    pub iat: usize,
}

/// Identity attached to an authorized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    ApiKey,
    Token(String),
}
