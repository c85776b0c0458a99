use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL_NAME: &str = "facebook/vjepa2-vitg-fpc64-256";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} points to a missing file: {path}")]
    MissingFile { key: &'static str, path: PathBuf },
    #[error("failed to read preprocessing config: {0}")]
    Preprocess(String),
}

/// Compute target for both the encoder and the classifier head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTarget {
    Cpu,
    Cuda(usize),
    Mps,
    /// First CUDA device when available, CPU otherwise.
    Auto,
}

impl FromStr for DeviceTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(DeviceTarget::Cpu),
            "cuda" | "gpu" => Ok(DeviceTarget::Cuda(0)),
            "mps" => Ok(DeviceTarget::Mps),
            "auto" => Ok(DeviceTarget::Auto),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(DeviceTarget::Cuda)
                .ok_or_else(|| "expected cpu, cuda, cuda:N, mps or auto".to_string()),
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::Cpu => write!(f, "cpu"),
            DeviceTarget::Cuda(idx) => write!(f, "cuda:{}", idx),
            DeviceTarget::Mps => write!(f, "mps"),
            DeviceTarget::Auto => write!(f, "auto"),
        }
    }
}

/// Which hosting surface is serving the API. Reported in health and root bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Container,
    Serverless,
    Managed,
}

impl Deployment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Deployment::Container => "container",
            Deployment::Serverless => "lambda",
            Deployment::Managed => "managed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorsPolicy {
    AnyOrigin,
    Origins(Vec<String>),
}

impl CorsPolicy {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsPolicy::AnyOrigin
        } else {
            CorsPolicy::Origins(origins)
        }
    }

    /// `Access-Control-Allow-Origin` value for a request. A listed origin is
    /// echoed back; anything else gets no header.
    pub fn allow_origin(&self, request_origin: Option<&str>) -> Option<String> {
        match self {
            CorsPolicy::AnyOrigin => Some("*".to_string()),
            CorsPolicy::Origins(origins) => request_origin
                .filter(|origin| origins.iter().any(|o| o == origin))
                .map(String::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model_name: String,
    pub model_path: PathBuf,
    pub classifier_path: PathBuf,
    pub class_names_path: PathBuf,
    pub num_classes: usize,
    pub top_k: usize,
    pub device: DeviceTarget,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub image_size: u32,
    pub frames_per_clip: usize,
    pub max_image_bytes: usize,
    pub preprocess_config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub log_level: String,
    pub request_timeout: Duration,
    pub max_request_bytes: usize,
    pub cors: CorsPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: ModelSettings,
    pub image: ImageSettings,
    pub server: ServerSettings,
    pub intention_threshold: f32,
    pub cache_url: Option<String>,
    pub cache_ttl: Duration,
    pub monitoring_dsn: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_lookup(|_| None).expect("built-in defaults are valid")
    }
}

impl Settings {
    /// Loads `.env` (when present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_name = get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        let model_path = get("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_encoder_path(&model_name));

        let model = ModelSettings {
            model_path,
            classifier_path: get("CLASSIFIER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/ssv2-classifier.pt")),
            class_names_path: get("CLASS_NAMES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ssv2_classes.json")),
            num_classes: parse_positive(&get, "NUM_CLASSES", 174)?,
            top_k: parse_positive(&get, "TOP_K", 5)?,
            device: parse_or(&get, "DEVICE", DeviceTarget::Cuda(0))?,
            batch_size: parse_positive(&get, "BATCH_SIZE", 1)?,
            model_name,
        };

        let image = ImageSettings {
            image_size: parse_positive(&get, "IMAGE_SIZE", 256u32)?,
            frames_per_clip: parse_positive(&get, "FRAMES_PER_CLIP", 64)?,
            max_image_bytes: parse_positive(&get, "MAX_IMAGE_SIZE", 10 * 1024 * 1024)?,
            preprocess_config: get("PREPROCESS_CONFIG").map(PathBuf::from),
        };

        let server = ServerSettings {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8000u16)?,
            workers: parse_positive(&get, "WORKERS", 1)?,
            log_level: get("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string())
                .to_ascii_lowercase(),
            request_timeout: Duration::from_secs(parse_positive(&get, "REQUEST_TIMEOUT", 30u64)?),
            max_request_bytes: parse_positive(&get, "MAX_REQUEST_SIZE", 20 * 1024 * 1024)?,
            cors: CorsPolicy::parse(&get("CORS_ORIGINS").unwrap_or_else(|| "*".to_string())),
        };

        let intention_threshold: f32 = parse_or(&get, "INTENTION_THRESHOLD", 0.5)?;
        if !(0.0..=1.0).contains(&intention_threshold) {
            return Err(ConfigError::Invalid {
                key: "INTENTION_THRESHOLD",
                value: intention_threshold.to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }

        let cache_url = get("CACHE_URL");
        if let Some(url) = &cache_url {
            if !["memory://", "redis://", "rediss://"]
                .iter()
                .any(|scheme| url.starts_with(scheme))
            {
                return Err(ConfigError::Invalid {
                    key: "CACHE_URL",
                    value: url.clone(),
                    reason: "supported schemes are memory://, redis:// and rediss://".to_string(),
                });
            }
        }

        Ok(Settings {
            model,
            image,
            server,
            intention_threshold,
            cache_url,
            cache_ttl: Duration::from_secs(parse_or(&get, "CACHE_TTL", 3600u64)?),
            monitoring_dsn: get("SENTRY_DSN"),
            api_key: get("API_KEY"),
            api_secret: get("API_SECRET"),
        })
    }

    /// Checks the artifact paths the process cannot start without.
    pub fn validate_paths(&self) -> Result<(), ConfigError> {
        require_file("MODEL_PATH", &self.model.model_path)?;
        require_file("CLASSIFIER_PATH", &self.model.classifier_path)?;
        if let Some(path) = &self.image.preprocess_config {
            require_file("PREPROCESS_CONFIG", path)?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some() || self.api_secret.is_some()
    }
}

fn default_encoder_path(model_name: &str) -> PathBuf {
    let tail = model_name.rsplit('/').next().unwrap_or(model_name);
    PathBuf::from(format!("models/{}.pt", tail))
}

fn require_file(key: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingFile {
            key,
            path: path.to_path_buf(),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn parse_positive<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq + fmt::Display,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
