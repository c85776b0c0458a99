/// Installs the global logger at `level` (the `LOG_LEVEL` setting).
/// `RUST_LOG`, when set, overrides it.
pub fn init(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(level))
        .format_timestamp_millis()
        .try_init()
        .ok();
}
