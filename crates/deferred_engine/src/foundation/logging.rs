//! Logging initialization

/// Initialize env_logger with sensible defaults for the engine
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
