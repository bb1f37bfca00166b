pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, API_BASE_URL_ENV};
pub use schema::{
    HttpConfig, LogFormat, LoggingConfig, PollingConfig, RetentionConfig, TrackerConfig,
    UploadConfig,
};
