mod settings;

pub use settings::{
    ApiConfig, JwtConfig, LogFormat, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
};
