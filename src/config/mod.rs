pub mod schema;

pub use schema::{
    app_dir, BrowserConfig, Config, GatewayConfig, SessionConfig, StoreConfig, DEFAULT_PORT,
};
