pub mod config;
pub mod context;
pub mod credentials;
pub mod logging;
