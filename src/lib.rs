//! PAC-style forwarding gateway library

pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod upstream;

pub use config::schema::GatewayConfig;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
