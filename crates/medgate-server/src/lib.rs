pub mod config;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod ratelimit;
pub mod server;

pub use config::{AppConfig, RateLimitConfig, RouteConfig, ServerConfig, ServiceConfig};
pub use gateway::{Forwarder, GatewayError, HttpForwarder, RouteRule, RouteTable};
pub use health::{HealthAggregator, HealthProbe, HealthTarget};
pub use observability::init_tracing;
pub use ratelimit::{Admission, FixedWindowLimiter};
pub use server::{AppState, GatewayServer, ServerBuilder, build_app, serve};
