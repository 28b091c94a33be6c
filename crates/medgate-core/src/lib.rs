pub mod envelope;
pub mod error;
pub mod health;
pub mod time;

pub use envelope::ErrorEnvelope;
pub use error::{CoreError, Result};
pub use health::{GatewayStatus, HealthFailure, HealthReport, ServiceState};
pub use time::{Timestamp, now_utc};
