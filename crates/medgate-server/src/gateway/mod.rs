//! Reverse-proxy core of the gateway.
//!
//! Requests that no local handler claims land in
//! [`gateway_fallback_handler`], which looks the path up in the
//! [`RouteTable`] and relays it through a [`Forwarder`]:
//!
//! ```text
//! request ──▶ RouteTable::match_path ──▶ Forwarder::forward ──▶ backend
//!                    │ no match                 │ transport failure
//!                    ▼                          ▼
//!              404 envelope              503 envelope
//! ```
//!
//! Backend responses, including 4xx/5xx, are passed through unchanged.

pub mod error;
pub mod proxy;
pub mod router;
pub mod types;

pub use error::{GatewayError, panic_response};
pub use proxy::{Forwarder, HttpForwarder, UpstreamError, forwardable_headers};
pub use router::{RouteTable, gateway_fallback_handler};
pub use types::RouteRule;
