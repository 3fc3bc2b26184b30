//! `idreq` is the blocking HTTP request-execution layer for identity-management
//! API SDKs: retry of transient failures with two independent budgets,
//! pluggable exponential backoff with jitter, rate-limit-aware delays derived
//! from server reset timestamps, correlation-id propagation across retries,
//! and a pooled transport that resolves redirects before the retry loop ever
//! sees them.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use idreq::prelude::{ApiRequest, RequestExecutor, StaticBearerAuth, UreqTransport};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: String,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UreqTransport::builder()
//!         .timeout(Duration::from_secs(10))
//!         .build()?;
//!     let executor = RequestExecutor::builder(Arc::new(transport))
//!         .max_attempts(4)
//!         .max_elapsed(Duration::from_secs(60))
//!         .authenticator(StaticBearerAuth::new("00aBcDeFg")?)
//!         .build();
//!
//!     let request = ApiRequest::get("https://id.example.com/api/v1/users/u1")?
//!         .query_pair("expand", "profile");
//!     let user: User = executor.execute(request)?.json()?;
//!
//!     println!("fetched user {}", user.id);
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Keep the default four-attempt budget and add `max_elapsed` for
//!   latency-sensitive callers.
//! - Buffered bodies retry transparently; reader bodies are sent at most
//!   once and degrade to the first response when a retry would be needed.

mod auth;
mod backoff;
mod error;
mod executor;
mod rate_limit;
mod request;
mod response;
mod transport;
mod util;

pub use crate::auth::{NoAuth, RequestAuthenticator, StaticBearerAuth};
pub use crate::backoff::{BackoffDelay, BackoffSource, BackoffStrategy, ExponentialBackoff};
pub use crate::error::{Error, ErrorCode, TransportErrorKind};
pub use crate::executor::{RequestExecutor, RequestExecutorBuilder};
pub use crate::rate_limit::RateLimitContext;
pub use crate::request::{ApiRequest, RequestBody};
pub use crate::response::ApiResponse;
pub use crate::transport::{
    AttemptBody, PreparedRequest, Transport, TransportError, UreqTransport, UreqTransportBuilder,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        ApiRequest, ApiResponse, BackoffDelay, BackoffSource, BackoffStrategy, Error, ErrorCode,
        ExponentialBackoff, NoAuth, RateLimitContext, RequestAuthenticator, RequestExecutor,
        RequestExecutorBuilder, StaticBearerAuth, Transport, TransportError, TransportErrorKind,
        UreqTransport,
    };
}
