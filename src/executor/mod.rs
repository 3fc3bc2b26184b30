use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::auth::RequestAuthenticator;
use crate::backoff::BackoffSource;
use crate::transport::Transport;

mod builder;
mod execute;

pub use builder::RequestExecutorBuilder;

/// Correlation id issued by the server for one logical request.
pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";
/// Carries the original failing request's correlation id on retried sends.
pub(crate) const RETRY_FOR_HEADER: &str = "x-retry-for";
/// 1-based attempt number, attached from the second attempt onward.
pub(crate) const RETRY_COUNT_HEADER: &str = "x-retry-count";

pub(crate) const DEFAULT_MAX_ATTEMPTS: i32 = 4;

/// Executes requests against a [`Transport`], transparently retrying a
/// bounded set of transient conditions under two independent budgets: a
/// maximum attempt count and a maximum total elapsed wall-clock time.
///
/// All per-call state (attempt counter, elapsed timer, header and query
/// snapshots) is local to one [`execute`](RequestExecutor::execute) call, so
/// one executor can serve any number of caller threads concurrently.
pub struct RequestExecutor {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) authenticator: Arc<dyn RequestAuthenticator>,
    pub(crate) backoff_source: Option<Arc<dyn BackoffSource>>,
    pub(crate) max_attempts: i32,
    pub(crate) max_elapsed: Duration,
}

impl RequestExecutor {
    pub fn builder(transport: Arc<dyn Transport>) -> RequestExecutorBuilder {
        RequestExecutorBuilder::new(transport)
    }

    /// An executor with the default budgets: four attempts, no elapsed-time
    /// budget.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}
