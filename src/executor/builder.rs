use std::sync::Arc;
use std::time::Duration;

use crate::auth::{NoAuth, RequestAuthenticator};
use crate::backoff::BackoffSource;
use crate::transport::Transport;

use super::{DEFAULT_MAX_ATTEMPTS, RequestExecutor};

pub struct RequestExecutorBuilder {
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn RequestAuthenticator>,
    backoff_source: Option<Arc<dyn BackoffSource>>,
    max_attempts: i32,
    max_elapsed: Duration,
}

impl RequestExecutorBuilder {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            authenticator: Arc::new(NoAuth),
            backoff_source: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_elapsed: Duration::ZERO,
        }
    }

    /// Maximum number of sends per logical call. Zero or negative disables
    /// the attempt budget; at least one budget must be enabled for any retry
    /// to happen.
    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Maximum wall-clock time a call may spend across all its attempts and
    /// sleeps. [`Duration::ZERO`] disables the elapsed-time budget.
    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn authenticator_arc(mut self, authenticator: Arc<dyn RequestAuthenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn authenticator<A>(self, authenticator: A) -> Self
    where
        A: RequestAuthenticator + 'static,
    {
        self.authenticator_arc(Arc::new(authenticator))
    }

    /// Custom delay policy. The source is asked for a fresh strategy at the
    /// start of every call, because strategies are stateful and not safe to
    /// share across in-flight calls.
    pub fn backoff_source_arc(mut self, backoff_source: Arc<dyn BackoffSource>) -> Self {
        self.backoff_source = Some(backoff_source);
        self
    }

    pub fn backoff_source<B>(self, backoff_source: B) -> Self
    where
        B: BackoffSource + 'static,
    {
        self.backoff_source_arc(Arc::new(backoff_source))
    }

    pub fn build(self) -> RequestExecutor {
        RequestExecutor {
            transport: self.transport,
            authenticator: self.authenticator,
            backoff_source: self.backoff_source,
            max_attempts: self.max_attempts,
            max_elapsed: self.max_elapsed,
        }
    }
}
