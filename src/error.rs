use http::Method;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Redirect,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Redirect => "redirect",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    SerializeJson,
    SerializeQuery,
    SerializeForm,
    InvalidHeaderName,
    InvalidHeaderValue,
    Authentication,
    Transport,
    BodyNotReplayable,
    RetryBudgetExhausted,
    Deserialize,
    MissingRateLimitHeader,
    MalformedRateLimitHeader,
    NoResponseObserved,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::SerializeJson => "serialize_json",
            Self::SerializeQuery => "serialize_query",
            Self::SerializeForm => "serialize_form",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::Authentication => "authentication",
            Self::Transport => "transport",
            Self::BodyNotReplayable => "body_not_replayable",
            Self::RetryBudgetExhausted => "retry_budget_exhausted",
            Self::Deserialize => "deserialize",
            Self::MissingRateLimitHeader => "missing_rate_limit_header",
            Self::MalformedRateLimitHeader => "malformed_rate_limit_header",
            Self::NoResponseObserved => "no_response_observed",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request url: {url}")]
    InvalidUrl { url: String },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize request query: {source}")]
    SerializeQuery {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("failed to serialize request form: {source}")]
    SerializeForm {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to sign request for {method} {url}: {source}")]
    Authentication {
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("transport error ({kind}) for {method} {url}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("cannot retry {method} {url}: request body is not replayable")]
    BodyNotReplayable { method: Method, url: String },
    #[error("retry budget exhausted after {attempts} attempts for {method} {url}")]
    RetryBudgetExhausted {
        method: Method,
        url: String,
        attempts: u32,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("rate limit header {header} is missing from the response")]
    MissingRateLimitHeader { header: &'static str },
    #[error("rate limit header {header} is not numeric: {value}")]
    MalformedRateLimitHeader { header: &'static str, value: String },
    #[error("no response has been observed yet")]
    NoResponseObserved,
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::SerializeQuery { .. } => ErrorCode::SerializeQuery,
            Self::SerializeForm { .. } => ErrorCode::SerializeForm,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Authentication { .. } => ErrorCode::Authentication,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::BodyNotReplayable { .. } => ErrorCode::BodyNotReplayable,
            Self::RetryBudgetExhausted { .. } => ErrorCode::RetryBudgetExhausted,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::MissingRateLimitHeader { .. } => ErrorCode::MissingRateLimitHeader,
            Self::MalformedRateLimitHeader { .. } => ErrorCode::MalformedRateLimitHeader,
            Self::NoResponseObserved => ErrorCode::NoResponseObserved,
        }
    }
}
