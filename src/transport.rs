use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, Method};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, TransportErrorKind};
use crate::response::ApiResponse;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = usize::MAX / 2;
const DEFAULT_MAX_CONNECTIONS_TOTAL: usize = usize::MAX;
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str = "idreq";
const MAX_REDIRECT_HOPS: usize = 10;

/// Body handle for one send attempt. Buffered bodies are cheap clones of the
/// request's bytes; a reader body is handed over exactly once.
pub enum AttemptBody {
    Empty,
    Buffered(Bytes),
    Reader(Box<dyn Read + Send + Sync>),
}

impl std::fmt::Debug for AttemptBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Buffered(body) => formatter
                .debug_tuple("Buffered")
                .field(&body.len())
                .finish(),
            Self::Reader(_) => formatter.write_str("Reader"),
        }
    }
}

/// A request as handed to the transport: the query string is already applied
/// to the URL and the headers are final for this attempt.
#[derive(Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: AttemptBody,
}

/// A connectivity fault raised by a transport, classified as transient
/// (worth retrying) or fatal.
#[derive(Debug, Error)]
#[error("{kind} fault: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    transient: bool,
    #[source]
    source: BoxError,
}

impl TransportError {
    pub fn transient(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            transient: true,
            source: source.into(),
        }
    }

    pub fn fatal(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            transient: false,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub(crate) fn into_error(self, method: &Method, url: &Url) -> Error {
        Error::Transport {
            kind: self.kind,
            method: method.clone(),
            url: url.to_string(),
            source: self.source,
        }
    }
}

/// Performs the literal network call for a fully-formed request.
///
/// Implementations must be safe to share across caller threads; the executor
/// never serializes access. The response handed back is always final and
/// fully buffered — redirects are resolved inside the transport so retry
/// bookkeeping upstream sees every non-redirect outcome.
pub trait Transport: Send + Sync {
    fn send(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError>;
}

pub struct UreqTransportBuilder {
    timeout: Duration,
    max_connections_per_host: usize,
    max_connections_total: usize,
    max_response_body_bytes: usize,
    proxy: Option<(String, u16)>,
    proxy_credentials: Option<(String, String)>,
    user_agent: String,
}

impl UreqTransportBuilder {
    pub(crate) fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            max_connections_total: DEFAULT_MAX_CONNECTIONS_TOTAL,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            proxy: None,
            proxy_credentials: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Single uniform duration applied to connect and read phases alike.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn max_connections_per_host(mut self, max_connections_per_host: usize) -> Self {
        self.max_connections_per_host = max_connections_per_host.max(1);
        self
    }

    pub fn max_connections_total(mut self, max_connections_total: usize) -> Self {
        self.max_connections_total = max_connections_total.max(1);
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some((host.into(), port));
        self
    }

    pub fn proxy_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.proxy_credentials = Some((username.into(), password.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> crate::Result<UreqTransport> {
        let (per_host, total) =
            resolve_pool_caps(self.max_connections_per_host, self.max_connections_total);

        let proxy = match &self.proxy {
            Some((host, port)) => {
                let uri = match &self.proxy_credentials {
                    Some((username, password)) => {
                        format!("http://{username}:{password}@{host}:{port}")
                    }
                    None => format!("http://{host}:{port}"),
                };
                let proxy = ureq::Proxy::new(&uri).map_err(|_| Error::InvalidUrl {
                    url: format!("http://{host}:{port}"),
                })?;
                Some(proxy)
            }
            None => None,
        };

        // Redirects are disabled in the agent so this adapter observes every
        // 3xx hop itself and the executor only ever sees final responses.
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .user_agent(&self.user_agent)
            .max_idle_connections_per_host(per_host)
            .max_idle_connections(total)
            .proxy(proxy)
            .build();

        Ok(UreqTransport {
            agent: config.new_agent(),
            timeout: self.timeout,
            max_response_body_bytes: self.max_response_body_bytes,
        })
    }
}

/// Blocking transport over a pooled ureq agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
    max_response_body_bytes: usize,
}

impl UreqTransport {
    pub fn builder() -> UreqTransportBuilder {
        UreqTransportBuilder::new()
    }

    pub fn standard() -> crate::Result<Self> {
        Self::builder().build()
    }

    fn run_once(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: AttemptBody,
    ) -> Result<ureq::http::Response<ureq::Body>, TransportError> {
        let mut builder = ureq::http::Request::builder().method(method.clone()).uri(url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        match body {
            AttemptBody::Empty => {
                let request = builder
                    .body(Vec::new())
                    .map_err(|source| TransportError::fatal(TransportErrorKind::Other, source))?;
                self.run_configured(request)
            }
            AttemptBody::Buffered(body) => {
                let request = builder
                    .body(body.to_vec())
                    .map_err(|source| TransportError::fatal(TransportErrorKind::Other, source))?;
                self.run_configured(request)
            }
            AttemptBody::Reader(reader) => {
                let request = builder
                    .body(ureq::SendBody::from_owned_reader(reader))
                    .map_err(|source| TransportError::fatal(TransportErrorKind::Other, source))?;
                self.run_configured(request)
            }
        }
    }

    fn run_configured<S: ureq::AsSendBody>(
        &self,
        request: ureq::http::Request<S>,
    ) -> Result<ureq::http::Response<ureq::Body>, TransportError> {
        let configured = self
            .agent
            .configure_request(request)
            .timeout_global(Some(self.timeout))
            .timeout_per_call(Some(self.timeout))
            .timeout_connect(Some(self.timeout))
            .timeout_recv_response(Some(self.timeout))
            .timeout_recv_body(Some(self.timeout))
            .build();

        self.agent.run(configured).map_err(|source| {
            let (kind, transient) = classify_ureq_error(&source);
            TransportError {
                kind,
                transient,
                source: Box::new(source),
            }
        })
    }

    fn materialize(
        &self,
        mut response: ureq::http::Response<ureq::Body>,
    ) -> Result<ApiResponse, TransportError> {
        let status = response.status();
        let mut headers = response.headers().clone();

        let body = read_all_body_limited(&mut response, self.max_response_body_bytes)?;
        if headers.contains_key(CONTENT_ENCODING) {
            // ureq already decoded the body; the original framing headers no
            // longer describe it.
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
        }

        Ok(ApiResponse::new(status, headers, body))
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        let PreparedRequest {
            mut method,
            url,
            mut headers,
            body,
        } = request;

        let (mut buffered, mut reader) = match body {
            AttemptBody::Empty => (None, None),
            AttemptBody::Buffered(bytes) => (Some(bytes), None),
            AttemptBody::Reader(inner) => (None, Some(inner)),
        };
        let had_reader_body = reader.is_some();

        let mut current_url = url;
        let mut hops = 0_usize;

        loop {
            let hop_body = if let Some(bytes) = &buffered {
                AttemptBody::Buffered(bytes.clone())
            } else if let Some(inner) = reader.take() {
                AttemptBody::Reader(inner)
            } else {
                AttemptBody::Empty
            };

            let response = self.run_once(&method, current_url.as_str(), &headers, hop_body)?;
            let status = response.status();
            if !status.is_redirection() {
                return self.materialize(response);
            }

            hops += 1;
            if hops > MAX_REDIRECT_HOPS {
                return Err(TransportError::fatal(
                    TransportErrorKind::Redirect,
                    format!("redirect limit of {MAX_REDIRECT_HOPS} hops exceeded at {current_url}"),
                ));
            }

            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(ToOwned::to_owned)
            else {
                return Err(TransportError::fatal(
                    TransportErrorKind::Redirect,
                    format!("redirect response {status} without a location header"),
                ));
            };
            let Ok(next_url) = current_url.join(&location) else {
                return Err(TransportError::fatal(
                    TransportErrorKind::Redirect,
                    format!("unresolvable redirect location {location}"),
                ));
            };

            let next_method = redirect_method(&method, status);
            let switched_to_get = next_method == Method::GET && method != Method::GET;
            if switched_to_get {
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
                buffered = None;
            } else if had_reader_body {
                // A reader body was already consumed by the previous hop and
                // this redirect wants it again.
                return Err(TransportError::fatal(
                    TransportErrorKind::Redirect,
                    format!("redirect {status} requires replaying a non-replayable body"),
                ));
            }
            if !same_origin(&current_url, &next_url) {
                headers.remove(AUTHORIZATION);
                headers.remove(COOKIE);
            }

            debug!(
                status = status.as_u16(),
                location = %next_url,
                hop = hops,
                "following redirect"
            );

            method = next_method;
            current_url = next_url;
        }
    }
}

fn redirect_method(method: &Method, status: http::StatusCode) -> Method {
    match status.as_u16() {
        303 => Method::GET,
        301 | 302 if *method == Method::POST => Method::GET,
        _ => method.clone(),
    }
}

fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}

pub(crate) fn resolve_pool_caps(per_host: usize, total: usize) -> (usize, usize) {
    if total < per_host {
        warn!(
            per_host,
            total,
            "total connection cap below per-host cap; reverting both to defaults"
        );
        return (
            DEFAULT_MAX_CONNECTIONS_PER_HOST,
            DEFAULT_MAX_CONNECTIONS_TOTAL,
        );
    }
    (per_host, total)
}

fn classify_ureq_error(error: &ureq::Error) -> (TransportErrorKind, bool) {
    match error {
        ureq::Error::HostNotFound => (TransportErrorKind::Dns, false),
        ureq::Error::Tls(_) => (TransportErrorKind::Tls, false),
        ureq::Error::ConnectProxyFailed(_) => (TransportErrorKind::Connect, false),
        ureq::Error::ConnectionFailed => (TransportErrorKind::Connect, true),
        ureq::Error::Timeout(_) => (TransportErrorKind::Read, true),
        ureq::Error::Io(source) => classify_io_error(source),
        _ => (TransportErrorKind::Other, false),
    }
}

fn classify_io_error(error: &std::io::Error) -> (TransportErrorKind, bool) {
    match error.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            (TransportErrorKind::Read, true)
        }
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::NotConnected => (TransportErrorKind::Read, true),
        std::io::ErrorKind::NotFound => (TransportErrorKind::Dns, false),
        std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable => {
            (TransportErrorKind::Connect, false)
        }
        _ => (TransportErrorKind::Other, false),
    }
}

fn wrapped_ureq_error(io_error: &std::io::Error) -> Option<&ureq::Error> {
    io_error
        .get_ref()
        .and_then(|source| source.downcast_ref::<ureq::Error>())
}

fn read_all_body_limited(
    response: &mut ureq::http::Response<ureq::Body>,
    max_bytes: usize,
) -> Result<Bytes, TransportError> {
    let mut reader = response.body_mut().as_reader();
    let mut collected = Vec::new();
    let mut chunk = [0_u8; 8192];
    let mut total_len = 0_usize;

    loop {
        let read = reader.read(&mut chunk).map_err(|source| {
            if let Some(inner) = wrapped_ureq_error(&source) {
                let (kind, transient) = classify_ureq_error(inner);
                TransportError {
                    kind,
                    transient,
                    source: Box::new(source),
                }
            } else {
                let (kind, transient) = classify_io_error(&source);
                TransportError {
                    kind,
                    transient,
                    source: Box::new(source),
                }
            }
        })?;
        if read == 0 {
            break;
        }
        total_len = total_len.saturating_add(read);
        if total_len > max_bytes {
            return Err(TransportError::fatal(
                TransportErrorKind::Read,
                format!("response body exceeds the {max_bytes} byte limit"),
            ));
        }
        collected.extend_from_slice(&chunk[..read]);
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_MAX_CONNECTIONS_PER_HOST, DEFAULT_MAX_CONNECTIONS_TOTAL, redirect_method,
        resolve_pool_caps, same_origin,
    };
    use http::{Method, StatusCode};
    use url::Url;

    #[test]
    fn inconsistent_pool_caps_revert_to_defaults() {
        assert_eq!(
            resolve_pool_caps(64, 8),
            (DEFAULT_MAX_CONNECTIONS_PER_HOST, DEFAULT_MAX_CONNECTIONS_TOTAL)
        );
    }

    #[test]
    fn consistent_pool_caps_are_kept() {
        assert_eq!(resolve_pool_caps(8, 64), (8, 64));
    }

    #[test]
    fn see_other_switches_any_method_to_get() {
        assert_eq!(
            redirect_method(&Method::PUT, StatusCode::SEE_OTHER),
            Method::GET
        );
    }

    #[test]
    fn temporary_redirect_preserves_the_method() {
        assert_eq!(
            redirect_method(&Method::POST, StatusCode::TEMPORARY_REDIRECT),
            Method::POST
        );
    }

    #[test]
    fn same_origin_considers_default_ports() {
        let left = Url::parse("https://api.example.com/a").expect("url should parse");
        let right = Url::parse("https://api.example.com:443/b").expect("url should parse");
        let other = Url::parse("https://other.example.com/b").expect("url should parse");
        assert!(same_origin(&left, &right));
        assert!(!same_origin(&left, &other));
    }
}
