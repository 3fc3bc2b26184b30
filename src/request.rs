use std::io::Read;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use url::Url;

use crate::error::Error;
use crate::transport::{AttemptBody, PreparedRequest};
use crate::util::{append_query_to_url, parse_header_name, parse_header_value};

pub enum RequestBody {
    Empty,
    Buffered(Bytes),
    Reader(Option<Box<dyn Read + Send + Sync>>),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Buffered(body) => formatter
                .debug_tuple("Buffered")
                .field(&body.len())
                .finish(),
            Self::Reader(reader) => formatter
                .debug_tuple("Reader")
                .field(&reader.is_some())
                .finish(),
        }
    }
}

/// Snapshot of the mutable request parts taken before the first send, so
/// every retry attempt starts from the caller's original request rather than
/// from whatever the previous attempt left behind.
#[derive(Clone, Debug)]
pub(crate) struct RequestSnapshot {
    query_pairs: Vec<(String, String)>,
    headers: HeaderMap,
}

/// A fully-assembled API request: method, target URL without query string,
/// ordered query pairs, headers, and an optionally-replayable body.
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    query_pairs: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl AsRef<str>) -> crate::Result<Self> {
        let raw = url.as_ref();
        let mut parsed = Url::parse(raw).map_err(|_| Error::InvalidUrl {
            url: raw.to_owned(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl {
                url: raw.to_owned(),
            });
        }

        let query_pairs = parsed
            .query_pairs()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        parsed.set_query(None);
        parsed.set_fragment(None);

        Ok(Self {
            method,
            url: parsed,
            query_pairs,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        })
    }

    pub fn get(url: impl AsRef<str>) -> crate::Result<Self> {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl AsRef<str>) -> crate::Result<Self> {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl AsRef<str>) -> crate::Result<Self> {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl AsRef<str>) -> crate::Result<Self> {
        Self::new(Method::DELETE, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL without its query string.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query_pairs
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> crate::Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn query_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_pairs.push((name.into(), value.into()));
        self
    }

    pub fn query<T>(mut self, params: &T) -> crate::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|source| Error::SerializeQuery { source })?;
        self.query_pairs.extend(
            url::form_urlencoded::parse(encoded.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned())),
        );
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Buffered(body.into());
        self
    }

    /// Streams the body from a reader. A reader body is consumed by the first
    /// send and cannot be replayed, which makes the request non-retryable.
    pub fn body_reader<R>(mut self, reader: R) -> Self
    where
        R: Read + Send + Sync + 'static,
    {
        self.body = RequestBody::Reader(Some(Box::new(reader)));
        self
    }

    pub fn json<T>(self, payload: &T) -> crate::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|source| Error::SerializeJson { source })?;
        let with_body = self.body(Bytes::from(body));
        Ok(with_body.header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    pub fn form<T>(self, payload: &T) -> crate::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_urlencoded::to_string(payload)
            .map_err(|source| Error::SerializeForm { source })?;
        let with_body = self.body(Bytes::from(encoded));
        Ok(with_body.header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        ))
    }

    pub(crate) fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            query_pairs: self.query_pairs.clone(),
            headers: self.headers.clone(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: &RequestSnapshot) {
        self.query_pairs = snapshot.query_pairs.clone();
        self.headers = snapshot.headers.clone();
    }

    /// Whether the body can be sent again. Buffered and empty bodies always
    /// can; a reader body cannot once the first send has consumed it.
    pub(crate) fn body_replayable(&self) -> bool {
        !matches!(self.body, RequestBody::Reader(None))
    }

    fn take_attempt_body(&mut self) -> AttemptBody {
        match &mut self.body {
            RequestBody::Empty => AttemptBody::Empty,
            RequestBody::Buffered(body) => AttemptBody::Buffered(body.clone()),
            RequestBody::Reader(slot) => match slot.take() {
                Some(reader) => AttemptBody::Reader(reader),
                None => AttemptBody::Empty,
            },
        }
    }

    pub(crate) fn prepare(&mut self) -> PreparedRequest {
        PreparedRequest {
            method: self.method.clone(),
            url: append_query_to_url(&self.url, &self.query_pairs),
            headers: self.headers.clone(),
            body: self.take_attempt_body(),
        }
    }
}
