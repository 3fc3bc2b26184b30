use http::HeaderValue;
use http::header::AUTHORIZATION;

use crate::error::Error;
use crate::request::ApiRequest;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Signs an outgoing request before it reaches the transport.
///
/// The executor re-signs on every attempt: header snapshots are restored
/// before each retry, which wipes whatever a previous signing pass added.
pub trait RequestAuthenticator: Send + Sync {
    fn authenticate(&self, request: &mut ApiRequest) -> Result<(), BoxError>;
}

/// Leaves the request untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuth;

impl RequestAuthenticator for NoAuth {
    fn authenticate(&self, _request: &mut ApiRequest) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Attaches a fixed bearer token. Suitable for SDKs holding a long-lived API
/// token; scheme selection and token refresh live outside this crate.
#[derive(Clone, Debug)]
pub struct StaticBearerAuth {
    header_value: HeaderValue,
}

impl StaticBearerAuth {
    pub fn new(token: &str) -> crate::Result<Self> {
        let mut header_value =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|source| {
                Error::InvalidHeaderValue {
                    name: AUTHORIZATION.as_str().to_owned(),
                    source,
                }
            })?;
        header_value.set_sensitive(true);
        Ok(Self { header_value })
    }
}

impl RequestAuthenticator for StaticBearerAuth {
    fn authenticate(&self, request: &mut ApiRequest) -> Result<(), BoxError> {
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.header_value.clone());
        Ok(())
    }
}
