use crate::error::Error;
use crate::response::ApiResponse;

pub(crate) const RATE_LIMIT_REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub(crate) const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
pub(crate) const RATE_LIMIT_LIMIT_HEADER: &str = "x-rate-limit-limit";

/// Read-only view over the rate-limit headers of the most recently observed
/// response. Constructed fresh per response, never cached, never mutated.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitContext<'a> {
    response: Option<&'a ApiResponse>,
}

impl<'a> RateLimitContext<'a> {
    pub fn of(response: &'a ApiResponse) -> Self {
        Self {
            response: Some(response),
        }
    }

    /// A context with no observed response yet; every accessor fails with
    /// [`Error::NoResponseObserved`].
    pub const fn unobserved() -> Self {
        Self { response: None }
    }

    /// Requests remaining in the current quota window.
    pub fn remaining(&self) -> crate::Result<u64> {
        self.numeric_header(RATE_LIMIT_REMAINING_HEADER)
    }

    /// Unix timestamp, in seconds, at which the quota window refills.
    pub fn reset(&self) -> crate::Result<u64> {
        self.numeric_header(RATE_LIMIT_RESET_HEADER)
    }

    /// Total requests allowed per quota window.
    pub fn limit(&self) -> crate::Result<u64> {
        self.numeric_header(RATE_LIMIT_LIMIT_HEADER)
    }

    fn numeric_header(&self, header: &'static str) -> crate::Result<u64> {
        let response = self.response.ok_or(Error::NoResponseObserved)?;
        let value = response
            .headers()
            .get(header)
            .ok_or(Error::MissingRateLimitHeader { header })?;
        let text = value
            .to_str()
            .map_err(|_| Error::MalformedRateLimitHeader {
                header,
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            })?;
        text.trim()
            .parse()
            .map_err(|_| Error::MalformedRateLimitHeader {
                header,
                value: text.to_owned(),
            })
    }
}
