use std::thread::sleep;
use std::time::{Duration, Instant};

use http::{HeaderValue, StatusCode};
use tracing::{debug, info_span, warn};

use crate::backoff::{BackoffDelay, BackoffStrategy};
use crate::error::Error;
use crate::rate_limit::RATE_LIMIT_RESET_HEADER;
use crate::request::ApiRequest;
use crate::response::ApiResponse;
use crate::util::{header_u64, response_date_millis};

use super::{
    REQUEST_ID_HEADER, RETRY_COUNT_HEADER, RETRY_FOR_HEADER, RequestExecutor, is_transient_status,
};

const FALLBACK_BASE_DELAY_MS: u64 = 300;
const FALLBACK_MAX_DELAY_MS: u64 = 20_000;
const MIN_RATE_LIMIT_DELAY_MS: u128 = 1_000;

impl RequestExecutor {
    /// Sends the request, retrying transient failures (429/503/504 and
    /// transient transport faults) until a budget runs out.
    ///
    /// When budgets run out after at least one response was received, that
    /// response is returned as-is instead of an error: a stale-but-real
    /// response beats an exception once a human-visible response exists.
    /// Every other HTTP status, including 4xx and 5xx, is returned after a
    /// single send for the caller to interpret.
    pub fn execute(&self, mut request: ApiRequest) -> crate::Result<ApiResponse> {
        let method = request.method().clone();
        let url = request.url().clone();
        let span = info_span!("idreq.request", method = %method, url = %url);
        let _enter = span.enter();

        let started_at = Instant::now();
        let snapshot = request.snapshot();
        let mut strategy = self
            .backoff_source
            .as_ref()
            .map(|source| source.backoff_for_call());
        let mut attempts_made = 0_u32;
        let mut last_response: Option<ApiResponse> = None;
        let mut retry_for: Option<HeaderValue> = None;

        loop {
            if attempts_made > 0 {
                request.restore(&snapshot);
                if retry_for.is_none() {
                    retry_for = last_response
                        .as_ref()
                        .and_then(|response| response.headers().get(REQUEST_ID_HEADER).cloned());
                }
                if !request.body_replayable() {
                    warn!("request body cannot be replayed; abandoning retry");
                    return match last_response {
                        Some(response) => Ok(response),
                        None => Err(Error::BodyNotReplayable {
                            method,
                            url: url.to_string(),
                        }),
                    };
                }
                if !self.pause_before_retry(
                    attempts_made,
                    last_response.as_ref(),
                    strategy.as_deref_mut(),
                    started_at,
                ) {
                    return match last_response {
                        Some(response) => {
                            warn!(
                                attempts = attempts_made,
                                "retry budgets exhausted; returning the last received response"
                            );
                            Ok(response)
                        }
                        None => Err(Error::RetryBudgetExhausted {
                            method,
                            url: url.to_string(),
                            attempts: attempts_made,
                        }),
                    };
                }
            }

            attempts_made += 1;
            if let Some(request_id) = &retry_for {
                request
                    .headers_mut()
                    .insert(RETRY_FOR_HEADER, request_id.clone());
            }
            if attempts_made > 1 {
                request
                    .headers_mut()
                    .insert(RETRY_COUNT_HEADER, HeaderValue::from(attempts_made));
            }

            self.authenticator
                .authenticate(&mut request)
                .map_err(|source| Error::Authentication {
                    method: method.clone(),
                    url: url.to_string(),
                    source,
                })?;

            debug!(attempt = attempts_made, "sending request");
            match self.transport.send(request.prepare()) {
                Ok(response) => {
                    let status = response.status();
                    if is_transient_status(status)
                        && self.can_attempt_again(attempts_made, started_at)
                    {
                        warn!(
                            status = status.as_u16(),
                            attempt = attempts_made,
                            "retrying request after retryable status"
                        );
                        last_response = Some(response);
                        continue;
                    }
                    debug!(
                        status = status.as_u16(),
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    return Ok(response);
                }
                Err(fault) if fault.is_transient() => {
                    if self.can_attempt_again(attempts_made, started_at) {
                        warn!(
                            error = %fault,
                            attempt = attempts_made,
                            "retrying request after transport fault"
                        );
                        continue;
                    }
                    return Err(fault.into_error(&method, &url));
                }
                Err(fault) => return Err(fault.into_error(&method, &url)),
            }
        }
    }

    fn attempt_budget_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    fn elapsed_budget_enabled(&self) -> bool {
        !self.max_elapsed.is_zero()
    }

    /// Whether the budgets leave room for one more send after `attempts_made`
    /// sends. With both budgets disabled no retry ever happens.
    fn can_attempt_again(&self, attempts_made: u32, started_at: Instant) -> bool {
        let attempt_budget = self.attempt_budget_enabled();
        let elapsed_budget = self.elapsed_budget_enabled();
        if !attempt_budget && !elapsed_budget {
            return false;
        }
        if attempt_budget && attempts_made >= self.max_attempts as u32 {
            return false;
        }
        if elapsed_budget && started_at.elapsed() >= self.max_elapsed {
            return false;
        }
        true
    }

    /// Computes and performs the pre-retry delay. Returns false when the
    /// retry must be abandoned instead: the configured strategy reported
    /// exhaustion, or sleeping would overrun the elapsed-time budget.
    fn pause_before_retry(
        &self,
        attempts_made: u32,
        last_response: Option<&ApiResponse>,
        strategy: Option<&mut (dyn BackoffStrategy + '_)>,
        started_at: Instant,
    ) -> bool {
        let delay = if let Some(strategy) = strategy {
            match strategy.next_delay() {
                BackoffDelay::Wait(delay) => delay,
                BackoffDelay::Exhausted => {
                    debug!("backoff strategy exhausted its elapsed budget");
                    return false;
                }
            }
        } else if let Some(delay) = last_response.and_then(rate_limit_delay) {
            delay
        } else {
            fallback_delay(attempts_made)
        };

        if self.elapsed_budget_enabled()
            && started_at.elapsed().saturating_add(delay) >= self.max_elapsed
        {
            return false;
        }

        debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = attempts_made,
            "pausing before retry"
        );
        if !delay.is_zero() {
            sleep(delay);
        }
        true
    }
}

/// Delay derived from a 429 response's rate-limit-reset and `Date` headers:
/// wait until the quota window refills, plus one second of slack, with a one
/// second floor. Missing or malformed headers fall back to the flat policy.
fn rate_limit_delay(response: &ApiResponse) -> Option<Duration> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let reset_seconds = header_u64(response.headers(), RATE_LIMIT_RESET_HEADER)?;
    let date_millis = response_date_millis(response.headers())?;

    let reset_millis = u128::from(reset_seconds) * 1_000;
    let delay_millis = reset_millis
        .saturating_sub(date_millis)
        .saturating_add(1_000)
        .max(MIN_RATE_LIMIT_DELAY_MS);
    Some(Duration::from_millis(delay_millis.min(u64::MAX as u128) as u64))
}

fn fallback_delay(attempts_made: u32) -> Duration {
    let exponent = attempts_made.min(31);
    let delay_ms = FALLBACK_BASE_DELAY_MS
        .saturating_mul(1_u64 << exponent)
        .min(FALLBACK_MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}
