//! HTTP retry helpers for the climate data store.
//!
//! Every call to the store goes through [`send`] or [`send_json`] so that
//! transient failures (timeouts, connection resets, HTTP 429 and 5xx) are
//! retried with exponential backoff. Other 4xx responses are permanent.

use std::time::Duration;

use crate::WeatherError;

/// Maximum retry attempts for transient HTTP errors.
///
/// Backoff is 2s, 4s, 8s, 16s, so a request gives up after 30 seconds of
/// waiting plus the request timeouts.
const MAX_RETRIES: u32 = 4;

/// Maximum full re-fetches when a JSON body cannot be decoded.
const MAX_BODY_RETRIES: u32 = 2;

/// Maximum length of the response body preview in error messages.
const BODY_PREVIEW_LEN: usize = 300;

/// Delay before retry number `attempt` (1-based).
#[must_use]
pub const fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

/// Whether an HTTP status is worth retrying.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sends a request and returns the successful response.
///
/// `build_request` is called once per attempt because request builders are
/// consumed by `send()`.
///
/// # Errors
///
/// Returns [`WeatherError`] if the request still fails after all retries
/// or the store answers with a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send<F>(build_request: F) -> Result<reqwest::Response, WeatherError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_inner(&build_request, MAX_RETRIES).await
}

/// Sends a request and parses the response body as JSON.
///
/// A body that arrives but cannot be decoded triggers a full re-fetch.
///
/// # Errors
///
/// Returns [`WeatherError`] if the request fails after all retries or the
/// body is still not valid JSON after [`MAX_BODY_RETRIES`] re-fetches.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, WeatherError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send_inner(&build_request, MAX_RETRIES).await?;
        let url = response.url().to_string();
        let status = response.status();

        let outcome = match response.text().await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                format!("JSON parse failed: {e} (status={status}, body: {preview})")
            }),
            Err(e) => Err(format!("body read failed: {e}")),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(message) if body_attempt < MAX_BODY_RETRIES => {
                body_attempt += 1;
                let delay = backoff_delay(body_attempt);
                log::warn!(
                    "{message} (body retry {body_attempt}/{MAX_BODY_RETRIES}), re-fetching {url} in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(message) => return Err(WeatherError::Api { message }),
        }
    }
}

#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, WeatherError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(WeatherError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if is_retryable_status(status) {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} from {}", response.url());
                        attempt += 1;
                        continue;
                    }
                    return Err(WeatherError::Api {
                        message: format!("HTTP {status} after {max_retries} retries"),
                    });
                }

                if status.is_client_error() {
                    let body = response.text().await.unwrap_or_default();
                    let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
                    return Err(WeatherError::Api {
                        message: format!("HTTP {status}: {preview}"),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(reqwest::StatusCode::OK));
    }
}
