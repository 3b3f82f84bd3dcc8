//! Classification of HTTP responses into [`RemoteError`]s.
//!
//! A 429 becomes [`RemoteError::Throttled`] so the invoker can retry it; any
//! other failure becomes [`RemoteError::Other`] with an [`HttpError`].

use crate::common::{DEFAULT_RETRY_AFTER, HttpError, RemoteError, ThrottleSignal};
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;

pub const TOO_MANY_REQUESTS: u16 = 429;

/// Body of a rate-limited response, e.g.
/// `{"message": "You are being rate limited.", "retry_after": 0.64, "global": false}`.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

/// Extract a throttle signal from the parts of a response.
///
/// Returns `None` for any status other than 429. Timing is taken from the
/// JSON body's `retry_after` first, then from a numeric `Retry-After`
/// header, and falls back to [`DEFAULT_RETRY_AFTER`].
pub fn throttle_from_parts(
    status: u16,
    retry_after_header: Option<&str>,
    body: &str,
) -> Option<ThrottleSignal> {
    if status != TOO_MANY_REQUESTS {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<RateLimitBody>(body) {
        return Some(ThrottleSignal::from_secs_f64(parsed.retry_after).with_global(parsed.global));
    }

    let signal = retry_after_header
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(ThrottleSignal::from_secs_f64)
        .unwrap_or_else(|| ThrottleSignal::new(DEFAULT_RETRY_AFTER));
    Some(signal)
}

/// Pass successful responses through and classify the rest.
pub async fn classify_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, RemoteError<HttpError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::Other(request_error(&url, e)))?;

    match throttle_from_parts(status.as_u16(), retry_after.as_deref(), &body) {
        Some(signal) => {
            log::debug!("Throttled by {}: {}", url, signal);
            Err(RemoteError::Throttled(signal))
        }
        None => Err(RemoteError::Other(HttpError::Status {
            url,
            status: status.as_u16(),
            body,
        })),
    }
}

/// Send a request and classify its response.
///
/// Build the request inside the operation closure so each retry sends a
/// fresh one:
///
/// ```no_run
/// # async fn run(client: reqwest::Client) {
/// use relay::invoker::RateLimitedInvoker;
///
/// let invoker = RateLimitedInvoker::default();
/// let response = invoker
///     .invoke(|| relay::http::execute(client.patch("https://example.invalid/guilds/1")))
///     .await;
/// # }
/// ```
pub async fn execute(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, RemoteError<HttpError>> {
    let (client, request) = request.build_split();
    let request = request.map_err(|e| {
        RemoteError::Other(HttpError::RequestFailed {
            url: e.url().map(ToString::to_string).unwrap_or_default(),
            reason: e.to_string(),
        })
    })?;
    let url = request.url().to_string();

    let response = client
        .execute(request)
        .await
        .map_err(|e| RemoteError::Other(request_error(&url, e)))?;
    classify_response(response).await
}

/// Deserialize a JSON body, reporting a mismatch as [`HttpError::InvalidResponse`].
pub async fn json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RemoteError<HttpError>> {
    let url = response.url().to_string();
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::Other(request_error(&url, e)))?;
    serde_json::from_str(&body).map_err(|e| {
        RemoteError::Other(HttpError::InvalidResponse {
            expected: std::any::type_name::<T>().to_string(),
            actual: e.to_string(),
        })
    })
}

fn request_error(url: &str, error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::Timeout {
            url: url.to_string(),
        }
    } else {
        HttpError::RequestFailed {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}
