//! Blocking HTTP client with timeout and bounded retry

use crate::error::Error;
use eyre::Result;
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode,
};
use serde::de::DeserializeOwned;
use std::{io::Write, time::Duration};

/// Delay added per failed attempt (attempt 1 waits 1x, attempt 2 waits 2x...)
const BACKOFF_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contraget/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            retries,
            backoff: BACKOFF_STEP,
        })
    }

    /// Per-request timeout, covering the whole body
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Overrides the backoff step, mostly useful to keep tests fast
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET `url` with `query` parameters and decode the JSON body
    pub fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.send(url, || self.client.get(url).query(query))?;
        response.json::<T>().map_err(|e| {
            Error::Download {
                url: url.to_string(),
                reason: format!("invalid JSON body: {e}"),
            }
            .into()
        })
    }

    /// GET `url` and stream the body into `out`, returning the byte count
    pub fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
        let mut response = self.send(url, || self.client.get(url))?;
        response.copy_to(out).map_err(|e| {
            Error::Download {
                url: url.to_string(),
                reason: format!("failed while reading body: {e}"),
            }
            .into()
        })
    }

    fn send(&self, url: &str, request: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let failure = match request().send() {
                Ok(response) if response.status() == StatusCode::OK => return Ok(response),
                Ok(response) if !is_retryable(response.status()) => {
                    return Err(Error::Download {
                        url: url.to_string(),
                        reason: format!("unexpected status code: {}", response.status()),
                    }
                    .into());
                }
                Ok(response) => format!("unexpected status code: {}", response.status()),
                Err(e) => e.without_url().to_string(),
            };

            if attempt >= self.retries {
                return Err(Error::Download {
                    url: url.to_string(),
                    reason: failure,
                }
                .into());
            }

            attempt += 1;
            tracing::warn!(
                "Request to {} failed ({}), retry {}/{}",
                url,
                failure,
                attempt,
                self.retries
            );
            std::thread::sleep(self.backoff * attempt);
        }
    }
}

/// Transient statuses worth another attempt
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_unreachable_host_is_download_error() {
        let client = HttpClient::new(Duration::from_millis(200), 1)
            .unwrap()
            .with_backoff(Duration::from_millis(1));

        let mut sink = Vec::new();
        let err = client
            .download("http://127.0.0.1:9/solc-static-linux", &mut sink)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Download { .. })
        ));
        assert!(sink.is_empty());
    }
}
