use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;

use crate::errors::{BotError, BotResult};

/// Some operators filter unknown clients; look like a browser.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Total attempts, including the first (NETWORK_RETRY_LIMIT).
    pub max_attempts: u32,
    /// Per-attempt request timeout (REQUEST_TIMEOUT_MS).
    pub request_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Idempotent GET with exponential backoff and jitter.
///
/// Transport failures and 5xx responses retry up to the attempt limit;
/// 4xx responses fail immediately. The underlying client binds IPv4 only —
/// some exchange endpoints blackhole v6 traffic.
#[derive(Clone)]
pub struct RetryingFetcher {
    http: Client,
    config: FetcherConfig,
}

impl RetryingFetcher {
    pub fn new(config: FetcherConfig) -> BotResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BotError::configuration("HTTP_CLIENT", e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Fetch `url`, returning the response body.
    pub async fn get(&self, url: &str) -> BotResult<String> {
        let mut last_err: Option<BotError> = None;

        for attempt in 1..=self.config.max_attempts {
            match self.attempt(url).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    let terminal = !err.retryable || attempt == self.config.max_attempts;
                    err.log(&format!("GET {url} attempt {attempt}"), terminal);
                    if terminal {
                        return Err(err);
                    }
                    last_err = Some(err);
                    let jitter_ms = rand::thread_rng().gen_range(0..1000);
                    let delay = backoff_delay(
                        attempt,
                        self.config.base_delay,
                        self.config.max_delay,
                        jitter_ms,
                    );
                    sleep(delay).await;
                }
            }
        }

        // Unreachable while max_attempts >= 1
        Err(last_err
            .unwrap_or_else(|| BotError::network("NET_EXHAUSTED", format!("GET {url} failed"))))
    }

    async fn attempt(&self, url: &str) -> BotResult<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        resp.text()
            .await
            .map_err(|e| BotError::network("NET_BODY", format!("GET {url}: {e}")))
    }
}

/// No HTTP response at all: timeouts, refused connections, resets.
fn classify_transport(url: &str, err: &reqwest::Error) -> BotError {
    BotError::network("NET_TRANSPORT", format!("GET {url}: {err}"))
}

/// An HTTP response arrived; 5xx is the operator's problem (retryable),
/// 4xx is ours (not).
fn classify_status(url: &str, status: StatusCode) -> BotError {
    let retryable = status.is_server_error();
    BotError::api(
        format!("HTTP_{}", status.as_u16()),
        format!("GET {url} returned {status}"),
    )
    .with_retryable(retryable)
}

/// Delay before attempt `attempt + 1` (1-indexed):
/// min(base * 2^(attempt-1) + jitter, max).
fn backoff_delay(attempt: u32, base: Duration, max: Duration, jitter_ms: u64) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    (exp + Duration::from_millis(jitter_ms)).min(max)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            max_attempts: 3,
            request_timeout: Duration::from_secs(2),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    /// Minimal HTTP server: answers each connection with the next canned
    /// status, counting hits.
    async fn spawn_server(statuses: Vec<u16>) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_srv = Arc::clone(&hits);

        tokio::spawn(async move {
            let mut responses = statuses.into_iter();
            while let Ok((mut stream, _)) = listener.accept().await {
                let status = responses.next().unwrap_or(200);
                hits_srv.fetch_add(1, Ordering::SeqCst);

                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;

                let (reason, body) = match status {
                    200 => ("OK", "ok"),
                    404 => ("Not Found", ""),
                    500 => ("Internal Server Error", ""),
                    503 => ("Service Unavailable", ""),
                    _ => ("Unknown", ""),
                };
                let resp = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{addr}/"), hits)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let (url, hits) = spawn_server(vec![200]).await;
        let fetcher = RetryingFetcher::new(test_config()).unwrap();
        let body = fetcher.get(&url).await.unwrap();
        assert_eq!(body, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_5xx_retries_until_success() {
        let (url, hits) = spawn_server(vec![500, 503, 200]).await;
        let fetcher = RetryingFetcher::new(test_config()).unwrap();
        let body = fetcher.get(&url).await.unwrap();
        assert_eq!(body, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_4xx_fails_after_exactly_one_call() {
        let (url, hits) = spawn_server(vec![404, 404, 404]).await;
        let fetcher = RetryingFetcher::new(test_config()).unwrap();
        let err = fetcher.get(&url).await.unwrap_err();
        assert_eq!(err.code, "HTTP_404");
        assert!(!err.retryable);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_5xx_exhaustion_is_retryable_api_error() {
        let (url, hits) = spawn_server(vec![500, 500, 500, 500]).await;
        let fetcher = RetryingFetcher::new(test_config()).unwrap();
        let err = fetcher.get(&url).await.unwrap_err();
        assert_eq!(err.code, "HTTP_500");
        assert!(err.retryable);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop so nothing is listening on the port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = RetryingFetcher::new(test_config()).unwrap();
        let err = fetcher.get(&format!("http://{addr}/")).await.unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Network);
        assert!(err.retryable);
    }

    #[test]
    fn test_backoff_schedule() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(1, base, max, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, max, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, base, max, 0), Duration::from_secs(4));
        assert_eq!(
            backoff_delay(3, base, max, 250),
            Duration::from_millis(4250)
        );
        // Capped at the max
        assert_eq!(backoff_delay(10, base, max, 999), Duration::from_secs(30));
    }

    #[test]
    fn test_status_classification() {
        assert!(!classify_status("u", StatusCode::BAD_REQUEST).retryable);
        assert!(!classify_status("u", StatusCode::TOO_MANY_REQUESTS).retryable);
        assert!(classify_status("u", StatusCode::INTERNAL_SERVER_ERROR).retryable);
        assert!(classify_status("u", StatusCode::BAD_GATEWAY).retryable);
    }
}
