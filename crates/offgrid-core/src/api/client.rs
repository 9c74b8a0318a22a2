//! API client for JSON REST backends.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::ApiError;

/// HTTP request timeout in seconds.
/// Long enough for slow mobile links, short enough that the cache fallback
/// kicks in before the user gives up.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should
    /// retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// GET `path` and decode the JSON body, backing off on 429s.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .client
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    debug!(url = %url, bytes = text.len(), "Response received");
                    return serde_json::from_str(&text)
                        .map_err(|source| ApiError::Decode { url: url.clone(), source });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited { attempts: retries });
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `responses` in order (the last one repeats), one per connection.
    async fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (format!("http://{}", addr), hits)
    }

    fn fast(client: ApiClient) -> ApiClient {
        ApiClient {
            initial_backoff: Duration::from_millis(1),
            ..client
        }
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://api.example.com/").unwrap();
        assert_eq!(client.url("/news"), "https://api.example.com/news");
        assert_eq!(client.url("news"), "https://api.example.com/news");
        assert_eq!(client.url("https://other.example.com/x"), "https://other.example.com/x");
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let (base, _) = serve(vec![("200 OK", r#"["T1","T2"]"#)]).await;
        let client = ApiClient::new(&base).unwrap();
        let trainings: Vec<String> = client.get_json("/trainings").await.unwrap();
        assert_eq!(trainings, vec!["T1", "T2"]);
    }

    #[tokio::test]
    async fn test_get_json_maps_status_errors() {
        let (base, _) = serve(vec![("404 Not Found", r#"{"error":"nope"}"#)]).await;
        let client = ApiClient::new(&base).unwrap();
        let result = client.get_json::<Vec<String>>("/missing").await;
        assert!(matches!(result, Err(ApiError::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_get_json_reports_undecodable_body() {
        let (base, _) = serve(vec![("200 OK", "<html>captive portal</html>")]).await;
        let client = ApiClient::new(&base).unwrap();
        let result = client.get_json::<Vec<String>>("/news").await;
        assert!(matches!(result, Err(ApiError::Decode { url, .. }) if url.ends_with("/news")));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let (base, hits) = serve(vec![
            ("429 Too Many Requests", "{}"),
            ("200 OK", "[1]"),
        ])
        .await;
        let client = fast(ApiClient::new(&base).unwrap());
        let result: Vec<u32> = client.get_json("/news").await.unwrap();
        assert_eq!(result, vec![1]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up() {
        let (base, hits) = serve(vec![("429 Too Many Requests", "{}")]).await;
        let client = fast(ApiClient::new(&base).unwrap());
        let result = client.get_json::<Vec<u32>>("/news").await;
        assert!(matches!(result, Err(ApiError::RateLimited { attempts }) if attempts == MAX_RATE_LIMIT_RETRIES + 1));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_RATE_LIMIT_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_no_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{}", addr)).unwrap();
        let error = client.get_json::<Vec<u32>>("/news").await.unwrap_err();
        assert!(matches!(error, ApiError::Unreachable(_)), "unexpected error: {error:?}");
    }
}
