use reqwest::StatusCode;
use thiserror::Error;

/// Why a live fetch produced no data.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No answer at all: refused, unroutable or timed out. Retrying once back
    /// online is the only remedy.
    #[error("No response from server: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Response bodies quoted in errors are cut to this many bytes
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ApiError::Unreachable(e)
        } else {
            ApiError::Transport(e)
        }
    }
}

impl ApiError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let cut = (0..=MAX_ERROR_BODY_LENGTH)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::Status {
            status,
            body: Self::truncate_body(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_code_and_body() {
        let error = ApiError::from_status(StatusCode::NOT_FOUND, r#"{"error":"gone"}"#);
        assert!(matches!(error, ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND));
        assert_eq!(error.to_string(), r#"HTTP 404 Not Found: {"error":"gone"}"#);
    }

    #[test]
    fn test_long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        match ApiError::from_status(StatusCode::FORBIDDEN, &body) {
            ApiError::Status { body: message, .. } => {
                assert!(message.contains("truncated, 800 total bytes"));
                assert!(message.len() < body.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_message() {
        let error = ApiError::RateLimited { attempts: 4 };
        assert_eq!(error.to_string(), "Still rate limited after 4 attempts");
    }
}
