use futures::StreamExt;
use thiserror::Error;

/// Why a response body could not be read in full.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    TooLarge(usize),
    /// Received fewer bytes than Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: usize },
}

/// Read a response body, refusing anything over `limit` bytes.
///
/// Callers needing a deadline wrap the whole request, this read included,
/// in `tokio::time::timeout`.
pub async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(BodyError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        // SEC-003: Use saturating_add to prevent integer overflow in size check
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: Network interruptions can end the stream early
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(BodyError::Incomplete {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn response_with(body: Vec<u8>) -> (MockServer, reqwest::Response) {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.unwrap();
        (server, response)
    }

    #[tokio::test]
    async fn test_body_within_limit() {
        let (_server, response) = response_with(b"<rss/>".to_vec()).await;
        assert_eq!(read_limited_bytes(response, 64).await.unwrap(), b"<rss/>");
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let (_server, response) = response_with(vec![b'x'; 128]).await;
        assert!(matches!(
            read_limited_bytes(response, 64).await,
            Err(BodyError::TooLarge(64))
        ));
    }
}
