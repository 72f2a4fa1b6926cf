//! Client for the entity scoring endpoint.
//!
//! All text snippets of one document go out in a single request; the
//! response carries one mention list per snippet, in the same order.

mod protocol;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use docenrich_shared::{EnrichError, Result, ScoringSettings};

pub use protocol::{
    InputData, Mention, Prediction, ScoringInput, ScoringOutput, SnippetPrediction, Span,
    TEXT_FIELD,
};

/// User-Agent string for scoring requests.
const USER_AGENT: &str = concat!("docenrich/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Entity detection over the text snippets of one document.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score `snippets` and return one mention list per snippet, in order.
    async fn score(&self, document_id: &str, snippets: &[String]) -> Result<Vec<Vec<Mention>>>;
}

// ---------------------------------------------------------------------------
// ScoringClient
// ---------------------------------------------------------------------------

/// HTTP scoring client with bounded connect and request timeouts.
#[derive(Debug, Clone)]
pub struct ScoringClient {
    client: Client,
    endpoint: String,
    api_token: String,
}

impl ScoringClient {
    /// Build a client from resolved settings.
    pub fn new(settings: &ScoringSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.timeouts.connect)
            .timeout(settings.timeouts.request)
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_token: settings.api_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Scorer for ScoringClient {
    #[instrument(skip_all, fields(document_id = %document_id, snippets = snippets.len()))]
    async fn score(&self, document_id: &str, snippets: &[String]) -> Result<Vec<Vec<Mention>>> {
        let input = ScoringInput::for_snippets(snippets);

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.api_token)
            .json(&input)
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{}: {e}", self.endpoint)))?;

        // Only a plain 200 carries predictions.
        let status = response.status();
        if status != StatusCode::OK {
            return Err(EnrichError::Http {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let output: ScoringOutput = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EnrichError::Network(format!("{}: {e}", self.endpoint))
            } else {
                EnrichError::Scoring(format!("invalid response body: {e}"))
            }
        })?;

        let mentions = output.into_mentions(snippets.len())?;
        debug!(
            mentions = mentions.iter().map(Vec::len).sum::<usize>(),
            "scoring complete"
        );
        Ok(mentions)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use docenrich_shared::Timeouts;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(server: &MockServer, request_timeout: Duration) -> ScoringSettings {
        ScoringSettings {
            endpoint: format!("{}/ml/v4/deployments/dep-1/predictions", server.uri()),
            api_token: "token-123".into(),
            timeouts: Timeouts {
                connect: Duration::from_secs(2),
                request: request_timeout,
            },
        }
    }

    #[tokio::test]
    async fn test_score_sends_one_request_per_document() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ml/v4/deployments/dep-1/predictions"))
            .and(header("authorization", "Bearer token-123"))
            .and(body_json(serde_json::json!({
                "input_data": [{"fields": ["text"], "values": [["hello"], ["world"]]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "predictions": [{"fields": ["entities"], "values": [[
                    {"mentions": [{"span": {"begin": 0, "end": 5, "text": "hello"}, "type": "GREETING", "confidence": 0.9}]},
                    {"mentions": []}
                ]]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ScoringClient::new(&settings(&server, Duration::from_secs(5))).unwrap();
        let mentions = client
            .score("doc-1", &["hello".into(), "world".into()])
            .await
            .unwrap();

        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0][0].span.begin, 0);
        assert_eq!(mentions[0][0].span.end, 5);
        assert!((mentions[0][0].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_score_non_success_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ScoringClient::new(&settings(&server, Duration::from_secs(5))).unwrap();
        let err = client.score("doc-1", &["hello".into()]).await.unwrap_err();
        assert!(matches!(err, EnrichError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_score_timeout_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({"predictions": []})),
            )
            .mount(&server)
            .await;

        let client = ScoringClient::new(&settings(&server, Duration::from_millis(200))).unwrap();
        let err = client.score("doc-1", &["hello".into()]).await.unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)));
    }

    #[tokio::test]
    async fn test_score_accepts_only_200() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "predictions": [{"values": [[{"mentions": []}]]}]
            })))
            .mount(&server)
            .await;

        let client = ScoringClient::new(&settings(&server, Duration::from_secs(5))).unwrap();
        let err = client.score("doc-1", &["hello".into()]).await.unwrap_err();
        assert!(matches!(err, EnrichError::Http { status: 202, .. }));
    }

    #[tokio::test]
    async fn test_score_body_timeout_is_network_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Headers arrive at once, the body never completes.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"predictions\"",
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = ScoringClient::new(&ScoringSettings {
            endpoint: format!("http://{addr}/predictions"),
            api_token: "token-123".into(),
            timeouts: Timeouts {
                connect: Duration::from_secs(2),
                request: Duration::from_millis(300),
            },
        })
        .unwrap();
        let err = client.score("doc-1", &["hello".into()]).await.unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_score_misaligned_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "predictions": [{"values": [[{"mentions": []}]]}]
            })))
            .mount(&server)
            .await;

        let client = ScoringClient::new(&settings(&server, Duration::from_secs(5))).unwrap();
        let err = client
            .score("doc-1", &["a".into(), "b".into(), "c".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Scoring(_)));
    }
}
