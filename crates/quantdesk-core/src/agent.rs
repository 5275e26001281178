use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ServiceResult;
use crate::http::{build_client, decode, trim_base_url};
use crate::state::ChatMessage;

/// Body of `POST /agent/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeRequest {
    pub ticker: String,
    pub question: String,
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeReply {
    pub answer: String,
    /// Which model answered, e.g. `"claude+yfinance"`.
    #[serde(default)]
    pub engine: Option<String>,
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    tickers: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentHealth {
    pub status: String,
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Anything that can answer an analyst question.
///
/// [`AgentClient`] is the HTTP implementation; the chat session only depends
/// on this trait so it can be driven by a stub in tests.
pub trait AnalystClient {
    fn analyze(
        &self,
        request: &AnalyzeRequest,
    ) -> impl Future<Output = ServiceResult<String>> + Send;
}

#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    base_url: String,
}

impl AgentClient {
    /// Requests that take longer than `timeout` fail with
    /// [`ServiceError::Transport`](crate::ServiceError::Transport).
    pub fn new(base_url: &str, timeout: Duration) -> ServiceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base_url(base_url),
        })
    }

    pub async fn ask(&self, request: &AnalyzeRequest) -> ServiceResult<AnalyzeReply> {
        let url = format!("{}/agent/analyze", self.base_url);
        debug!(
            ticker = %request.ticker,
            history = request.history.len(),
            "sending analyst question"
        );

        let response = self.client.post(&url).json(request).send().await?;
        let reply: AnalyzeReply = decode(response).await.inspect_err(|e| {
            warn!(ticker = %request.ticker, error = %e, "analyst request failed");
        })?;

        debug!(engine = reply.engine.as_deref().unwrap_or("unknown"), "analyst answered");
        Ok(reply)
    }

    /// Side-by-side comparison of two or more tickers.
    pub async fn compare(&self, tickers: &[String]) -> ServiceResult<AnalyzeReply> {
        let url = format!("{}/agent/compare", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CompareRequest { tickers })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn health(&self) -> ServiceResult<AgentHealth> {
        let url = format!("{}/agent/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }
}

impl AnalystClient for AgentClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> ServiceResult<String> {
        self.ask(request).await.map(|reply| reply.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::session::{ChatSession, Resolution, SessionConfig};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> AgentClient {
        AgentClient::new(uri, Duration::from_secs(5)).unwrap()
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            ticker: "NVDA".to_string(),
            question: "Buy or sell?".to_string(),
            history: vec![ChatMessage::assistant("ready"), ChatMessage::user("hi")],
        }
    }

    #[tokio::test]
    async fn test_analyze_posts_request_and_returns_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/analyze"))
            .and(body_json(json!({
                "ticker": "NVDA",
                "question": "Buy or sell?",
                "history": [
                    {"role": "assistant", "content": "ready"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ticker": "NVDA",
                "answer": "**BUY** on strength",
                "engine": "claude+yfinance"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let agent = client(&server.uri());
        let reply = agent.ask(&request()).await.unwrap();
        assert_eq!(reply.answer, "**BUY** on strength");
        assert_eq!(reply.engine.as_deref(), Some("claude+yfinance"));
    }

    #[tokio::test]
    async fn test_error_field_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/analyze"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "ticker is required"})),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri()).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Server(ref m) if m == "ticker is required"));
    }

    #[tokio::test]
    async fn test_missing_answer_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ticker": "NVDA"})))
            .mount(&server)
            .await;

        let err = client(&server.uri()).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_bad_gateway_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let err = client("http://127.0.0.1:1").analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_compare_and_health() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/compare"))
            .and(body_json(json!({"tickers": ["AAPL", "MSFT"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "| Ticker | P/E |",
                "engine": "groq+yfinance"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/agent/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "primary": "claude",
                "fallback": "none"
            })))
            .mount(&server)
            .await;

        let agent = client(&format!("{}/", server.uri()));
        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];
        assert_eq!(agent.compare(&tickers).await.unwrap().answer, "| Ticker | P/E |");

        let health = agent.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.primary.as_deref(), Some("claude"));
    }

    #[tokio::test]
    async fn test_hung_agent_times_out_and_session_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"answer": "too late"}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let agent = AgentClient::new(&server.uri(), Duration::from_millis(200)).unwrap();
        let err = agent.analyze(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport(ref e) if e.is_timeout()));

        let mut session = ChatSession::new("NVDA", None, SessionConfig::default());
        let resolution = tokio::time::timeout(Duration::from_secs(10), session.ask(&agent, "Buy?"))
            .await
            .expect("client timeout should fire first");
        assert_eq!(resolution, Some(Resolution::Failed));
        assert!(!session.is_pending());
        assert!(session.last_error().is_some());
    }
}
