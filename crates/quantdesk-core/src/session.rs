//! Analyst chat session state machine.
//!
//! A [`ChatSession`] belongs to one subject (ticker) at a time and allows at
//! most one question in flight. The network call happens outside the session:
//! [`ChatSession::submit`] hands out a [`PendingQuery`], the caller awaits the
//! agent however it likes (spawned task, inline `.await`), and
//! [`ChatSession::resolve`] applies the outcome. Resolving consumes the
//! [`QueryTicket`], so every attempt resolves exactly once.

use tracing::{debug, warn};

use crate::agent::{AnalystClient, AnalyzeRequest};
use crate::config::Config;
use crate::error::ServiceError;
use crate::signal::Signal;
use crate::state::ChatMessage;

/// Model output worth mentioning in the greeting.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalContext {
    pub signal: Signal,
    /// Percent, 0-100.
    pub confidence: Option<f64>,
    pub target_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub agent_name: String,
    pub context_window: usize,
    pub fallback_hint: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::new())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            agent_name: "QuantDesk Agent".to_string(),
            context_window: config.context_window,
            fallback_hint: config.fallback_hint.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct SessionState {
    messages: Vec<ChatMessage>,
    pending: bool,
    last_error: Option<String>,
}

/// Identifies which session generation a request was issued for.
#[derive(Debug)]
pub struct QueryTicket {
    subject: String,
    epoch: u64,
}

impl QueryTicket {
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// A question that has been accepted and must now be sent to the agent.
#[derive(Debug)]
pub struct PendingQuery {
    pub request: AnalyzeRequest,
    pub ticket: QueryTicket,
}

/// A comparison that has been accepted and must now be sent to the agent.
#[derive(Debug)]
pub struct PendingCompare {
    pub tickers: Vec<String>,
    pub ticket: QueryTicket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Answered,
    /// The agent failed; a fallback message was appended instead.
    Failed,
    /// The session was reset while the request was in flight; nothing changed.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickAction {
    pub label: &'static str,
    pub question: String,
}

pub struct ChatSession {
    subject: String,
    state: SessionState,
    epoch: u64,
    config: SessionConfig,
}

impl ChatSession {
    pub fn new(subject: &str, signal: Option<&SignalContext>, config: SessionConfig) -> Self {
        let mut session = Self {
            subject: String::new(),
            state: SessionState::default(),
            epoch: 0,
            config,
        };
        session.seed(subject, signal);
        session
    }

    /// Switch to `subject` (or restart the current one). Any request still in
    /// flight becomes stale.
    pub fn reset(&mut self, subject: &str, signal: Option<&SignalContext>) {
        self.epoch = self.epoch.wrapping_add(1);
        self.seed(subject, signal);
        debug!(subject = %self.subject, epoch = self.epoch, "chat session reset");
    }

    fn seed(&mut self, subject: &str, signal: Option<&SignalContext>) {
        self.subject = subject.to_string();
        self.state = SessionState {
            messages: vec![ChatMessage::assistant(self.greeting(signal))],
            pending: false,
            last_error: None,
        };
    }

    fn greeting(&self, signal: Option<&SignalContext>) -> String {
        let mut text = format!(
            "**{} ready.**\n\nAnalyzing **{}** with live fundamentals, margins, \
             analyst ratings & earnings data.",
            self.config.agent_name, self.subject
        );

        if let Some(context) = signal {
            text.push_str(&format!("\nThe model signals a **{}**", context.signal));
            if let Some(confidence) = context.confidence {
                text.push_str(&format!(" with {confidence:.1}% confidence"));
            }
            if let Some(target) = context.target_price {
                text.push_str(&format!(" and a price target of **${target:.2}**"));
            }
            text.push('.');
        }

        text.push_str("\n\nWhat would you like to know?");
        text
    }

    /// Accept a question unless it is blank or another one is in flight.
    ///
    /// The returned request carries the last `context_window` messages from
    /// before this question was added.
    pub fn submit(&mut self, text: &str) -> Option<PendingQuery> {
        let question = text.trim();
        if question.is_empty() || self.state.pending {
            return None;
        }

        let window = self.config.context_window;
        let start = self.state.messages.len().saturating_sub(window);
        let history = self.state.messages[start..].to_vec();

        let ticket = self.open(question);
        debug!(subject = %self.subject, history = history.len(), "question submitted");

        Some(PendingQuery {
            request: AnalyzeRequest {
                ticker: self.subject.clone(),
                question: question.to_string(),
                history,
            },
            ticket,
        })
    }

    /// Ask for a side-by-side comparison of the subject with `others`.
    ///
    /// Shares the one-request-at-a-time rule with [`submit`](Self::submit)
    /// and resolves through the same [`resolve`](Self::resolve). `None` when
    /// there is nothing distinct to compare against.
    pub fn submit_compare(&mut self, others: &[String]) -> Option<PendingCompare> {
        if self.state.pending || self.subject.trim().is_empty() {
            return None;
        }

        let mut tickers = vec![self.subject.to_uppercase()];
        for other in others {
            let other = other.trim().to_uppercase();
            if !other.is_empty() && !tickers.contains(&other) {
                tickers.push(other);
            }
        }
        if tickers.len() < 2 {
            return None;
        }

        let ticket = self.open(&format!("Compare {}", tickers.join(" vs ")));
        debug!(?tickers, "comparison submitted");
        Some(PendingCompare { tickers, ticket })
    }

    fn open(&mut self, question: &str) -> QueryTicket {
        self.state.messages.push(ChatMessage::user(question));
        self.state.pending = true;
        QueryTicket {
            subject: self.subject.clone(),
            epoch: self.epoch,
        }
    }

    /// Apply the agent's outcome for a previously submitted question.
    pub fn resolve(
        &mut self,
        ticket: QueryTicket,
        outcome: Result<String, ServiceError>,
    ) -> Resolution {
        if ticket.epoch != self.epoch || ticket.subject != self.subject {
            warn!(
                issued_for = %ticket.subject,
                current = %self.subject,
                "discarding stale analyst response"
            );
            return Resolution::Stale;
        }

        self.state.pending = false;
        match outcome {
            Ok(answer) => {
                self.state.last_error = None;
                self.state.messages.push(ChatMessage::assistant(answer));
                Resolution::Answered
            }
            Err(error) => {
                warn!(subject = %self.subject, %error, "analyst unavailable");
                let detail = error.to_string();
                self.state.messages.push(ChatMessage::assistant(format!(
                    "⚠ {detail}\n\n{}",
                    self.config.fallback_hint
                )));
                self.state.last_error = Some(detail);
                Resolution::Failed
            }
        }
    }

    /// Submit, wait for `client`, resolve. Returns `None` if the question was
    /// not accepted.
    pub async fn ask<C: AnalystClient>(&mut self, client: &C, text: &str) -> Option<Resolution> {
        let PendingQuery { request, ticket } = self.submit(text)?;
        let outcome = client.analyze(&request).await;
        Some(self.resolve(ticket, outcome))
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.state.messages
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending
    }

    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    /// Canned questions for the current subject.
    pub fn quick_actions(&self) -> Vec<QuickAction> {
        let s = &self.subject;
        vec![
            QuickAction {
                label: "Full Analysis",
                question: format!("Give me a complete investment analysis for {s}."),
            },
            QuickAction {
                label: "Buy or Sell?",
                question: format!("Should I buy, hold, or sell {s} right now? Use the live data."),
            },
            QuickAction {
                label: "Key Financials",
                question: format!("Show key financial metrics and ratios for {s} in a table."),
            },
            QuickAction {
                label: "Analyst View",
                question: format!("What is the analyst consensus and price target for {s}?"),
            },
        ]
    }

    pub fn status_text(&self) -> Option<String> {
        self.state
            .pending
            .then(|| format!("Analyzing {}", self.subject))
    }

    pub fn placeholder(&self) -> String {
        format!("Ask about {}...", self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatRole;
    use std::sync::Mutex;

    struct StubAnalyst {
        reply: Result<String, String>,
        requests: Mutex<Vec<AnalyzeRequest>>,
    }

    impl StubAnalyst {
        fn answering(answer: &str) -> Self {
            Self {
                reply: Ok(answer.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                reply: Err(error.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl AnalystClient for StubAnalyst {
        async fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ServiceError> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(ServiceError::Server)
        }
    }

    fn session(subject: &str) -> ChatSession {
        ChatSession::new(subject, None, SessionConfig::default())
    }

    #[test]
    fn test_new_session_has_greeting() {
        let session = session("AAPL");
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, ChatRole::Assistant);
        assert!(session.messages()[0].content.contains("**AAPL**"));
        assert!(!session.is_pending());
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_greeting_includes_signal_context() {
        let context = SignalContext {
            signal: Signal::Buy,
            confidence: Some(87.25),
            target_price: Some(212.4),
        };
        let session = ChatSession::new("NVDA", Some(&context), SessionConfig::default());
        let greeting = &session.messages()[0].content;
        assert!(greeting.contains("**BUY**"));
        assert!(greeting.contains("87.2% confidence") || greeting.contains("87.3% confidence"));
        assert!(greeting.contains("**$212.40**"));
    }

    #[test]
    fn test_blank_submit_is_ignored() {
        let mut session = session("AAPL");
        assert!(session.submit("").is_none());
        assert!(session.submit("   \n\t").is_none());
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_pending());
    }

    #[test]
    fn test_submit_appends_user_message_and_waits() {
        let mut session = session("AAPL");
        let pending = session.submit("  What is the P/E?  ").unwrap();

        assert!(session.is_pending());
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1], ChatMessage::user("What is the P/E?"));
        assert_eq!(pending.request.ticker, "AAPL");
        assert_eq!(pending.request.question, "What is the P/E?");
        // History is taken before the question is appended
        assert_eq!(pending.request.history, session.messages()[..1].to_vec());
        assert_eq!(pending.ticket.subject(), "AAPL");
        assert_eq!(session.status_text().as_deref(), Some("Analyzing AAPL"));
    }

    #[test]
    fn test_second_submit_while_waiting_is_rejected() {
        let mut session = session("AAPL");
        let first = session.submit("one");
        let second = session.submit("two");

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(session.messages().len(), 2);
        assert!(session.is_pending());
    }

    #[test]
    fn test_success_appends_answer_and_goes_idle() {
        let mut session = session("AAPL");
        let pending = session.submit("Buy?").unwrap();

        let resolution = session.resolve(pending.ticket, Ok("**HOLD** for now".to_string()));

        assert_eq!(resolution, Resolution::Answered);
        assert!(!session.is_pending());
        assert_eq!(session.messages().last(), Some(&ChatMessage::assistant("**HOLD** for now")));
        assert!(session.status_text().is_none());
    }

    #[test]
    fn test_failure_appends_one_fallback_message() {
        let mut session = session("AAPL");
        let pending = session.submit("Buy?").unwrap();

        let resolution = session.resolve(
            pending.ticket,
            Err(ServiceError::Server("rate limited".to_string())),
        );

        assert_eq!(resolution, Resolution::Failed);
        assert!(!session.is_pending());
        assert_eq!(session.messages().len(), 3);
        let fallback = &session.messages()[2];
        assert_eq!(fallback.role, ChatRole::Assistant);
        assert!(fallback.content.starts_with("⚠ rate limited"));
        assert!(fallback.content.contains("agent server"));
        assert_eq!(session.last_error(), Some("rate limited"));

        // Still usable afterwards
        assert!(session.submit("again").is_some());
    }

    #[test]
    fn test_success_clears_previous_error() {
        let mut session = session("AAPL");
        let pending = session.submit("a").unwrap();
        session.resolve(pending.ticket, Err(ServiceError::Protocol("bad".to_string())));
        assert!(session.last_error().is_some());

        let pending = session.submit("b").unwrap();
        session.resolve(pending.ticket, Ok("ok".to_string()));
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_context_window_is_last_six_prior_messages() {
        let mut session = session("MSFT");
        for i in 0..4 {
            let pending = session.submit(&format!("q{i}")).unwrap();
            session.resolve(pending.ticket, Ok(format!("a{i}")));
        }
        assert_eq!(session.messages().len(), 9);

        let before = session.messages().to_vec();
        let pending = session.submit("q4").unwrap();

        assert_eq!(pending.request.history.len(), 6);
        assert_eq!(pending.request.history, before[3..].to_vec());
        assert_eq!(pending.request.history[0], ChatMessage::user("q1"));
        assert_eq!(pending.request.history[5], ChatMessage::assistant("a3"));
    }

    #[test]
    fn test_context_window_is_configurable() {
        let config = SessionConfig {
            context_window: 2,
            ..SessionConfig::default()
        };
        let mut session = ChatSession::new("MSFT", None, config);
        let pending = session.submit("q0").unwrap();
        session.resolve(pending.ticket, Ok("a0".to_string()));

        let pending = session.submit("q1").unwrap();
        assert_eq!(
            pending.request.history,
            vec![ChatMessage::user("q0"), ChatMessage::assistant("a0")]
        );
    }

    #[test]
    fn test_reset_while_waiting_discards_late_response() {
        let mut session = session("AAPL");
        let pending = session.submit("AAPL outlook?").unwrap();

        session.reset("TSLA", None);
        assert!(!session.is_pending());
        assert_eq!(session.subject(), "TSLA");

        let resolution = session.resolve(pending.ticket, Ok("AAPL looks great".to_string()));

        assert_eq!(resolution, Resolution::Stale);
        assert_eq!(session.messages().len(), 1);
        assert!(session.messages()[0].content.contains("**TSLA**"));
        assert!(!session.is_pending());
    }

    #[test]
    fn test_stale_failure_does_not_touch_new_request() {
        let mut session = session("AAPL");
        let old = session.submit("old").unwrap();

        session.reset("TSLA", None);
        let new = session.submit("new").unwrap();

        let stale = session.resolve(old.ticket, Err(ServiceError::Server("late".to_string())));
        assert_eq!(stale, Resolution::Stale);
        assert!(session.is_pending());
        assert_eq!(session.last_error(), None);

        assert_eq!(session.resolve(new.ticket, Ok("fresh".to_string())), Resolution::Answered);
        assert_eq!(session.messages().len(), 3);
    }

    #[test]
    fn test_reset_to_same_subject_still_discards() {
        let mut session = session("AAPL");
        let pending = session.submit("q").unwrap();
        session.reset("AAPL", None);
        assert_eq!(session.resolve(pending.ticket, Ok("late".to_string())), Resolution::Stale);
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_quick_actions_mention_subject() {
        let session = session("AMZN");
        let actions = session.quick_actions();
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[1].label, "Buy or Sell?");
        assert!(actions.iter().all(|a| a.question.contains("AMZN")));
        assert_eq!(session.placeholder(), "Ask about AMZN...");
    }

    #[tokio::test]
    async fn test_ask_round_trip() {
        let analyst = StubAnalyst::answering("## Verdict\n**BUY**");
        let mut session = session("NVDA");

        let resolution = session.ask(&analyst, "Buy?").await;

        assert_eq!(resolution, Some(Resolution::Answered));
        assert_eq!(analyst.calls(), 1);
        assert_eq!(session.messages().len(), 3);
        assert!(!session.is_pending());
        let sent = &analyst.requests.lock().unwrap()[0];
        assert_eq!(sent.ticker, "NVDA");
        assert_eq!(sent.history.len(), 1);
    }

    #[tokio::test]
    async fn test_ask_failure_resolves_pending() {
        let analyst = StubAnalyst::failing("connection refused");
        let mut session = session("NVDA");

        assert_eq!(session.ask(&analyst, "Buy?").await, Some(Resolution::Failed));
        assert!(!session.is_pending());
        assert_eq!(session.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_ask_blank_never_calls_agent() {
        let analyst = StubAnalyst::answering("unused");
        let mut session = session("NVDA");

        assert_eq!(session.ask(&analyst, " ").await, None);
        assert_eq!(analyst.calls(), 0);
    }

    #[test]
    fn test_compare_lists_subject_first_and_dedupes() {
        let mut session = session("AAPL");
        let others = vec!["msft".to_string(), "AAPL".to_string(), " ".to_string()];
        let pending = session.submit_compare(&others).unwrap();

        assert_eq!(pending.tickers, vec!["AAPL", "MSFT"]);
        assert!(session.is_pending());
        assert_eq!(session.messages()[1], ChatMessage::user("Compare AAPL vs MSFT"));

        session.resolve(pending.ticket, Ok("| Ticker | P/E |".to_string()));
        assert!(!session.is_pending());
        assert_eq!(session.messages().len(), 3);
    }

    #[test]
    fn test_compare_needs_a_second_ticker_and_idle_session() {
        let mut session = session("AAPL");
        assert!(session.submit_compare(&["aapl".to_string()]).is_none());
        assert_eq!(session.messages().len(), 1);

        let _pending = session.submit("Buy?").unwrap();
        assert!(session.submit_compare(&["MSFT".to_string()]).is_none());
    }
}
