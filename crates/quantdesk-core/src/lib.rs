pub mod agent;
pub mod config;
pub mod error;
mod http;
pub mod market;
pub mod markup;
pub mod series;
pub mod session;
pub mod signal;
pub mod state;
pub mod watchlist;

// Re-export main types for convenience
pub use agent::{AgentClient, AgentHealth, AnalystClient, AnalyzeRequest};
pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use market::{ForecastClient, MarketClient, Prediction, Quote, SearchHit};
pub use markup::{render_blocks, render_inline, DisplayBlock, Span};
pub use series::{compose, SeriesPoint};
pub use session::{
    ChatSession, PendingCompare, PendingQuery, QueryTicket, Resolution, SessionConfig,
    SignalContext,
};
pub use signal::{Bias, Signal};
pub use state::{ChatMessage, ChatRole};
pub use watchlist::Watchlist;
