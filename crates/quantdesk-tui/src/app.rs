use std::time::{Duration, Instant};
use anyhow::Result;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use quantdesk_core::series::{self, SeriesPoint};
use quantdesk_core::{
    AgentClient, AgentHealth, AnalystClient, ChatSession, Config, ForecastClient, MarketClient,
    PendingCompare, PendingQuery, Prediction, QueryTicket, Quote, SearchHit, ServiceError,
    ServiceResult, SessionConfig, Watchlist,
};
use crate::input::TextInput;

/// History ranges cycled with the `d` key, in days.
pub const RANGES: [u32; 4] = [7, 30, 90, 365];

/// Typing pause before a ticker search is sent.
const SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Watchlist,
    Chat,
    Input,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Watchlist => FocusPane::Chat,
            FocusPane::Chat => FocusPane::Input,
            FocusPane::Input => FocusPane::Watchlist,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AgentStatus {
    Checking,
    Online(AgentHealth),
    Offline(String),
}

/// An analyst question running in the background.
pub struct InFlightQuery {
    pub ticket: QueryTicket,
    pub handle: JoinHandle<ServiceResult<String>>,
}

type Task<T> = Option<JoinHandle<ServiceResult<T>>>;

/// Take the result out of `slot` if its task has finished.
async fn take_finished<T>(slot: &mut Task<T>) -> Option<ServiceResult<T>> {
    if !slot.as_ref().is_some_and(JoinHandle::is_finished) {
        return None;
    }
    let task = slot.take()?;
    Some(task.await.unwrap_or_else(|e| Err(ServiceError::Aborted(e.to_string()))))
}

fn abort<T>(slot: &mut Task<T>) {
    if let Some(task) = slot.take() {
        task.abort();
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub config: Config,

    // Watchlist and quotes
    pub watchlist: Watchlist,
    pub watchlist_state: ListState,
    pub quotes: Vec<Quote>,
    pub quotes_loading: bool,
    pub quotes_error: Option<String>,
    quotes_task: Task<Vec<Quote>>,

    // Ticker search
    pub search: TextInput,
    pub search_results: Vec<SearchHit>,
    pub search_state: ListState,
    pub searching: bool,
    search_changed_at: Option<Instant>,
    search_task: Task<Vec<SearchHit>>,

    // Chart
    pub history_days: u32,
    pub history: Vec<SeriesPoint>,
    pub history_loading: bool,
    history_task: Task<Vec<SeriesPoint>>,
    pub prediction: Option<Prediction>,
    pub prediction_loading: bool,
    prediction_task: Task<Prediction>,
    pub show_forecast: bool,
    pub market_error: Option<String>,

    // Analyst chat
    pub session: ChatSession,
    pub query: TextInput,
    pub chat_scroll: u16,
    pub chat_follow: bool, // keep the newest message in view
    // Requests issued before a symbol switch stay here until they finish so
    // the session can discard them.
    pub in_flight: Vec<InFlightQuery>,
    pub agent_status: AgentStatus,
    health_task: Task<AgentHealth>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Service clients
    agent: AgentClient,
    market: MarketClient,
    forecast: ForecastClient,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let watchlist = Watchlist::new(&config.watchlist);
        let first = watchlist.get(0).unwrap_or_default().to_string();

        let mut watchlist_state = ListState::default();
        if !watchlist.is_empty() {
            watchlist_state.select(Some(0));
        }

        let timeout = config.request_timeout();
        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Watchlist,

            watchlist,
            watchlist_state,
            quotes: Vec::new(),
            quotes_loading: false,
            quotes_error: None,
            quotes_task: None,

            search: TextInput::default(),
            search_results: Vec::new(),
            search_state: ListState::default(),
            searching: false,
            search_changed_at: None,
            search_task: None,

            history_days: config.history_days,
            history: Vec::new(),
            history_loading: false,
            history_task: None,
            prediction: None,
            prediction_loading: false,
            prediction_task: None,
            show_forecast: true,
            market_error: None,

            session: ChatSession::new(&first, None, SessionConfig::from(&config)),
            query: TextInput::default(),
            chat_scroll: 0,
            chat_follow: true,
            in_flight: Vec::new(),
            agent_status: AgentStatus::Checking,
            health_task: None,

            animation_frame: 0,

            agent: AgentClient::new(&config.agent_url, timeout)?,
            market: MarketClient::new(&config.market_url, timeout)?,
            forecast: ForecastClient::new(&config.ml_url, timeout)?,
            config,
        })
    }

    /// Kick off everything the dashboard shows on launch.
    pub fn start(&mut self) {
        self.refresh();
        self.check_agent();
    }

    pub fn selected_symbol(&self) -> Option<&str> {
        self.watchlist_state
            .selected()
            .and_then(|i| self.watchlist.get(i))
    }

    // Watchlist navigation
    pub fn watchlist_down(&mut self) {
        let len = self.watchlist.len();
        if len > 0 {
            let i = self.watchlist_state.selected().unwrap_or(0);
            self.select_symbol((i + 1).min(len - 1));
        }
    }

    pub fn watchlist_up(&mut self) {
        let i = self.watchlist_state.selected().unwrap_or(0);
        self.select_symbol(i.saturating_sub(1));
    }

    pub fn select_symbol(&mut self, index: usize) {
        if index >= self.watchlist.len() || self.watchlist_state.selected() == Some(index) {
            return;
        }
        self.watchlist_state.select(Some(index));
        self.activate_selection();
    }

    /// Point the chart and chat at whatever is selected now.
    fn activate_selection(&mut self) {
        abort(&mut self.history_task);
        abort(&mut self.prediction_task);
        self.history_loading = false;
        self.prediction = None;
        self.prediction_loading = false;
        self.history.clear();
        self.market_error = None;

        let symbol = self.selected_symbol().unwrap_or_default().to_string();
        info!(%symbol, "switched symbol");
        self.session.reset(&symbol, None);
        self.chat_scroll = 0;
        self.chat_follow = true;
        self.load_history();
    }

    /// Add `symbol` to the watchlist and select it.
    pub fn add_symbol(&mut self, symbol: &str) {
        if self.watchlist.add(symbol) {
            info!(symbol, "added to watchlist");
            self.persist_watchlist();
            self.load_quotes();
        }
        if let Some(index) = self.watchlist.position(symbol) {
            self.select_symbol(index);
        }
    }

    /// Drop the selected symbol and go back to the top of the list.
    pub fn remove_selected(&mut self) {
        let Some(symbol) = self.selected_symbol().map(str::to_string) else {
            return;
        };
        if !self.watchlist.remove(&symbol) {
            return;
        }
        info!(%symbol, "removed from watchlist");
        self.quotes.retain(|q| q.symbol != symbol);
        self.persist_watchlist();

        let first = (!self.watchlist.is_empty()).then_some(0);
        self.watchlist_state.select(first);
        self.activate_selection();
    }

    fn persist_watchlist(&mut self) {
        self.config.watchlist = self.watchlist.as_slice().to_vec();
        if let Err(e) = Config::save_watchlist(self.watchlist.as_slice()) {
            warn!(error = %e, "failed to save watchlist");
        }
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.symbol == symbol)
    }

    pub fn refresh(&mut self) {
        self.load_history();
        self.load_quotes();
    }

    pub fn load_quotes(&mut self) {
        abort(&mut self.quotes_task);
        let market = self.market.clone();
        let symbols = self.watchlist.as_slice().to_vec();
        self.quotes_loading = true;
        self.quotes_task = Some(tokio::spawn(async move { market.quotes(&symbols).await }));
    }

    pub fn cycle_range(&mut self) {
        let next = RANGES
            .iter()
            .position(|&days| days == self.history_days)
            .map(|i| RANGES[(i + 1) % RANGES.len()])
            .unwrap_or(RANGES[0]);
        self.history_days = next;
        self.load_history();
    }

    pub fn load_history(&mut self) {
        let Some(symbol) = self.selected_symbol().map(str::to_string) else {
            return;
        };
        abort(&mut self.history_task);

        let market = self.market.clone();
        let days = self.history_days;
        self.history_loading = true;
        self.history_task = Some(tokio::spawn(async move { market.history(&symbol, days).await }));
    }

    pub fn run_prediction(&mut self) {
        if self.prediction_task.is_some() {
            return;
        }
        let Some(symbol) = self.selected_symbol().map(str::to_string) else {
            return;
        };

        let forecast = self.forecast.clone();
        self.prediction_loading = true;
        self.market_error = None;
        self.prediction_task = Some(tokio::spawn(async move { forecast.predict(&symbol).await }));
    }

    pub fn toggle_forecast(&mut self) {
        self.show_forecast = !self.show_forecast;
    }

    /// Points to plot: history, plus the forecast when it is shown.
    pub fn chart_points(&self) -> Vec<SeriesPoint> {
        let forecast = self
            .prediction
            .as_ref()
            .filter(|_| self.show_forecast)
            .map(|p| p.forecast.as_slice());
        series::chart_data(&self.history, forecast)
    }

    pub fn check_agent(&mut self) {
        abort(&mut self.health_task);
        let agent = self.agent.clone();
        self.agent_status = AgentStatus::Checking;
        self.health_task = Some(tokio::spawn(async move { agent.health().await }));
    }

    /// Send a question to the analyst. Ignored while another is in flight or
    /// when no symbol is selected.
    pub fn submit_question(&mut self, text: &str) {
        if self.selected_symbol().is_none() {
            return;
        }
        let Some(PendingQuery { request, ticket }) = self.session.submit(text) else {
            return;
        };

        let agent = self.agent.clone();
        let handle = tokio::spawn(async move { agent.analyze(&request).await });
        self.in_flight.push(InFlightQuery { ticket, handle });
        self.chat_follow = true;
    }

    pub fn submit_input(&mut self) {
        if self.session.is_pending() {
            return;
        }
        let text = self.query.take();
        self.submit_question(&text);
    }

    pub fn quick_action(&mut self, index: usize) {
        if let Some(action) = self.session.quick_actions().into_iter().nth(index) {
            self.submit_question(&action.question);
        }
    }

    /// Compare the selected symbol with the one below it (wrapping).
    pub fn compare_with_next(&mut self) {
        let Some(index) = self.watchlist_state.selected() else {
            return;
        };
        let len = self.watchlist.len();
        if len < 2 {
            return;
        }
        let Some(other) = self.watchlist.get((index + 1) % len).map(str::to_string) else {
            return;
        };
        let Some(PendingCompare { tickers, ticket }) = self.session.submit_compare(&[other]) else {
            return;
        };

        let agent = self.agent.clone();
        let handle = tokio::spawn(async move {
            agent.compare(&tickers).await.map(|reply| reply.answer)
        });
        self.in_flight.push(InFlightQuery { ticket, handle });
        self.chat_follow = true;
    }

    // Ticker search
    pub fn open_search(&mut self) {
        self.input_mode = InputMode::Search;
        self.focus = FocusPane::Watchlist;
        self.search.clear();
        self.search_results.clear();
        self.search_state.select(None);
    }

    pub fn close_search(&mut self) {
        self.input_mode = InputMode::Normal;
        abort(&mut self.search_task);
        self.searching = false;
        self.search_changed_at = None;
        self.search.clear();
        self.search_results.clear();
        self.search_state.select(None);
    }

    pub fn search_changed(&mut self) {
        if self.search.text.trim().is_empty() {
            abort(&mut self.search_task);
            self.searching = false;
            self.search_changed_at = None;
            self.search_results.clear();
            self.search_state.select(None);
        } else {
            self.search_changed_at = Some(Instant::now());
        }
    }

    fn start_search(&mut self) {
        abort(&mut self.search_task);
        let market = self.market.clone();
        let query = self.search.text.clone();
        self.searching = true;
        self.search_task = Some(tokio::spawn(async move { market.search(&query).await }));
    }

    pub fn search_down(&mut self) {
        if !self.search_results.is_empty() {
            let i = self.search_state.selected().map_or(0, |i| i + 1);
            self.search_state.select(Some(i.min(self.search_results.len() - 1)));
        }
    }

    pub fn search_up(&mut self) {
        let i = self.search_state.selected().unwrap_or(0);
        self.search_state.select(Some(i.saturating_sub(1)));
    }

    /// Add the highlighted search hit and leave search mode.
    pub fn confirm_search(&mut self) {
        let Some(hit) = self
            .search_state
            .selected()
            .and_then(|i| self.search_results.get(i))
            .map(|hit| hit.symbol.clone())
        else {
            return;
        };
        self.close_search();
        self.add_symbol(&hit);
    }

    /// Collect results from any background task that has finished.
    pub async fn poll_tasks(&mut self) {
        let mut i = 0;
        while i < self.in_flight.len() {
            if !self.in_flight[i].handle.is_finished() {
                i += 1;
                continue;
            }
            let InFlightQuery { ticket, handle } = self.in_flight.remove(i);
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(ServiceError::Aborted(e.to_string())));
            self.session.resolve(ticket, outcome);
            self.chat_follow = true;
        }

        if let Some(outcome) = take_finished(&mut self.history_task).await {
            self.history_loading = false;
            match outcome {
                Ok(points) => self.history = points,
                Err(e) => self.report_market_error("history", e),
            }
        }

        if let Some(outcome) = take_finished(&mut self.prediction_task).await {
            self.prediction_loading = false;
            match outcome {
                Ok(prediction) => {
                    // Mention the signal in the greeting if nothing was asked yet
                    if self.session.messages().len() == 1 && !self.session.is_pending() {
                        let subject = self.session.subject().to_string();
                        self.session.reset(&subject, Some(&prediction.signal_context()));
                    }
                    self.prediction = Some(prediction);
                    self.show_forecast = true;
                }
                Err(e) => self.report_market_error("forecast", e),
            }
        }

        if let Some(outcome) = take_finished(&mut self.quotes_task).await {
            self.quotes_loading = false;
            match outcome {
                Ok(quotes) => {
                    self.quotes = quotes;
                    self.quotes_error = None;
                }
                Err(e) => {
                    warn!(error = %e, "quote refresh failed");
                    self.quotes_error = Some(e.to_string());
                }
            }
        }

        if let Some(outcome) = take_finished(&mut self.health_task).await {
            self.agent_status = match outcome {
                Ok(health) => AgentStatus::Online(health),
                Err(e) => {
                    warn!(error = %e, "agent health check failed");
                    AgentStatus::Offline(e.to_string())
                }
            };
        }

        if self
            .search_changed_at
            .is_some_and(|at| at.elapsed() >= SEARCH_DEBOUNCE)
        {
            self.search_changed_at = None;
            self.start_search();
        }

        if let Some(outcome) = take_finished(&mut self.search_task).await {
            self.searching = false;
            self.search_results = outcome.unwrap_or_else(|e| {
                warn!(error = %e, "ticker search failed");
                Vec::new()
            });
            let first = (!self.search_results.is_empty()).then_some(0);
            self.search_state.select(first);
        }
    }

    fn report_market_error(&mut self, what: &str, error: ServiceError) {
        warn!(what, %error, "market request failed");
        self.market_error = Some(format!("{what}: {error}"));
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        let busy = self.session.is_pending()
            || self.history_loading
            || self.prediction_loading
            || self.quotes_loading
            || self.searching;
        if busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_follow = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }
}
