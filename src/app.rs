use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use crossterm::event::{KeyCode, MouseButton, MouseEventKind};
use ratatui::layout::Rect;

use crate::config::{ClockMode, Config};
use crate::error::AppError;
use crate::fetch::PriceSource;
use crate::model::{parse_date, PeriodSpec, PriceRecord, QueryParameters, MAX_LOOKBACK_DAYS, MIN_LOOKBACK_DAYS};
use crate::store::{self, StoredRows, Store};
use crate::view::{ChartView, Display, TableMode, TableView};

const CLOCK_TICK: Duration = Duration::from_secs(1);

/// What a fetched series is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    Chart,
    Table,
    Export,
}

/// Background work; only one may be outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Fetch(FetchPurpose),
    Clear,
    Open,
}

impl Job {
    pub fn label(self) -> &'static str {
        match self {
            Job::Fetch(FetchPurpose::Chart) => "Explore",
            Job::Fetch(FetchPurpose::Table) => "Table",
            Job::Fetch(FetchPurpose::Export) => "Export",
            Job::Clear => "Clear",
            Job::Open => "Open",
        }
    }
}

/// Posted from the worker thread back to the UI thread
#[derive(Debug)]
enum JobMessage {
    Fetched {
        purpose: FetchPurpose,
        symbol: String,
        records: Vec<PriceRecord>,
    },
    NoData {
        symbol: String,
    },
    Exported {
        symbol: String,
        count: usize,
        total: i64,
    },
    Cleared {
        deleted: usize,
    },
    Opened {
        path: PathBuf,
        stored: StoredRows,
    },
    Failed(AppError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodMode {
    Lookback,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub kind: NoticeKind,
}

#[derive(Debug)]
pub enum InputMode {
    Normal,
    EditSymbol(String),
    EditDate(DateField, String),
    OpenFile(String),
    Notice(Notice),
}

/// Menu entries, grouped the way the menu bar draws them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Explore,
    Table,
    Open,
    Close,
    Export,
    Clear,
    Quit,
}

pub const MENU: [(&str, &[(MenuItem, &str)]); 3] = [
    ("File", &[(MenuItem::Open, "o Open"), (MenuItem::Quit, "q Close")]),
    ("Chart", &[(MenuItem::Explore, "e Explore"), (MenuItem::Table, "t Table"), (MenuItem::Close, "w Close")]),
    ("Data", &[(MenuItem::Export, "x Export"), (MenuItem::Clear, "c Clear")]),
];

/// Menu bar areas recorded while drawing, for mouse clicks
#[derive(Default, Clone, Debug)]
pub struct ClickableRegions {
    pub menu: Vec<(Rect, MenuItem)>,
}

pub enum Action {
    None,
    Quit,
    Explore,
    ShowTable,
    Export,
    Clear,
    Open(PathBuf),
    CloseView,
}

pub struct App {
    source: Arc<dyn PriceSource>,
    store: Store,
    table_mode: TableMode,
    clock_mode: ClockMode,
    symbol: String,
    period_mode: PeriodMode,
    lookback_days: u32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    display: Display,
    price_readout: Option<String>,
    clock_label: String,
    last_clock_update: Instant,
    status: String,
    pub input_mode: InputMode,
    pub clickable_regions: ClickableRegions,
    busy: Option<Job>,
    job_sender: Sender<JobMessage>,
    job_receiver: Receiver<JobMessage>,
}

impl App {
    pub fn new(config: &Config, source: Arc<dyn PriceSource>) -> Self {
        let (job_sender, job_receiver) = mpsc::channel();
        let today = Local::now().date_naive();
        let mut app = App {
            source,
            store: Store::new(config.db_path.clone()),
            table_mode: config.table_mode,
            clock_mode: config.clock_mode,
            symbol: String::new(),
            period_mode: PeriodMode::Lookback,
            lookback_days: config.lookback_days,
            start_date: today - chrono::Duration::days(i64::from(config.lookback_days)),
            end_date: today,
            display: Display::Empty,
            price_readout: None,
            clock_label: String::new(),
            last_clock_update: Instant::now(),
            status: "Enter a symbol with s, then e to explore".to_string(),
            input_mode: InputMode::Normal,
            clickable_regions: ClickableRegions::default(),
            busy: None,
            job_sender,
            job_receiver,
        };
        app.update_clock();
        app
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        self.symbol = symbol.trim().to_uppercase();
    }

    pub fn period_mode(&self) -> PeriodMode {
        self.period_mode
    }

    pub fn toggle_period_mode(&mut self) {
        self.period_mode = match self.period_mode {
            PeriodMode::Lookback => PeriodMode::Range,
            PeriodMode::Range => PeriodMode::Lookback,
        };
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    /// Move the period slider, staying inside 1..=365
    pub fn adjust_lookback(&mut self, delta: i32) {
        let days = i64::from(self.lookback_days) + i64::from(delta);
        self.lookback_days =
            days.clamp(i64::from(MIN_LOOKBACK_DAYS), i64::from(MAX_LOOKBACK_DAYS)) as u32;
    }

    pub fn dates(&self) -> (NaiveDate, NaiveDate) {
        (self.start_date, self.end_date)
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn price_readout(&self) -> Option<&str> {
        self.price_readout.as_deref()
    }

    pub fn clock_label(&self) -> &str {
        &self.clock_label
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    pub fn busy(&self) -> Option<Job> {
        self.busy
    }

    fn update_clock(&mut self) {
        self.clock_label = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.last_clock_update = Instant::now();
    }

    /// Refresh the clock when ticking; the one-shot clock keeps its startup value.
    /// Returns true if the label changed.
    pub fn tick(&mut self) -> bool {
        if self.clock_mode == ClockMode::Ticking && self.last_clock_update.elapsed() >= CLOCK_TICK {
            self.update_clock();
            return true;
        }
        false
    }

    fn query(&self) -> Result<QueryParameters, AppError> {
        let period = match self.period_mode {
            PeriodMode::Lookback => PeriodSpec::Lookback(self.lookback_days),
            PeriodMode::Range => PeriodSpec::Range {
                start: self.start_date,
                end: self.end_date,
            },
        };
        QueryParameters::new(&self.symbol, period)
    }

    pub fn explore(&mut self) {
        self.start_fetch(FetchPurpose::Chart);
    }

    pub fn show_table(&mut self) {
        self.start_fetch(FetchPurpose::Table);
    }

    pub fn export(&mut self) {
        self.start_fetch(FetchPurpose::Export);
    }

    fn start_fetch(&mut self, purpose: FetchPurpose) {
        let job = Job::Fetch(purpose);
        if self.reject_if_busy(job) {
            return;
        }
        let query = match self.query() {
            Ok(query) => query,
            Err(err) => return self.notify_error(err),
        };

        tracing::info!(action = job.label(), symbol = %query.symbol, period = ?query.period, "starting fetch");

        let status = format!("Fetching {}...", query.symbol);
        let source = Arc::clone(&self.source);
        let store = self.store.clone();
        self.spawn(job, status, move || run_fetch(purpose, source.as_ref(), &store, query));
    }

    /// Empty the store and the display region
    pub fn clear(&mut self) {
        if self.reject_if_busy(Job::Clear) {
            return;
        }
        tracing::info!(path = %self.store.path().display(), "clearing store");

        let store = self.store.clone();
        self.spawn(Job::Clear, "Clearing stored prices...".to_string(), move || {
            match store.clear_all() {
                Ok(deleted) => JobMessage::Cleared { deleted },
                Err(err) => JobMessage::Failed(err.into()),
            }
        });
    }

    /// Load a store file and show its rows as a table
    pub fn open(&mut self, path: PathBuf) {
        if self.reject_if_busy(Job::Open) {
            return;
        }
        tracing::info!(path = %path.display(), "opening store file");

        let status = format!("Opening {}...", path.display());
        self.spawn(Job::Open, status, move || match store::open_external(&path) {
            Ok(stored) => JobMessage::Opened { path, stored },
            Err(err) => JobMessage::Failed(err.into()),
        });
    }

    pub fn close_view(&mut self) {
        if self.display.is_empty() {
            self.status = "Nothing to close".to_string();
            return;
        }
        self.replace_display(Display::Empty);
        self.price_readout = None;
        self.status = "View closed".to_string();
    }

    /// Drop whatever the region shows and put `display` in its place
    fn replace_display(&mut self, display: Display) {
        self.display = display;
    }

    pub fn scroll_down(&mut self) {
        if let Display::Table(view) = &mut self.display {
            view.scroll_down();
        }
    }

    pub fn scroll_up(&mut self) {
        if let Display::Table(view) = &mut self.display {
            view.scroll_up();
        }
    }

    fn reject_if_busy(&mut self, job: Job) -> bool {
        match self.busy {
            Some(running) => {
                tracing::debug!(requested = job.label(), running = running.label(), "ignored while busy");
                self.status = format!("{} is still running, please wait", running.label());
                true
            }
            None => false,
        }
    }

    fn spawn<F>(&mut self, job: Job, status: String, work: F)
    where
        F: FnOnce() -> JobMessage + Send + 'static,
    {
        self.busy = Some(job);
        self.status = status;
        let sender = self.job_sender.clone();
        thread::spawn(move || {
            // A panicking job still has to free the slot
            let msg = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                tracing::error!(job = job.label(), "background job panicked");
                JobMessage::Failed(AppError::Worker(job.label()))
            });
            let _ = sender.send(msg);
        });
    }

    /// Apply any finished background work. Returns true if state changed.
    pub fn poll_jobs(&mut self) -> bool {
        let mut updated = false;
        while let Ok(msg) = self.job_receiver.try_recv() {
            self.apply(msg);
            updated = true;
        }
        updated
    }

    fn apply(&mut self, msg: JobMessage) {
        self.busy = None;

        match msg {
            JobMessage::Fetched { purpose: FetchPurpose::Chart, symbol, records } => {
                let chart = ChartView::from_records(&symbol, &records);
                if let Some(price) = chart.price_readout() {
                    self.price_readout = Some(price);
                }
                self.status = format!("{}: {} trading days", symbol, records.len());
                self.replace_display(Display::Chart(chart));
            }
            JobMessage::Fetched { symbol, records, .. } => {
                let table = TableView::from_records(&symbol, &records, self.table_mode);
                self.status = format!("{}: {} trading days", symbol, records.len());
                self.replace_display(Display::Table(table));
            }
            JobMessage::NoData { symbol } => {
                tracing::info!(%symbol, "provider returned no rows");
                self.status = format!("No data for {}", symbol);
                self.notify(Notice {
                    title: "No data".to_string(),
                    message: format!("No price data for {} in the selected period", symbol),
                    kind: NoticeKind::Info,
                });
            }
            JobMessage::Exported { symbol, count, total } => {
                self.status = format!("Exported {} rows for {}", count, symbol);
                self.notify(Notice {
                    title: "Export".to_string(),
                    message: format!(
                        "Saved {} rows for {} to {} ({} rows stored)",
                        count,
                        symbol,
                        self.store.path().display(),
                        total
                    ),
                    kind: NoticeKind::Info,
                });
            }
            JobMessage::Cleared { deleted } => {
                self.replace_display(Display::Empty);
                self.price_readout = None;
                self.status = format!("Deleted {} stored rows", deleted);
            }
            JobMessage::Opened { path, stored } => {
                let title = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.status = format!("{}: {} stored rows", title, stored.rows.len());
                let table = TableView::new(title, stored.header, stored.rows, self.table_mode);
                self.replace_display(Display::Table(table));
                self.price_readout = None;
            }
            JobMessage::Failed(err) => self.notify_error(err),
        }
    }

    fn notify(&mut self, notice: Notice) {
        self.input_mode = InputMode::Notice(notice);
    }

    fn notify_error(&mut self, err: AppError) {
        tracing::warn!(error = %err, "action failed");
        self.status = err.title().to_string();
        self.notify(Notice {
            title: err.title().to_string(),
            message: err.to_string(),
            kind: NoticeKind::Error,
        });
    }

    fn commit_date(&mut self, field: DateField, input: &str) {
        match parse_date(input) {
            Ok(date) => match field {
                DateField::Start => self.start_date = date,
                DateField::End => self.end_date = date,
            },
            Err(err) => self.notify_error(err),
        }
    }

    #[cfg(test)]
    fn wait_for_job(&mut self) {
        let msg = self
            .job_receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("background job finished");
        self.apply(msg);
    }
}

/// Body of a fetch job, run on the worker thread
fn run_fetch(purpose: FetchPurpose, source: &dyn PriceSource, store: &Store, query: QueryParameters) -> JobMessage {
    let records = match source.fetch(&query.symbol, &query.period) {
        Ok(records) => records,
        Err(err) => return JobMessage::Failed(err.into()),
    };
    if records.is_empty() {
        return JobMessage::NoData { symbol: query.symbol };
    }

    match purpose {
        FetchPurpose::Export => {
            let saved = store
                .export(&query.symbol, &records)
                .and_then(|count| Ok((count, store.row_count()?)));
            match saved {
                Ok((count, total)) => JobMessage::Exported {
                    symbol: query.symbol,
                    count,
                    total,
                },
                Err(err) => JobMessage::Failed(err.into()),
            }
        }
        FetchPurpose::Chart | FetchPurpose::Table => JobMessage::Fetched {
            purpose,
            symbol: query.symbol,
            records,
        },
    }
}

pub fn handle_input(app: &mut App, key: KeyCode) -> Action {
    match &mut app.input_mode {
        InputMode::Normal => match key {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char('s') | KeyCode::Char('/') => {
                app.input_mode = InputMode::EditSymbol(app.symbol.clone());
                Action::None
            }
            KeyCode::Enter | KeyCode::Char('e') => Action::Explore,
            KeyCode::Char('t') => Action::ShowTable,
            KeyCode::Char('x') => Action::Export,
            KeyCode::Char('c') => Action::Clear,
            KeyCode::Char('o') => {
                app.input_mode = InputMode::OpenFile(app.store.path().display().to_string());
                Action::None
            }
            KeyCode::Char('w') | KeyCode::Esc => Action::CloseView,
            KeyCode::Char('m') => {
                app.toggle_period_mode();
                Action::None
            }
            // Period slider
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('-') => {
                app.adjust_lookback(-1);
                Action::None
            }
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('+') => {
                app.adjust_lookback(1);
                Action::None
            }
            KeyCode::PageDown => {
                app.adjust_lookback(-30);
                Action::None
            }
            KeyCode::PageUp => {
                app.adjust_lookback(30);
                Action::None
            }
            KeyCode::Char('[') if app.period_mode == PeriodMode::Range => {
                app.input_mode = InputMode::EditDate(DateField::Start, app.start_date.to_string());
                Action::None
            }
            KeyCode::Char(']') if app.period_mode == PeriodMode::Range => {
                app.input_mode = InputMode::EditDate(DateField::End, app.end_date.to_string());
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.scroll_down();
                Action::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.scroll_up();
                Action::None
            }
            _ => Action::None,
        },
        InputMode::EditSymbol(buffer) => match key {
            KeyCode::Esc => {
                app.input_mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Enter => {
                let symbol = buffer.clone();
                app.set_symbol(&symbol);
                app.input_mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Backspace => {
                buffer.pop();
                Action::None
            }
            KeyCode::Char(c) if !c.is_control() => {
                buffer.push(c.to_ascii_uppercase());
                Action::None
            }
            _ => Action::None,
        },
        InputMode::EditDate(field, buffer) => match key {
            KeyCode::Esc => {
                app.input_mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Enter => {
                let (field, input) = (*field, buffer.clone());
                app.input_mode = InputMode::Normal;
                app.commit_date(field, &input);
                Action::None
            }
            KeyCode::Backspace => {
                buffer.pop();
                Action::None
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '-' => {
                buffer.push(c);
                Action::None
            }
            _ => Action::None,
        },
        InputMode::OpenFile(buffer) => match key {
            KeyCode::Esc => {
                app.input_mode = InputMode::Normal;
                Action::None
            }
            KeyCode::Enter => {
                let path = buffer.trim().to_string();
                app.input_mode = InputMode::Normal;
                if path.is_empty() {
                    Action::None
                } else {
                    Action::Open(PathBuf::from(path))
                }
            }
            KeyCode::Backspace => {
                buffer.pop();
                Action::None
            }
            KeyCode::Char(c) if !c.is_control() => {
                buffer.push(c);
                Action::None
            }
            _ => Action::None,
        },
        InputMode::Notice(_) => {
            app.input_mode = InputMode::Normal;
            Action::None
        }
    }
}

/// Check if a point (x, y) is inside a Rect
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

pub fn handle_mouse(app: &mut App, kind: MouseEventKind, x: u16, y: u16) -> Action {
    match kind {
        MouseEventKind::ScrollDown => {
            app.scroll_down();
            return Action::None;
        }
        MouseEventKind::ScrollUp => {
            app.scroll_up();
            return Action::None;
        }
        MouseEventKind::Down(MouseButton::Left) => {}
        _ => return Action::None,
    }

    // A click dismisses an open notice
    if matches!(app.input_mode, InputMode::Notice(_)) {
        app.input_mode = InputMode::Normal;
        return Action::None;
    }
    if !matches!(app.input_mode, InputMode::Normal) {
        return Action::None;
    }

    let clicked = app
        .clickable_regions
        .menu
        .iter()
        .find(|(rect, _)| point_in_rect(x, y, *rect))
        .map(|(_, item)| *item);

    match clicked {
        Some(MenuItem::Explore) => Action::Explore,
        Some(MenuItem::Table) => Action::ShowTable,
        Some(MenuItem::Export) => Action::Export,
        Some(MenuItem::Clear) => Action::Clear,
        Some(MenuItem::Close) => Action::CloseView,
        Some(MenuItem::Quit) => Action::Quit,
        Some(MenuItem::Open) => {
            app.input_mode = InputMode::OpenFile(app.store.path().display().to_string());
            Action::None
        }
        None => Action::None,
    }
}
