//! What the display region is currently showing

use chrono::NaiveDate;

use crate::model::PriceRecord;

/// How many rows the table keeps, and whether it scrolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// First 20 rows, Up/Down scrolls through them
    #[default]
    Scrollable,
    /// First 10 rows, no scrolling
    Paged,
}

impl TableMode {
    pub fn row_cap(self) -> usize {
        match self {
            TableMode::Scrollable => 20,
            TableMode::Paged => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartView {
    pub symbol: String,
    pub points: Vec<(NaiveDate, f64)>,
}

impl ChartView {
    pub fn from_records(symbol: &str, records: &[PriceRecord]) -> Self {
        let mut points: Vec<(NaiveDate, f64)> = records.iter().map(|r| (r.date, r.close)).collect();
        points.sort_by_key(|(date, _)| *date);
        Self {
            symbol: symbol.to_string(),
            points,
        }
    }

    /// Close of the last point, two decimals; None for an empty series
    pub fn price_readout(&self) -> Option<String> {
        self.points.last().map(|(_, close)| format!("{:.2}", close))
    }

    /// `(x, y)` pairs where x is days since the first point
    pub fn data(&self) -> Vec<(f64, f64)> {
        let Some(&(first, _)) = self.points.first() else {
            return Vec::new();
        };
        self.points
            .iter()
            .map(|(date, close)| ((*date - first).num_days() as f64, *close))
            .collect()
    }

    pub fn x_bounds(&self) -> [f64; 2] {
        let max_x = self.data().last().map(|(x, _)| *x).unwrap_or(0.0);
        [0.0, max_x.max(1.0)]
    }

    pub fn y_bounds(&self) -> [f64; 2] {
        let min = self.points.iter().map(|(_, c)| *c).fold(f64::INFINITY, f64::min);
        let max = self.points.iter().map(|(_, c)| *c).fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return [0.0, 1.0];
        }
        [min * 0.98, max * 1.02]
    }

    /// First, middle and last dates for the x axis
    pub fn x_labels(&self) -> Vec<String> {
        match self.points.len() {
            0 => Vec::new(),
            1 => vec![self.points[0].0.to_string()],
            n => vec![
                self.points[0].0.to_string(),
                self.points[n / 2].0.to_string(),
                self.points[n - 1].0.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub title: String,
    pub header: Vec<String>,
    rows: Vec<Vec<String>>,
    mode: TableMode,
    offset: usize,
    total: usize,
}

impl TableView {
    pub fn new(title: impl Into<String>, header: Vec<String>, mut rows: Vec<Vec<String>>, mode: TableMode) -> Self {
        let total = rows.len();
        rows.truncate(mode.row_cap());
        Self {
            title: title.into(),
            header,
            rows,
            mode,
            offset: 0,
            total,
        }
    }

    /// Table of freshly fetched records
    pub fn from_records(symbol: &str, records: &[PriceRecord], mode: TableMode) -> Self {
        let header = ["Date", "Open", "High", "Low", "Close", "Volume"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    r.date.to_string(),
                    format!("{:.2}", r.open),
                    format!("{:.2}", r.high),
                    format!("{:.2}", r.low),
                    format!("{:.2}", r.close),
                    r.volume.to_string(),
                ]
            })
            .collect();
        Self::new(symbol, header, rows, mode)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Rows in the source before the cap was applied
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn scroll_down(&mut self) {
        if self.mode == TableMode::Scrollable && self.offset + 1 < self.rows.len() {
            self.offset += 1;
        }
    }

    pub fn scroll_up(&mut self) {
        if self.mode == TableMode::Scrollable {
            self.offset = self.offset.saturating_sub(1);
        }
    }
}

/// The single content slot of the window
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Display {
    #[default]
    Empty,
    Chart(ChartView),
    Table(TableView),
}

impl Display {
    pub fn is_empty(&self) -> bool {
        matches!(self, Display::Empty)
    }
}
