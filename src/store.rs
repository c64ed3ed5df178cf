//! Local SQLite store for exported price rows
//!
//! Each call opens its own connection and drops it before returning, on the
//! error path as well.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};

use crate::error::StoreError;
use crate::model::PriceRecord;

pub const TABLE: &str = "stock_prices";

/// Column names a file must carry to be opened
pub const COLUMNS: [&str; 8] = ["id", "date", "open", "high", "low", "close", "volume", "symbol"];

/// Fixed header shown for stored rows
pub const HEADER: [&str; 8] = ["ID", "Date", "Open", "High", "Low", "Close", "Volume", "Symbol"];

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stock_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume INTEGER,
    symbol TEXT
)
"#;

/// Rows loaded from a store file, already rendered as text
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRows {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file, creating the price table if it is missing
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(conn)
    }

    /// Create the price table if it is missing
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.connect().map(drop)
    }

    /// Append one row per record, all tagged with `symbol`.
    ///
    /// Existing rows are never checked, so exporting twice stores duplicates.
    pub fn export(&self, symbol: &str, records: &[PriceRecord]) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;

        let tx = conn.transaction()?;
        let mut stmt = tx.prepare(
            "INSERT INTO stock_prices (date, open, high, low, close, volume, symbol)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for record in records {
            stmt.execute(params![
                record.date.format("%Y-%m-%d").to_string(),
                record.open,
                record.high,
                record.low,
                record.close,
                record.volume,
                symbol,
            ])?;
        }
        drop(stmt);
        tx.commit()?;

        tracing::info!(symbol, rows = records.len(), path = %self.path.display(), "exported prices");
        Ok(records.len())
    }

    /// Delete every row and restart the id counter at 1
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;

        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM stock_prices", [])?;
        tx.execute("DELETE FROM sqlite_sequence WHERE name = ?1", params![TABLE])?;
        tx.commit()?;

        tracing::info!(deleted, path = %self.path.display(), "cleared stored prices");
        Ok(deleted)
    }

    pub fn row_count(&self) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM stock_prices", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Load every row of the first table in `path` whose columns match the
/// price schema.
///
/// The file is opened read-only, so a missing path is an error rather than a
/// fresh empty database.
pub fn open_external(path: &Path) -> Result<StoredRows, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let table = find_price_table(&conn)?.ok_or_else(|| StoreError::SchemaMismatch {
        path: path.display().to_string(),
    })?;

    // Table names come from sqlite_master, quoting guards odd names
    let sql = format!(
        "SELECT {} FROM \"{}\" ORDER BY rowid",
        COLUMNS.join(", "),
        table.replace('"', "\"\"")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            (0..COLUMNS.len())
                .map(|i| row.get_ref(i).map(render_value))
                .collect::<rusqlite::Result<Vec<String>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    tracing::info!(path = %path.display(), table, rows = rows.len(), "opened store file");

    Ok(StoredRows {
        header: HEADER.iter().map(|h| h.to_string()).collect(),
        rows,
    })
}

/// First user table, by creation order, carrying exactly the expected columns
fn find_price_table(conn: &Connection) -> Result<Option<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY rowid",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for table in tables {
        let mut info = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = info
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let matches = columns.len() == COLUMNS.len()
            && columns
                .iter()
                .zip(COLUMNS.iter())
                .all(|(have, want)| have.eq_ignore_ascii_case(want));
        if matches {
            return Ok(Some(table));
        }
        tracing::debug!(table, ?columns, "skipping table with foreign schema");
    }

    Ok(None)
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{:.2}", f),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::MockSource;
    use tempfile::tempdir;

    fn records(n: usize) -> Vec<PriceRecord> {
        MockSource::with_days("AAPL", n).records
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("stocks.db"));
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_export_then_open_returns_every_row() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("stocks.db"));

        assert_eq!(store.export("AAPL", &records(7)).unwrap(), 7);

        let loaded = open_external(store.path()).unwrap();
        assert_eq!(loaded.header, HEADER.to_vec());
        assert_eq!(loaded.rows.len(), 7);
        assert_eq!(
            loaded.rows[0],
            vec!["1", "2024-01-01", "99.50", "101.00", "99.00", "100.00", "1000", "AAPL"]
        );
    }

    #[test]
    fn test_reexport_appends_duplicates() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("stocks.db"));

        store.export("AAPL", &records(5)).unwrap();
        store.export("AAPL", &records(5)).unwrap();

        assert_eq!(store.row_count().unwrap(), 10);
        let loaded = open_external(store.path()).unwrap();
        assert_eq!(loaded.rows[0][1], loaded.rows[5][1]);
        assert_eq!(loaded.rows[9][0], "10");
    }

    #[test]
    fn test_clear_all_empties_and_resets_ids() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("stocks.db"));

        store.export("AAPL", &records(4)).unwrap();
        assert_eq!(store.clear_all().unwrap(), 4);
        assert!(open_external(store.path()).unwrap().rows.is_empty());

        store.export("MSFT", &records(2)).unwrap();
        let loaded = open_external(store.path()).unwrap();
        assert_eq!(loaded.rows[0][0], "1");
        assert_eq!(loaded.rows[1][0], "2");
        assert_eq!(loaded.rows[0][7], "MSFT");
    }

    #[test]
    fn test_clear_on_fresh_file() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("fresh.db"));
        assert_eq!(store.clear_all().unwrap(), 0);
    }

    #[test]
    fn test_open_skips_foreign_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
                 INSERT INTO notes (body) VALUES ('hello');",
            )
            .unwrap();
        }
        Store::new(&path).export("TSLA", &records(3)).unwrap();

        let loaded = open_external(&path).unwrap();
        assert_eq!(loaded.rows.len(), 3);
        assert_eq!(loaded.rows[2][7], "TSLA");
    }

    #[test]
    fn test_open_reports_schema_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE trades (id INTEGER PRIMARY KEY, qty REAL);").unwrap();
        }

        let err = open_external(&path).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_open_missing_file_does_not_create_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.db");
        assert!(matches!(open_external(&path), Err(StoreError::Database(_))));
        assert!(!path.exists());
    }
}
