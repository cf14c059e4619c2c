// src/ledger.rs

use crate::error::LedgerError;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::info;

/// Maximum number of characters of the raw service response kept per
/// row for audit.
pub const EXCERPT_MAX_CHARS: usize = 500;

/// Placeholder purpose written at discovery time, before the
/// extraction outcome is known.
pub const PLACEHOLDER_PURPOSE: &str = "processing...";

/// Opaque handle to one appended ledger row. Only `append_placeholder`
/// hands these out, so a row can never be patched before it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(i64);

/// The patchable middle of a row: everything between the filename and
/// the execution date. Filename and execution date are fixed at append
/// time and never change.
#[derive(Debug, Clone, Default)]
pub struct RowPatch {
    pub purpose: String,
    pub billing_date: String,
    pub usd_amount: Option<f64>,
    pub jpy_amount: Option<i64>,
    pub raw_excerpt: String,
    pub error: String,
}

/// One full row, as read back for inspection.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub filename: String,
    pub purpose: String,
    pub billing_date: String,
    pub usd_amount: Option<f64>,
    pub jpy_amount: Option<i64>,
    pub raw_excerpt: String,
    pub error: String,
    pub execution_date: String,
    /// Reserved, filled in manually by operators.
    pub budget_source: String,
    /// Reserved, filled in manually by operators.
    pub task_number: String,
}

/// Append-only + positional-update ledger over SQLite, one database
/// per archive period. Rows are never deleted or reordered.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger for one archive period. Re-opening
    /// the same period's ledger reuses the existing rows.
    pub fn open(archive_dir: &Path, period: &str) -> Result<Self, LedgerError> {
        let db_path = archive_dir.join(format!("{period}-expenses.db"));
        let existed = db_path.exists();
        let conn = Connection::open(&db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                purpose TEXT NOT NULL,
                billing_date TEXT NOT NULL DEFAULT '',
                usd_amount REAL,
                jpy_amount INTEGER,
                raw_excerpt TEXT NOT NULL DEFAULT '',
                error TEXT NOT NULL DEFAULT '',
                execution_date TEXT NOT NULL,
                budget_source TEXT NOT NULL DEFAULT '',
                task_number TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        if existed {
            info!(path = %db_path.display(), "Reusing existing ledger");
        } else {
            info!(path = %db_path.display(), "Created new ledger");
        }

        Ok(Ledger { conn })
    }

    /// Append the placeholder row for a newly discovered document and
    /// return its handle for later patching.
    pub fn append_placeholder(
        &self,
        filename: &str,
        execution_date: &str,
    ) -> Result<RowHandle, LedgerError> {
        self.conn.execute(
            "INSERT INTO entries (filename, purpose, execution_date)
             VALUES (?1, ?2, ?3)",
            params![filename, PLACEHOLDER_PURPOSE, execution_date],
        )?;
        let handle = RowHandle(self.conn.last_insert_rowid());
        info!(row = handle.0, filename = %filename, "Ledger row appended");
        Ok(handle)
    }

    /// Patch the outcome columns of a previously appended row. The
    /// filename and execution date columns are left untouched.
    pub fn patch_result(&self, row: &RowHandle, patch: &RowPatch) -> Result<(), LedgerError> {
        let changed = self.conn.execute(
            "UPDATE entries SET
                purpose = ?1,
                billing_date = ?2,
                usd_amount = ?3,
                jpy_amount = ?4,
                raw_excerpt = ?5,
                error = ?6
             WHERE id = ?7",
            params![
                patch.purpose,
                patch.billing_date,
                patch.usd_amount,
                patch.jpy_amount,
                patch.raw_excerpt,
                patch.error,
                row.0
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::RowMissing(row.0));
        }
        Ok(())
    }

    /// Append a relocation failure to a row's error column without
    /// disturbing the extraction outcome already recorded there.
    pub fn append_error(&self, row: &RowHandle, message: &str) -> Result<(), LedgerError> {
        let changed = self.conn.execute(
            "UPDATE entries SET
                error = CASE WHEN error = '' THEN ?1 ELSE error || '; ' || ?1 END
             WHERE id = ?2",
            params![message, row.0],
        )?;
        if changed == 0 {
            return Err(LedgerError::RowMissing(row.0));
        }
        Ok(())
    }

    pub fn row_count(&self) -> Result<usize, LedgerError> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Read all rows back in append order, for operator inspection
    /// and tests.
    pub fn fetch_all(&self) -> Result<Vec<LedgerRow>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, purpose, billing_date, usd_amount, jpy_amount,
                    raw_excerpt, error, execution_date, budget_source, task_number
             FROM entries ORDER BY id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(LedgerRow {
                filename: r.get(0)?,
                purpose: r.get(1)?,
                billing_date: r.get(2)?,
                usd_amount: r.get(3)?,
                jpy_amount: r.get(4)?,
                raw_excerpt: r.get(5)?,
                error: r.get(6)?,
                execution_date: r.get(7)?,
                budget_source: r.get(8)?,
                task_number: r.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Read one row back, for operator inspection and tests.
    pub fn fetch_row(&self, row: &RowHandle) -> Result<LedgerRow, LedgerError> {
        let found = self
            .conn
            .query_row(
                "SELECT filename, purpose, billing_date, usd_amount, jpy_amount,
                        raw_excerpt, error, execution_date, budget_source, task_number
                 FROM entries WHERE id = ?1",
                params![row.0],
                |r| {
                    Ok(LedgerRow {
                        filename: r.get(0)?,
                        purpose: r.get(1)?,
                        billing_date: r.get(2)?,
                        usd_amount: r.get(3)?,
                        jpy_amount: r.get(4)?,
                        raw_excerpt: r.get(5)?,
                        error: r.get(6)?,
                        execution_date: r.get(7)?,
                        budget_source: r.get(8)?,
                        task_number: r.get(9)?,
                    })
                },
            )
            .optional()?;
        found.ok_or(LedgerError::RowMissing(row.0))
    }
}
