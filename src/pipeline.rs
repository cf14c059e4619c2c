// src/pipeline.rs
//
// The per-document state machine: append a placeholder ledger row,
// call the extraction service, patch the outcome back, then relocate
// the file into the archive folder. Every document ends relocated,
// whatever its extraction outcome, so a re-run only ever sees files
// not yet attempted.

use crate::error::ExtractError;
use crate::gemini::Extractor;
use crate::ledger::{EXCERPT_MAX_CHARS, Ledger, RowHandle, RowPatch};
use crate::normalize::{self, excerpt};
use crate::workspace;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Marker recorded when the service answered but with no usable text.
const NO_RESPONSE: &str = "no API response";

/// Fixed-delay pacing between documents, kept apart from the
/// orchestration logic so tests can run without sleeping.
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn fixed(millis: u64) -> Self {
        Pacer {
            delay: Duration::from_millis(millis),
        }
    }

    /// No pacing at all, for tests.
    pub fn none() -> Self {
        Pacer {
            delay: Duration::ZERO,
        }
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Total documents attempted, independent of per-document outcome.
    pub processed: usize,
    pub extracted: usize,
    pub failed: usize,
}

/// Extraction outcome for one document, before relocation.
enum Outcome {
    Extracted {
        record: normalize::CanonicalRecord,
        raw: String,
    },
    NoResponse,
    Failed(ExtractError),
}

/// Process every PDF currently in the source folder, one at a time.
///
/// Per-document failures (extraction errors, unreadable files, even
/// relocation failures) are recorded in the document's ledger row and
/// never abort the batch.
pub async fn run_batch(
    extractor: &dyn Extractor,
    ledger: &Ledger,
    source_dir: &Path,
    archive_dir: &Path,
    pacer: &Pacer,
) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let documents = workspace::list_pdfs(source_dir)?;
    let execution_date = workspace::execution_date()?;
    info!(count = documents.len(), "Documents discovered");

    let mut summary = BatchSummary::default();

    for path in &documents {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed.pdf")
            .to_string();
        let span = tracing::info_span!("document", filename = %filename);
        let _guard = span.enter();

        // Placeholder first, so an interrupted run still leaves an
        // audit trail for every attempted document.
        let row = ledger.append_placeholder(&filename, &execution_date)?;

        let outcome = match tokio::fs::read(path).await {
            Ok(bytes) => match extractor.extract(&bytes).await {
                Ok(text) if !text.trim().is_empty() => {
                    let record = normalize::parse_extraction(&text);
                    Outcome::Extracted { record, raw: text }
                }
                Ok(_) => Outcome::NoResponse,
                Err(e) => Outcome::Failed(e),
            },
            Err(e) => Outcome::Failed(ExtractError::UnexpectedStructure(format!(
                "could not read document: {e}"
            ))),
        };

        let new_stem = record_outcome(ledger, &row, &outcome);

        // Relocation is also isolated per document: a storage hiccup
        // here is recorded in the row and the batch continues.
        match workspace::relocate(path, archive_dir, new_stem.as_deref()) {
            Ok(target) => info!(target = %target.display(), "Document archived"),
            Err(e) => {
                warn!(error = %e, "Failed to relocate document");
                if let Err(le) = ledger.append_error(&row, &format!("relocation failed: {e}")) {
                    warn!(error = %le, "Could not record relocation failure");
                }
            }
        }

        summary.processed += 1;
        match &outcome {
            Outcome::Extracted { .. } => summary.extracted += 1,
            Outcome::NoResponse => {}
            Outcome::Failed(_) => summary.failed += 1,
        }

        pacer.pause().await;
    }

    info!(
        processed = summary.processed,
        extracted = summary.extracted,
        failed = summary.failed,
        "Batch complete"
    );
    Ok(summary)
}

/// Patch the row for one outcome and decide the rename target.
/// Recording failures are logged but never abort the batch.
fn record_outcome(ledger: &Ledger, row: &RowHandle, outcome: &Outcome) -> Option<String> {
    let (patch, new_stem) = match outcome {
        Outcome::Extracted { record, raw } => {
            info!(
                purpose = %record.purpose,
                date = %record.date,
                usd = ?record.usd_amount,
                jpy = ?record.jpy_amount,
                "Extraction result"
            );
            let new_stem = record
                .has_meaningful_purpose()
                .then(|| record.purpose.clone());
            (
                RowPatch {
                    purpose: record.purpose.clone(),
                    billing_date: record.date.clone(),
                    usd_amount: record.usd_amount,
                    jpy_amount: record.jpy_amount,
                    raw_excerpt: excerpt(raw, EXCERPT_MAX_CHARS),
                    error: String::new(),
                },
                new_stem,
            )
        }
        Outcome::NoResponse => {
            warn!("No usable text from extraction service");
            (
                RowPatch {
                    purpose: NO_RESPONSE.to_string(),
                    error: NO_RESPONSE.to_string(),
                    ..RowPatch::default()
                },
                None,
            )
        }
        Outcome::Failed(e) => {
            warn!(error = %e, "Extraction failed");
            (
                RowPatch {
                    purpose: "error".to_string(),
                    error: format!("error: {e}"),
                    ..RowPatch::default()
                },
                None,
            )
        }
    };

    if let Err(e) = ledger.patch_result(row, &patch) {
        warn!(error = %e, "Could not patch ledger row");
    }
    new_stem
}
