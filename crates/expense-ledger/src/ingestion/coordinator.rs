//! Upload ingestion: extension gate, temp spooling, persistence

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use bson::Document;
use tracing::{debug, warn};

use crate::config::IngestionConfig;
use crate::error::{Error, Result};
use crate::ingestion::extractor::ReceiptExtractor;
use crate::storage::LedgerStore;
use crate::types::{Expense, ExtractedExpense, Transaction};

/// Recorded in the derived transaction's expense link; the real expense id
/// is never correlated back into it.
const PLACEHOLDER_EXPENSE_ID: &str = "auto-generated";

/// Outcome of one receipt ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// The expense document as persisted, defaults applied.
    pub expense: Document,
    /// What the model extracted, before defaulting.
    pub extracted: ExtractedExpense,
    /// Whether the derived transaction insert landed.
    pub transaction_recorded: bool,
}

/// Drives a receipt upload from raw bytes to persisted records.
pub struct IngestionCoordinator {
    extractor: ReceiptExtractor,
    store: Arc<LedgerStore>,
    config: IngestionConfig,
}

impl IngestionCoordinator {
    pub fn new(
        extractor: ReceiptExtractor,
        store: Arc<LedgerStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            config,
        }
    }

    /// Ingest an uploaded receipt for `user_id`. The extension gate runs
    /// before anything touches disk or the model; the spooled temp file is
    /// released on every exit path.
    pub async fn ingest(
        &self,
        filename: &str,
        content: &[u8],
        user_id: &str,
    ) -> Result<IngestReport> {
        let extension = Path::new(filename)
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();
        if !self.config.allows(&extension) {
            return Err(Error::UnsupportedFileType(format!(
                "File type '{}' not supported. Allowed types: {}",
                extension,
                self.config.allowed_extensions.join(", ")
            )));
        }

        debug!(filename, user = user_id, "processing receipt upload");

        let spool = tempfile::Builder::new()
            .prefix("receipt-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        tokio::fs::write(spool.path(), content).await?;

        let payload = self.extractor.extract(spool.path(), user_id).await?;
        let extracted = payload.expenses;

        let amount = extracted.amount_value()?;
        let title = extracted
            .title
            .clone()
            .unwrap_or_else(|| self.config.default_title.clone());
        let category = extracted
            .category
            .clone()
            .unwrap_or_else(|| self.config.default_category.clone());
        let description = extracted
            .description
            .clone()
            .unwrap_or_else(|| self.config.default_description.clone());

        let expense_doc =
            Expense::new(title, category.clone(), amount, description.clone(), user_id)
                .to_document()?;
        if !self.store.insert_expense(expense_doc.clone()).await? {
            return Err(Error::validation(
                "expenses",
                "receipt-derived expense was rejected",
            ));
        }

        let transaction = Transaction::new(
            user_id,
            PLACEHOLDER_EXPENSE_ID,
            category,
            amount,
            description,
        );
        let transaction_recorded = self.record_transaction(transaction).await;

        Ok(IngestReport {
            expense: expense_doc,
            extracted,
            transaction_recorded,
        })
    }

    /// The companion transaction is propagation-grade: failures are logged
    /// and never fail the ingestion.
    async fn record_transaction(&self, transaction: Transaction) -> bool {
        let doc = match transaction.to_document() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "could not encode derived transaction");
                return false;
            }
        };
        match self.store.insert_transaction(doc).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("derived transaction failed validation");
                false
            }
            Err(e) => {
                warn!(error = %e, "derived transaction insert failed");
                false
            }
        }
    }
}
