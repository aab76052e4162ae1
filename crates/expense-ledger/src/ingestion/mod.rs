//! Receipt ingestion pipeline
//!
//! An upload travels extension gate -> temp spool -> model extraction ->
//! validated persistence. Each stage is a separate module so the extraction
//! strategy and the persistence choreography stay independently testable.

pub mod coordinator;
pub mod extractor;
pub mod strategy;

pub use coordinator::{IngestReport, IngestionCoordinator};
pub use extractor::ReceiptExtractor;
pub use strategy::ExtractionStrategy;
