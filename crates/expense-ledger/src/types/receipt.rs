//! Receipt extraction payload
//!
//! The extraction prompt asks the model for one JSON object with a single
//! `expenses` key. Models routinely wrap that object in markdown code
//! fences, so parsing strips fence markers before handing the remainder to
//! serde.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The strict response shape the extraction prompt requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptPayload {
    pub expenses: ExtractedExpense,
}

/// Fields the model extracts from one receipt. All optional; the ingestion
/// layer applies defaults for anything the model left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedExpense {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Numbers and numeric strings both occur in practice.
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReceiptPayload {
    /// Parse a raw model response, tolerating markdown code fences.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = raw.trim().replace("```json", "").replace("```", "");
        Ok(serde_json::from_str(cleaned.trim())?)
    }
}

impl ExtractedExpense {
    /// Coerce the extracted amount to a float. An absent or null amount
    /// defaults to zero; a present but non-numeric amount fails rather than
    /// silently recording a zero charge.
    pub fn amount_value(&self) -> Result<f64> {
        match &self.amount {
            Value::Null => Ok(0.0),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| Error::extraction(format!("amount out of range: {n}"))),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::extraction(format!("amount is not numeric: {s:?}"))),
            other => Err(Error::extraction(format!("amount is not numeric: {other}"))),
        }
    }
}
