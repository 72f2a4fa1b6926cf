//! Request/response bodies of the deployment predictions API.
//!
//! Mention spans are code-point offsets local to the submitted snippet.

use serde::{Deserialize, Serialize};

use docenrich_shared::{EnrichError, Result};

/// Name of the single input field sent to the model.
pub const TEXT_FIELD: &str = "text";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringInput {
    pub input_data: Vec<InputData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputData {
    pub fields: Vec<String>,
    /// One single-element row per snippet, in submission order.
    pub values: Vec<Vec<String>>,
}

impl ScoringInput {
    /// Wrap snippets as rows of the single `text` field.
    pub fn for_snippets(snippets: &[String]) -> Self {
        Self {
            input_data: vec![InputData {
                fields: vec![TEXT_FIELD.to_string()],
                values: snippets.iter().map(|s| vec![s.clone()]).collect(),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoringOutput {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<SnippetPrediction>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnippetPrediction {
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

/// An entity detected within one snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub span: Span,
    #[serde(rename = "type")]
    pub mention_type: String,
    pub confidence: f64,
}

/// Code-point range within the snippet, plus the covered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
    pub text: String,
}

impl ScoringOutput {
    /// Extract one mention list per submitted snippet.
    ///
    /// The first prediction's first value row must hold exactly `expected`
    /// entries; anything else breaks positional alignment.
    pub fn into_mentions(self, expected: usize) -> Result<Vec<Vec<Mention>>> {
        let row = self
            .predictions
            .into_iter()
            .next()
            .and_then(|p| p.values.into_iter().next())
            .ok_or_else(|| EnrichError::Scoring("response has no prediction values".into()))?;

        if row.len() != expected {
            return Err(EnrichError::Scoring(format!(
                "response has {} prediction values for {expected} snippets",
                row.len()
            )));
        }

        Ok(row.into_iter().map(|p| p.mentions).collect())
    }
}
