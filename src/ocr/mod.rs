//! Recognizer abstraction.
//!
//! Defines the [`Recognizer`] trait so the HTTP layer does not care which
//! executable produces the output files, plus the result types parsed from them.

pub mod tesseract;
pub mod tsv;

use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use tesseract::TesseractCli;
pub use tsv::BoundingBox;

/// Failure of the external recognizer.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to start OCR process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Non-zero exit. `stderr` may be empty.
    #[error("OCR process failed: {stderr}")]
    Failed { stderr: String },

    #[error("OCR process timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs recognition for one staged image.
///
/// On success `<output_base>.txt` exists, and `<output_base>.tsv` too when
/// `tabular` was requested. Implementations return only after the work has
/// fully finished.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(&self, image: &Path, output_base: &Path, tabular: bool) -> Result<(), OcrError>;
}

/// Box granularity a caller asks for. Echoed back as a label only; rows are
/// not filtered by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BboxType {
    Word,
    Line,
    Paragraph,
    Block,
    Page,
}

impl BboxType {
    pub const ALL: [BboxType; 5] = [
        BboxType::Word,
        BboxType::Line,
        BboxType::Paragraph,
        BboxType::Block,
        BboxType::Page,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BboxType::Word => "word",
            BboxType::Line => "line",
            BboxType::Paragraph => "paragraph",
            BboxType::Block => "block",
            BboxType::Page => "page",
        }
    }

    /// Parse a request value into a bbox type.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}
