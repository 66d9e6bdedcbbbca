//! Reading recognizer output: plain text and Tesseract's TSV table.
//!
//! TSV columns, in order:
//! `level page_num block_num par_num line_num word_num left top width height conf text`.
//!
//! Numeric cells are parsed leniently. A malformed `conf` becomes `NaN` and a
//! malformed coordinate becomes `None`; both serialize as JSON `null`. A bad
//! cell never drops the row or fails the request.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

const COL_LEFT: usize = 6;
const COL_TOP: usize = 7;
const COL_WIDTH: usize = 8;
const COL_HEIGHT: usize = 9;
const COL_CONF: usize = 10;
const COL_TEXT: usize = 11;

/// One recognized region. `x_max`/`y_max` are `left + width` / `top + height`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox {
    pub text: String,
    /// Tesseract reports `-1` for rows without a word.
    pub confidence: f64,
    pub x_min: Option<i64>,
    pub y_min: Option<i64>,
    pub x_max: Option<i64>,
    pub y_max: Option<i64>,
}

/// Read `<base>.txt` and trim it.
pub async fn read_text(path: &Path) -> std::io::Result<String> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content.trim().to_string())
}

/// Read `<base>.tsv` and parse every data row.
pub async fn read_bboxes(path: &Path) -> std::io::Result<Vec<BoundingBox>> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_tsv(&content).map_err(std::io::Error::other)
}

/// Parse TSV content. The first line is a header and is skipped, as are
/// whitespace-only lines. Rows are returned for every level.
pub fn parse_tsv(content: &str) -> Result<Vec<BoundingBox>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let mut boxes = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read TSV row")?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        boxes.push(row_to_bbox(&record));
    }

    Ok(boxes)
}

fn row_to_bbox(record: &csv::StringRecord) -> BoundingBox {
    let int = |idx: usize| record.get(idx).and_then(|v| v.trim().parse::<i64>().ok());

    let left = int(COL_LEFT);
    let top = int(COL_TOP);
    let width = int(COL_WIDTH);
    let height = int(COL_HEIGHT);

    BoundingBox {
        text: record.get(COL_TEXT).unwrap_or("").trim().to_string(),
        confidence: record
            .get(COL_CONF)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN),
        x_min: left,
        y_min: top,
        x_max: add(left, width),
        y_max: add(top, height),
    }
}

fn add(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    a?.checked_add(b?)
}
