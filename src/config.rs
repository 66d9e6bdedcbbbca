//! Service configuration.
//!
//! Everything is read from the environment once at startup (a `.env` file is
//! honoured via `dotenvy`) and is immutable afterwards.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TESSERACT: &str = "tesseract";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BODY_LIMIT_MB: usize = 50;

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    /// Recognizer executable. A bare name is resolved through `PATH`.
    pub tesseract_path: PathBuf,
    /// Optional `-l` language passed to the recognizer.
    pub tesseract_lang: Option<String>,
    pub ocr_timeout: Duration,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tesseract_path: PathBuf::from(DEFAULT_TESSERACT),
            tesseract_lang: None,
            ocr_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
        }
    }
}

impl Settings {
    /// Build settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unset or blank keys fall
    /// back to defaults; present but malformed numbers are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = parse_or(get("PORT"), "PORT", defaults.port)?;
        let timeout_secs = parse_or(get("OCR_TIMEOUT_SECS"), "OCR_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let body_limit_mb = parse_or(get("BODY_LIMIT_MB"), "BODY_LIMIT_MB", DEFAULT_BODY_LIMIT_MB)?;

        if timeout_secs == 0 {
            anyhow::bail!("OCR_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            port,
            tesseract_path: get("TESSERACT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tesseract_path),
            tesseract_lang: get("TESSERACT_LANG"),
            ocr_timeout: Duration::from_secs(timeout_secs),
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            body_limit_bytes: body_limit_mb * 1024 * 1024,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
