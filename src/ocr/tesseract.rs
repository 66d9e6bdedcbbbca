//! Tesseract command-line recognizer.

use super::{OcrError, Recognizer};
use crate::config::Settings;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Config variable that makes Tesseract write `<base>.tsv` next to `<base>.txt`.
const TSV_CONFIG: &str = "tessedit_create_tsv=1";

pub struct TesseractCli {
    binary: PathBuf,
    lang: Option<String>,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            lang: None,
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let cli = Self::new(&settings.tesseract_path, settings.ocr_timeout);
        match &settings.tesseract_lang {
            Some(lang) => cli.with_lang(lang.as_str()),
            None => cli,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Arguments after the binary name.
    fn args(&self, image: &Path, output_base: &Path, tabular: bool) -> Vec<std::ffi::OsString> {
        let mut args = vec![image.as_os_str().to_owned(), output_base.as_os_str().to_owned()];
        if let Some(lang) = &self.lang {
            args.push("-l".into());
            args.push(lang.into());
        }
        if tabular {
            args.push("-c".into());
            args.push(TSV_CONFIG.into());
        }
        args
    }
}

#[async_trait::async_trait]
impl Recognizer for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &Path, output_base: &Path, tabular: bool) -> Result<(), OcrError> {
        let args = self.args(image, output_base, tabular);
        debug!("Running {:?} {:?}", self.binary, args);

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout kills the child.
            .kill_on_drop(true)
            .spawn()
            .map_err(OcrError::Spawn)?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(OcrError::Spawn)?,
            Err(_) => {
                warn!("Tesseract exceeded {:?} on {:?}, killed", self.timeout, image);
                return Err(OcrError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Tesseract exited with {}: {}", output.status, stderr);
            return Err(OcrError::Failed { stderr });
        }

        info!("Tesseract finished {:?} (tabular={})", image, tabular);
        Ok(())
    }
}
