//! JSON-lines export of committed public observations.

use std::path::{Path, PathBuf};

use artemis_core::error::AppError;
use artemis_core::models::{DataProvider, ProcessedObservation};
use artemis_core::traits::ExportSink;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON document per line to `<dir>/<provider identifier>.jsonl`.
///
/// Windows of the same run append concurrently; a lock keeps each batch's
/// lines contiguous.
#[derive(Debug)]
pub struct JsonlExportSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export file for a provider.
    pub fn path_for(&self, provider: &DataProvider) -> PathBuf {
        self.dir.join(format!("{}.jsonl", provider.identifier))
    }

    fn encode(records: &[ProcessedObservation]) -> Result<Vec<u8>, AppError> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

impl ExportSink for JsonlExportSink {
    async fn append_observations(
        &self,
        records: &[ProcessedObservation],
        provider: &DataProvider,
        batch_id: &str,
    ) -> Result<bool, AppError> {
        if records.is_empty() {
            return Ok(false);
        }

        let buf = Self::encode(records)?;
        let path = self.path_for(provider);

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        tracing::debug!(
            provider = %provider,
            batch_id,
            count = records.len(),
            path = %path.display(),
            "Exported observations"
        );
        Ok(true)
    }
}
