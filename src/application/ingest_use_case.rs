// ============================================================
// Layer 2 — Stage 1: Data Ingestion
// ============================================================
//   Step 1: Resolve the drive file id from the source URL
//           (fails here, before any network call, if malformed)
//   Step 2: Download the archive to local_data_file
//   Step 3: Unpack it into unzip_dir
//
// Re-running overwrites both the archive and the extracted
// tree.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::DataIngestionConfig;
use crate::infra::{archive::extract_zip, downloader::DriveDownloader, files::get_size};

pub struct DataIngestionUseCase {
    config:     DataIngestionConfig,
    downloader: Option<DriveDownloader>,
}

impl DataIngestionUseCase {
    pub fn new(config: DataIngestionConfig) -> Self {
        Self { config, downloader: None }
    }

    /// Use a specific downloader instead of the Drive default.
    pub fn with_downloader(mut self, downloader: DriveDownloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn execute(&self) -> Result<()> {
        self.download_file()?;
        self.extract_zip_file()?;
        Ok(())
    }

    pub fn download_file(&self) -> Result<PathBuf> {
        let cfg     = &self.config;
        let file_id = cfg.file_id()?;

        let path = match &self.downloader {
            Some(d) => d.download(file_id, &cfg.local_data_file)?,
            None    => DriveDownloader::new()?.download(file_id, &cfg.local_data_file)?,
        };
        tracing::info!(
            "Downloaded {} → {} ({})",
            cfg.source_url,
            path.display(),
            get_size(&path)
        );
        Ok(path)
    }

    pub fn extract_zip_file(&self) -> Result<usize> {
        let cfg = &self.config;
        let entries = extract_zip(&cfg.local_data_file, &cfg.unzip_dir).with_context(|| {
            format!("Stage 1 could not unpack '{}'", cfg.local_data_file.display())
        })?;
        tracing::info!(
            "Extracted {} entries from {} into {}",
            entries,
            cfg.local_data_file.display(),
            cfg.unzip_dir.display()
        );
        Ok(entries)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::io::Write;
    use std::path::Path;

    fn config(root: &Path, url: &str) -> DataIngestionConfig {
        DataIngestionConfig {
            root_dir:        root.to_path_buf(),
            source_url:      url.to_string(),
            local_data_file: root.join("data.zip"),
            unzip_dir:       root.to_path_buf(),
        }
    }

    #[test]
    fn test_malformed_url_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        // an unroutable prefix: reaching the network would error differently
        let downloader = DriveDownloader::with_prefix("http://127.0.0.1:9/?id=").unwrap();
        let err = DataIngestionUseCase::new(config(dir.path(), "no-slashes"))
            .with_downloader(downloader)
            .download_file()
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Download(_))));
        assert!(err.to_string().contains("no file id"));
    }

    #[test]
    fn test_extracts_downloaded_archive() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "https://drive.google.com/file/d/xyz/view");

        let file = std::fs::File::create(&cfg.local_data_file).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("ct_scans/Test_Set/normal/a.png", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"png").unwrap();
        zip.finish().unwrap();

        let n = DataIngestionUseCase::new(cfg).extract_zip_file().unwrap();
        assert_eq!(n, 1);
        assert!(dir.path().join("ct_scans/Test_Set/normal/a.png").is_file());
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "https://drive.google.com/file/d/xyz/view");
        std::fs::write(&cfg.local_data_file, b"garbage").unwrap();

        let err = DataIngestionUseCase::new(cfg).extract_zip_file().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Extraction { .. })
        ));
    }
}
