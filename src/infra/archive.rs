// ============================================================
// Layer 6 — Archive Extraction
// ============================================================
// Unpacks the downloaded dataset zip into `unzip_dir`.
// Existing files are overwritten, so re-running Stage 1 is
// idempotent.
//
// Every entry name is checked before anything is written: an
// absolute path or one that climbs out with `..` fails the
// whole extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};

/// Extract every entry of `archive` into `dest`. Returns the entry count.
pub fn extract_zip(archive: &Path, dest: &Path) -> PipelineResult<usize> {
    let fail = |reason: &dyn std::fmt::Display| PipelineError::extraction(archive, reason);

    let file = File::open(archive).map_err(|e| fail(&e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| fail(&e))?;

    fs::create_dir_all(dest).map_err(|e| fail(&e))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| fail(&e))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| fail(&format!("unsafe entry path '{}'", entry.name())))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| fail(&e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(&e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| fail(&e))?;
        io::copy(&mut entry, &mut out).map_err(|e| fail(&e))?;
    }

    tracing::debug!("Extracted {} entries into {}", zip.len(), dest.display());
    Ok(zip.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extracts_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        write_zip(
            &archive,
            &[
                ("ct/Train_and_Validation_Set/normal/a.png", b"png-a"),
                ("ct/Test_Set/normal/b.png", b"png-b"),
            ],
        );

        let out = dir.path().join("unzipped");
        assert_eq!(extract_zip(&archive, &out).unwrap(), 2);
        assert_eq!(
            fs::read(out.join("ct/Train_and_Validation_Set/normal/a.png")).unwrap(),
            b"png-a"
        );

        // second run overwrites in place
        assert_eq!(extract_zip(&archive, &out).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = extract_zip(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction { .. }));
    }

    #[test]
    fn test_missing_archive_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_zip(&dir.path().join("nope.zip"), dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction { .. }));
    }
}
