/// Export bundle: one self-contained directory per finalized session
///
/// The bundle holds every photo that still exists, the metadata document
/// (with paths rewritten to bundle-relative file names) and any extra
/// files such as the composite. It is staged in a hidden sibling directory
/// and renamed into place, so a half-written bundle is never visible.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SessionError, SessionResult};
use crate::state::metadata::SessionDocument;
use crate::state::status::{self, StatusSink};

use super::store::{write_atomic, SessionStore};

/// What ended up in a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub bundle_dir: PathBuf,
    /// File names copied into the bundle
    pub copied: Vec<String>,
    /// Photo paths that were missing on disk
    pub skipped: Vec<String>,
}

/// Write `Session_<id>_Export/` next to the session files
pub fn export_bundle(
    store: &SessionStore,
    document: &SessionDocument,
    extra_files: &[PathBuf],
    sink: &dyn StatusSink,
) -> SessionResult<ExportReport> {
    let session_id = document
        .session_id()
        .ok_or_else(|| SessionError::MalformedMetadata("document contains no records".to_string()))?;

    let bundle_dir = store.export_dir(session_id);
    let staging = staging_dir(&bundle_dir);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    match fill_bundle(&staging, document, extra_files, sink) {
        Ok((copied, skipped)) => {
            if bundle_dir.exists() {
                fs::remove_dir_all(&bundle_dir)?;
            }
            fs::rename(&staging, &bundle_dir)?;

            status::info(
                sink,
                format!("📦 Exported {} files to {}", copied.len(), bundle_dir.display()),
            );
            Ok(ExportReport {
                bundle_dir,
                copied,
                skipped,
            })
        }
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            Err(e)
        }
    }
}

fn fill_bundle(
    staging: &Path,
    document: &SessionDocument,
    extra_files: &[PathBuf],
    sink: &dyn StatusSink,
) -> SessionResult<(Vec<String>, Vec<String>)> {
    let mut copied = Vec::new();
    let mut skipped = Vec::new();
    let mut bundled = document.clone();

    for entry in bundled.items.iter_mut() {
        let source = PathBuf::from(&entry.path);
        if !source.is_file() {
            status::warn(sink, format!("⚠️  Photo missing, not exported: {}", entry.path));
            skipped.push(entry.path.clone());
            continue;
        }

        let name = file_name_of(&source);
        fs::copy(&source, staging.join(&name))?;
        entry.path = name.clone();
        copied.push(name);
    }

    for extra in extra_files {
        if !extra.is_file() {
            tracing::debug!("extra export file not present: {}", extra.display());
            continue;
        }
        let name = file_name_of(extra);
        fs::copy(extra, staging.join(&name))?;
        copied.push(name);
    }

    if let Some(session_id) = document.session_id() {
        let name = SessionDocument::file_name(session_id);
        write_atomic(&staging.join(&name), bundled.to_json()?.as_bytes())?;
        copied.push(name);
    }

    Ok((copied, skipped))
}

fn staging_dir(bundle_dir: &Path) -> PathBuf {
    let name = bundle_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    bundle_dir.with_file_name(format!(".{}.tmp", name))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::PhotoRecord;
    use crate::state::metadata::RecordEntry;
    use crate::state::status::StatusLog;
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use uuid::Uuid;

    fn saved_entry(store: &SessionStore, session_id: Uuid, slot: usize) -> RecordEntry {
        let mut record = PhotoRecord::new(Uuid::new_v4(), session_id, Utc::now(), slot)
            .with_pixels(RgbImage::from_pixel(8, 8, Rgb([slot as u8, 0, 0])));
        let path = store.save_photo(&mut record).unwrap();
        RecordEntry::from_record(&record, path.to_string_lossy().to_string())
    }

    #[test]
    fn test_bundle_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let session_id = Uuid::new_v4();

        let document = SessionDocument {
            items: (0..3).map(|i| saved_entry(&store, session_id, i)).collect(),
        };
        let composite = store.composite_path(session_id);
        store
            .write_image(&composite, &RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])))
            .unwrap();

        let log = StatusLog::new();
        let report = export_bundle(&store, &document, &[composite], &log).unwrap();

        assert_eq!(report.bundle_dir, store.export_dir(session_id));
        assert_eq!(report.copied.len(), 5);
        assert!(report.skipped.is_empty());
        assert!(log.warnings().is_empty());

        let bundled = SessionStore::load_document(
            &report.bundle_dir.join(SessionDocument::file_name(session_id)),
        )
        .unwrap();
        assert!(bundled.items.iter().all(|item| !item.path.contains('/')));
        assert!(report.bundle_dir.join(format!("Stitched_{}.png", session_id)).is_file());
        assert!(!staging_dir(&report.bundle_dir).exists());
    }

    #[test]
    fn test_missing_photo_is_skipped_once() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let session_id = Uuid::new_v4();

        let items: Vec<RecordEntry> = (0..2).map(|i| saved_entry(&store, session_id, i)).collect();
        fs::remove_file(&items[1].path).unwrap();

        let log = StatusLog::new();
        let report = export_bundle(&store, &SessionDocument { items }, &[], &log).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(log.warnings().len(), 1);
        // One photo plus the document
        assert_eq!(report.copied.len(), 2);
    }

    #[test]
    fn test_reexport_replaces_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let session_id = Uuid::new_v4();
        let document = SessionDocument {
            items: vec![saved_entry(&store, session_id, 0)],
        };

        let log = StatusLog::new();
        let first = export_bundle(&store, &document, &[], &log).unwrap();
        fs::write(first.bundle_dir.join("stale.txt"), "old").unwrap();

        let second = export_bundle(&store, &document, &[], &log).unwrap();
        assert!(!second.bundle_dir.join("stale.txt").exists());
    }
}
