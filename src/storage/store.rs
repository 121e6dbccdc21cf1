use image::{ImageFormat, RgbImage};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{SessionError, SessionResult};
use crate::state::data::PhotoRecord;
use crate::state::metadata::SessionDocument;

/// The SessionStore owns the directory where sessions are persisted.
/// It stores captured photos, metadata documents, composites and export bundles.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> SessionResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!("📁 Session store at: {}", root.display());
        Ok(Self { root })
    }

    /// Open the store in the user's data directory:
    /// - Linux: ~/.local/share/mini-stitch/sessions
    /// - macOS: ~/Library/Application Support/mini-stitch/sessions
    /// - Windows: %APPDATA%\mini-stitch\sessions
    pub fn open_default() -> SessionResult<Self> {
        Self::open(Self::default_root()?)
    }

    /// Get the path where sessions should be stored
    pub fn default_root() -> SessionResult<PathBuf> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no user data directory"))?;

        path.push("mini-stitch");
        path.push("sessions");
        Ok(path)
    }

    /// Get the root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn photo_path(&self, record: &PhotoRecord) -> PathBuf {
        self.root.join(record.file_name())
    }

    pub fn document_path(&self, session_id: Uuid) -> PathBuf {
        self.root.join(SessionDocument::file_name(session_id))
    }

    pub fn composite_path(&self, session_id: Uuid) -> PathBuf {
        self.root.join(format!("Stitched_{}.png", session_id))
    }

    pub fn preview_path(&self, session_id: Uuid) -> PathBuf {
        self.root.join(format!("Combined_{}.png", session_id))
    }

    pub fn export_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join(format!("Session_{}_Export", session_id))
    }

    /// Make sure the record's photo exists on disk
    ///
    /// Records whose file is already present are left alone. In-memory
    /// pixels are written as PNG and the record's `storage_path` updated.
    pub fn save_photo(&self, record: &mut PhotoRecord) -> SessionResult<PathBuf> {
        if let Some(path) = &record.storage_path {
            if path.is_file() {
                return Ok(path.clone());
            }
        }

        let pixels = record.pixels.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("photo {} has neither pixels nor a file", record.photo_id),
            )
        })?;

        let path = self.photo_path(record);
        write_png(&path, pixels)?;
        record.storage_path = Some(path.clone());
        Ok(path)
    }

    /// Write `Session_<id>.json`
    pub fn write_document(&self, session_id: Uuid, document: &SessionDocument) -> SessionResult<PathBuf> {
        let path = self.document_path(session_id);
        write_atomic(&path, document.to_json()?.as_bytes())?;
        tracing::info!("📝 Saved session metadata: {}", path.display());
        Ok(path)
    }

    /// Read a metadata document from disk
    pub fn load_document(path: &Path) -> SessionResult<SessionDocument> {
        let text = fs::read_to_string(path)?;
        SessionDocument::from_json(&text)
    }

    /// Write an image as PNG, replacing any previous file
    pub fn write_image(&self, path: &Path, image: &RgbImage) -> SessionResult<()> {
        write_png(path, image)?;
        tracing::info!("🖼️  Saved image: {}", path.display());
        Ok(())
    }

    /// Most recently modified `Session_*.json` directly under the root
    pub fn latest_document(&self) -> SessionResult<Option<PathBuf>> {
        let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !is_session_document(path) {
                continue;
            }

            let modified = entry.metadata().map_err(io::Error::from)?.modified()?;
            let newer = match &latest {
                None => true,
                Some((best, best_path)) => {
                    modified > *best || (modified == *best && path > best_path.as_path())
                }
            };
            if newer {
                latest = Some((modified, path.to_path_buf()));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

fn is_session_document(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("Session_") && name.ends_with(".json")
}

/// Write through a temporary file and rename into place
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = temp_sibling(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)
}

fn write_png(path: &Path, image: &RgbImage) -> SessionResult<()> {
    let tmp_path = temp_sibling(path);
    if let Err(e) = image.save_with_format(&tmp_path, ImageFormat::Png) {
        let _ = fs::remove_file(&tmp_path);
        return Err(SessionError::Image(e));
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

// Implement Debug for better error messages
impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("root", &self.root)
            .finish()
    }
}
