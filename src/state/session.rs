/// Capture session state machine
///
/// A session accumulates up to eight photos with their poses, then hands
/// the whole set to the stitching engine exactly once. Finalize runs in two
/// phases: `prepare_finalize` drains the records and computes the composite,
/// `commit_finalize` persists everything and resets the session. A failure
/// in either phase puts the records back so the caller can retry.

use chrono::Utc;
use image::RgbImage;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{PlacementMode, SessionConfig, SESSION_CAPACITY};
use crate::error::{SessionError, SessionResult, StitchError};
use crate::stitch::engine::{Composite, StitchingEngine};
use crate::stitch::rotate::rotate_quarter_cw;
use crate::storage::export::{export_bundle, ExportReport};
use crate::storage::store::SessionStore;

use super::data::{normalized, relative_orientation, Orientation, PhotoRecord, PoseSample};
use super::guides::{right_strip, top_strip, EdgeGuides, PoseStatus};
use super::metadata::{RecordEntry, SessionDocument};
use super::status::{self, StatusSink};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionStatus {
    Empty,
    Accumulating,
    ReadyToFinalize,
    Finalizing,
    Finalized,
}

/// Output of the first finalize phase, consumed by `commit_finalize`
#[derive(Debug)]
pub struct PreparedFinalize {
    session_id: Uuid,
    /// Records that went into the composite
    stitched: Vec<PhotoRecord>,
    /// Records whose photo file was gone
    missing: Vec<PhotoRecord>,
    composite: Composite,
    preview: Option<RgbImage>,
}

impl PreparedFinalize {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn composite(&self) -> &Composite {
        &self.composite
    }

    pub fn stitched_count(&self) -> usize {
        self.stitched.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.missing.len()
    }
}

/// Everything a finalize produced
#[derive(Debug)]
pub struct CompositeResult {
    pub session_id: Uuid,
    pub composite: Composite,
    pub preview: Option<RgbImage>,
    pub document: SessionDocument,
    pub document_path: PathBuf,
    pub composite_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub export: Option<ExportReport>,
}

pub struct CaptureSession {
    config: SessionConfig,
    engine: StitchingEngine,
    session_id: Uuid,
    records: Vec<PhotoRecord>,
    /// Orientation and position of the first capture
    reference: Option<(Orientation, cgmath::Vector3<f64>)>,
    status: SessionStatus,
    resumed: bool,
    /// Id of the generation finalized last, cleared by the next capture or `begin_session`
    finalized: Option<Uuid>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig) -> Self {
        let engine = StitchingEngine::new(config.stitch.clone());
        Self {
            config,
            engine,
            session_id: Uuid::new_v4(),
            records: Vec::with_capacity(SESSION_CAPACITY),
            reference: None,
            status: SessionStatus::Empty,
            resumed: false,
            finalized: None,
        }
    }

    /// Start a fresh session; only allowed while nothing is pending
    pub fn begin_session(&mut self) -> SessionResult<Uuid> {
        if self.status != SessionStatus::Empty {
            return Err(SessionError::SessionActive(self.session_id));
        }
        self.reset();
        self.finalized = None;
        tracing::debug!(session_id = %self.session_id, "session started");
        Ok(self.session_id)
    }

    /// Record one photo with the pose it was taken at
    ///
    /// The first capture fixes the session's reference orientation and
    /// position; every record stores its pose relative to that reference.
    pub fn capture(
        &mut self,
        image: RgbImage,
        pose: PoseSample,
        sink: &dyn StatusSink,
    ) -> SessionResult<&PhotoRecord> {
        if self.status == SessionStatus::Finalizing {
            return Err(SessionError::FinalizeInProgress(self.session_id));
        }
        if self.resumed {
            return Err(SessionError::Resumed(self.session_id));
        }
        if self.records.len() >= SESSION_CAPACITY {
            status::warn(sink, "⚠️  Session is full, finalize before capturing again");
            return Err(SessionError::SessionFull {
                capacity: SESSION_CAPACITY,
            });
        }

        let image = if self.config.rotate_frames_cw {
            rotate_quarter_cw(&image)
        } else {
            image
        };
        let slot = self.records.len();
        if image.width() == 0 || image.height() == 0 {
            return Err(StitchError::EmptyImage {
                index: slot,
                width: image.width(),
                height: image.height(),
            }
            .into());
        }

        let (reference, origin) = *self
            .reference
            .get_or_insert((normalized(pose.orientation), pose.position));

        let record = PhotoRecord::new(Uuid::new_v4(), self.session_id, Utc::now(), slot)
            .with_pixels(image)
            .with_pose(
                pose.orientation,
                relative_orientation(reference, pose.orientation),
                pose.position - origin,
                pose.geo,
            );
        self.records.push(record);
        self.finalized = None;

        let count = self.records.len();
        status::info(sink, format!("📸 Captured photo {}/{}", count, SESSION_CAPACITY));
        if count == SESSION_CAPACITY {
            self.status = SessionStatus::ReadyToFinalize;
            status::info(sink, "✅ All photos captured, ready to stitch");
        } else {
            self.status = SessionStatus::Accumulating;
        }

        Ok(&self.records[slot])
    }

    /// Full set captured and finalize not started yet
    pub fn is_ready_to_finalize(&self) -> bool {
        self.records.len() == SESSION_CAPACITY && self.status <= SessionStatus::ReadyToFinalize
    }

    /// Live tracking state for a pose that has not been captured
    pub fn pose_status(&self, sample: &PoseSample) -> PoseStatus {
        PoseStatus::evaluate(self.reference, sample, self.config.stationary_threshold)
    }

    /// Neighbours of the slot the next capture will fill
    pub fn edge_guides(&self) -> EdgeGuides {
        if self.records.len() >= SESSION_CAPACITY {
            return EdgeGuides::default();
        }
        EdgeGuides::for_slot(self.records.len())
    }

    /// Guide strips for the next capture: (left edge, bottom edge)
    pub fn guide_strips(&self) -> SessionResult<(Option<RgbImage>, Option<RgbImage>)> {
        let guides = self.edge_guides();
        let fraction = self.config.edge_guide_fraction;

        let left = match guides.left.and_then(|slot| self.records.get(slot)) {
            Some(record) => record.load_pixels()?.map(|p| right_strip(&p, fraction)),
            None => None,
        };
        let below = match guides.below.and_then(|slot| self.records.get(slot)) {
            Some(record) => record.load_pixels()?.map(|p| top_strip(&p, fraction)),
            None => None,
        };

        Ok((left, below))
    }

    /// Rebuild a session from a persisted metadata document
    ///
    /// The stored relative orientations are trusted; no reference is
    /// re-derived. The session is immediately ready to finalize, with
    /// however many records the document holds.
    pub fn resume_from_metadata(document: SessionDocument, config: SessionConfig) -> SessionResult<Self> {
        if document.items.is_empty() {
            return Err(SessionError::MalformedMetadata(
                "document contains no records".to_string(),
            ));
        }
        if document.items.len() > SESSION_CAPACITY {
            return Err(SessionError::MalformedMetadata(format!(
                "document holds {} records, a session has at most {}",
                document.items.len(),
                SESSION_CAPACITY
            )));
        }

        let mut session = Self::new(config);
        if let Some(id) = document.session_id() {
            session.session_id = id;
        }
        if document.items.iter().any(|item| item.session_id != session.session_id) {
            tracing::warn!(session_id = %session.session_id, "document mixes records from several sessions");
        }

        session.records = document
            .items
            .iter()
            .enumerate()
            .map(|(slot, item)| item.to_record(slot))
            .collect();
        session.status = SessionStatus::ReadyToFinalize;
        session.resumed = true;

        tracing::info!(
            "🔁 Resumed session {} with {} photos",
            session.session_id,
            session.records.len()
        );
        Ok(session)
    }

    /// Load a metadata document from disk and resume it
    pub fn resume_from_file(path: &Path, config: SessionConfig) -> SessionResult<Self> {
        let document = SessionStore::load_document(path)?;
        Self::resume_from_metadata(document, config)
    }

    /// First finalize phase: take the records and compute the composite
    ///
    /// Records whose photo file no longer exists are skipped with one
    /// warning each. On error the session is left as it was.
    pub fn prepare_finalize(&mut self, sink: &dyn StatusSink) -> SessionResult<PreparedFinalize> {
        match self.status {
            SessionStatus::Finalizing | SessionStatus::Finalized => {
                return Err(SessionError::AlreadyFinalized(self.session_id));
            }
            SessionStatus::Empty => {
                if let Some(id) = self.finalized {
                    return Err(SessionError::AlreadyFinalized(id));
                }
                return Err(self.not_ready());
            }
            SessionStatus::Accumulating => return Err(self.not_ready()),
            SessionStatus::ReadyToFinalize => {}
        }

        self.status = SessionStatus::Finalizing;
        status::info(sink, format!("🧵 Stitching session {}...", self.session_id));

        let records = std::mem::take(&mut self.records);
        match self.stitch_records(records, sink) {
            Ok(prepared) => Ok(prepared),
            Err((records, e)) => {
                self.restore(records);
                Err(e)
            }
        }
    }

    fn stitch_records(
        &self,
        records: Vec<PhotoRecord>,
        sink: &dyn StatusSink,
    ) -> Result<PreparedFinalize, (Vec<PhotoRecord>, SessionError)> {
        let (stitched, missing): (Vec<PhotoRecord>, Vec<PhotoRecord>) =
            records.into_iter().partition(|r| {
                r.pixels.is_some() || r.storage_path.as_deref().is_some_and(Path::is_file)
            });

        for record in &missing {
            let path = record
                .storage_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| record.file_name());
            status::warn(sink, format!("⚠️  Photo not found, skipping: {}", path));
        }

        let outcome = self.compute(&stitched, sink);
        match outcome {
            Ok((composite, preview)) => Ok(PreparedFinalize {
                session_id: self.session_id,
                stitched,
                missing,
                composite,
                preview,
            }),
            Err(e) => {
                let mut records = stitched;
                records.extend(missing);
                Err((records, e))
            }
        }
    }

    fn compute(
        &self,
        stitched: &[PhotoRecord],
        sink: &dyn StatusSink,
    ) -> SessionResult<(Composite, Option<RgbImage>)> {
        let mut photos = Vec::with_capacity(stitched.len());
        for record in stitched {
            let pixels = record.load_pixels()?.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("photo {} disappeared while stitching", record.photo_id),
                )
            })?;
            photos.push(pixels);
        }

        let composite = self.engine.stitch(&photos, stitched, sink)?;
        let preview = if self.config.stitch.mode == PlacementMode::Position && self.config.stitch.grid_preview {
            Some(self.engine.grid_collage(&photos)?)
        } else {
            None
        };
        Ok((composite, preview))
    }

    /// Second finalize phase: persist outputs and reset to a new session
    pub fn commit_finalize(
        &mut self,
        prepared: PreparedFinalize,
        store: &SessionStore,
        sink: &dyn StatusSink,
    ) -> SessionResult<CompositeResult> {
        if self.status != SessionStatus::Finalizing || prepared.session_id != self.session_id {
            return Err(SessionError::AlreadyFinalized(prepared.session_id));
        }

        let PreparedFinalize {
            session_id,
            mut stitched,
            missing,
            composite,
            preview,
        } = prepared;

        match self.persist(session_id, &mut stitched, &missing, &composite, preview.as_ref(), store, sink) {
            Ok((document, document_path, composite_path, preview_path, export)) => {
                self.status = SessionStatus::Finalized;
                status::info(sink, format!("🎉 Session {} finalized", session_id));

                self.reset();
                self.finalized = Some(session_id);

                Ok(CompositeResult {
                    session_id,
                    composite,
                    preview,
                    document,
                    document_path,
                    composite_path,
                    preview_path,
                    export,
                })
            }
            Err(e) => {
                stitched.extend(missing);
                self.restore(stitched);
                Err(e)
            }
        }
    }

    /// Write photos, document, composite and export bundle
    ///
    /// The session document keeps the entries of missing photos so a later
    /// resume still sees them; the export bundle only lists what was stitched.
    #[allow(clippy::type_complexity, clippy::too_many_arguments)]
    fn persist(
        &self,
        session_id: Uuid,
        stitched: &mut [PhotoRecord],
        missing: &[PhotoRecord],
        composite: &Composite,
        preview: Option<&RgbImage>,
        store: &SessionStore,
        sink: &dyn StatusSink,
    ) -> SessionResult<(SessionDocument, PathBuf, PathBuf, Option<PathBuf>, Option<ExportReport>)> {
        let mut slotted = Vec::with_capacity(stitched.len() + missing.len());
        for record in stitched.iter_mut() {
            let path = store.save_photo(record)?.to_string_lossy().to_string();
            slotted.push((record.grid_slot, RecordEntry::from_record(record, path)));
        }
        let exported = SessionDocument {
            items: slotted.iter().map(|(_, entry)| entry.clone()).collect(),
        };

        for record in missing {
            let path = record
                .storage_path
                .as_deref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| record.file_name());
            slotted.push((record.grid_slot, RecordEntry::from_record(record, path)));
        }
        slotted.sort_by_key(|(slot, _)| *slot);
        let document = SessionDocument {
            items: slotted.into_iter().map(|(_, entry)| entry).collect(),
        };
        let document_path = store.write_document(session_id, &document)?;

        let composite_path = store.composite_path(session_id);
        store.write_image(&composite_path, &composite.image)?;

        let preview_path = match preview {
            Some(image) => {
                let path = store.preview_path(session_id);
                store.write_image(&path, image)?;
                Some(path)
            }
            None => None,
        };

        let export = if self.config.export_on_finalize {
            let mut extras = vec![composite_path.clone()];
            extras.extend(preview_path.clone());
            Some(export_bundle(store, &exported, &extras, sink)?)
        } else {
            None
        };

        Ok((document, document_path, composite_path, preview_path, export))
    }

    /// Give a prepared finalize back without persisting anything
    pub fn abort_finalize(&mut self, prepared: PreparedFinalize) {
        if prepared.session_id != self.session_id || self.status != SessionStatus::Finalizing {
            tracing::debug!(session_id = %prepared.session_id, "ignoring stale finalize");
            return;
        }
        let mut records = prepared.stitched;
        records.extend(prepared.missing);
        self.restore(records);
    }

    /// Both finalize phases back to back
    pub fn finalize(&mut self, store: &SessionStore, sink: &dyn StatusSink) -> SessionResult<CompositeResult> {
        let prepared = self.prepare_finalize(sink)?;
        self.commit_finalize(prepared, store, sink)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn records(&self) -> &[PhotoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn reference_orientation(&self) -> Option<Orientation> {
        self.reference.map(|(orientation, _)| orientation)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn not_ready(&self) -> SessionError {
        SessionError::NotReady {
            count: self.records.len(),
            capacity: SESSION_CAPACITY,
        }
    }

    fn restore(&mut self, mut records: Vec<PhotoRecord>) {
        records.sort_by_key(|r| r.grid_slot);
        self.records = records;
        self.status = SessionStatus::ReadyToFinalize;
    }

    fn reset(&mut self) {
        self.session_id = Uuid::new_v4();
        self.records.clear();
        self.reference = None;
        self.status = SessionStatus::Empty;
        self.resumed = false;
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// Implement Debug without dumping pixel buffers
impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("session_id", &self.session_id)
            .field("status", &self.status)
            .field("records", &self.records.len())
            .field("resumed", &self.resumed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StitchConfig;
    use crate::state::data::identity;
    use crate::state::status::StatusLog;
    use crate::stitch::compositor::solid;
    use cgmath::{Deg, InnerSpace, Quaternion, Rotation3, Vector3};

    fn grid_config() -> SessionConfig {
        SessionConfig {
            stitch: StitchConfig {
                mode: PlacementMode::Grid,
                refine_adjacency: false,
                grid_preview: false,
                ..StitchConfig::default()
            },
            ..SessionConfig::default()
        }
    }

    fn fill(session: &mut CaptureSession, count: usize, log: &StatusLog) {
        for i in 0..count {
            let pose = PoseSample::from_orientation(identity()).with_position(Vector3::new(i as f64 * 0.01, 0.0, 0.0));
            session
                .capture(solid(10, 10, [i as u8 * 20, 0, 0]), pose, log)
                .unwrap();
        }
    }

    fn close(a: Quaternion<f64>, b: Quaternion<f64>) -> bool {
        // q and -q describe the same rotation
        (a - b).magnitude() < 1e-9 || (a + b).magnitude() < 1e-9
    }

    #[test]
    fn test_ninth_capture_is_rejected() {
        let log = StatusLog::new();
        let mut session = CaptureSession::new(grid_config());
        fill(&mut session, 8, &log);
        assert_eq!(session.status(), SessionStatus::ReadyToFinalize);
        assert!(session.is_ready_to_finalize());

        let err = session
            .capture(solid(10, 10, [0, 0, 0]), PoseSample::default(), &log)
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionFull { capacity: 8 }));
        assert_eq!(session.len(), 8);
    }

    #[test]
    fn test_reference_is_set_once() {
        let log = StatusLog::new();
        let mut session = CaptureSession::default();

        let first = Quaternion::from_angle_y(Deg(30.0));
        let second = Quaternion::from_angle_y(Deg(45.0));
        let pose = PoseSample::from_orientation(first).with_position(Vector3::new(1.0, 2.0, 3.0));
        let record = session.capture(solid(8, 8, [1, 1, 1]), pose, &log).unwrap();
        assert!(close(record.orientation_relative(), identity()));
        assert_eq!(record.position_relative, Vector3::new(0.0, 0.0, 0.0));

        let pose = PoseSample::from_orientation(second).with_position(Vector3::new(1.5, 2.0, 3.0));
        let record = session.capture(solid(8, 8, [1, 1, 1]), pose, &log).unwrap();
        assert!(close(record.orientation_relative(), Quaternion::from_angle_y(Deg(15.0))));
        assert_eq!(record.position_relative, Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(record.grid_slot, 1);

        assert!(close(session.reference_orientation().unwrap(), first));
    }

    #[test]
    fn test_begin_session_only_from_empty() {
        let log = StatusLog::new();
        let mut session = CaptureSession::default();
        let before = session.session_id();
        let id = session.begin_session().unwrap();
        assert_ne!(id, before);

        fill(&mut session, 1, &log);
        assert!(matches!(session.begin_session(), Err(SessionError::SessionActive(_))));
    }

    #[test]
    fn test_finalize_before_full_is_refused() {
        let log = StatusLog::new();
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut session = CaptureSession::new(grid_config());
        fill(&mut session, 3, &log);

        let err = session.finalize(&store, &log).unwrap_err();
        assert!(matches!(err, SessionError::NotReady { count: 3, capacity: 8 }));
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn test_second_finalize_is_rejected() {
        let log = StatusLog::new();
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut session = CaptureSession::new(grid_config());
        fill(&mut session, 8, &log);
        let first_id = session.session_id();

        let result = session.finalize(&store, &log).unwrap();
        assert_eq!(result.session_id, first_id);
        assert_eq!(result.composite.image.dimensions(), (40, 20));
        assert!(result.document_path.is_file());
        assert!(result.export.as_ref().unwrap().bundle_dir.is_dir());

        // Reset to a new, empty generation
        assert_eq!(session.status(), SessionStatus::Empty);
        assert_ne!(session.session_id(), first_id);
        assert!(session.is_empty());

        let before = std::fs::read(&result.composite_path).unwrap();
        let err = session.finalize(&store, &log).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyFinalized(id) if id == first_id));
        assert_eq!(std::fs::read(&result.composite_path).unwrap(), before);
    }

    #[test]
    fn test_begin_session_clears_finalize_latch() {
        let log = StatusLog::new();
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut session = CaptureSession::new(grid_config());
        fill(&mut session, 8, &log);
        session.finalize(&store, &log).unwrap();

        let fresh = session.begin_session().unwrap();
        assert_eq!(session.session_id(), fresh);
        let err = session.finalize(&store, &log).unwrap_err();
        assert!(matches!(err, SessionError::NotReady { count: 0, capacity: 8 }));
    }

    #[test]
    fn test_capture_while_finalizing() {
        let log = StatusLog::new();
        let mut session = CaptureSession::new(grid_config());
        fill(&mut session, 8, &log);

        let prepared = session.prepare_finalize(&log).unwrap();
        assert_eq!(prepared.stitched_count(), 8);
        assert!(!session.is_ready_to_finalize());
        assert!(matches!(
            session.capture(solid(10, 10, [0, 0, 0]), PoseSample::default(), &log),
            Err(SessionError::FinalizeInProgress(_))
        ));
        assert!(matches!(
            session.prepare_finalize(&log),
            Err(SessionError::AlreadyFinalized(_))
        ));

        session.abort_finalize(prepared);
        assert_eq!(session.status(), SessionStatus::ReadyToFinalize);
        assert_eq!(session.len(), 8);
        assert!(session.records().iter().enumerate().all(|(i, r)| r.grid_slot == i));
    }

    fn persisted_document(store: &SessionStore, count: usize) -> SessionDocument {
        let session_id = Uuid::new_v4();
        let items = (0..count)
            .map(|slot| {
                let mut record = PhotoRecord::new(Uuid::new_v4(), session_id, Utc::now(), slot)
                    .with_pixels(solid(10, 10, [slot as u8 * 30, 100, 0]));
                let path = store.save_photo(&mut record).unwrap();
                RecordEntry::from_record(&record, path.to_string_lossy().to_string())
            })
            .collect();
        SessionDocument { items }
    }

    #[test]
    fn test_resume_skips_missing_photo() {
        let log = StatusLog::new();
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();

        let document = persisted_document(&store, 6);
        let missing_path = document.items[2].path.clone();
        std::fs::remove_file(&missing_path).unwrap();

        let mut session = CaptureSession::resume_from_metadata(document, grid_config()).unwrap();
        assert_eq!(session.status(), SessionStatus::ReadyToFinalize);
        assert!(session.is_resumed());

        let result = session.finalize(&store, &log).unwrap();
        assert_eq!(result.composite.placements.len(), 5);
        assert_eq!(result.composite.image.dimensions(), (40, 20));
        assert_eq!(log.warnings().len(), 1);

        // The rewritten session document still lists the missing photo
        assert_eq!(result.document.items.len(), 6);
        let reread = SessionStore::load_document(&result.document_path).unwrap();
        assert_eq!(reread.items.len(), 6);
        assert_eq!(reread.items[2].path, missing_path);

        // The bundle only describes what was stitched
        let export = result.export.unwrap();
        assert!(export.skipped.is_empty());
        let bundled_path = export.bundle_dir.join(result.document_path.file_name().unwrap());
        let bundled = SessionStore::load_document(&bundled_path).unwrap();
        assert_eq!(bundled.items.len(), 5);
    }

    #[test]
    fn test_resume_trusts_stored_orientation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut document = persisted_document(&store, 2);

        let stored: Quaternion<f64> = Quaternion::from_angle_z(Deg(10.0));
        let raw: Quaternion<f64> = Quaternion::from_angle_x(Deg(80.0));
        document.items[1].orientation = raw.into();
        document.items[1].orientation_relative = stored.into();

        let session = CaptureSession::resume_from_metadata(document, grid_config()).unwrap();
        assert!(session.reference_orientation().is_none());
        assert!(close(session.records()[1].orientation_relative(), stored));
        assert!((session.records()[1].roll_degrees() - 10.0).abs() < 1e-6);
        assert_eq!(session.pose_status(&PoseSample::default()), PoseStatus::Waiting);

        let mut session = session;
        assert!(matches!(
            session.capture(solid(10, 10, [0, 0, 0]), PoseSample::default(), &StatusLog::new()),
            Err(SessionError::Resumed(_))
        ));
    }

    #[test]
    fn test_resume_rejects_bad_documents() {
        let empty = SessionDocument::default();
        assert!(matches!(
            CaptureSession::resume_from_metadata(empty, SessionConfig::default()),
            Err(SessionError::MalformedMetadata(_))
        ));

        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let too_many = persisted_document(&store, 9);
        assert!(matches!(
            CaptureSession::resume_from_metadata(too_many, SessionConfig::default()),
            Err(SessionError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_guides_for_next_slot() {
        let log = StatusLog::new();
        let mut session = CaptureSession::new(grid_config());
        assert!(session.edge_guides().is_empty());

        fill(&mut session, 5, &log);
        let guides = session.edge_guides();
        assert_eq!(guides, EdgeGuides { left: Some(4), below: Some(1) });

        let (left, below) = session.guide_strips().unwrap();
        assert_eq!(left.unwrap().dimensions(), (1, 10));
        assert_eq!(below.unwrap().get_pixel(0, 0).0, [20, 0, 0]);
    }

    #[test]
    fn test_frames_rotated_on_capture() {
        let log = StatusLog::new();
        let mut session = CaptureSession::new(SessionConfig {
            rotate_frames_cw: true,
            ..grid_config()
        });
        let record = session
            .capture(solid(20, 10, [5, 5, 5]), PoseSample::default(), &log)
            .unwrap();
        assert_eq!((record.width, record.height), (10, 20));
    }

    #[test]
    fn test_position_mode_writes_preview() {
        let log = StatusLog::new();
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path()).unwrap();
        let mut session = CaptureSession::new(SessionConfig {
            export_on_finalize: false,
            stitch: StitchConfig {
                refine_adjacency: false,
                ..StitchConfig::default()
            },
            ..SessionConfig::default()
        });
        fill(&mut session, 8, &log);

        let result = session.finalize(&store, &log).unwrap();
        assert!(result.export.is_none());
        let preview_path = result.preview_path.unwrap();
        assert_eq!(preview_path, store.preview_path(result.session_id));
        assert!(preview_path.is_file());
        assert_eq!(result.preview.unwrap().dimensions(), (40, 20));
    }
}
