/// Error types for the capture session and the stitching engine
///
/// Engine failures (`StitchError`) never carry a partial canvas; the
/// session wraps them together with persistence failures in `SessionError`.

use thiserror::Error;

/// Errors raised by the stitching engine and its stages.
#[derive(Debug, Error)]
pub enum StitchError {
    /// Nothing to stitch.
    #[error("no photos to stitch")]
    NoPhotos,
    /// Photo count and metadata count differ.
    #[error("stitch input mismatch: {photos} photos but {metadata} metadata records")]
    StitchInputMismatch { photos: usize, metadata: usize },
    /// A photo with zero width or height.
    #[error("photo {index} has empty dimensions {width}x{height}")]
    EmptyImage { index: usize, width: u32, height: u32 },
    /// Photos in one stitch must share their pixel dimensions.
    #[error("photo {index} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Canvas would exceed the supported side length.
    #[error("canvas {width}x{height} exceeds the {limit} px limit")]
    CanvasTooLarge { width: u64, height: u64, limit: u64 },
    /// Device position that does not map to a canvas pixel (NaN, infinite or far out of range).
    #[error("photo {index} has an unusable position")]
    InvalidPosition { index: usize },
    /// Compositor was given a different number of placements than photos.
    #[error("{placements} placements for {photos} photos")]
    PlacementMismatch { photos: usize, placements: usize },
}

/// Errors raised by the capture session and the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Capture attempted while all slots are taken. Finalize first.
    #[error("session is full ({capacity} photos)")]
    SessionFull { capacity: usize },
    /// Duplicate finalize trigger for a generation that already ran.
    #[error("session {0} was already finalized")]
    AlreadyFinalized(uuid::Uuid),
    /// `begin_session` called while photos are still pending.
    #[error("session {0} is still active")]
    SessionActive(uuid::Uuid),
    /// Capture attempted between `prepare_finalize` and `commit_finalize`.
    #[error("session {0} is being finalized")]
    FinalizeInProgress(uuid::Uuid),
    /// Capture attempted on a session rebuilt from metadata.
    #[error("session {0} was resumed from metadata and only accepts finalize")]
    Resumed(uuid::Uuid),
    /// Finalize requested before the session holds a full set of photos.
    #[error("session not ready to finalize: {count} of {capacity} photos")]
    NotReady { count: usize, capacity: usize },
    /// Corrupt or empty metadata document.
    #[error("malformed session metadata: {0}")]
    MalformedMetadata(String),
    #[error(transparent)]
    Stitch(#[from] StitchError),
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("image I/O failure: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON failure: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StitchResult<T> = Result<T, StitchError>;
pub type SessionResult<T> = Result<T, SessionError>;
