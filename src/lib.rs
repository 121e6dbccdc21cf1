//! Capture a 4x2 grid of photos with their device poses and stitch them
//! into one composite image.

pub mod config;
pub mod error;
pub mod state;
pub mod stitch;
pub mod storage;

pub use config::{PlacementMode, SessionConfig, StitchConfig};
pub use error::{SessionError, SessionResult, StitchError, StitchResult};
pub use state::data::{PhotoRecord, PoseSample};
pub use state::metadata::SessionDocument;
pub use state::session::{CaptureSession, CompositeResult, SessionStatus};
pub use state::status::{StatusLog, StatusSink, TracingSink};
pub use stitch::engine::{Composite, StitchingEngine};
pub use storage::store::SessionStore;
