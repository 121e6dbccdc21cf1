/// Session state module
///
/// This module handles everything the capture side owns:
/// - Photo records and device poses (data.rs)
/// - The persisted metadata document (metadata.rs)
/// - Status events for whoever drives a session (status.rs)
/// - Capture guides and live pose status (guides.rs)
/// - The capture session state machine (session.rs)

pub mod data;
pub mod metadata;
pub mod status;
pub mod guides;
pub mod session;
