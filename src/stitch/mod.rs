/// Stitching module
///
/// This module turns a session's photos into one composite:
/// - Rotating photos into the first photo's frame (rotate.rs)
/// - Searching the overlap offset between neighbours (overlap.rs)
/// - Laying out and drawing the canvas (compositor.rs)
/// - Running the stages in order (engine.rs)

pub mod rotate;
pub mod overlap;
pub mod compositor;
pub mod engine;
