/// Stitching engine: rotation compensation, overlap refinement, compositing
///
/// Runs synchronously over one session's photos and either returns a full
/// composite or an error, never a partial canvas.

use image::RgbImage;
use std::borrow::Borrow;

use crate::config::{PlacementMode, StitchConfig};
use crate::error::{StitchError, StitchResult};
use crate::state::data::PhotoRecord;
use crate::state::status::{self, StatusSink};

use super::compositor::{self, Layout, Placement};
use super::overlap::{OverlapHint, OverlapMatcher, OverlapPriority};
use super::rotate::{Background, RotationCompensator, RotationDelta};

/// Output of one stitch
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RgbImage,
    pub mode: PlacementMode,
    /// Final top-left corner of every photo, in input order
    pub placements: Vec<Placement>,
    /// Overlap refinement applied to every photo (zero for the first)
    pub offsets: Vec<(i32, i32)>,
}

/// Stitching engine configured once, reusable across sessions
#[derive(Debug, Clone)]
pub struct StitchingEngine {
    config: StitchConfig,
    compensator: RotationCompensator,
    matcher: OverlapMatcher,
}

impl StitchingEngine {
    pub fn new(config: StitchConfig) -> Self {
        let compensator = RotationCompensator::new(config.virtual_fov_degrees);
        let matcher = OverlapMatcher::new(config.search_radius, config.strip);
        Self {
            config,
            compensator,
            matcher,
        }
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Background fill for the configured mode
    pub fn background(&self) -> Background {
        match self.config.mode {
            PlacementMode::Grid => Background::White,
            PlacementMode::Position => Background::Black,
        }
    }

    /// Stitch `photos` described by `records` (same order, same length)
    pub fn stitch<P>(
        &self,
        photos: &[P],
        records: &[PhotoRecord],
        sink: &dyn StatusSink,
    ) -> StitchResult<Composite>
    where
        P: Borrow<RgbImage>,
    {
        let (width, height) = validate(photos, records)?;
        let mode = self.config.mode;
        let background = self.background();

        // Grid cells only need the roll corrected; free placement gets the full 3-D warp
        let corrected: Vec<RgbImage> = photos
            .iter()
            .zip(records)
            .map(|(photo, record)| {
                let delta = match mode {
                    PlacementMode::Grid => RotationDelta::Planar {
                        degrees: -record.roll_degrees(),
                    },
                    PlacementMode::Position => {
                        RotationDelta::Spatial(record.orientation_relative().conjugate())
                    }
                };
                self.compensator.compensate(photo.borrow(), delta, background)
            })
            .collect();

        let layout = match mode {
            PlacementMode::Grid => compositor::grid_layout(corrected.len(), width, height)?,
            PlacementMode::Position => {
                let positions: Vec<_> = records.iter().map(|r| r.position_relative).collect();
                compositor::position_layout(&positions, self.config.position_scale, width, height)?
            }
        };

        let offsets = if self.config.refine_adjacency {
            self.refine(&corrected, records, &layout)
        } else {
            vec![(0, 0); corrected.len()]
        };

        let placements: Vec<Placement> = layout
            .placements
            .iter()
            .zip(&offsets)
            .map(|(p, &(dx, dy))| p.shifted(dx as i64, dy as i64))
            .collect();

        let image = compositor::composite(
            &corrected,
            &placements,
            layout.canvas_width,
            layout.canvas_height,
            background,
        )?;

        status::info(
            sink,
            format!(
                "🧩 Stitched {} photos into {}x{} ({:?} mode)",
                corrected.len(),
                image.width(),
                image.height(),
                mode
            ),
        );

        Ok(Composite {
            image,
            mode,
            placements,
            offsets,
        })
    }

    /// Overlap offset of every photo against the one before it
    fn refine(&self, corrected: &[RgbImage], records: &[PhotoRecord], layout: &Layout) -> Vec<(i32, i32)> {
        let mut offsets = vec![(0, 0); corrected.len()];

        for i in 1..corrected.len() {
            let coarse = layout.placements[i];
            let prev = layout.placements[i - 1];
            let delta = records[i].position_relative - records[i - 1].position_relative;

            let hint = OverlapHint {
                base: (coarse.x - prev.x, coarse.y - prev.y),
                priority: OverlapPriority::resolve(self.config.priority, delta),
            };

            match self.matcher.find_best_offset(&corrected[i], &corrected[i - 1], hint) {
                Some(found) => {
                    tracing::debug!(
                        photo = i,
                        dx = found.dx,
                        dy = found.dy,
                        cost = found.cost,
                        "overlap refined"
                    );
                    offsets[i] = found.offset();
                }
                None => {
                    tracing::debug!(photo = i, "photos never touch inside the search window");
                }
            }
        }

        offsets
    }

    /// Plain grid collage: no rotation, no refinement, white background
    pub fn grid_collage<P>(&self, photos: &[P]) -> StitchResult<RgbImage>
    where
        P: Borrow<RgbImage>,
    {
        let (width, height) = validate_dimensions(photos)?;
        let layout = compositor::grid_layout(photos.len(), width, height)?;
        let owned: Vec<&RgbImage> = photos.iter().map(|p| p.borrow()).collect();

        let mut canvas = RgbImage::from_pixel(
            layout.canvas_width,
            layout.canvas_height,
            Background::White.rgb(),
        );
        for (photo, placement) in owned.iter().zip(&layout.placements) {
            image::imageops::replace(&mut canvas, *photo, placement.x, placement.y);
        }
        Ok(canvas)
    }
}

impl Default for StitchingEngine {
    fn default() -> Self {
        Self::new(StitchConfig::default())
    }
}

/// Photo and metadata counts must agree, dimensions must be uniform
fn validate<P: Borrow<RgbImage>>(photos: &[P], records: &[PhotoRecord]) -> StitchResult<(u32, u32)> {
    if photos.len() != records.len() {
        return Err(StitchError::StitchInputMismatch {
            photos: photos.len(),
            metadata: records.len(),
        });
    }
    validate_dimensions(photos)
}

fn validate_dimensions<P: Borrow<RgbImage>>(photos: &[P]) -> StitchResult<(u32, u32)> {
    let first = photos.first().ok_or(StitchError::NoPhotos)?.borrow().dimensions();

    for (index, photo) in photos.iter().enumerate() {
        let (width, height) = photo.borrow().dimensions();
        if width == 0 || height == 0 {
            return Err(StitchError::EmptyImage { index, width, height });
        }
        if (width, height) != first {
            return Err(StitchError::DimensionMismatch {
                index,
                expected: first,
                actual: (width, height),
            });
        }
    }

    Ok(first)
}
