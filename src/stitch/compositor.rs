/// Canvas layout and compositing
///
/// Layouts decide where each photo's top-left corner lands; `composite`
/// copies full opaque pixels in insertion order, so later photos overwrite
/// earlier ones where they overlap. Pixels that fall outside the canvas
/// are clipped.

use cgmath::Vector3;
use image::{Rgb, RgbImage};

use crate::config::GRID_COLUMNS;
use crate::error::{StitchError, StitchResult};

use super::rotate::Background;

/// Largest canvas side we agree to allocate
pub const MAX_CANVAS_SIDE: u64 = 32_768;

/// Top-left corner of a photo on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
}

impl Placement {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn shifted(self, dx: i64, dy: i64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Canvas size plus one placement per photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub placements: Vec<Placement>,
}

/// Grid shape (columns, rows) for `count` photos
///
/// Eight photos give the full 4x2 grid; fewer keep four columns per row
/// and only as many rows as needed.
pub fn grid_shape(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let cols = count.min(GRID_COLUMNS);
    let rows = count.div_ceil(GRID_COLUMNS);
    (cols, rows)
}

/// Cell `(col, row)` of photo `index`, row 0 being the first captured row
pub fn grid_cell(index: usize) -> (usize, usize) {
    (index % GRID_COLUMNS, index / GRID_COLUMNS)
}

/// Grid mode layout
///
/// Rows are flipped: the first captured row is drawn at the bottom of the
/// canvas, so photo 0 lands in the bottom-left cell.
pub fn grid_layout(count: usize, photo_width: u32, photo_height: u32) -> StitchResult<Layout> {
    let (cols, rows) = grid_shape(count);
    let (canvas_width, canvas_height) =
        checked_canvas(cols as u64 * photo_width as u64, rows as u64 * photo_height as u64)?;

    let placements = (0..count)
        .map(|i| {
            let (col, row) = grid_cell(i);
            let visual_row = rows - 1 - row;
            Placement::new(
                col as i64 * photo_width as i64,
                visual_row as i64 * photo_height as i64,
            )
        })
        .collect();

    Ok(Layout {
        canvas_width,
        canvas_height,
        placements,
    })
}

/// Largest scaled coordinate accepted; every integer up to here is exact in f64
const MAX_SCALED_COORD: f64 = (1u64 << 52) as f64;

/// Device translation scaled to canvas pixels (x right, y down)
///
/// Device y points up, so it is negated for the raster. `None` when either
/// coordinate is not finite or lies beyond `MAX_SCALED_COORD`.
pub fn scaled_position(position: Vector3<f64>, scale: f64) -> Option<(i64, i64)> {
    let to_pixel = |v: f64| {
        let v = v.round();
        (v.is_finite() && v.abs() <= MAX_SCALED_COORD).then_some(v as i64)
    };
    Some((to_pixel(position.x * scale)?, to_pixel(-position.y * scale)?))
}

/// Position mode layout
///
/// The canvas spans the scaled positions plus one photo; each placement is
/// its scaled position minus the canvas minimum.
pub fn position_layout(
    positions: &[Vector3<f64>],
    scale: f64,
    photo_width: u32,
    photo_height: u32,
) -> StitchResult<Layout> {
    if positions.is_empty() {
        return Err(StitchError::NoPhotos);
    }

    let scaled = positions
        .iter()
        .enumerate()
        .map(|(index, p)| scaled_position(*p, scale).ok_or(StitchError::InvalidPosition { index }))
        .collect::<StitchResult<Vec<(i64, i64)>>>()?;
    let min_x = scaled.iter().map(|s| s.0).min().unwrap_or(0);
    let max_x = scaled.iter().map(|s| s.0).max().unwrap_or(0);
    let min_y = scaled.iter().map(|s| s.1).min().unwrap_or(0);
    let max_y = scaled.iter().map(|s| s.1).max().unwrap_or(0);

    let span = |max: i64, min: i64, photo: u32| {
        max.checked_sub(min)
            .and_then(|d| (d as u64).checked_add(photo as u64))
            .unwrap_or(u64::MAX)
    };
    let (canvas_width, canvas_height) = checked_canvas(
        span(max_x, min_x, photo_width),
        span(max_y, min_y, photo_height),
    )?;

    let placements = scaled
        .iter()
        .map(|&(x, y)| Placement::new(x - min_x, y - min_y))
        .collect();

    Ok(Layout {
        canvas_width,
        canvas_height,
        placements,
    })
}

fn checked_canvas(width: u64, height: u64) -> StitchResult<(u32, u32)> {
    if width > MAX_CANVAS_SIDE || height > MAX_CANVAS_SIDE {
        return Err(StitchError::CanvasTooLarge {
            width,
            height,
            limit: MAX_CANVAS_SIDE,
        });
    }
    Ok((width as u32, height as u32))
}

/// Draw `photos` onto a fresh canvas at `placements`
pub fn composite(
    photos: &[RgbImage],
    placements: &[Placement],
    canvas_width: u32,
    canvas_height: u32,
    background: Background,
) -> StitchResult<RgbImage> {
    if photos.len() != placements.len() {
        return Err(StitchError::PlacementMismatch {
            photos: photos.len(),
            placements: placements.len(),
        });
    }

    let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, background.rgb());
    for (photo, placement) in photos.iter().zip(placements) {
        draw(&mut canvas, photo, *placement);
    }

    Ok(canvas)
}

/// Copy `photo` onto `canvas` with clipping
fn draw(canvas: &mut RgbImage, photo: &RgbImage, at: Placement) {
    let cw = canvas.width() as i64;
    let ch = canvas.height() as i64;
    let pw = photo.width() as i64;
    let ph = photo.height() as i64;

    // Visible span in photo coordinates
    let x0 = (-at.x).max(0);
    let x1 = pw.min(cw - at.x);
    let y0 = (-at.y).max(0);
    let y1 = ph.min(ch - at.y);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let run = (x1 - x0) as usize * 3;
    let photo_stride = pw as usize * 3;
    let canvas_stride = cw as usize * 3;
    let src = photo.as_raw();
    let dst: &mut [u8] = canvas;

    for y in y0..y1 {
        let s = y as usize * photo_stride + x0 as usize * 3;
        let d = (y + at.y) as usize * canvas_stride + (x0 + at.x) as usize * 3;
        dst[d..d + run].copy_from_slice(&src[s..s + run]);
    }
}

/// Solid photo, handy for previews and tests
pub fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLORS: [[u8; 3]; 8] = [
        [255, 0, 0],
        [0, 255, 0],
        [0, 0, 255],
        [255, 255, 0],
        [255, 0, 255],
        [0, 255, 255],
        [128, 64, 32],
        [32, 64, 128],
    ];

    fn region_is(canvas: &RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 3]) -> bool {
        (y0..y0 + h).all(|y| (x0..x0 + w).all(|x| canvas.get_pixel(x, y).0 == color))
    }

    #[test]
    fn test_grid_rows_are_flipped() {
        let photos: Vec<RgbImage> = COLORS.iter().map(|c| solid(100, 100, *c)).collect();
        let layout = grid_layout(8, 100, 100).unwrap();
        assert_eq!((layout.canvas_width, layout.canvas_height), (400, 200));

        let canvas = composite(
            &photos,
            &layout.placements,
            layout.canvas_width,
            layout.canvas_height,
            Background::White,
        )
        .unwrap();

        // Slot 0 (red) sits bottom-left
        assert!(region_is(&canvas, 0, 100, 100, 100, [255, 0, 0]));
        // Slot 4 sits top-left
        assert!(region_is(&canvas, 0, 0, 100, 100, COLORS[4]));

        for (slot, color) in COLORS.iter().enumerate() {
            let col = (slot % 4) as u32;
            let row = (slot / 4) as u32;
            let y = (1 - row) * 100;
            assert!(region_is(&canvas, col * 100, y, 100, 100, *color), "slot {}", slot);
        }
    }

    #[test]
    fn test_partial_grid() {
        let layout = grid_layout(5, 10, 20).unwrap();
        assert_eq!((layout.canvas_width, layout.canvas_height), (40, 40));
        assert_eq!(layout.placements[0], Placement::new(0, 20));
        assert_eq!(layout.placements[4], Placement::new(0, 0));

        let layout = grid_layout(3, 10, 20).unwrap();
        assert_eq!((layout.canvas_width, layout.canvas_height), (30, 20));
        assert_eq!(layout.placements[2], Placement::new(20, 0));
    }

    #[test]
    fn test_later_photos_overwrite() {
        let photos = vec![solid(10, 10, [255, 0, 0]), solid(10, 10, [0, 0, 255])];
        let placements = vec![Placement::new(0, 0), Placement::new(5, 0)];
        let canvas = composite(&photos, &placements, 15, 10, Background::Black).unwrap();

        assert_eq!(canvas.get_pixel(2, 2).0, [255, 0, 0]);
        assert_eq!(canvas.get_pixel(7, 2).0, [0, 0, 255]);
        assert_eq!(canvas.get_pixel(14, 9).0, [0, 0, 255]);
    }

    #[test]
    fn test_clipping_and_background() {
        let photos = vec![solid(10, 10, [9, 9, 9])];
        let placements = vec![Placement::new(-5, 7)];
        let canvas = composite(&photos, &placements, 20, 20, Background::White).unwrap();

        assert_eq!(canvas.get_pixel(0, 7).0, [9, 9, 9]);
        assert_eq!(canvas.get_pixel(4, 16).0, [9, 9, 9]);
        assert_eq!(canvas.get_pixel(5, 7).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(0, 6).0, [255, 255, 255]);
    }

    #[test]
    fn test_position_layout_bounds() {
        let positions = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.05, 0.0, 0.0),
            Vector3::new(0.0, 0.02, 0.0),
        ];
        let layout = position_layout(&positions, 2000.0, 64, 48).unwrap();

        // x spans 0..100, y spans -40..0
        assert_eq!((layout.canvas_width, layout.canvas_height), (164, 88));
        assert_eq!(layout.placements[0], Placement::new(0, 40));
        assert_eq!(layout.placements[1], Placement::new(100, 40));
        assert_eq!(layout.placements[2], Placement::new(0, 0));
    }

    #[test]
    fn test_mismatched_placements() {
        let photos = vec![solid(4, 4, [0, 0, 0])];
        let err = composite(&photos, &[], 4, 4, Background::Black).unwrap_err();
        assert!(matches!(err, StitchError::PlacementMismatch { .. }));
    }

    #[test]
    fn test_huge_canvas_rejected() {
        let positions = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(100.0, 0.0, 0.0)];
        let err = position_layout(&positions, 2000.0, 64, 48).unwrap_err();
        assert!(matches!(err, StitchError::CanvasTooLarge { .. }));
    }

    #[test]
    fn test_extreme_positions_rejected() {
        // Far apart but representable: too large, not a panic
        let positions = [Vector3::new(-1e9, 0.0, 0.0), Vector3::new(1e9, 0.0, 0.0)];
        let err = position_layout(&positions, 2000.0, 10, 10).unwrap_err();
        assert!(matches!(err, StitchError::CanvasTooLarge { .. }));

        let positions = [Vector3::new(-1e30, 0.0, 0.0), Vector3::new(1e30, 0.0, 0.0)];
        let err = position_layout(&positions, 2000.0, 10, 10).unwrap_err();
        assert!(matches!(err, StitchError::InvalidPosition { index: 0 }));

        let positions = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, f64::NAN, 0.0)];
        let err = position_layout(&positions, 2000.0, 10, 10).unwrap_err();
        assert!(matches!(err, StitchError::InvalidPosition { index: 1 }));

        let positions = [Vector3::new(f64::INFINITY, 0.0, 0.0)];
        assert!(position_layout(&positions, 2000.0, 10, 10).is_err());
    }
}
