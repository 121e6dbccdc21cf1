/// Brute-force overlap search between neighbouring photos
///
/// `current` is placed at `hint.base + (dx, dy)` relative to `previous`.
/// For every candidate `(dx, dy)` in the search window, thin strips along
/// all four edges of both photos are compared against the other photo at
/// the displaced position. Photos that only touch along an edge are scored
/// by how well each edge continues the other photo's facing edge. The
/// candidate with the smallest mean absolute RGB difference wins.

use cgmath::Vector3;
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::config::{PriorityPolicy, StripWidth};

/// Axis whose edge pairs decide exact cost ties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPriority {
    /// Left/right edge pairs
    Horizontal,
    /// Top/bottom edge pairs
    Vertical,
}

impl OverlapPriority {
    /// Horizontal when the photos moved further along x than along y
    pub fn from_position_delta(delta: Vector3<f64>) -> Self {
        if delta.x.abs() > delta.y.abs() {
            OverlapPriority::Horizontal
        } else {
            OverlapPriority::Vertical
        }
    }

    pub fn resolve(policy: PriorityPolicy, delta: Vector3<f64>) -> Self {
        match policy {
            PriorityPolicy::FromPositionDelta => Self::from_position_delta(delta),
            PriorityPolicy::Horizontal => OverlapPriority::Horizontal,
            PriorityPolicy::Vertical => OverlapPriority::Vertical,
        }
    }
}

/// Coarse placement of `current` relative to `previous`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapHint {
    /// Displacement in pixels before refinement
    pub base: (i64, i64),
    pub priority: OverlapPriority,
}

impl OverlapHint {
    /// Photos assumed to start at the same position
    pub fn aligned(priority: OverlapPriority) -> Self {
        Self { base: (0, 0), priority }
    }
}

/// Winning candidate of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapMatch {
    pub dx: i32,
    pub dy: i32,
    /// Summed absolute RGB difference over all edge comparisons
    pub cost: u64,
    /// Number of compared pixel pairs
    pub samples: u64,
}

impl OverlapMatch {
    pub fn offset(&self) -> (i32, i32) {
        (self.dx, self.dy)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    dx: i32,
    dy: i32,
    total: u64,
    samples: u64,
    priority_cost: u64,
    priority_samples: u64,
    scan_index: usize,
}

impl Candidate {
    /// Lower mean cost first, then lower mean priority-edge cost, then scan order
    fn rank(&self, other: &Self) -> Ordering {
        mean_cmp((self.total, self.samples), (other.total, other.samples))
            .then_with(|| {
                mean_cmp(
                    (self.priority_cost, self.priority_samples),
                    (other.priority_cost, other.priority_samples),
                )
            })
            .then(self.scan_index.cmp(&other.scan_index))
    }
}

/// Compare `sum / count` ratios exactly; a ratio without samples ranks last
fn mean_cmp(a: (u64, u64), b: (u64, u64)) -> Ordering {
    match (a.1, b.1) {
        (0, 0) => Ordering::Equal,
        (0, _) => Ordering::Greater,
        (_, 0) => Ordering::Less,
        _ => (a.0 as u128 * b.1 as u128).cmp(&(b.0 as u128 * a.1 as u128)),
    }
}

/// Exhaustive offset search over a square window
#[derive(Debug, Clone, Copy)]
pub struct OverlapMatcher {
    pub search_radius: i32,
    pub strip: StripWidth,
}

impl Default for OverlapMatcher {
    fn default() -> Self {
        Self {
            search_radius: 10,
            strip: StripWidth::default(),
        }
    }
}

impl OverlapMatcher {
    pub fn new(search_radius: i32, strip: StripWidth) -> Self {
        Self {
            search_radius: search_radius.max(0),
            strip,
        }
    }

    /// Find the refinement `(dx, dy)` that best aligns the shared edges
    ///
    /// Ties on total cost go to the lower cost on the priority edge pairs,
    /// then to the first candidate in scan order (`dx` outer, `dy` inner).
    /// Returns `None` when no candidate puts the photos in contact.
    pub fn find_best_offset(
        &self,
        current: &RgbImage,
        previous: &RgbImage,
        hint: OverlapHint,
    ) -> Option<OverlapMatch> {
        if current.width() == 0 || current.height() == 0 || previous.width() == 0 || previous.height() == 0 {
            return None;
        }

        let r = self.search_radius;
        let side = (2 * r + 1) as usize;
        let current_strips = EdgeStrips::new(current, self.strip);
        let previous_strips = EdgeStrips::new(previous, self.strip);

        let best = (0..side * side)
            .into_par_iter()
            .filter_map(|scan_index| {
                let dx = (scan_index / side) as i32 - r;
                let dy = (scan_index % side) as i32 - r;
                let ox = hint.base.0 + dx as i64;
                let oy = hint.base.1 + dy as i64;

                let cost = edge_costs(current, previous, &current_strips, &previous_strips, ox, oy);
                if cost.samples() == 0 {
                    return None;
                }

                let (priority_cost, priority_samples) = match hint.priority {
                    OverlapPriority::Horizontal => (cost.horizontal, cost.horizontal_samples),
                    OverlapPriority::Vertical => (cost.vertical, cost.vertical_samples),
                };

                Some(Candidate {
                    dx,
                    dy,
                    total: cost.total(),
                    samples: cost.samples(),
                    priority_cost,
                    priority_samples,
                    scan_index,
                })
            })
            .min_by(|a, b| a.rank(b))?;

        Some(OverlapMatch {
            dx: best.dx,
            dy: best.dy,
            cost: best.total,
            samples: best.samples,
        })
    }
}

/// Pixel rectangle `[x0, x1) x [y0, y1)`
#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: i64,
    x1: i64,
    y0: i64,
    y1: i64,
}

/// Left, right, top and bottom strips of one photo
#[derive(Debug, Clone, Copy)]
struct EdgeStrips {
    left: Rect,
    right: Rect,
    top: Rect,
    bottom: Rect,
}

impl EdgeStrips {
    fn new(image: &RgbImage, strip: StripWidth) -> Self {
        let w = image.width() as i64;
        let h = image.height() as i64;
        let tw = strip.resolve(image.width()) as i64;
        let th = strip.resolve(image.height()) as i64;

        Self {
            left: Rect { x0: 0, x1: tw, y0: 0, y1: h },
            right: Rect { x0: w - tw, x1: w, y0: 0, y1: h },
            top: Rect { x0: 0, x1: w, y0: 0, y1: th },
            bottom: Rect { x0: 0, x1: w, y0: h - th, y1: h },
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct EdgeCost {
    horizontal: u64,
    horizontal_samples: u64,
    vertical: u64,
    vertical_samples: u64,
}

impl EdgeCost {
    fn add_horizontal(&mut self, (sad, samples): (u64, u64)) {
        self.horizontal += sad;
        self.horizontal_samples += samples;
    }

    fn add_vertical(&mut self, (sad, samples): (u64, u64)) {
        self.vertical += sad;
        self.vertical_samples += samples;
    }

    fn total(&self) -> u64 {
        self.horizontal + self.vertical
    }

    fn samples(&self) -> u64 {
        self.horizontal_samples + self.vertical_samples
    }
}

/// Cost of all four edge pairings with `current` displaced by `(ox, oy)`
fn edge_costs(
    current: &RgbImage,
    previous: &RgbImage,
    cs: &EdgeStrips,
    ps: &EdgeStrips,
    ox: i64,
    oy: i64,
) -> EdgeCost {
    let mut cost = EdgeCost::default();

    // current pixel (x, y) sits over previous pixel (x + ox, y + oy)
    // right of current <-> left of previous
    cost.add_horizontal(strip_sad(current, cs.right, previous, ox, oy));
    cost.add_horizontal(strip_sad(previous, ps.left, current, -ox, -oy));
    // left of current <-> right of previous
    cost.add_horizontal(strip_sad(current, cs.left, previous, ox, oy));
    cost.add_horizontal(strip_sad(previous, ps.right, current, -ox, -oy));
    // bottom of current <-> top of previous
    cost.add_vertical(strip_sad(current, cs.bottom, previous, ox, oy));
    cost.add_vertical(strip_sad(previous, ps.top, current, -ox, -oy));
    // top of current <-> bottom of previous
    cost.add_vertical(strip_sad(current, cs.top, previous, ox, oy));
    cost.add_vertical(strip_sad(previous, ps.bottom, current, -ox, -oy));

    // Edge to edge without overlap: compare across the seam
    let (pw, ph) = (previous.width() as i64, previous.height() as i64);
    let (cw, ch) = (current.width() as i64, current.height() as i64);
    if ox == pw {
        cost.add_horizontal(column_seam(previous, current, oy));
    }
    if ox == -cw {
        cost.add_horizontal(column_seam(current, previous, -oy));
    }
    if oy == ph {
        cost.add_vertical(row_seam(previous, current, ox));
    }
    if oy == -ch {
        cost.add_vertical(row_seam(current, previous, -ox));
    }

    cost
}

/// Seam between `left`'s last column and `right`'s first column
///
/// Row `y` of `right` sits next to row `y + shift` of `left`. Each edge
/// pixel is compared with the linear continuation of the other photo's
/// last two columns.
fn column_seam(left: &RgbImage, right: &RgbImage, shift: i64) -> (u64, u64) {
    let y0 = (-shift).max(0);
    let y1 = (right.height() as i64).min(left.height() as i64 - shift);
    if y0 >= y1 {
        return (0, 0);
    }

    let lx = left.width() - 1;
    let lx_inner = left.width().saturating_sub(2);
    let rx_inner = 1.min(right.width() - 1);

    let mut sad = 0u64;
    for y in y0..y1 {
        let ly = (y + shift) as u32;
        let ry = y as u32;
        let l_edge = left.get_pixel(lx, ly);
        let r_edge = right.get_pixel(0, ry);
        sad += continuation(l_edge, left.get_pixel(lx_inner, ly), r_edge);
        sad += continuation(r_edge, right.get_pixel(rx_inner, ry), l_edge);
    }

    (sad, 2 * (y1 - y0) as u64)
}

/// Seam between `top`'s last row and `bottom`'s first row
///
/// Column `x` of `bottom` sits under column `x + shift` of `top`.
fn row_seam(top: &RgbImage, bottom: &RgbImage, shift: i64) -> (u64, u64) {
    let x0 = (-shift).max(0);
    let x1 = (bottom.width() as i64).min(top.width() as i64 - shift);
    if x0 >= x1 {
        return (0, 0);
    }

    let ty = top.height() - 1;
    let ty_inner = top.height().saturating_sub(2);
    let by_inner = 1.min(bottom.height() - 1);

    let mut sad = 0u64;
    for x in x0..x1 {
        let tx = (x + shift) as u32;
        let bx = x as u32;
        let t_edge = top.get_pixel(tx, ty);
        let b_edge = bottom.get_pixel(bx, 0);
        sad += continuation(t_edge, top.get_pixel(tx, ty_inner), b_edge);
        sad += continuation(b_edge, bottom.get_pixel(bx, by_inner), t_edge);
    }

    (sad, 2 * (x1 - x0) as u64)
}

/// Difference between `across` and `edge` extended one pixel away from `inner`
fn continuation(edge: &Rgb<u8>, inner: &Rgb<u8>, across: &Rgb<u8>) -> u64 {
    (0..3)
        .map(|c| {
            let predicted = 2 * edge.0[c] as i32 - inner.0[c] as i32;
            (predicted - across.0[c] as i32).unsigned_abs() as u64
        })
        .sum()
}

/// Sum of absolute RGB differences between `strip` of `a` and `b` shifted by `(ox, oy)`
///
/// Only pixels that land inside `b` are compared.
fn strip_sad(a: &RgbImage, strip: Rect, b: &RgbImage, ox: i64, oy: i64) -> (u64, u64) {
    let bw = b.width() as i64;
    let bh = b.height() as i64;

    let x0 = strip.x0.max(-ox);
    let x1 = strip.x1.min(bw - ox);
    let y0 = strip.y0.max(-oy);
    let y1 = strip.y1.min(bh - oy);
    if x0 >= x1 || y0 >= y1 {
        return (0, 0);
    }

    let a_raw = a.as_raw();
    let b_raw = b.as_raw();
    let a_stride = a.width() as usize * 3;
    let b_stride = b.width() as usize * 3;
    let run = (x1 - x0) as usize * 3;

    let mut sad = 0u64;
    for y in y0..y1 {
        let a_start = y as usize * a_stride + x0 as usize * 3;
        let b_start = (y + oy) as usize * b_stride + (x0 + ox) as usize * 3;
        sad += a_raw[a_start..a_start + run]
            .iter()
            .zip(&b_raw[b_start..b_start + run])
            .map(|(&p, &q)| p.abs_diff(q) as u64)
            .sum::<u64>();
    }

    (sad, ((x1 - x0) * (y1 - y0)) as u64)
}
