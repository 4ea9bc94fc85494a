//! Coverage to signed distance field conversion by jump flooding.
//!
//! Every pixel tracks two seeds: the nearest inside pixel and the nearest
//! outside pixel. After the seed pass, one propagation pass runs per offset of
//! a [`JumpFloodPlan`] and each pixel looks at the 9 cells at `{-k, 0, +k}²`.
//! The final pass measures the distance to the nearest seed of the opposite
//! class and encodes it into 8 bits.
//!
//! [`CpuDistanceTransform`] and the compute-shader engine in
//! [`wgpu_transform`] use the same plan, sample order and integer arithmetic.

use crate::error::AtlasError;
use crate::raster::CoverageBitmap;

#[cfg(feature = "wgpu")]
pub mod wgpu_transform;

#[cfg(feature = "wgpu")]
pub use wgpu_transform::WgpuDistanceTransform;

/// Parameters shared by every distance transform engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SdfParams {
    pub max_distance_inside: f32,
    pub max_distance_outside: f32,
    /// Coverage at or above this value is inside.
    pub coverage_threshold: u8,
}

impl Default for SdfParams {
    fn default() -> Self {
        Self {
            max_distance_inside: 8.0,
            max_distance_outside: 8.0,
            coverage_threshold: 128,
        }
    }
}

/// Sequence of propagation offsets for a `width x height` image.
///
/// There are `ceil(log2(max(width, height)))` passes; offsets halve from
/// `2^(steps - 1)` down to `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpFloodPlan {
    steps: u32,
}

impl JumpFloodPlan {
    pub fn new(width: usize, height: usize) -> Self {
        let max = width.max(height);
        let steps = if max <= 1 {
            0
        } else {
            usize::BITS - (max - 1).leading_zeros()
        };
        Self { steps }
    }

    /// Number of propagation passes.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Offset used by pass `k`, or `None` past the last pass.
    pub fn offset(&self, k: u32) -> Option<u32> {
        (k < self.steps).then(|| 1 << (self.steps - 1 - k))
    }

    pub fn offsets(&self) -> impl Iterator<Item = u32> + use<> {
        (0..self.steps).rev().map(|shift| 1 << shift)
    }
}

/// Nearest seed found so far for one pixel and one class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedCell {
    pub nearest_x: i32,
    pub nearest_y: i32,
    pub seeded: bool,
}

impl SeedCell {
    pub const EMPTY: Self = Self {
        nearest_x: -1,
        nearest_y: -1,
        seeded: false,
    };

    pub const fn at(x: i32, y: i32) -> Self {
        Self {
            nearest_x: x,
            nearest_y: y,
            seeded: true,
        }
    }

    fn distance_squared(&self, x: i32, y: i32) -> i32 {
        let dx = x - self.nearest_x;
        let dy = y - self.nearest_y;
        dx * dx + dy * dy
    }
}

const INSIDE: usize = 0;
const OUTSIDE: usize = 1;

/// 8-bit signed distance field.
///
/// `128` (0.5) is the glyph edge; larger values are inside. Distances
/// saturate at `max_distance_inside` / `max_distance_outside`.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceField {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    pub max_distance_inside: f32,
    pub max_distance_outside: f32,
}

impl DistanceField {
    /// Signed distance at `(x, y)` decoded back to pixels, positive inside.
    pub fn distance_at(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let value = *self.pixels.get(y * self.width + x)? as f32 / 255.0;
        Some(if value >= 0.5 {
            (value - 0.5) * 2.0 * self.max_distance_inside
        } else {
            -(0.5 - value) * 2.0 * self.max_distance_outside
        })
    }
}

/// Encodes a distance for a pixel of the given class.
///
/// Kept in sync with `encode` in `jump_flood.wgsl`.
pub(crate) fn encode_distance(
    distance_squared: Option<i32>,
    inside: bool,
    params: &SdfParams,
) -> u8 {
    let max = if inside {
        params.max_distance_inside
    } else {
        params.max_distance_outside
    };
    let distance = match distance_squared {
        Some(d2) => ((d2 as f32).sqrt() - 0.5).clamp(0.0, max),
        None => max,
    };
    let value = if inside {
        0.5 + 0.5 * distance / max
    } else {
        0.5 - 0.5 * distance / max
    };
    (value.clamp(0.0, 1.0) * 255.0 + 0.5).floor() as u8
}

/// Converts a coverage bitmap into a distance field.
pub trait DistanceTransform {
    fn transform(
        &mut self,
        coverage: &CoverageBitmap,
        params: &SdfParams,
    ) -> Result<DistanceField, AtlasError>;
}

/// Reference engine running the jump flood on the calling thread.
#[derive(Debug, Default)]
pub struct CpuDistanceTransform {
    executed_offsets: Vec<u32>,
}

impl CpuDistanceTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offsets of the propagation passes run by the last transform.
    pub fn executed_offsets(&self) -> &[u32] {
        &self.executed_offsets
    }

    fn seed(coverage: &CoverageBitmap, threshold: u8) -> Vec<[SeedCell; 2]> {
        let mut cells = Vec::with_capacity(coverage.pixels.len());
        for y in 0..coverage.height {
            for x in 0..coverage.width {
                let own = SeedCell::at(x as i32, y as i32);
                let inside = coverage.pixels[y * coverage.width + x] >= threshold;
                cells.push(if inside {
                    [own, SeedCell::EMPTY]
                } else {
                    [SeedCell::EMPTY, own]
                });
            }
        }
        cells
    }

    fn propagate(
        src: &[[SeedCell; 2]],
        dst: &mut [[SeedCell; 2]],
        width: usize,
        height: usize,
        offset: i32,
    ) {
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let mut best = [SeedCell::EMPTY; 2];
                let mut best_d2 = [i32::MAX; 2];

                for dy in [-offset, 0, offset] {
                    let ny = y + dy;
                    if ny < 0 || ny >= height as i32 {
                        continue;
                    }
                    for dx in [-offset, 0, offset] {
                        let nx = x + dx;
                        if nx < 0 || nx >= width as i32 {
                            continue;
                        }
                        let neighbour = &src[ny as usize * width + nx as usize];
                        for class in [INSIDE, OUTSIDE] {
                            let candidate = neighbour[class];
                            if !candidate.seeded {
                                continue;
                            }
                            let d2 = candidate.distance_squared(x, y);
                            if d2 < best_d2[class] {
                                best_d2[class] = d2;
                                best[class] = candidate;
                            }
                        }
                    }
                }

                dst[y as usize * width + x as usize] = best;
            }
        }
    }
}

impl DistanceTransform for CpuDistanceTransform {
    fn transform(
        &mut self,
        coverage: &CoverageBitmap,
        params: &SdfParams,
    ) -> Result<DistanceField, AtlasError> {
        let CoverageBitmap { width, height, .. } = *coverage;
        self.executed_offsets.clear();

        let mut front = Self::seed(coverage, params.coverage_threshold);
        let mut back = front.clone();

        // `front` always holds the output of the last finished pass.
        for offset in JumpFloodPlan::new(width, height).offsets() {
            Self::propagate(&front, &mut back, width, height, offset as i32);
            std::mem::swap(&mut front, &mut back);
            self.executed_offsets.push(offset);
        }

        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                let inside = coverage.pixels[index] >= params.coverage_threshold;
                let target = front[index][if inside { OUTSIDE } else { INSIDE }];
                let d2 = target
                    .seeded
                    .then(|| target.distance_squared(x as i32, y as i32));
                pixels.push(encode_distance(d2, inside, params));
            }
        }

        log::debug!(
            "jump flood on {}x{} finished after {} passes",
            width,
            height,
            self.executed_offsets.len()
        );

        Ok(DistanceField {
            width,
            height,
            pixels,
            max_distance_inside: params.max_distance_inside,
            max_distance_outside: params.max_distance_outside,
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// `size x size` bitmap with an `inner x inner` solid square in the middle.
    fn centered_square(inner: usize, border: usize) -> CoverageBitmap {
        let size = inner + 2 * border;
        let mut bitmap = CoverageBitmap::new(size, size);
        for y in border..border + inner {
            for x in border..border + inner {
                bitmap.pixels[y * size + x] = 255;
            }
        }
        bitmap
    }

    fn params(max: f32) -> SdfParams {
        SdfParams {
            max_distance_inside: max,
            max_distance_outside: max,
            coverage_threshold: 128,
        }
    }

    /// Exhaustive nearest-opposite search for comparison.
    fn brute_force(coverage: &CoverageBitmap, params: &SdfParams) -> Vec<u8> {
        let (w, h) = (coverage.width, coverage.height);
        let inside = |x: usize, y: usize| coverage.pixels[y * w + x] >= params.coverage_threshold;
        let mut out = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let own = inside(x, y);
                let mut best: Option<i32> = None;
                for sy in 0..h {
                    for sx in 0..w {
                        if inside(sx, sy) == own {
                            continue;
                        }
                        let dx = x as i32 - sx as i32;
                        let dy = y as i32 - sy as i32;
                        let d2 = dx * dx + dy * dy;
                        best = Some(best.map_or(d2, |b| b.min(d2)));
                    }
                }
                out.push(encode_distance(best, own, params));
            }
        }
        out
    }

    #[test]
    fn pass_count_is_ceil_log2_of_the_larger_side() {
        let cases = [
            ((1, 1), 0),
            ((2, 1), 1),
            ((3, 3), 2),
            ((4, 2), 2),
            ((5, 1), 3),
            ((64, 64), 6),
            ((65, 10), 7),
            ((10, 1000), 10),
            ((1024, 1024), 10),
        ];
        for ((w, h), steps) in cases {
            assert_eq!(JumpFloodPlan::new(w, h).steps(), steps, "{w}x{h}");
        }
    }

    #[test]
    fn offsets_halve_down_to_one() {
        let plan = JumpFloodPlan::new(300, 120);
        let offsets: Vec<u32> = plan.offsets().collect();
        assert_eq!(offsets, vec![256, 128, 64, 32, 16, 8, 4, 2, 1]);
        for k in 0..plan.steps() {
            assert_eq!(plan.offset(k), Some(offsets[k as usize]));
        }
        assert_eq!(plan.offset(plan.steps()), None);
    }

    #[test]
    fn transform_runs_every_planned_pass() {
        let coverage = centered_square(7, 6);
        let mut engine = CpuDistanceTransform::new();
        engine.transform(&coverage, &params(6.0)).unwrap();

        let expected: Vec<u32> = JumpFloodPlan::new(19, 19).offsets().collect();
        assert_eq!(engine.executed_offsets(), expected.as_slice());
        assert_eq!(engine.executed_offsets(), &[16, 8, 4, 2, 1]);
    }

    #[test]
    fn centre_of_square_matches_euclidean_distance() {
        for (inner, border) in [(5, 4), (9, 6), (3, 2)] {
            let coverage = centered_square(inner, border);
            let max = border as f32;
            let field = CpuDistanceTransform::new()
                .transform(&coverage, &params(max))
                .unwrap();

            let centre = border + inner / 2;
            let expected = (inner as f32 / 2.0).min(max);
            let decoded = field.distance_at(centre, centre).unwrap();
            let tolerance = 2.0 * max / 255.0;
            assert!(
                (decoded - expected).abs() <= tolerance,
                "{inner}/{border}: got {decoded}, expected {expected}"
            );
        }
    }

    #[test]
    fn large_square_centre_is_clamped_to_radius() {
        let coverage = centered_square(21, 4);
        let field = CpuDistanceTransform::new()
            .transform(&coverage, &params(4.0))
            .unwrap();
        assert_eq!(field.pixels[14 * 29 + 14], 255);
        assert_eq!(field.distance_at(14, 14), Some(4.0));
    }

    #[test]
    fn edge_pixels_straddle_the_midpoint() {
        let coverage = centered_square(6, 4);
        let field = CpuDistanceTransform::new()
            .transform(&coverage, &params(4.0))
            .unwrap();
        // first inside column and last outside column along the middle row
        let inside = field.distance_at(4, 7).unwrap();
        let outside = field.distance_at(3, 7).unwrap();
        assert!(inside > 0.0 && inside < 1.0, "{inside}");
        assert!(outside < 0.0 && outside > -1.0, "{outside}");
    }

    #[test]
    fn matches_brute_force_on_irregular_shape() {
        let mut coverage = CoverageBitmap::new(23, 17);
        for y in 0..17 {
            for x in 0..23 {
                let (fx, fy) = (x as f32 - 9.0, y as f32 - 8.0);
                let ring = (fx * fx + fy * fy).sqrt();
                if (3.0..6.5).contains(&ring) || (x > 16 && y % 5 == 1) {
                    coverage.pixels[y * 23 + x] = 200;
                }
            }
        }
        let p = params(5.0);
        let field = CpuDistanceTransform::new().transform(&coverage, &p).unwrap();
        let exact = brute_force(&coverage, &p);

        // jump flooding is approximate; allow a one step deviation
        let worst = field
            .pixels
            .iter()
            .zip(&exact)
            .map(|(&a, &b)| (a as i32 - b as i32).abs())
            .max()
            .unwrap();
        assert!(worst <= 3, "max deviation {worst}");
    }

    #[test]
    fn empty_bitmap_is_all_max_outside() {
        let coverage = CoverageBitmap::new(8, 5);
        let field = CpuDistanceTransform::new()
            .transform(&coverage, &params(3.0))
            .unwrap();
        assert!(field.pixels.iter().all(|&p| p == 0));
        assert_eq!(field.distance_at(0, 0), Some(-3.0));
    }

    #[test]
    fn solid_bitmap_is_all_max_inside() {
        let mut coverage = CoverageBitmap::new(6, 6);
        coverage.pixels.fill(255);
        let field = CpuDistanceTransform::new()
            .transform(&coverage, &params(3.0))
            .unwrap();
        assert!(field.pixels.iter().all(|&p| p == 255));
    }

    #[test]
    fn zero_sized_bitmap_produces_empty_field() {
        let coverage = CoverageBitmap::new(0, 0);
        let mut engine = CpuDistanceTransform::new();
        let field = engine.transform(&coverage, &params(3.0)).unwrap();
        assert!(field.pixels.is_empty());
        assert!(engine.executed_offsets().is_empty());
    }

    #[test]
    fn threshold_decides_inside() {
        let mut coverage = CoverageBitmap::new(5, 1);
        coverage.pixels.copy_from_slice(&[0, 100, 127, 128, 255]);
        let field = CpuDistanceTransform::new()
            .transform(&coverage, &params(2.0))
            .unwrap();
        assert!(field.pixels[2] < 128);
        assert!(field.pixels[3] >= 128);
    }

    #[test]
    fn asymmetric_radii_are_respected() {
        let coverage = centered_square(1, 6);
        let p = SdfParams {
            max_distance_inside: 1.0,
            max_distance_outside: 4.0,
            coverage_threshold: 128,
        };
        let field = CpuDistanceTransform::new().transform(&coverage, &p).unwrap();
        // corner pixel is far outside: saturates at the outside radius
        assert_eq!(field.distance_at(0, 0), Some(-4.0));
        assert_eq!(field.pixels[0], 0);
    }
}
