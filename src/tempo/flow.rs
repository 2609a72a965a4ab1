//! Dense optical flow between consecutive frames.
//!
//! A pyramidal Lucas-Kanade tracker evaluated on a regular grid of the
//! analysis raster. Each grid point is tracked independently from the
//! coarsest pyramid level down to full resolution, so the result depends only
//! on the two input frames.

use image::{imageops, GrayImage};
use rayon::prelude::*;

use crate::config::FlowConfig;
use crate::video::Frame;

/// Smallest side a pyramid level may have before the pyramid stops growing
const MIN_LEVEL_SIZE: usize = 16;

/// Determinant below which the structure tensor is treated as singular
const MIN_DETERMINANT: f32 = 1e-4;

/// Updates smaller than this (px) end the refinement at a level
const CONVERGENCE_EPSILON: f32 = 0.01;

/// Dense field of displacement vectors, one per grid sample.
///
/// Vectors are stored in source-frame pixels regardless of the raster the
/// flow was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: usize,
    height: usize,
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl FlowField {
    /// All-zero field of the given grid size
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            dx: vec![0.0; width * height],
            dy: vec![0.0; width * height],
        }
    }

    /// Field where every sample has the same displacement
    pub fn uniform(width: usize, height: usize, dx: f32, dy: f32) -> Self {
        Self {
            width,
            height,
            dx: vec![dx; width * height],
            dy: vec![dy; width * height],
        }
    }

    /// Build a field from row-major `(dx, dy)` vectors.
    ///
    /// Returns `None` when the vector count does not match the grid size.
    pub fn from_vectors(width: usize, height: usize, vectors: &[(f32, f32)]) -> Option<Self> {
        if vectors.len() != width * height {
            return None;
        }

        let (dx, dy) = vectors.iter().copied().unzip();
        Some(Self { width, height, dx, dy })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of displacement samples
    pub fn len(&self) -> usize {
        self.dx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dx.is_empty()
    }

    /// Displacement at a grid position
    pub fn get(&self, x: usize, y: usize) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y * self.width + x;
        Some((self.dx[i], self.dy[i]))
    }

    /// Overwrite the displacement at a grid position
    pub fn set(&mut self, x: usize, y: usize, dx: f32, dy: f32) {
        if x < self.width && y < self.height {
            let i = y * self.width + x;
            self.dx[i] = dx;
            self.dy[i] = dy;
        }
    }

    /// Horizontal components in row-major order
    pub fn dx(&self) -> &[f32] {
        &self.dx
    }

    /// Vertical components in row-major order
    pub fn dy(&self) -> &[f32] {
        &self.dy
    }

    /// Iterate over `(dx, dy)` vectors in row-major order
    pub fn vectors(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.dx.iter().copied().zip(self.dy.iter().copied())
    }

    /// Euclidean norm of every vector
    pub fn magnitudes(&self) -> Vec<f32> {
        self.vectors().map(|(dx, dy)| (dx * dx + dy * dy).sqrt()).collect()
    }

    /// Multiply every vector by `factor`
    pub fn scale(&mut self, factor: f32) {
        self.dx.iter_mut().for_each(|v| *v *= factor);
        self.dy.iter_mut().for_each(|v| *v *= factor);
    }
}

/// Computes dense displacement fields between frame pairs
#[derive(Debug, Clone)]
pub struct FlowExtractor {
    config: FlowConfig,
}

impl FlowExtractor {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Flow from `current` to `next`, in source-frame pixels.
    ///
    /// Both frames are converted to intensity and downscaled to the
    /// configured analysis size first.
    pub fn extract(&self, current: &Frame, next: &Frame) -> FlowField {
        let first = current.luma(self.config.max_dimension);
        let mut second = next.luma(self.config.max_dimension);

        if second.dimensions() != first.dimensions() {
            second = imageops::resize(
                &second,
                first.width(),
                first.height(),
                imageops::FilterType::Triangle,
            );
        }

        let mut field = self.extract_luma(&first, &second);

        if first.width() > 0 && current.width() != first.width() {
            field.scale(current.width() as f32 / first.width() as f32);
        }

        field
    }

    /// Flow between two equally sized intensity rasters, in raster pixels
    pub fn extract_luma(&self, first: &GrayImage, second: &GrayImage) -> FlowField {
        let step = self.config.grid_step;
        let (width, height) = (first.width() as usize, first.height() as usize);
        let grid_w = (width + step - 1) / step;
        let grid_h = (height + step - 1) / step;

        if width == 0 || height == 0 {
            return FlowField::zeros(0, 0);
        }

        let pyramid_a = Pyramid::build(Plane::from_gray(first), self.config.pyramid_levels);
        let pyramid_b = Pyramid::build(Plane::from_gray(second), self.config.pyramid_levels);
        let gradients: Vec<(Plane, Plane)> = pyramid_a.levels.iter().map(Plane::gradients).collect();

        let rows: Vec<Vec<(f32, f32)>> = (0..grid_h)
            .into_par_iter()
            .map(|gy| {
                (0..grid_w)
                    .map(|gx| {
                        let point = ((gx * step) as f32, (gy * step) as f32);
                        self.track_point(point, &pyramid_a, &pyramid_b, &gradients)
                    })
                    .collect()
            })
            .collect();

        let vectors: Vec<(f32, f32)> = rows.into_iter().flatten().collect();
        FlowField::from_vectors(grid_w, grid_h, &vectors)
            .unwrap_or_else(|| FlowField::zeros(grid_w, grid_h))
    }

    /// Coarse-to-fine Lucas-Kanade for a single point
    fn track_point(
        &self,
        point: (f32, f32),
        first: &Pyramid,
        second: &Pyramid,
        gradients: &[(Plane, Plane)],
    ) -> (f32, f32) {
        let radius = self.config.window_radius as isize;
        let mut guess = (0.0f32, 0.0f32);

        for level in (0..first.levels.len()).rev() {
            let scale = (1usize << level) as f32;
            let (px, py) = (point.0 / scale, point.1 / scale);
            let image_a = &first.levels[level];
            let image_b = &second.levels[level];
            let (grad_x, grad_y) = &gradients[level];

            // Structure tensor over the window
            let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);
            for wy in -radius..=radius {
                for wx in -radius..=radius {
                    let (sx, sy) = (px + wx as f32, py + wy as f32);
                    let ix = grad_x.sample(sx, sy);
                    let iy = grad_y.sample(sx, sy);
                    gxx += ix * ix;
                    gxy += ix * iy;
                    gyy += iy * iy;
                }
            }

            let det = gxx * gyy - gxy * gxy;
            let mut refinement = (0.0f32, 0.0f32);

            if det.abs() > MIN_DETERMINANT {
                for _ in 0..self.config.iterations {
                    let (mut bx, mut by) = (0.0f32, 0.0f32);
                    for wy in -radius..=radius {
                        for wx in -radius..=radius {
                            let (sx, sy) = (px + wx as f32, py + wy as f32);
                            let diff = image_a.sample(sx, sy)
                                - image_b.sample(
                                    sx + guess.0 + refinement.0,
                                    sy + guess.1 + refinement.1,
                                );
                            bx += diff * grad_x.sample(sx, sy);
                            by += diff * grad_y.sample(sx, sy);
                        }
                    }

                    let eta_x = (gyy * bx - gxy * by) / det;
                    let eta_y = (gxx * by - gxy * bx) / det;
                    if !eta_x.is_finite() || !eta_y.is_finite() {
                        break;
                    }

                    refinement.0 += eta_x;
                    refinement.1 += eta_y;

                    if eta_x.abs() < CONVERGENCE_EPSILON && eta_y.abs() < CONVERGENCE_EPSILON {
                        break;
                    }
                }
            }

            guess = (guess.0 + refinement.0, guess.1 + refinement.1);
            if level > 0 {
                guess = (guess.0 * 2.0, guess.1 * 2.0);
            }
        }

        guess
    }
}

/// Single-channel float raster with clamp-to-edge sampling
#[derive(Debug, Clone)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    fn at(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (ix, iy) = (x0 as isize, y0 as isize);

        let top = self.at(ix, iy) * (1.0 - fx) + self.at(ix + 1, iy) * fx;
        let bottom = self.at(ix, iy + 1) * (1.0 - fx) + self.at(ix + 1, iy + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Half-resolution copy using 2x2 box averaging
    fn downsample(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width * height);

        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = ((x * 2) as isize, (y * 2) as isize);
                let sum = self.at(sx, sy)
                    + self.at(sx + 1, sy)
                    + self.at(sx, sy + 1)
                    + self.at(sx + 1, sy + 1);
                data.push(sum * 0.25);
            }
        }

        Self { width, height, data }
    }

    /// Central-difference gradients (x, y)
    fn gradients(&self) -> (Plane, Plane) {
        let mut gx = Vec::with_capacity(self.data.len());
        let mut gy = Vec::with_capacity(self.data.len());

        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                gx.push((self.at(x + 1, y) - self.at(x - 1, y)) * 0.5);
                gy.push((self.at(x, y + 1) - self.at(x, y - 1)) * 0.5);
            }
        }

        (
            Plane { width: self.width, height: self.height, data: gx },
            Plane { width: self.width, height: self.height, data: gy },
        )
    }
}

/// Image pyramid, level 0 at full analysis resolution
struct Pyramid {
    levels: Vec<Plane>,
}

impl Pyramid {
    fn build(base: Plane, max_levels: usize) -> Self {
        let mut levels = vec![base];

        while levels.len() < max_levels {
            let last = &levels[levels.len() - 1];
            if last.width / 2 < MIN_LEVEL_SIZE || last.height / 2 < MIN_LEVEL_SIZE {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }

        Self { levels }
    }
}
