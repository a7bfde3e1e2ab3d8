//! Cubic B-spline free-form deformation on top of a linear bulk transform.
//!
//! The mapping is `T(x) = bulk(x) + d(x)`, where `d` is the cubic B-spline
//! interpolation of control-point displacements laid out on a regular grid.
//! Points whose 4x4 support leaves the grid get no displacement.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};

use super::error::{Result, TransformError};
use super::linear::Transform2D;
use super::trait_::ParametricTransform;
use crate::spatial::{Point2, Vector2};

const SPLINE_ORDER: usize = 3;
const SUPPORT: usize = SPLINE_ORDER + 1;

/// Regular grid of control points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlGrid {
    /// Number of control points along x and y.
    pub size: [usize; 2],
    /// Physical position of control point `(0, 0)`.
    pub origin: Point2,
    /// Physical distance between control points.
    pub spacing: Vector2,
}

impl ControlGrid {
    /// A grid with no control points; the deformation is zero everywhere.
    pub fn empty() -> Self {
        Self {
            size: [0, 0],
            origin: Point2::origin(),
            spacing: Vector2::new(1.0, 1.0),
        }
    }

    /// Grid covering the region `[origin, origin + extent]` with
    /// `nodes_inside` intervals per axis, padded so every point of the region
    /// has a full cubic support.
    pub fn covering(origin: Point2, extent: Vector2, nodes_inside: usize) -> Self {
        let nodes_inside = nodes_inside.max(1);
        let spacing = extent.map(|e| if e > 0.0 { e / nodes_inside as f64 } else { 1.0 });
        Self {
            size: [nodes_inside + SPLINE_ORDER; 2],
            origin: origin - spacing,
            spacing,
        }
    }

    pub fn len(&self) -> usize {
        self.size[0] * self.size[1]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[nx, ny, origin_x, origin_y, spacing_x, spacing_y]`
    pub fn description(&self) -> Vec<f64> {
        vec![
            self.size[0] as f64,
            self.size[1] as f64,
            self.origin.x,
            self.origin.y,
            self.spacing.x,
            self.spacing.y,
        ]
    }

    pub fn from_description(values: &[f64]) -> Result<Self> {
        TransformError::check_count(6, values.len())?;
        if values[0] < 0.0 || values[1] < 0.0 || values[4] <= 0.0 || values[5] <= 0.0 {
            return Err(TransformError::Unsupported(format!(
                "invalid control grid description {:?}",
                values
            )));
        }
        Ok(Self {
            size: [values[0].round() as usize, values[1].round() as usize],
            origin: Point2::new(values[2], values[3]),
            spacing: Vector2::new(values[4], values[5]),
        })
    }

    /// Flat control-point indices and weights supporting `point`, or `None`
    /// if the support is not fully inside the grid.
    fn support(&self, point: &Point2) -> Option<[(usize, f64); SUPPORT * SUPPORT]> {
        if self.is_empty() {
            return None;
        }
        let u = (point - self.origin).component_div(&self.spacing);
        let base_x = u.x.floor() as i64 - 1;
        let base_y = u.y.floor() as i64 - 1;
        let nx = self.size[0] as i64;
        let ny = self.size[1] as i64;
        if base_x < 0 || base_y < 0 || base_x + SUPPORT as i64 > nx || base_y + SUPPORT as i64 > ny {
            return None;
        }

        let bx = cubic_basis(u.x - u.x.floor());
        let by = cubic_basis(u.y - u.y.floor());

        let mut out = [(0usize, 0.0f64); SUPPORT * SUPPORT];
        for j in 0..SUPPORT {
            for i in 0..SUPPORT {
                let flat = (base_y as usize + j) * self.size[0] + base_x as usize + i;
                out[j * SUPPORT + i] = (flat, bx[i] * by[j]);
            }
        }
        Some(out)
    }
}

/// Cubic B-spline weights for the four nodes around fractional offset `u`.
fn cubic_basis(u: f64) -> [f64; SUPPORT] {
    let u2 = u * u;
    let u3 = u2 * u;
    [
        (1.0 - u).powi(3) / 6.0,
        (3.0 * u3 - 6.0 * u2 + 4.0) / 6.0,
        (-3.0 * u3 + 3.0 * u2 + 3.0 * u + 1.0) / 6.0,
        u3 / 6.0,
    ]
}

/// B-spline deformable transform with a linear bulk transform.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineDeformable {
    grid: ControlGrid,
    /// All x displacements, then all y displacements.
    coefficients: Vec<f64>,
    bulk: Transform2D,
}

impl BSplineDeformable {
    /// Zero deformation on `grid` on top of `bulk`.
    pub fn from_bulk(bulk: Transform2D, grid: ControlGrid) -> Result<Self> {
        if !bulk.kind().is_linear() {
            return Err(TransformError::Unsupported(
                "bulk transform of a B-spline must be linear".to_string(),
            ));
        }
        Ok(Self {
            coefficients: vec![0.0; 2 * grid.len()],
            grid,
            bulk,
        })
    }

    /// No control points yet; only the bulk transform acts.
    pub(crate) fn empty(bulk: Transform2D) -> Self {
        Self {
            grid: ControlGrid::empty(),
            coefficients: Vec::new(),
            bulk,
        }
    }

    pub fn grid(&self) -> &ControlGrid {
        &self.grid
    }

    pub fn bulk(&self) -> &Transform2D {
        &self.bulk
    }

    pub fn bulk_mut(&mut self) -> &mut Transform2D {
        &mut self.bulk
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Replace the grid, resetting all displacements to zero.
    pub fn set_grid(&mut self, grid: ControlGrid) {
        self.grid = grid;
        self.coefficients = vec![0.0; 2 * grid.len()];
    }

    /// Displacement `d(x)` at a single point.
    pub fn displacement(&self, point: &Point2) -> Vector2 {
        let n = self.grid.len();
        match self.grid.support(point) {
            Some(support) => support.iter().fold(Vector2::zeros(), |acc, &(idx, w)| {
                acc + Vector2::new(self.coefficients[idx], self.coefficients[n + idx]) * w
            }),
            None => Vector2::zeros(),
        }
    }
}

impl ParametricTransform<2> for BSplineDeformable {
    fn type_tag(&self) -> String {
        super::kind::TransformKind::BSplineDeformable.type_tag()
    }

    fn parameters(&self) -> Vec<f64> {
        self.coefficients.clone()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        TransformError::check_count(self.coefficients.len(), parameters.len())?;
        self.coefficients.copy_from_slice(parameters);
        Ok(())
    }

    fn fixed_parameters(&self) -> Vec<f64> {
        self.grid.description()
    }

    fn set_fixed_parameters(&mut self, fixed: &[f64]) -> Result<()> {
        let grid = ControlGrid::from_description(fixed)?;
        self.set_grid(grid);
        Ok(())
    }

    fn transform_point(&self, point: &Point2) -> Point2 {
        self.bulk.transform_point(point) + self.displacement(point)
    }

    fn map_points<B: Backend>(&self, parameters: Tensor<B, 1>, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let bulk = self.bulk.transform_points(points.clone());
        if self.grid.is_empty() {
            return bulk;
        }

        let device = points.device();
        let [n, _] = points.dims();
        let host: Vec<f32> = points.into_data().iter::<f32>().collect();

        // Weights depend only on the points, so they are built on the host;
        // the gather from `parameters` keeps the coefficients differentiable.
        let taps = SUPPORT * SUPPORT;
        let mut indices = Vec::with_capacity(n * taps);
        let mut weights = Vec::with_capacity(n * taps);
        for p in host.chunks_exact(2) {
            let point = Point2::new(p[0] as f64, p[1] as f64);
            match self.grid.support(&point) {
                Some(support) => {
                    for (idx, w) in support {
                        indices.push(idx as i64);
                        weights.push(w as f32);
                    }
                }
                None => {
                    indices.extend(std::iter::repeat(0i64).take(taps));
                    weights.extend(std::iter::repeat(0.0f32).take(taps));
                }
            }
        }

        let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, Shape::new([n * taps])), &device);
        let weights = Tensor::<B, 2>::from_data(TensorData::new(weights, Shape::new([n, taps])), &device);

        let count = self.grid.len();
        let coeff_x = parameters.clone().slice([0..count]).select(0, indices.clone()).reshape([n, taps]);
        let coeff_y = parameters.slice([count..2 * count]).select(0, indices).reshape([n, taps]);

        let dx = (coeff_x * weights.clone()).sum_dim(1);
        let dy = (coeff_y * weights).sum_dim(1);

        bulk + Tensor::cat(vec![dx, dy], 1)
    }
}
