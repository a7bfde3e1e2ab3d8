//! 3D volumes as NIfTI-1 (`.nii` or `.nii.gz`).
//!
//! Voxel data is `[X, Y, Z]` on disk and `[Z, Y, X]` in a tensor.

use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::Matrix3;
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::debug;

use histostack_core::image::Image;
use histostack_core::mri::Mri;
use histostack_core::spatial::{Direction3, Point3, Spacing3, Vector3};

/// Row-major 4x4 voxel-to-world matrix from the header: sform if set, else
/// qform, else plain pixdim scaling.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 4] {
    let f = |v: f32| v as f64;
    if header.sform_code > 0 {
        let row = |r: [f32; 4]| [f(r[0]), f(r[1]), f(r[2]), f(r[3])];
        return [row(header.srow_x), row(header.srow_y), row(header.srow_z), [0.0, 0.0, 0.0, 1.0]];
    }

    let (dx, dy, dz) = (f(header.pixdim[1]), f(header.pixdim[2]), f(header.pixdim[3]));
    if header.qform_code > 0 {
        let (b, c, d) = (f(header.quatern_b), f(header.quatern_c), f(header.quatern_d));
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;
        return [
            [(a * a + b * b - c * c - d * d) * dx, 2.0 * (b * c - a * d) * dy, 2.0 * (b * d + a * c) * dz, f(header.quatern_x)],
            [2.0 * (b * c + a * d) * dx, (a * a + c * c - b * b - d * d) * dy, 2.0 * (c * d - a * b) * dz, f(header.quatern_y)],
            [2.0 * (b * d - a * c) * dx, 2.0 * (c * d + a * b) * dy, (a * a + d * d - c * c - b * b) * dz, f(header.quatern_z)],
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    [
        [dx, 0.0, 0.0, 0.0],
        [0.0, dy, 0.0, 0.0],
        [0.0, 0.0, dz, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Split a voxel-to-world matrix into origin, spacing and direction cosines.
fn geometry(affine: &[[f64; 4]; 4]) -> (Point3, Spacing3, Direction3) {
    let origin = Point3::new(affine[0][3], affine[1][3], affine[2][3]);
    let mut spacing = Spacing3::zeros();
    let mut columns = [Vector3::zeros(); 3];
    for axis in 0..3 {
        let column = Vector3::new(affine[0][axis], affine[1][axis], affine[2][axis]);
        let norm = column.norm();
        spacing[axis] = if norm > 1e-9 { norm } else { 1.0 };
        columns[axis] = if norm > 1e-9 {
            column / norm
        } else {
            let mut unit = Vector3::zeros();
            unit[axis] = 1.0;
            unit
        };
    }
    (origin, spacing, Matrix3::from_columns(&columns))
}

/// Read a 3D NIfTI volume with its origin, spacing and direction.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let object = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let (origin, spacing, direction) = geometry(&header_affine(object.header()));

    let voxels = object
        .into_volume()
        .into_ndarray::<f32>()
        .with_context(|| format!("Failed to convert {} to an array", path.display()))?;
    let shape = voxels.shape().to_vec();
    if shape.len() != 3 {
        anyhow::bail!("Expected a 3D NIfTI file, found {} dimensions in {}", shape.len(), path.display());
    }

    // Logical [X, Y, Z] order regardless of the array's memory layout.
    let values: Vec<f32> = voxels.as_standard_layout().iter().copied().collect();
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([shape[0], shape[1], shape[2]])), device)
        .permute([2, 1, 0]);

    debug!("read volume {} of size {:?}", path.display(), shape);
    Ok(Image::new(tensor, origin, spacing, direction))
}

/// Write a volume as NIfTI with an sform carrying its geometry.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Image<B, 3>) -> Result<()> {
    let path = path.as_ref();
    let [nx, ny, nz] = volume.size();
    let values: Vec<f32> = volume
        .data()
        .clone()
        .permute([2, 1, 0])
        .into_data()
        .iter::<f32>()
        .collect();
    let array = Array3::from_shape_vec((nx, ny, nz), values)
        .with_context(|| format!("Volume data does not match size {:?}", volume.size()))?;

    let spacing = volume.spacing();
    let direction = volume.direction();
    let origin = volume.origin();
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0];
    header.sform_code = 1;
    let row = |r: usize| {
        [
            (direction[(r, 0)] * spacing[0]) as f32,
            (direction[(r, 1)] * spacing[1]) as f32,
            (direction[(r, 2)] * spacing[2]) as f32,
            origin[r] as f32,
        ]
    };
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    debug!("wrote volume {} of size {:?}", path.display(), volume.size());
    Ok(())
}

/// Load the MRI reference and resample it onto the stack grid.
///
/// Intensities are rescaled to `0..=255` and the file's spacing multiplied
/// by `resize_factor` before resampling onto `spacing`/`size`.
pub fn read_mri<B: Backend, P: AsRef<Path>>(
    path: P,
    resize_factor: f64,
    spacing: Spacing3,
    size: [usize; 3],
    device: &B::Device,
) -> Result<Mri<B>> {
    let raw = read_volume::<B, _>(path, device)?;
    Ok(Mri::from_raw(&raw, resize_factor, spacing, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use histostack_core::spatial::spacing;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_round_trip_keeps_geometry_and_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("volume.nii");
        let device = Default::default();

        // tensor [Z, Y, X] = [2, 3, 4]
        let pixels: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let volume = Image::<TestBackend, 3>::from_pixels(pixels.clone(), [2, 3, 4], spacing([0.5, 0.25, 2.0]), &device)
            .with_origin(Point3::new(1.0, -2.0, 3.0));

        write_volume(&path, &volume)?;
        let read = read_volume::<TestBackend, _>(&path, &device)?;

        assert_eq!(read.shape(), [2, 3, 4]);
        assert_eq!(read.to_pixels(), pixels);
        assert!((read.spacing() - volume.spacing()).norm() < 1e-6);
        assert!((read.origin() - volume.origin()).norm() < 1e-6);
        assert!((read.direction() - Direction3::identity()).norm() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_reads_plain_array() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("plain.nii");
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&path).write_nifti(&array)?;

        let image = read_volume::<TestBackend, _>(&path, &Default::default())?;
        assert_eq!(image.shape(), [5, 4, 3]);
        assert_eq!(image.size(), [3, 4, 5]);

        // voxel (x=2, y=1, z=3) sits at tensor [3, 1, 2]
        let pixels = image.to_pixels();
        assert_eq!(pixels[3 * 12 + 3 + 2], 312.0);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_volume::<TestBackend, _>(dir.path().join("none.nii"), &Default::default()).is_err());
    }
}
