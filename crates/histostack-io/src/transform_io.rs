//! Transform files in the ITK text format.
//!
//! ```text
//! #Insight Transform File V1.0
//! #Transform 0
//! Transform: CenteredRigid2DTransform_double_2_2
//! Parameters: 0.1 12 14 0.5 -0.25
//! FixedParameters:
//! ```
//!
//! A B-spline transform is written as two blocks: the deformation first,
//! then its bulk transform.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use histostack_core::spatial::{Point2, Point3};
use histostack_core::transform::{ParametricTransform, Rigid3D, Transform2D, TransformKind, RIGID3D_TYPE_TAG};

const HEADER: &str = "#Insight Transform File V1.0";

/// One `#Transform n` block.
#[derive(Debug, Clone, PartialEq)]
struct TransformBlock {
    type_tag: String,
    parameters: Vec<f64>,
    fixed_parameters: Vec<f64>,
}

fn join(values: &[f64]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

fn push_block<T: ParametricTransform<D>, const D: usize>(out: &mut String, index: usize, transform: &T) {
    out.push_str(&format!("#Transform {}\n", index));
    out.push_str(&format!("Transform: {}\n", transform.type_tag()));
    out.push_str(&format!("Parameters: {}\n", join(&transform.parameters())));
    out.push_str(&format!("FixedParameters: {}\n", join(&transform.fixed_parameters())));
}

/// Text of a slice transform file.
pub fn format_transform(transform: &Transform2D) -> String {
    let mut out = format!("{}\n", HEADER);
    push_block(&mut out, 0, transform);
    if let Transform2D::BSplineDeformable(bspline) = transform {
        push_block(&mut out, 1, bspline.bulk());
    }
    out
}

/// Text of a rigid 3D transform file.
pub fn format_rigid3d(transform: &Rigid3D) -> String {
    let mut out = format!("{}\n", HEADER);
    push_block(&mut out, 0, transform);
    out
}

fn parse_values(line: &str, field: &str, line_number: usize) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("line {}: bad {} value '{}'", line_number, field, token))
        })
        .collect()
}

fn parse_blocks(text: &str) -> Result<Vec<TransformBlock>> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, first)) if first.trim() == HEADER => {}
        _ => bail!("missing '{}' header", HEADER),
    }

    let mut blocks: Vec<TransformBlock> = Vec::new();
    for (index, raw) in lines {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("line {}: expected 'Key: value', got '{}'", line_number, line))?;
        match key.trim() {
            "Transform" => blocks.push(TransformBlock {
                type_tag: value.trim().to_string(),
                parameters: Vec::new(),
                fixed_parameters: Vec::new(),
            }),
            field @ ("Parameters" | "FixedParameters") => {
                let block = blocks
                    .last_mut()
                    .ok_or_else(|| anyhow!("line {}: {} before any Transform", line_number, field))?;
                let values = parse_values(value, field, line_number)?;
                if field == "Parameters" {
                    block.parameters = values;
                } else {
                    block.fixed_parameters = values;
                }
            }
            other => bail!("line {}: unknown field '{}'", line_number, other),
        }
    }

    if blocks.is_empty() {
        bail!("no transform found");
    }
    Ok(blocks)
}

fn linear_from_block(block: &TransformBlock) -> Result<Transform2D> {
    let kind = TransformKind::from_type_tag(&block.type_tag)?;
    let mut transform = Transform2D::identity(kind, Point2::origin());
    transform.set_fixed_parameters(&block.fixed_parameters)?;
    transform.set_parameters(&block.parameters)?;
    Ok(transform)
}

/// Parse a slice transform.
///
/// Unknown type tags and parameter counts that do not fit the type are
/// errors.
pub fn parse_transform(text: &str) -> Result<Transform2D> {
    let blocks = parse_blocks(text)?;
    let mut transform = linear_from_block(&blocks[0])?;
    if let Transform2D::BSplineDeformable(bspline) = &mut transform {
        if let Some(bulk) = blocks.get(1) {
            let bulk = linear_from_block(bulk)?;
            if !bulk.kind().is_linear() {
                bail!("bulk transform of a B-spline must be linear, got {}", bulk.kind());
            }
            *bspline.bulk_mut() = bulk;
        }
    }
    Ok(transform)
}

/// Parse a rigid 3D transform.
pub fn parse_rigid3d(text: &str) -> Result<Rigid3D> {
    let blocks = parse_blocks(text)?;
    let block = &blocks[0];
    if block.type_tag != RIGID3D_TYPE_TAG {
        bail!("expected {}, found {}", RIGID3D_TYPE_TAG, block.type_tag);
    }
    let mut transform = Rigid3D::identity(Point3::origin());
    transform.set_fixed_parameters(&block.fixed_parameters)?;
    transform.set_parameters(&block.parameters)?;
    Ok(transform)
}

pub fn write_transform<P: AsRef<Path>>(path: P, transform: &Transform2D) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format_transform(transform))
        .with_context(|| format!("Failed to write transform {}", path.display()))
}

pub fn read_transform<P: AsRef<Path>>(path: P) -> Result<Transform2D> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read transform {}", path.display()))?;
    parse_transform(&text).with_context(|| format!("Invalid transform file {}", path.display()))
}

pub fn write_rigid3d<P: AsRef<Path>>(path: P, transform: &Rigid3D) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format_rigid3d(transform))
        .with_context(|| format!("Failed to write transform {}", path.display()))
}

pub fn read_rigid3d<P: AsRef<Path>>(path: P) -> Result<Rigid3D> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read transform {}", path.display()))?;
    parse_rigid3d(&text).with_context(|| format!("Invalid transform file {}", path.display()))
}
