use std::fs;
use std::path::Path;
use std::process::Command;

use histostack_core::spatial::{Point2, Vector2};
use histostack_core::transform::{ParametricTransform, Transform2D};
use histostack_io::{read_transform, write_transform, Dirs};
use tempfile::tempdir;

const PARAMETERS: &str = "\
metric:
  meanSquares: {}
optimizer:
  maxIterations: 20
  regularStepGradientDescent: {relaxationFactor: 0.5, maxStepLength: 1.0, minStepLength: 0.001, gradientMagnitudeTolerance: 0.0001}
";

fn write_layout(dirs: &Dirs, basenames: &[&str]) {
    let config = dirs.config_dir();
    fs::create_dir_all(config.join("ROIs")).unwrap();
    fs::write(config.join("image_spacings.yml"), "LoRes: [0.05, 0.05, 0.1]\nHiRes: [0.01, 0.01, 0.1]\n").unwrap();
    fs::write(config.join("downsample_ratios.yml"), "LoRes: 4\nHiRes: 8\n").unwrap();
    fs::write(config.join("registration_parameters.yml"), PARAMETERS).unwrap();
    fs::write(config.join("ROIs").join("whole_heart.yml"), "Size: [64, 48]\nTranslation: [0, 0]\n").unwrap();

    fs::create_dir_all(dirs.images_dir()).unwrap();
    fs::write(dirs.image_list(), basenames.join("\n")).unwrap();
}

fn histostack(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_histostack"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .unwrap()
}

fn shift(x: f64, y: f64) -> Transform2D {
    Transform2D::CenteredAffine {
        matrix: nalgebra::Matrix2::identity(),
        center: Point2::origin(),
        translation: Vector2::new(x, y),
    }
}

#[test]
fn test_missing_config_exits_with_failure() {
    let root = tempdir().unwrap();
    let output = histostack(root.path(), &["build-volumes", "Rat24", "run1", "HiResTransforms/CenteredAffineTransform"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_diffusion_then_compose() {
    let root = tempdir().unwrap();
    let dirs = Dirs::new(root.path(), "Rat24", "run1");
    write_layout(&dirs, &["0001", "0002", "0003"]);

    let pairs_dir = dirs.final_transforms_dir("CenteredAffineTransform");
    fs::create_dir_all(&pairs_dir).unwrap();
    write_transform(pairs_dir.join("0001_0002"), &shift(2.0, 0.0)).unwrap();
    write_transform(pairs_dir.join("0002_0003"), &shift(4.0, 0.0)).unwrap();

    let output = histostack(
        root.path(),
        &["compute-diffusion-transforms", "Rat24", "run1", "CenteredAffineTransform", "0.5", "--method", "linear"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let diffusion_dir = dirs.diffusion_transforms_dir("CenteredAffineTransform");
    let bottom = read_transform(diffusion_dir.join("0001")).unwrap();
    let middle = read_transform(diffusion_dir.join("0002")).unwrap();
    let top = read_transform(diffusion_dir.join("0003")).unwrap();
    let origin = Point2::origin();
    assert!((bottom.transform_point(&origin) - Point2::new(1.0, 0.0)).norm() < 1e-9);
    // half way between -2 and 4, at full strength
    assert!((middle.transform_point(&origin) - Point2::new(1.0, 0.0)).norm() < 1e-9);
    assert!((top.transform_point(&origin) - Point2::new(-2.0, 0.0)).norm() < 1e-9);

    let stage_dir = dirs.hi_res_transforms_dir().join("CenteredAffineTransform");
    fs::create_dir_all(&stage_dir).unwrap();
    for basename in ["0001", "0003"] {
        write_transform(stage_dir.join(basename), &shift(0.0, 3.0)).unwrap();
    }
    let rigid = Transform2D::CenteredRigid2D {
        angle: 0.0,
        center: Point2::new(10.0, 10.0),
        translation: Vector2::new(0.0, 3.0),
    };
    write_transform(stage_dir.join("0002"), &rigid).unwrap();
    let output = histostack(
        root.path(),
        &["compose-transform-series", "Rat24", "run1", "CenteredAffineTransform", "CenteredAffineTransform"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let adjusted_dir = dirs.adjusted_transforms_dir("CenteredAffineTransform");
    // boundary slices keep their stage transform
    for basename in ["0001", "0003"] {
        let kept = read_transform(adjusted_dir.join(basename)).unwrap();
        assert!((kept.transform_point(&origin) - Point2::new(0.0, 3.0)).norm() < 1e-9);
        assert_eq!(kept.parameters().len(), 8);
    }
    let adjusted = read_transform(adjusted_dir.join("0002")).unwrap();
    assert!((adjusted.transform_point(&origin) - Point2::new(1.0, 3.0)).norm() < 1e-9);
    assert_eq!(adjusted.parameters().len(), 6);
}
