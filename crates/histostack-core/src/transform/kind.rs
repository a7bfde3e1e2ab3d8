//! Transform family tags.

use std::fmt;
use std::str::FromStr;

use super::error::TransformError;

/// The kinds of 2D transform a slice can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Identity,
    Translation,
    CenteredRigid2D,
    CenteredSimilarity2D,
    CenteredAffine,
    Affine,
    BSplineDeformable,
}

impl TransformKind {
    pub const ALL: [TransformKind; 7] = [
        TransformKind::Identity,
        TransformKind::Translation,
        TransformKind::CenteredRigid2D,
        TransformKind::CenteredSimilarity2D,
        TransformKind::CenteredAffine,
        TransformKind::Affine,
        TransformKind::BSplineDeformable,
    ];

    /// Short name, also used as the directory name for per-stage output.
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Identity => "IdentityTransform",
            TransformKind::Translation => "TranslationTransform",
            TransformKind::CenteredRigid2D => "CenteredRigid2DTransform",
            TransformKind::CenteredSimilarity2D => "CenteredSimilarity2DTransform",
            TransformKind::CenteredAffine => "CenteredAffineTransform",
            TransformKind::Affine => "AffineTransform",
            TransformKind::BSplineDeformable => "BSplineDeformableTransform",
        }
    }

    /// Full type tag written to transform files.
    pub fn type_tag(&self) -> String {
        format!("{}_double_2_2", self.name())
    }

    /// Parse a full type tag such as `CenteredRigid2DTransform_double_2_2`.
    pub fn from_type_tag(tag: &str) -> Result<Self, TransformError> {
        let name = tag.split('_').next().unwrap_or_default();
        name.parse()
    }

    /// Whether the kind is a matrix-plus-offset transform.
    pub fn is_linear(&self) -> bool {
        !matches!(self, TransformKind::BSplineDeformable)
    }

    /// Whether the center is part of the optimised parameters.
    pub fn has_center_parameters(&self) -> bool {
        matches!(
            self,
            TransformKind::CenteredRigid2D
                | TransformKind::CenteredSimilarity2D
                | TransformKind::CenteredAffine
        )
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformKind {
    type Err = TransformError;

    /// Accepts the short name (`CenteredAffineTransform`) or the name without
    /// the `Transform` suffix (`CenteredAffine`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        TransformKind::ALL
            .iter()
            .copied()
            .find(|kind| {
                let name = kind.name();
                trimmed == name || Some(trimmed) == name.strip_suffix("Transform")
            })
            .ok_or_else(|| TransformError::UnknownType(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for kind in TransformKind::ALL {
            let tag = kind.type_tag();
            assert_eq!(TransformKind::from_type_tag(&tag).unwrap(), kind);
        }
    }

    #[test]
    fn test_short_names() {
        assert_eq!("CenteredRigid2D".parse::<TransformKind>().unwrap(), TransformKind::CenteredRigid2D);
        assert_eq!("AffineTransform".parse::<TransformKind>().unwrap(), TransformKind::Affine);
        assert!(matches!(
            "QuadraticTransform".parse::<TransformKind>(),
            Err(TransformError::UnknownType(_))
        ));
    }
}
