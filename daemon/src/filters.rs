//! Post-processing filters applied to a wallpaper before it is set.
//!
//! A filter spec is a whitespace separated pipeline such as
//! `"grayscale blur:1.5 brighten:-10"`.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("Unknown filter operation: {0}")]
    UnknownOperation(String),

    #[error("Missing argument for filter operation: {0}")]
    MissingArgument(String),

    #[error("Invalid argument for {op}: {arg}")]
    InvalidArgument { op: String, arg: String },

    #[error("Empty filter spec")]
    Empty,
}

/// One image operation
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Grayscale,
    Invert,
    FlipHorizontal,
    FlipVertical,
    Blur(f32),
    Brighten(i32),
    Contrast(f32),
    HueRotate(i32),
}

impl FilterOp {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Grayscale => image.grayscale(),
            Self::Invert => {
                let mut image = image;
                image.invert();
                image
            }
            Self::FlipHorizontal => image.fliph(),
            Self::FlipVertical => image.flipv(),
            Self::Blur(sigma) => image.blur(*sigma),
            Self::Brighten(value) => image.brighten(*value),
            Self::Contrast(value) => image.adjust_contrast(*value),
            Self::HueRotate(degrees) => image.huerotate(*degrees),
        }
    }
}

/// Parse a filter spec into its operations
pub fn parse_spec(spec: &str) -> Result<Vec<FilterOp>, FilterError> {
    let ops = spec
        .split_whitespace()
        .map(parse_op)
        .collect::<Result<Vec<_>, _>>()?;
    if ops.is_empty() {
        return Err(FilterError::Empty);
    }
    Ok(ops)
}

fn parse_op(token: &str) -> Result<FilterOp, FilterError> {
    let (name, arg) = match token.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (token, None),
    };

    match name.to_lowercase().as_str() {
        "grayscale" | "greyscale" => Ok(FilterOp::Grayscale),
        "invert" => Ok(FilterOp::Invert),
        "fliph" => Ok(FilterOp::FlipHorizontal),
        "flipv" => Ok(FilterOp::FlipVertical),
        "blur" => Ok(FilterOp::Blur(parse_arg(name, arg)?)),
        "brighten" => Ok(FilterOp::Brighten(parse_arg(name, arg)?)),
        "contrast" => Ok(FilterOp::Contrast(parse_arg(name, arg)?)),
        "huerotate" => Ok(FilterOp::HueRotate(parse_arg(name, arg)?)),
        _ => Err(FilterError::UnknownOperation(token.to_string())),
    }
}

fn parse_arg<T: std::str::FromStr>(op: &str, arg: Option<&str>) -> Result<T, FilterError> {
    let arg = arg.ok_or_else(|| FilterError::MissingArgument(op.to_string()))?;
    arg.parse().map_err(|_| FilterError::InvalidArgument {
        op: op.to_string(),
        arg: arg.to_string(),
    })
}

/// Run `spec` on `source` and write the result to `output`
pub fn apply_filter(source: &Path, spec: &str, output: &Path) -> Result<()> {
    let ops = parse_spec(spec)?;

    let image = image::open(source)
        .with_context(|| format!("Failed to load image: {}", source.display()))?;
    let processed = ops.iter().fold(image, |image, op| op.apply(image));

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // JPEG has no alpha channel
    processed
        .to_rgb8()
        .save(output)
        .with_context(|| format!("Failed to write filtered image: {}", output.display()))?;

    log::debug!("Applied filter '{}' to {}", spec, source.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec() {
        assert_eq!(
            parse_spec("grayscale blur:1.5 brighten:-10").unwrap(),
            vec![
                FilterOp::Grayscale,
                FilterOp::Blur(1.5),
                FilterOp::Brighten(-10)
            ]
        );
        assert_eq!(
            parse_spec("  HueRotate:90\tinvert ").unwrap(),
            vec![FilterOp::HueRotate(90), FilterOp::Invert]
        );
    }

    #[test]
    fn test_parse_spec_errors() {
        assert_eq!(parse_spec("   "), Err(FilterError::Empty));
        assert_eq!(
            parse_spec("sepia"),
            Err(FilterError::UnknownOperation("sepia".to_string()))
        );
        assert_eq!(
            parse_spec("blur"),
            Err(FilterError::MissingArgument("blur".to_string()))
        );
        assert!(matches!(
            parse_spec("contrast:lots"),
            Err(FilterError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_apply_filter_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]))
            .save(&source)
            .unwrap();

        let output = dir.path().join("out/wallpaper.jpg");
        apply_filter(&source, "invert fliph", &output).unwrap();
        assert!(output.exists());

        let result = image::open(&output).unwrap().to_rgb8();
        let pixel = result.get_pixel(0, 0).0;
        // JPEG is lossy, only check the inverted channel balance
        assert!(pixel[0] < 128 && pixel[1] > 128 && pixel[2] > 128);
    }

    #[test]
    fn test_apply_filter_rejects_bad_spec_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply_filter(
            &dir.path().join("missing.png"),
            "nope",
            &dir.path().join("o.jpg"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown filter operation"));
    }
}
