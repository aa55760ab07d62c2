//! Input tensor construction

use crate::engine::InputTensor;
use crate::error::{Error, Result};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Deterministic pseudo-random UINT8 tensor
///
/// The same shape and seed always produce the same bytes, so latency runs
/// are comparable across boards.
#[must_use]
pub fn synthetic_input(shape: &[usize], seed: u64) -> InputTensor {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = vec![0u8; shape.iter().product()];
    rng.fill_bytes(&mut data);
    InputTensor::new(shape.to_vec(), data)
}

/// Width after scaling to `height`, floored and capped at `max_width`
#[cfg_attr(not(feature = "image-decode"), allow(dead_code))]
fn scaled_width(width: u32, height: u32, target_height: u32, max_width: u32) -> u32 {
    let scaled = u64::from(width) * u64::from(target_height) / u64::from(height.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX).clamp(1, max_width)
}

/// Load a text-line image as an HWC RGB tensor
///
/// The image is scaled to `height` keeping its aspect ratio (width capped at
/// `width`) and padded on the right with white.
///
/// # Errors
///
/// Returns [`Error::ImageDecode`] if the file cannot be decoded, or
/// [`Error::Unavailable`] if no decoder is available on this host.
pub fn load_text_image(path: &Path, height: u32, width: u32) -> Result<InputTensor> {
    let data = decode_and_pad(path, height, width)?;
    Ok(InputTensor::new(
        vec![height as usize, width as usize, 3],
        data,
    ))
}

#[cfg(feature = "image-decode")]
fn decode_and_pad(path: &Path, height: u32, width: u32) -> Result<Vec<u8>> {
    use image::imageops::{self, FilterType};
    use image::{Rgb, RgbImage};

    let img = image::open(path)
        .map_err(|e| Error::ImageDecode(format!("{}: {e}", path.display())))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::ImageDecode(format!("{}: empty image", path.display())));
    }

    let new_width = scaled_width(w, h, height, width);
    let resized = imageops::resize(&img, new_width, height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, &resized, 0, 0);
    Ok(canvas.into_raw())
}

#[cfg(not(feature = "image-decode"))]
fn decode_and_pad(path: &Path, height: u32, width: u32) -> Result<Vec<u8>> {
    run_converter(Path::new("convert"), path, height, width)
}

/// ImageMagick arguments: fit to `width`x`height`, anchor left, pad white
#[cfg(not(feature = "image-decode"))]
fn converter_args(path: &Path, height: u32, width: u32) -> Vec<std::ffi::OsString> {
    use std::ffi::OsString;

    let geometry = format!("{width}x{height}");
    let mut args = vec![path.as_os_str().to_owned()];
    args.extend(
        [
            "-resize",
            geometry.as_str(),
            "-background",
            "white",
            "-gravity",
            "West",
            "-extent",
            geometry.as_str(),
            "rgb:-",
        ]
        .map(OsString::from),
    );
    args
}

#[cfg(not(feature = "image-decode"))]
fn run_converter(program: &Path, path: &Path, height: u32, width: u32) -> Result<Vec<u8>> {
    use std::process::Command;

    let output = Command::new(program)
        .args(converter_args(path, height, width))
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::Unavailable(
                "Could not load test image: no image decoder available".to_string(),
            ),
            _ => Error::IoError(e),
        })?;

    if !output.status.success() {
        return Err(Error::ImageDecode(format!(
            "{}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let expected = width as usize * height as usize * 3;
    if output.stdout.len() != expected {
        return Err(Error::ImageDecode(format!(
            "{}: converter produced {} bytes, expected {expected}",
            path.display(),
            output.stdout.len()
        )));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_input_is_deterministic() {
        let a = synthetic_input(&[224, 224, 3], 42);
        let b = synthetic_input(&[224, 224, 3], 42);
        assert_eq!(a, b);
        assert_eq!(a.data.len(), 224 * 224 * 3);
        assert_eq!(a.shape, vec![224, 224, 3]);
    }

    #[test]
    fn test_synthetic_input_depends_on_seed() {
        let a = synthetic_input(&[1, 8, 8, 3], 42);
        let b = synthetic_input(&[1, 8, 8, 3], 43);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_synthetic_input_is_not_constant() {
        let input = synthetic_input(&[16, 16, 3], 42);
        let first = input.data[0];
        assert!(input.data.iter().any(|&b| b != first));
    }

    #[test]
    fn test_scaled_width() {
        // 200x100 -> height 48 -> width 96
        assert_eq!(scaled_width(200, 100, 48, 320), 96);
        // very wide lines are capped
        assert_eq!(scaled_width(2000, 100, 48, 320), 320);
        // floor, never zero
        assert_eq!(scaled_width(1, 1000, 48, 320), 1);
        assert_eq!(scaled_width(101, 48, 48, 320), 101);
    }

    #[cfg(feature = "image-decode")]
    mod decode {
        use super::*;
        use image::{Rgb, RgbImage};
        use tempfile::TempDir;

        #[test]
        fn test_image_is_resized_and_padded_white() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("line.png");
            RgbImage::from_pixel(100, 24, Rgb([0, 0, 0])).save(&path).unwrap();

            let input = load_text_image(&path, 48, 320).unwrap();
            assert_eq!(input.shape, vec![48, 320, 3]);
            assert_eq!(input.data.len(), 48 * 320 * 3);

            // scaled content is 200 px wide: black at the left, white padding after
            let pixel = |x: usize, y: usize| {
                let i = (y * 320 + x) * 3;
                [input.data[i], input.data[i + 1], input.data[i + 2]]
            };
            assert_eq!(pixel(10, 20), [0, 0, 0]);
            assert_eq!(pixel(300, 20), [255, 255, 255]);
        }

        #[test]
        fn test_corrupt_image_is_decode_error() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("broken.png");
            std::fs::write(&path, b"not a png").unwrap();
            let err = load_text_image(&path, 48, 320).unwrap_err();
            assert!(matches!(err, Error::ImageDecode(_)));
            assert!(err.to_string().starts_with("Could not load test image"));
        }
    }

    #[cfg(not(feature = "image-decode"))]
    mod converter {
        use super::*;
        use crate::verdict::Status;
        use tempfile::TempDir;

        #[test]
        fn test_converter_args_order() {
            let args = converter_args(Path::new("/models/line.png"), 48, 320);
            let args: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
            assert_eq!(
                args,
                [
                    "/models/line.png",
                    "-resize",
                    "320x48",
                    "-background",
                    "white",
                    "-gravity",
                    "West",
                    "-extent",
                    "320x48",
                    "rgb:-",
                ]
            );
        }

        #[test]
        fn test_missing_converter_is_skip() {
            let empty = TempDir::new().unwrap();
            let program = empty.path().join("convert");
            let err = run_converter(&program, Path::new("line.png"), 48, 320).unwrap_err();
            assert!(matches!(err, Error::Unavailable(_)));
            assert_eq!(err.status(), Status::Skip);
            assert!(err.to_string().starts_with("Could not load test image"));
        }

        #[test]
        fn test_failing_converter_is_decode_error() {
            let err = run_converter(Path::new("false"), Path::new("line.png"), 48, 320)
                .unwrap_err();
            assert!(matches!(err, Error::ImageDecode(_)));
            assert_eq!(err.status(), Status::Fail);
        }

        #[test]
        fn test_short_converter_output_is_decode_error() {
            let err = run_converter(Path::new("true"), Path::new("line.png"), 48, 320)
                .unwrap_err();
            let Error::ImageDecode(message) = &err else {
                panic!("expected decode error, got {err:?}");
            };
            assert!(message.contains("produced 0 bytes, expected 46080"));
        }
    }
}
