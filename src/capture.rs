//! PNG export and summary statistics of the resolved fields.

use image::{GrayImage, Luma, Rgb, RgbImage};
use log::info;

use crate::backend::ComputeBackend;
use crate::error::CaptureError;
use crate::ocean::FrameOutput;
use crate::params::CaptureConfig;

/// Summary of one frame's displacement and normal maps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub min_height_m: f32,
    pub max_height_m: f32,
    pub rms_height_m: f32,
    /// Largest horizontal displacement magnitude (m)
    pub max_horizontal_m: f32,
    /// Largest |1 - |n|| over the normal map
    pub max_normal_error: f32,
    /// Number of NaN/Inf values in either map
    pub non_finite: usize,
}

fn check_len(field: &[f32], size: u32) -> Result<(), CaptureError> {
    let expected = size as usize * size as usize * 4;
    if field.len() != expected {
        return Err(CaptureError::FieldSize {
            expected,
            actual: field.len(),
        });
    }
    Ok(())
}

pub fn field_stats(displacement: &[f32], normals: &[f32]) -> FieldStats {
    let mut stats = FieldStats {
        min_height_m: f32::INFINITY,
        max_height_m: f32::NEG_INFINITY,
        rms_height_m: 0.0,
        max_horizontal_m: 0.0,
        max_normal_error: 0.0,
        non_finite: 0,
    };

    let mut sum_sq = 0.0_f64;
    let mut texels = 0_usize;
    for texel in displacement.chunks_exact(4) {
        if texel.iter().any(|v| !v.is_finite()) {
            stats.non_finite += 1;
            continue;
        }
        let height = texel[0];
        stats.min_height_m = stats.min_height_m.min(height);
        stats.max_height_m = stats.max_height_m.max(height);
        stats.max_horizontal_m = stats.max_horizontal_m.max(texel[2].hypot(texel[3]));
        sum_sq += f64::from(height) * f64::from(height);
        texels += 1;
    }
    if texels > 0 {
        stats.rms_height_m = (sum_sq / texels as f64).sqrt() as f32;
    }

    for texel in normals.chunks_exact(4) {
        if texel.iter().any(|v| !v.is_finite()) {
            stats.non_finite += 1;
            continue;
        }
        let length = glam::Vec3::new(texel[0], texel[1], texel[2]).length();
        stats.max_normal_error = stats.max_normal_error.max((1.0 - length).abs());
    }
    stats
}

/// Height channel remapped from [min, max] to 8-bit grayscale
pub fn height_image(displacement: &[f32], size: u32) -> Result<GrayImage, CaptureError> {
    check_len(displacement, size)?;
    let (min, max) = displacement
        .chunks_exact(4)
        .map(|t| t[0])
        .filter(|h| h.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(h), hi.max(h)));
    let range = (max - min).max(f32::EPSILON);

    Ok(GrayImage::from_fn(size, size, |x, y| {
        let height = displacement[((y * size + x) * 4) as usize];
        let value = ((height - min) / range).clamp(0.0, 1.0);
        Luma([(value * 255.0) as u8])
    }))
}

/// Normals encoded as RGB (n * 0.5 + 0.5)
pub fn normal_image(normals: &[f32], size: u32) -> Result<RgbImage, CaptureError> {
    check_len(normals, size)?;
    let encode = |v: f32| ((v * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0) as u8;

    Ok(RgbImage::from_fn(size, size, |x, y| {
        let i = ((y * size + x) * 4) as usize;
        Rgb([encode(normals[i]), encode(normals[i + 1]), encode(normals[i + 2])])
    }))
}

/// Read back both maps of `output` and write them as PNGs
pub fn save_frame(
    backend: &mut dyn ComputeBackend,
    output: &FrameOutput,
    tex_size: u32,
    config: &CaptureConfig,
    frame_num: usize,
) -> Result<FieldStats, CaptureError> {
    let displacement = backend.read_texture(output.displacement)?;
    let normals = backend.read_texture(output.normal_map)?;

    let height_path = config.height_path(frame_num);
    height_image(&displacement, tex_size)?.save(&height_path)?;
    normal_image(&normals, tex_size)?.save(config.normal_path(frame_num))?;
    info!("captured frame {} to {}", frame_num, height_path.display());

    Ok(field_stats(&displacement, &normals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_of_flat_sea() {
        let displacement = vec![0.0; 16 * 4];
        let normals: Vec<f32> = (0..16).flat_map(|_| [0.0, 1.0, 0.0, 1.0]).collect();
        let stats = field_stats(&displacement, &normals);

        assert_eq!(stats.min_height_m, 0.0);
        assert_eq!(stats.max_height_m, 0.0);
        assert_eq!(stats.rms_height_m, 0.0);
        assert_eq!(stats.max_normal_error, 0.0);
        assert_eq!(stats.non_finite, 0);
    }

    #[test]
    fn test_stats_count_non_finite_texels() {
        let displacement = vec![1.0, 0.0, 3.0, 4.0, f32::NAN, 0.0, 0.0, 0.0];
        let normals = vec![0.0, 2.0, 0.0, 1.0];
        let stats = field_stats(&displacement, &normals);

        assert_eq!(stats.non_finite, 1);
        assert_eq!(stats.max_height_m, 1.0);
        assert_eq!(stats.max_horizontal_m, 5.0);
        assert_eq!(stats.max_normal_error, 1.0);
    }

    #[test]
    fn test_height_image_spans_full_range() {
        let displacement: Vec<f32> = (0..4).flat_map(|i| [i as f32, 0.0, 0.0, 0.0]).collect();
        let image = height_image(&displacement, 2).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn test_normal_image_encoding() {
        let normals = vec![0.0, 1.0, -1.0, 1.0];
        let image = normal_image(&normals, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [127, 255, 0]);
        assert!(normal_image(&normals, 2).is_err());
    }
}
