use crate::error::NormalizeError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::fs;
use std::path::Path;

/// Lanczos3 reaches this many source pixels either side of a sample.
const FILTER_SUPPORT: u64 = 3;

/// Target size after the aspect-preserving resize: width `dim`, height `round(h * dim / w)`.
///
/// The height is exact integer arithmetic and may exceed what an image buffer can hold;
/// callers crop before resampling.
pub fn scaled_dimensions(width: u32, height: u32, dim: u32) -> Result<(u32, u64), NormalizeError> {
    if width == 0 || height == 0 {
        return Err(NormalizeError::EmptyImage { width, height });
    }

    let numerator = 2 * height as u128 * dim as u128 + width as u128;
    let new_height = (numerator / (2 * width as u128)) as u64;
    if new_height == 0 {
        return Err(NormalizeError::DegenerateSize { width, height, dim });
    }

    Ok((dim, new_height))
}

/// Size of the top-left crop. Short images are not padded.
pub fn crop_dimensions(resized_width: u32, resized_height: u64, dim: u32) -> (u32, u32) {
    (resized_width.min(dim), resized_height.min(dim as u64) as u32)
}

/// Source rows that reach the top `dim` rows of the resized image, filter support included.
///
/// Those rows form a `width`-tall square of the source, since the resize maps `width` to `dim`.
pub fn source_rows(width: u32, height: u32, dim: u32) -> u32 {
    let reach = FILTER_SUPPORT * (width as u64).div_ceil(dim.max(1) as u64).max(1);
    (width as u64 + reach).min(height as u64) as u32
}

/// Open and decode an image. With `unlimited_pixels` the decoder's allocation
/// limits are lifted for this reader only, so very large page scans load.
pub fn open_image(path: &Path, unlimited_pixels: bool) -> Result<DynamicImage, NormalizeError> {
    let open_err = |source| NormalizeError::Open {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ImageReader::open(path)
        .map_err(open_err)?
        .with_guessed_format()
        .map_err(open_err)?;

    if unlimited_pixels {
        reader.no_limits();
    }

    reader.decode().map_err(|source| NormalizeError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Resize to width `dim` preserving aspect ratio, then crop the top-left square
pub fn resize_and_crop(img: &DynamicImage, dim: u32) -> Result<DynamicImage, NormalizeError> {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = scaled_dimensions(width, height, dim)?;
    let (crop_width, crop_height) = crop_dimensions(new_width, new_height, dim);

    // Rows below the crop are dropped first so memory stays near dim x dim
    let rows = source_rows(width, height, dim);
    let resized = if rows < height {
        let (_, top_height) = scaled_dimensions(width, rows, dim)?;
        img.crop_imm(0, 0, width, rows)
            .resize_exact(new_width, fit_u32(top_height)?, FilterType::Lanczos3)
    } else {
        img.resize_exact(new_width, fit_u32(new_height)?, FilterType::Lanczos3)
    };

    Ok(resized.crop_imm(0, 0, crop_width, crop_height))
}

fn fit_u32(height: u64) -> Result<u32, NormalizeError> {
    u32::try_from(height).map_err(|_| NormalizeError::TooLarge { height })
}

/// Encode as JPEG, removing any partial file if encoding fails.
pub fn save_jpeg(img: &DynamicImage, greyscale: bool, target: &Path) -> Result<(), NormalizeError> {
    // JPEG holds neither alpha nor 16-bit samples
    let img = if greyscale {
        DynamicImage::ImageLuma8(img.to_luma8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    img.save_with_format(target, ImageFormat::Jpeg)
        .map_err(|source| {
            if target.exists() {
                let _ = fs::remove_file(target);
            }
            NormalizeError::Encode {
                path: target.to_path_buf(),
                source,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn tall_page_scales_down_to_width() {
        assert_eq!(scaled_dimensions(2000, 3000, 1024).unwrap(), (1024, 1536));
        assert_eq!(crop_dimensions(1024, 1536, 1024), (1024, 1024));
    }

    #[test]
    fn wide_page_upscales_and_crop_does_not_pad() {
        assert_eq!(scaled_dimensions(500, 300, 1024).unwrap(), (1024, 614));
        assert_eq!(crop_dimensions(1024, 614, 1024), (1024, 614));
    }

    #[test]
    fn height_is_rounded_not_truncated() {
        // 7 * 10 / 4 = 17.5
        assert_eq!(scaled_dimensions(4, 7, 10).unwrap(), (10, 18));
        // 5 * 10 / 3 = 16.67
        assert_eq!(scaled_dimensions(3, 5, 10).unwrap(), (10, 17));
    }

    #[test]
    fn extreme_aspect_ratio_height_is_exact() {
        // 5_000_000 * 1024 overflows u32; the arithmetic must not saturate
        assert_eq!(
            scaled_dimensions(1, 5_000_000, 1024).unwrap(),
            (1024, 5_120_000_000)
        );
        assert_eq!(crop_dimensions(1024, 5_120_000_000, 1024), (1024, 1024));
    }

    #[test]
    fn source_rows_cover_crop_plus_filter_reach() {
        // Downscale: 2000 wide maps onto 1024, reach is 3 * ceil(2000 / 1024)
        assert_eq!(source_rows(2000, 3000, 1024), 2006);
        // Upscale: 3 source rows either side
        assert_eq!(source_rows(1, 5_000_000, 1024), 4);
        // Short pages keep every row
        assert_eq!(source_rows(500, 300, 1024), 300);
    }

    #[test]
    fn very_tall_sliver_only_resamples_the_top() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 50_000, Rgb([9, 9, 9])));

        let out = resize_and_crop(&img, 16).unwrap();

        assert_eq!(out.dimensions(), (16, 16));
    }

    #[test]
    fn empty_and_degenerate_sizes_are_errors() {
        assert!(matches!(
            scaled_dimensions(0, 100, 1024),
            Err(NormalizeError::EmptyImage { .. })
        ));
        assert!(matches!(
            scaled_dimensions(100, 0, 1024),
            Err(NormalizeError::EmptyImage { .. })
        ));
        assert!(matches!(
            scaled_dimensions(5000, 1, 1024),
            Err(NormalizeError::DegenerateSize { .. })
        ));
    }

    #[test]
    fn resize_and_crop_keeps_top_left() {
        // Top half red, bottom half blue; the crop must only see red
        let mut img = RgbImage::new(40, 80);
        for (_, y, px) in img.enumerate_pixels_mut() {
            *px = if y < 40 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        }

        let out = resize_and_crop(&DynamicImage::ImageRgb8(img), 20).unwrap();
        assert_eq!(out.dimensions(), (20, 20));

        let px = out.to_rgb8().get_pixel(10, 5).0;
        assert!(px[0] > 200 && px[2] < 50, "expected red, got {px:?}");
    }

    #[test]
    fn save_jpeg_writes_greyscale() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jpg");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 200, 30])));

        save_jpeg(&img, true, &target).unwrap();

        let reloaded = image::open(&target).unwrap();
        assert_eq!(reloaded.dimensions(), (16, 16));
        assert_eq!(reloaded.color(), image::ColorType::L8);
    }
}
