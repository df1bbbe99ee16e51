use super::CompressionResult;
use crate::constants::{
    DEFAULT_IMAGE_QUALITY, DEFAULT_MAX_IMAGE_DIMENSION, DEFAULT_MAX_SIZE_MB,
    DEFAULT_USE_BACKGROUND_WORKER, IMAGE_SHRINK_STEP, LIBDEFLATER_HIGH_LEVEL,
    LIBDEFLATER_LOW_LEVEL, MAX_IMAGE_ITERATIONS, MEBIBYTE, OXIPNG_PRESET, ZOPFLI_ITERATIONS,
};
use crate::error::{PipelineError, Result};
use crate::formats::with_extension;
use crate::media::MediaFile;
use crate::utils::format_file_size;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use oxipng::{Deflaters, Options};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::num::NonZeroU8;
use tracing::{debug, info};

/// Caller overrides for image compression. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCompressionOptions {
    pub max_size_mb: Option<f64>,
    pub max_dimension: Option<u32>,
    pub quality: Option<f32>,
    pub use_background_worker: Option<bool>,
}

impl ImageCompressionOptions {
    pub fn new(
        max_size_mb: Option<f64>,
        max_dimension: Option<u32>,
        quality: Option<f32>,
        use_background_worker: Option<bool>,
    ) -> Result<Self> {
        let options = Self {
            max_size_mb,
            max_dimension,
            quality,
            use_background_worker,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        let max_size_mb = self.effective_max_size_mb();
        if !(max_size_mb.is_finite() && max_size_mb > 0.0) {
            return Err(PipelineError::InvalidSizeLimit(max_size_mb));
        }
        if self.effective_max_dimension() == 0 {
            return Err(PipelineError::InvalidDimension(0));
        }
        let quality = self.effective_quality();
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(PipelineError::InvalidImageQuality(quality));
        }
        Ok(())
    }

    pub fn effective_max_size_mb(&self) -> f64 {
        self.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB)
    }

    pub fn effective_max_dimension(&self) -> u32 {
        self.max_dimension.unwrap_or(DEFAULT_MAX_IMAGE_DIMENSION)
    }

    pub fn effective_quality(&self) -> f32 {
        self.quality.unwrap_or(DEFAULT_IMAGE_QUALITY)
    }

    pub fn effective_use_background_worker(&self) -> bool {
        self.use_background_worker
            .unwrap_or(DEFAULT_USE_BACKGROUND_WORKER)
    }

    pub fn max_size_bytes(&self) -> u64 {
        (self.effective_max_size_mb() * MEBIBYTE as f64) as u64
    }
}

/// Resizes and re-encodes an image so it fits the size and dimension envelope.
///
/// PNG input stays PNG; everything else is re-encoded as JPEG. The size limit
/// is best effort: after [`MAX_IMAGE_ITERATIONS`] shrink steps the smallest
/// encode is returned even if it is still over the limit.
///
/// # Errors
/// Any decode, encode or worker failure is reported as
/// `PipelineError::ImageCompression` and no output is produced.
pub async fn compress_image(
    file: &MediaFile,
    options: &ImageCompressionOptions,
) -> Result<CompressionResult> {
    options.validate()?;

    let output = if options.effective_use_background_worker() {
        let source = file.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || encode_within_envelope(&source, &options))
            .await
            .map_err(|e| PipelineError::ImageCompression(format!("worker failed: {}", e)))??
    } else {
        encode_within_envelope(file, options)?
    };

    let result = CompressionResult::new(output, file.size());
    info!(
        "Compressed {} from {} to {} ({:.1}%)",
        file.name,
        format_file_size(result.original_size_bytes),
        format_file_size(result.compressed_size_bytes),
        result.reduction_percent
    );
    Ok(result)
}

/// Downsizes `img` so neither side exceeds `max_dimension`, preserving aspect
/// ratio. Smaller images are returned untouched.
pub fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn image_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ImageCompression(e.to_string())
}

fn encode_within_envelope(file: &MediaFile, options: &ImageCompressionOptions) -> Result<MediaFile> {
    let img = ImageReader::new(Cursor::new(&file.data))
        .with_guessed_format()
        .map_err(image_error)?
        .decode()
        .map_err(image_error)?;

    let format = if file.mime_type.eq_ignore_ascii_case("image/png") {
        ImageFormat::Png
    } else {
        ImageFormat::Jpeg
    };
    let limit = options.max_size_bytes();
    let mut quality = options.effective_quality();
    let mut img = fit_within(img, options.effective_max_dimension());
    let mut best: Option<Vec<u8>> = None;

    for iteration in 0..MAX_IMAGE_ITERATIONS {
        let encoded = match format {
            ImageFormat::Png => optimize_png(&encode(&img, format, quality)?, quality)?,
            _ => encode(&img, format, quality)?,
        };
        let fits = encoded.len() as u64 <= limit;
        debug!(
            "Iteration {}: {}x{} at quality {:.2} -> {} bytes",
            iteration,
            img.width(),
            img.height(),
            quality,
            encoded.len()
        );
        if best.as_ref().map_or(true, |b| encoded.len() < b.len()) {
            best = Some(encoded);
        }
        if fits {
            break;
        }

        let (width, height) = img.dimensions();
        let next_width = ((width as f64 * IMAGE_SHRINK_STEP) as u32).max(1);
        let next_height = ((height as f64 * IMAGE_SHRINK_STEP) as u32).max(1);
        if (next_width, next_height) == (width, height) {
            break;
        }
        img = img.resize_exact(next_width, next_height, FilterType::Triangle);
        if format == ImageFormat::Jpeg {
            quality = (quality * IMAGE_SHRINK_STEP as f32).max(0.05);
        }
    }

    let data = best.ok_or_else(|| image_error("no encode attempt was made"))?;
    match format {
        ImageFormat::Png => Ok(MediaFile::new(file.name.clone(), "image/png", data)),
        _ => Ok(MediaFile::new(with_extension(&file.name, "jpg"), "image/jpeg", data)),
    }
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: f32) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        ImageFormat::Png => img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png),
        _ => {
            let jpeg_quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, jpeg_quality))
        }
    }
    .map_err(image_error)?;
    Ok(buffer)
}

fn optimize_png(data: &[u8], quality: f32) -> Result<Vec<u8>> {
    let mut options = Options::from_preset(OXIPNG_PRESET);
    options.deflate = if quality >= 0.9 {
        Deflaters::Zopfli {
            iterations: NonZeroU8::new(ZOPFLI_ITERATIONS).unwrap_or(NonZeroU8::MIN),
        }
    } else if quality >= 0.7 {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        }
    } else {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        }
    };
    oxipng::optimize_from_memory(data, &options)
        .map_err(|e| PipelineError::ImageCompression(format!("PNG optimization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x2545_f491;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        }))
    }

    fn to_file(img: &DynamicImage, name: &str, format: ImageFormat, mime: &str) -> MediaFile {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        MediaFile::new(name, mime, buffer)
    }

    #[test]
    fn test_image_options_default() {
        let options = ImageCompressionOptions::default();
        assert_eq!(options.effective_max_size_mb(), 1.0);
        assert_eq!(options.effective_max_dimension(), 1920);
        assert_eq!(options.effective_quality(), 0.85);
        assert!(options.effective_use_background_worker());
        assert_eq!(options.max_size_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_image_options_overrides_merge() {
        let options = ImageCompressionOptions::new(None, Some(800), Some(0.6), None).unwrap();
        assert_eq!(options.effective_max_size_mb(), 1.0);
        assert_eq!(options.effective_max_dimension(), 800);
        assert_eq!(options.effective_quality(), 0.6);
        assert!(options.effective_use_background_worker());
    }

    #[test]
    fn test_image_options_invalid() {
        assert!(matches!(
            ImageCompressionOptions::new(None, None, Some(0.0), None),
            Err(PipelineError::InvalidImageQuality(_))
        ));
        assert!(matches!(
            ImageCompressionOptions::new(None, None, Some(1.2), None),
            Err(PipelineError::InvalidImageQuality(_))
        ));
        assert!(matches!(
            ImageCompressionOptions::new(Some(-1.0), None, None, None),
            Err(PipelineError::InvalidSizeLimit(_))
        ));
        assert!(matches!(
            ImageCompressionOptions::new(None, Some(0), None, None),
            Err(PipelineError::InvalidDimension(0))
        ));
    }

    #[test]
    fn test_fit_within_preserves_aspect_ratio() {
        let img = fit_within(gradient(4000, 2000), 1920);
        assert_eq!(img.dimensions(), (1920, 960));

        let img = fit_within(gradient(1000, 3000), 1500);
        assert_eq!(img.dimensions(), (500, 1500));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let img = fit_within(gradient(640, 480), 1920);
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[tokio::test]
    async fn test_compress_jpeg_resizes_to_max_dimension() {
        let file = to_file(&gradient(2400, 1200), "wide.png", ImageFormat::Jpeg, "image/jpeg");
        let options = ImageCompressionOptions::new(None, Some(1200), None, None).unwrap();

        let result = compress_image(&file, &options).await.unwrap();

        let decoded = image::load_from_memory(&result.output.data).unwrap();
        assert_eq!(decoded.dimensions(), (1200, 600));
        assert_eq!(result.output.mime_type, "image/jpeg");
        assert_eq!(result.output.name, "wide.jpg");
        assert_eq!(result.original_size_bytes, file.size());
        assert_eq!(result.compressed_size_bytes, result.output.size());
    }

    #[tokio::test]
    async fn test_compress_png_stays_png() {
        let file = to_file(&gradient(300, 200), "logo.png", ImageFormat::Png, "image/png");
        let options = ImageCompressionOptions::new(None, None, None, Some(false)).unwrap();

        let result = compress_image(&file, &options).await.unwrap();

        assert_eq!(result.output.mime_type, "image/png");
        assert_eq!(result.output.name, "logo.png");
        let decoded = image::load_from_memory_with_format(&result.output.data, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (300, 200));
    }

    #[tokio::test]
    async fn test_png_that_fits_after_optimization_keeps_its_size() {
        let img = gradient(640, 480);
        let raw = encode(&img, ImageFormat::Png, 0.8).unwrap();
        let optimized = optimize_png(&raw, 0.8).unwrap();
        assert!(optimized.len() < raw.len());

        let limit_bytes = (optimized.len() + raw.len()) / 2;
        let options = ImageCompressionOptions::new(
            Some(limit_bytes as f64 / MEBIBYTE as f64),
            None,
            Some(0.8),
            Some(false),
        )
        .unwrap();
        let file = MediaFile::new("court.png", "image/png", raw);

        let result = compress_image(&file, &options).await.unwrap();

        assert!(result.compressed_size_bytes <= limit_bytes as u64);
        let decoded = image::load_from_memory_with_format(&result.output.data, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (640, 480));
    }

    #[tokio::test]
    async fn test_compress_shrinks_toward_size_limit() {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(noise(600, 600).to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, 100))
            .unwrap();
        let file = MediaFile::new("noise.jpg", "image/jpeg", buffer);
        let options = ImageCompressionOptions::new(Some(0.05), None, None, None).unwrap();

        let result = compress_image(&file, &options).await.unwrap();

        assert!(result.compressed_size_bytes < result.original_size_bytes);
        assert!(result.reduction_percent > 0.0);
    }

    #[tokio::test]
    async fn test_compress_invalid_bytes_is_image_error() {
        let file = MediaFile::new("broken.jpg", "image/jpeg", b"not really an image".to_vec());
        let result = compress_image(&file, &ImageCompressionOptions::default()).await;
        assert!(matches!(result, Err(PipelineError::ImageCompression(_))));
    }
}
