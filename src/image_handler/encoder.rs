//! # 编码模块
//!
//! 画布 → 二进制。JPEG 丢弃 alpha 并按质量编码，PNG 始终无损且忽略质量。
//! 编码是 CPU 密集型操作，异步入口放到 `spawn_blocking` 线程执行。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

use super::ImageError;
use super::model::{OutputFormat, clamp_quality};

/// 编码结果。
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl EncodedImage {
    /// 附上下载文件名。
    pub fn named(self, filename: impl Into<String>) -> EncodedAsset {
        EncodedAsset {
            filename: filename.into(),
            bytes: self.bytes,
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}

/// 可直接写盘/下载的最终产物。
#[derive(Debug, Clone)]
pub struct EncodedAsset {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// 同步编码。
pub fn encode(
    surface: &RgbaImage,
    format: OutputFormat,
    quality: f32,
) -> Result<EncodedImage, ImageError> {
    let (width, height) = surface.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Encode("画布尺寸为 0".to_string()));
    }

    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let quality = (clamp_quality(quality) * 100.0).round().clamp(1.0, 100.0) as u8;
            let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
            encoder
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(Cursor::new(&mut buffer));
            encoder
                .write_image(surface.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ImageError::Encode(format!("PNG 编码失败：{}", e)))?;
        }
    }

    if buffer.is_empty() {
        return Err(ImageError::Encode("编码结果为空".to_string()));
    }

    Ok(EncodedImage {
        bytes: buffer,
        width,
        height,
        format,
    })
}

/// 异步编码：在阻塞线程池执行，不占用调用方线程。
pub async fn encode_async(
    surface: RgbaImage,
    format: OutputFormat,
    quality: f32,
) -> Result<EncodedImage, ImageError> {
    tokio::task::spawn_blocking(move || encode(&surface, format, quality))
        .await
        .map_err(|e| ImageError::Encode(format!("编码任务异常退出：{}", e)))?
}
