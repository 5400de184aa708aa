//! # 解码与缩放流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像”和“图像 → 指定尺寸”两段过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限 / 内存上限快速拒绝
//! 3. 完整解码，并对解码结果再次校验
//! 4. 缩放统一走 `fast_image_resize`，只重采样画布内可见的区域

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

use super::source::RawImageData;
use super::{ImageConfig, ImageError};

/// 将原始字节解码为可渲染的图像。
pub(crate) fn decode_raw_image(
    raw: &RawImageData,
    config: &ImageConfig,
) -> Result<DynamicImage, ImageError> {
    image::guess_format(&raw.bytes)
        .map_err(|e| ImageError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(&raw.bytes)
        .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Decode("图片尺寸为 0".to_string()));
    }
    validate_pixel_limits(config, width, height)?;
    validate_decoded_memory_limits(config, width, height)?;

    log::info!(
        "✅ 图片解码成功 - 文件: {} 类型: {} 尺寸: {}x{}",
        raw.file_name,
        raw.mime,
        width,
        height
    );

    Ok(decoded)
}

/// 仅通过内存中的图片头信息读取宽高。
///
/// 用于在完整解码前做像素限制检查。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(
    config: &ImageConfig,
    width: u32,
    height: u32,
) -> Result<(), ImageError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 将 `src` 缩放到 `(x, y, w, h)` 并叠加到画布上。
///
/// 矩形可以部分落在画布外（cover 模式），此时只重采样可见部分，
/// 源图上对应的裁剪窗口按比例换算。
pub(crate) fn draw_scaled(
    canvas: &mut RgbaImage,
    src: &RgbaImage,
    placement: (f64, f64, f64, f64),
    filter: FilterType,
) -> Result<(), ImageError> {
    let (x, y, w, h) = placement;
    let (canvas_w, canvas_h) = canvas.dimensions();
    let (src_w, src_h) = src.dimensions();
    if w <= 0.0 || h <= 0.0 || src_w == 0 || src_h == 0 {
        return Ok(());
    }

    let left = x.round().max(0.0).min(canvas_w as f64);
    let top = y.round().max(0.0).min(canvas_h as f64);
    let right = (x + w).round().max(0.0).min(canvas_w as f64);
    let bottom = (y + h).round().max(0.0).min(canvas_h as f64);
    let dst_w = (right - left) as u32;
    let dst_h = (bottom - top) as u32;
    if dst_w == 0 || dst_h == 0 {
        return Ok(());
    }

    let ratio_x = src_w as f64 / w;
    let ratio_y = src_h as f64 / h;
    let crop_left = ((left - x) * ratio_x).clamp(0.0, src_w as f64);
    let crop_top = ((top - y) * ratio_y).clamp(0.0, src_h as f64);
    let crop_w = (dst_w as f64 * ratio_x).min(src_w as f64 - crop_left);
    let crop_h = (dst_h as f64 * ratio_y).min(src_h as f64 - crop_top);

    let patch = resize_with_fast_image_resize(
        src,
        dst_w,
        dst_h,
        Some((crop_left, crop_top, crop_w, crop_h)),
        filter,
    )?;

    image::imageops::overlay(canvas, &patch, left as i64, top as i64);
    Ok(())
}

/// 使用 `fast_image_resize` 缩放，`crop` 为源图上的裁剪窗口（浮点像素）。
pub(crate) fn resize_with_fast_image_resize(
    src: &RgbaImage,
    target_width: u32,
    target_height: u32,
    crop: Option<(f64, f64, f64, f64)>,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::ImageRef::new(src_width, src_height, src.as_raw(), fr::PixelType::U8x4)
            .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let mut options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));
    if let Some((left, top, width, height)) = crop {
        options = options.crop(left, top, width, height);
    }

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}
