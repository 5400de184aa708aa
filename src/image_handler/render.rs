//! # 画布渲染模块
//!
//! ## 设计思路
//!
//! 给定源图、目标尺寸、变换状态与渲染配置，产出恰好 `tw × th` 的 RGBA 画布。
//! 每次渲染都分配独立画布，不存在跨次调用残留的变换状态。
//!
//! ## 实现思路
//!
//! 1. 分配画布
//! 2. 绘制背景层：纯色填充 / 模糊压暗的 cover 背景 / fill 模式跳过
//! 3. 先翻转再旋转得到朝向正确的源图（等价于“先 rotate 再 scale(-1)”的矩阵顺序）
//! 4. 用几何模块的矩形居中绘制，仅重采样画布内可见部分
//! 5. 在未变换坐标系中叠加文字水印

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, imageops};

use super::geometry::{Extent, compute_draw_rect, preview_dimensions};
use super::model::{Background, RenderConfig, Rotation, ScaleMode, TransformState, Watermark};
use super::pipeline::{draw_scaled, resize_with_fast_image_resize};
use super::{ImageConfig, ImageError};

/// 预览区域最大宽度（像素）。
pub const PREVIEW_MAX_WIDTH: u32 = 360;
/// 预览区域最大高度（像素）。
pub const PREVIEW_MAX_HEIGHT: u32 = 520;

/// 模糊背景先在缩小的画布上计算，再放大回目标尺寸。
const BACKDROP_DOWNSAMPLE: u32 = 4;

/// 渲染一张输出画布。
pub fn render_surface(
    source: &DynamicImage,
    target: (u32, u32),
    transform: TransformState,
    render: &RenderConfig,
    watermark: Option<&Watermark>,
    config: &ImageConfig,
) -> Result<RgbaImage, ImageError> {
    let (sw, sh) = source.dimensions();
    if sw == 0 || sh == 0 {
        return Err(ImageError::Decode("源图尺寸为 0，无法渲染".to_string()));
    }
    let (tw, th) = target;
    let target_extent = Extent::from_pixels(tw, th);
    let rect = compute_draw_rect(
        Extent::from_pixels(sw, sh),
        target_extent,
        transform.rotation,
        render.fit_mode.scale_mode(),
    )?;

    let oriented = orient(source, transform);

    let mut canvas = match render.fit_mode.backdrop(render.background) {
        Some(Background::Color(color)) => {
            RgbaImage::from_pixel(tw, th, Rgba([color[0], color[1], color[2], 255]))
        }
        Some(Background::Blur) => blurred_backdrop(&oriented, tw, th, config)?,
        None => RgbaImage::new(tw, th),
    };

    draw_scaled(
        &mut canvas,
        &oriented,
        rect.placement(target_extent),
        config.resize_filter,
    )?;

    if let Some(mark) = watermark.filter(|m| m.is_visible()) {
        draw_watermark(&mut canvas, mark);
    }

    Ok(canvas)
}

/// 渲染预览：保持目标比例缩进 360×520 区域后走同一渲染链路。
pub fn render_preview(
    source: &DynamicImage,
    target: (u32, u32),
    transform: TransformState,
    render: &RenderConfig,
    watermark: Option<&Watermark>,
    config: &ImageConfig,
) -> Result<RgbaImage, ImageError> {
    let (pw, ph) = preview_dimensions(target.0, target.1, PREVIEW_MAX_WIDTH, PREVIEW_MAX_HEIGHT);
    if pw == 0 || ph == 0 {
        return Err(ImageError::InvalidFormat(format!(
            "目标尺寸无效：{}x{}",
            target.0, target.1
        )));
    }
    render_surface(source, (pw, ph), transform, render, watermark, config)
}

/// 将翻转与旋转烘焙进像素。
pub(crate) fn orient(source: &DynamicImage, transform: TransformState) -> RgbaImage {
    let mut pixels = source.to_rgba8();
    if transform.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut pixels);
    }
    if transform.flip_vertical {
        imageops::flip_vertical_in_place(&mut pixels);
    }
    match transform.rotation {
        Rotation::Deg0 => pixels,
        Rotation::Deg90 => imageops::rotate90(&pixels),
        Rotation::Deg180 => {
            imageops::rotate180_in_place(&mut pixels);
            pixels
        }
        Rotation::Deg270 => imageops::rotate270(&pixels),
    }
}

/// 模糊背景：源图 cover 铺满，高斯模糊后压暗。
fn blurred_backdrop(
    oriented: &RgbaImage,
    tw: u32,
    th: u32,
    config: &ImageConfig,
) -> Result<RgbaImage, ImageError> {
    let small_w = tw.div_ceil(BACKDROP_DOWNSAMPLE).max(1);
    let small_h = th.div_ceil(BACKDROP_DOWNSAMPLE).max(1);
    let small_extent = Extent::from_pixels(small_w, small_h);
    let (ow, oh) = oriented.dimensions();
    let cover = compute_draw_rect(
        Extent::from_pixels(ow, oh),
        small_extent,
        Rotation::Deg0,
        ScaleMode::Cover,
    )?;

    let mut small = RgbaImage::from_pixel(small_w, small_h, Rgba([0, 0, 0, 255]));
    draw_scaled(&mut small, oriented, cover.placement(small_extent), config.resize_filter)?;

    let sigma = (config.backdrop_blur_sigma / BACKDROP_DOWNSAMPLE as f32).max(0.5);
    let mut blurred = imageops::fast_blur(&small, sigma);
    let factor = config.backdrop_brightness.clamp(0.0, 1.0);
    for pixel in blurred.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = (*channel as f32 * factor).round() as u8;
        }
        pixel.0[3] = 255;
    }

    resize_with_fast_image_resize(&blurred, tw, th, None, config.resize_filter)
}

/// 用 8×8 点阵字体绘制白色水印，`mark.y` 为基线。
fn draw_watermark(canvas: &mut RgbaImage, mark: &Watermark) {
    let scale = ((mark.font_size as f32 / 8.0).round() as i32).max(1);
    let glyph_size = 8 * scale;
    let alpha = mark.opacity;
    let (width, height) = canvas.dimensions();
    let top = mark.y - glyph_size;
    let mut cursor_x = mark.x;

    for ch in mark.text.chars() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let base_x = cursor_x + col * scale;
                let base_y = top + row as i32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        let (px, py) = (base_x + dx, base_y + dy);
                        if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                            continue;
                        }
                        let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                        for channel in pixel.0.iter_mut().take(3) {
                            *channel = (*channel as f32 * (1.0 - alpha) + 255.0 * alpha).round() as u8;
                        }
                        pixel.0[3] = pixel.0[3].max((alpha * 255.0).round() as u8);
                    }
                }
            }
        }
        cursor_x += glyph_size + scale;
    }
}
