//! # PDF 文档导出模块
//!
//! ## 设计思路
//!
//! 每张源图占一页，页序严格等于输入顺序。排版复用几何模块，只是单位换成毫米：
//! - `Fit`：contain 进内容区
//! - `Fill`：cover 内容区，超出部分用裁剪路径截掉
//! - `Original`：按 96 DPI 把像素换算为毫米，超出内容区时退回 contain
//!
//! ## 实现思路
//!
//! 1. 源图去 alpha（白底）后编码为 JPEG，作为 `DCTDecode` 图像 XObject 直接嵌入
//! 2. 页面内容流：平移到内容区中心 → 旋转/翻转矩阵 → 缩放到绘制尺寸 → `Do`
//! 3. 组装 Pages / Catalog，压缩对象后输出字节

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, Rgba, RgbaImage, imageops};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use serde::Serialize;

use super::batch::{ExportProgress, progress_percent};
use super::config::DEFAULT_JPEG_QUALITY;
use super::encoder::encode;
use super::geometry::{DrawRect, Extent, compute_draw_rect, compute_original_rect};
use super::model::{OutputFormat, Rotation, ScaleMode, TransformState, clamp_quality};
use super::source::SourceImage;
use super::ImageError;

/// 1 英寸 = 25.4 mm = 72 pt。
const MM_TO_PT: f64 = 72.0 / 25.4;
/// 屏幕像素按 96 DPI 换算为毫米。
pub const PX_TO_MM: f64 = 25.4 / 96.0;

/// 纸张规格（纵向，毫米）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A4,
    Letter,
    Legal,
}

impl PageFormat {
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        match input.trim().to_lowercase().as_str() {
            "a4" => Ok(Self::A4),
            "letter" => Ok(Self::Letter),
            "legal" => Ok(Self::Legal),
            other => Err(ImageError::InvalidFormat(format!(
                "未知纸张规格：{}（可选：a4 / letter / legal）",
                other
            ))),
        }
    }

    /// 纵向宽高（毫米）。
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            Self::A4 => (210.0, 297.0),
            Self::Letter => (215.9, 279.4),
            Self::Legal => (215.9, 355.6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        match input.trim().to_lowercase().as_str() {
            "portrait" | "p" => Ok(Self::Portrait),
            "landscape" | "l" => Ok(Self::Landscape),
            other => Err(ImageError::InvalidFormat(format!("未知页面方向：{}", other))),
        }
    }
}

/// 页面内的图片排版方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFit {
    #[default]
    Fit,
    Fill,
    Original,
}

impl DocumentFit {
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        match input.trim().to_lowercase().as_str() {
            "fit" | "contain" => Ok(Self::Fit),
            "fill" | "cover" => Ok(Self::Fill),
            "original" | "none" => Ok(Self::Original),
            other => Err(ImageError::InvalidFormat(format!(
                "未知排版方式：{}（可选：fit / fill / original）",
                other
            ))),
        }
    }
}

impl fmt::Display for DocumentFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Original => "original",
        };
        f.write_str(name)
    }
}

/// PDF 导出参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentSettings {
    pub page_format: PageFormat,
    pub orientation: Orientation,
    margin_mm: f64,
    pub fit: DocumentFit,
    quality: f32,
}

impl DocumentSettings {
    pub fn new(
        page_format: PageFormat,
        orientation: Orientation,
        margin_mm: f64,
        fit: DocumentFit,
        quality: f32,
    ) -> Self {
        let (w, h) = page_format.size_mm();
        let max_margin = (w.min(h) / 2.0 - 1.0).max(0.0);
        let margin_mm = if margin_mm.is_finite() {
            margin_mm.clamp(0.0, max_margin)
        } else {
            0.0
        };
        Self {
            page_format,
            orientation,
            margin_mm,
            fit,
            quality: clamp_quality(quality),
        }
    }

    pub fn margin_mm(&self) -> f64 {
        self.margin_mm
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// 按方向调整后的页面宽高（毫米）。
    pub fn page_size_mm(&self) -> Extent {
        let (w, h) = self.page_format.size_mm();
        match self.orientation {
            Orientation::Portrait => Extent::new(w, h),
            Orientation::Landscape => Extent::new(h, w),
        }
    }

    /// 去掉四周边距后的内容区（毫米）。
    pub fn content_area_mm(&self) -> Extent {
        let page = self.page_size_mm();
        Extent::new(page.width - 2.0 * self.margin_mm, page.height - 2.0 * self.margin_mm)
    }
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self::new(
            PageFormat::A4,
            Orientation::Portrait,
            10.0,
            DocumentFit::Fit,
            DEFAULT_JPEG_QUALITY,
        )
    }
}

/// 单页排版结果（毫米）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page: Extent,
    pub content: Extent,
    pub rect: DrawRect,
    /// 是否需要按内容区裁剪。
    pub clip: bool,
}

/// 计算单张图片在页面中的排版。
pub fn layout_page(
    image_px: (u32, u32),
    rotation: Rotation,
    settings: &DocumentSettings,
) -> Result<PageLayout, ImageError> {
    let content = settings.content_area_mm();
    let source = Extent::from_pixels(image_px.0, image_px.1);
    let rect = match settings.fit {
        DocumentFit::Fit => compute_draw_rect(source, content, rotation, ScaleMode::Contain)?,
        DocumentFit::Fill => compute_draw_rect(source, content, rotation, ScaleMode::Cover)?,
        DocumentFit::Original => {
            let physical = Extent::new(source.width * PX_TO_MM, source.height * PX_TO_MM);
            compute_original_rect(physical, content, rotation)?
        }
    };
    Ok(PageLayout {
        page: settings.page_size_mm(),
        content,
        rect,
        clip: settings.fit == DocumentFit::Fill,
    })
}

/// PDF 导出结果。
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// 按输入顺序把每张图片排成一页并输出 PDF。
pub async fn export_document<P, C>(
    images: &[SourceImage],
    settings: &DocumentSettings,
    on_progress: P,
    is_cancelled: C,
) -> Result<DocumentReport, ImageError>
where
    P: Fn(ExportProgress) + Send + Sync,
    C: Fn() -> bool + Send + Sync,
{
    if images.is_empty() {
        return Err(ImageError::InvalidFormat("没有可导出的图片".to_string()));
    }

    let started = Instant::now();
    let total = images.len();
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(total);

    log::info!(
        "📄 开始生成 PDF - 页数: {} 纸张: {:?} {:?} 排版: {}",
        total,
        settings.page_format,
        settings.orientation,
        settings.fit
    );

    for (index, image) in images.iter().enumerate() {
        if is_cancelled() {
            log::warn!("🛑 PDF 生成已取消 - 完成 {}/{}", index, total);
            return Err(ImageError::Cancelled(format!(
                "PDF 生成已取消（完成 {}/{}）",
                index, total
            )));
        }

        let layout = layout_page((image.width(), image.height()), image.transform.rotation, settings)?;
        let jpeg = flatten_and_encode(image.shared_pixels(), settings.quality()).await?;

        let image_id = doc.add_object(image_xobject(image.width(), image.height(), jpeg));
        let resource_name = format!("Im{}", index + 1);
        let content = page_content(&layout, settings.margin_mm(), image.transform, &resource_name);
        let content_bytes = content
            .encode()
            .map_err(|e| ImageError::Document(format!("页面内容编码失败：{}", e)))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(pt(layout.page.width)),
                Object::Real(pt(layout.page.height)),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    resource_name.as_str() => image_id,
                },
            },
        });
        kids.push(page_id.into());

        let completed = index + 1;
        on_progress(ExportProgress {
            completed,
            total,
            percent: progress_percent(completed, total),
            current: image.file_name().to_string(),
        });
        tokio::task::yield_now().await;
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => total as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ImageError::Document(format!("PDF 写出失败：{}", e)))?;

    log::info!(
        "📄 PDF 生成完成 - 页数: {} 大小: {:.2} MB total={}ms",
        total,
        bytes.len() as f64 / 1024.0 / 1024.0,
        started.elapsed().as_millis()
    );

    Ok(DocumentReport { bytes, pages: total })
}

fn pt(mm: f64) -> f32 {
    (mm * MM_TO_PT) as f32
}

/// 去 alpha（白底合成）后编码 JPEG。
async fn flatten_and_encode(pixels: Arc<DynamicImage>, quality: f32) -> Result<Vec<u8>, ImageError> {
    tokio::task::spawn_blocking(move || {
        let rgba = pixels.to_rgba8();
        let mut flat = RgbaImage::from_pixel(rgba.width(), rgba.height(), Rgba([255, 255, 255, 255]));
        imageops::overlay(&mut flat, &rgba, 0, 0);
        encode(&flat, OutputFormat::Jpeg, quality).map(|encoded| encoded.bytes)
    })
    .await
    .map_err(|e| ImageError::Document(format!("页面图片编码任务异常退出：{}", e)))?
}

fn image_xobject(width: u32, height: u32, jpeg: Vec<u8>) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8i64,
        "Filter" => "DCTDecode",
    };
    // 已是 JPEG，不再做 Flate 压缩
    Stream::new(dict, jpeg).with_compression(false)
}

/// 顺时针旋转在 PDF（y 轴向上）坐标系中的矩阵 `[a b c d]`。
fn rotation_matrix(rotation: Rotation) -> [f32; 4] {
    match rotation {
        Rotation::Deg0 => [1.0, 0.0, 0.0, 1.0],
        Rotation::Deg90 => [0.0, -1.0, 1.0, 0.0],
        Rotation::Deg180 => [-1.0, 0.0, 0.0, -1.0],
        Rotation::Deg270 => [0.0, 1.0, -1.0, 0.0],
    }
}

fn cm(values: [f32; 6]) -> Operation {
    Operation::new("cm", values.iter().map(|v| Object::Real(*v)).collect())
}

/// 生成单页内容流。
fn page_content(
    layout: &PageLayout,
    margin_mm: f64,
    transform: TransformState,
    resource_name: &str,
) -> Content {
    let mut operations = vec![Operation::new("q", vec![])];

    if layout.clip {
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(pt(margin_mm)),
                Object::Real(pt(margin_mm)),
                Object::Real(pt(layout.content.width)),
                Object::Real(pt(layout.content.height)),
            ],
        ));
        operations.push(Operation::new("W", vec![]));
        operations.push(Operation::new("n", vec![]));
    }

    let center_x = pt(margin_mm + layout.content.width / 2.0);
    let center_y = pt(margin_mm + layout.content.height / 2.0);
    operations.push(cm([1.0, 0.0, 0.0, 1.0, center_x, center_y]));

    let [a, b, c, d] = rotation_matrix(transform.rotation);
    operations.push(cm([a, b, c, d, 0.0, 0.0]));

    if transform.flip_horizontal || transform.flip_vertical {
        let fx = if transform.flip_horizontal { -1.0 } else { 1.0 };
        let fy = if transform.flip_vertical { -1.0 } else { 1.0 };
        operations.push(cm([fx, 0.0, 0.0, fy, 0.0, 0.0]));
    }

    let w = pt(layout.rect.dw);
    let h = pt(layout.rect.dh);
    operations.push(cm([w, 0.0, 0.0, h, -w / 2.0, -h / 2.0]));
    operations.push(Operation::new("Do", vec![Object::Name(resource_name.as_bytes().to_vec())]));
    operations.push(Operation::new("Q", vec![]));

    Content { operations }
}
