//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `RawImageData` 表示已读取但未解码的字节
//! - `SourceImage` 表示已解码、可反复渲染的源图（连同其变换状态）
//!
//! 源图只存在于内存中，从工作区移除或工作区销毁时即释放。

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;
use once_cell::sync::Lazy;
use regex::Regex;

use super::model::TransformState;

/// 只匹配最后一个扩展名。
static EXTENSION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

/// 工作区内源图的唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub(crate) u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "img-{}", self.0)
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 原始文件名（含扩展名）。
    pub(crate) file_name: String,
    /// 魔数嗅探得到的 MIME。
    pub(crate) mime: &'static str,
}

/// 已解码的源图。
pub struct SourceImage {
    id: SourceId,
    file_name: String,
    mime: &'static str,
    byte_size: u64,
    pixels: Arc<DynamicImage>,
    /// 用户旋转/翻转状态。
    pub transform: TransformState,
}

impl SourceImage {
    pub(crate) fn new(
        id: SourceId,
        file_name: String,
        mime: &'static str,
        byte_size: u64,
        pixels: DynamicImage,
    ) -> Self {
        Self {
            id,
            file_name,
            mime,
            byte_size,
            pixels: Arc::new(pixels),
            transform: TransformState::default(),
        }
    }

    /// 直接从内存图像构建，不经过工作区（测试与 CLI 单图流程使用）。
    pub fn from_image(file_name: impl Into<String>, pixels: DynamicImage) -> Self {
        Self::new(SourceId(0), file_name.into(), "image/png", 0, pixels)
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// 去掉扩展名的文件名，用于输出命名。
    pub fn base_name(&self) -> String {
        strip_extension(&self.file_name)
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// 共享像素句柄，交给阻塞线程渲染时使用。
    pub(crate) fn shared_pixels(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.pixels)
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("size", &format_args!("{}x{}", self.width(), self.height()))
            .field("transform", &self.transform)
            .finish()
    }
}

impl Drop for SourceImage {
    fn drop(&mut self) {
        log::debug!(
            "🧹 释放源图 {} ({}，{}x{})",
            self.id,
            self.file_name,
            self.pixels.width(),
            self.pixels.height()
        );
    }
}

/// 去掉最后一个扩展名；只保留路径中的文件名部分。
pub fn strip_extension(file_name: &str) -> String {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    let stripped = EXTENSION_PATTERN.replace(name, "");
    if stripped.is_empty() {
        "image".to_string()
    } else {
        stripped.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_extension_removes_only_last_suffix() {
        assert_eq!(strip_extension("holiday.photo.JPG"), "holiday.photo");
        assert_eq!(strip_extension("cat.png"), "cat");
        assert_eq!(strip_extension("README"), "README");
        assert_eq!(strip_extension("dir/sub/pic.webp"), "pic");
        assert_eq!(strip_extension(".png"), "image");
    }

    #[test]
    fn source_image_exposes_intrinsic_size() {
        let source = SourceImage::from_image("a.png", DynamicImage::new_rgba8(8, 5));
        assert_eq!((source.width(), source.height()), (8, 5));
        assert_eq!(source.base_name(), "a");
        assert!(source.transform.is_identity());
    }
}
