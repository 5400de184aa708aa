//! # 工作区模块
//!
//! ## 设计思路
//!
//! 工作区是源图的唯一所有者：导入即解码并持有像素，移除或清空即释放。
//! 源图顺序就是导出顺序（PDF 页序、压缩包条目顺序），工作区不做任何重排。
//!
//! ## 实现思路
//!
//! - 导入时逐个执行：体积校验 → MIME 嗅探 → 数量上限 → 受限解码。
//! - 单个文件失败只记录到 `IngestReport`，不影响其余文件。

use std::path::Path;

use serde::Serialize;

use super::loader::{load_from_bytes, load_from_file};
use super::model::TransformState;
use super::pipeline::decode_raw_image;
use super::source::{RawImageData, SourceId, SourceImage};
use super::{ImageConfig, ImageError};

/// 被拒绝的输入。
#[derive(Debug, Clone, Serialize)]
pub struct IngestRejection {
    pub name: String,
    pub code: &'static str,
    pub message: String,
}

/// 一次导入的结果汇总。
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub accepted: Vec<SourceId>,
    pub rejected: Vec<IngestRejection>,
}

impl IngestReport {
    fn reject(&mut self, name: impl Into<String>, err: ImageError) {
        let name = name.into();
        log::warn!("⛔ 拒绝导入 {}：{}", name, err);
        self.rejected.push(IngestRejection {
            name,
            code: err.code(),
            message: err.to_string(),
        });
    }
}

/// 源图工作区。
pub struct Workspace {
    config: ImageConfig,
    images: Vec<SourceImage>,
    next_id: u64,
}

impl Workspace {
    pub fn new(config: ImageConfig) -> Self {
        Self {
            config,
            images: Vec::new(),
            next_id: 1,
        }
    }

    /// 按顺序导入多个本地文件。
    pub fn add_files<I, P>(&mut self, paths: I) -> IngestReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = IngestReport::default();
        for path in paths {
            let path = path.as_ref();
            let name = path.display().to_string();
            let result = load_from_file(path, &self.config).and_then(|raw| self.admit(raw));
            match result {
                Ok(id) => report.accepted.push(id),
                Err(err) => report.reject(name, err),
            }
        }
        log::info!(
            "📥 导入完成 - 接受: {} 拒绝: {} 当前: {}/{}",
            report.accepted.len(),
            report.rejected.len(),
            self.images.len(),
            self.config.max_files
        );
        report
    }

    /// 导入内存中的单个文件。
    pub fn add_bytes(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<SourceId, ImageError> {
        let raw = load_from_bytes(name, bytes, &self.config)?;
        self.admit(raw)
    }

    fn admit(&mut self, raw: RawImageData) -> Result<SourceId, ImageError> {
        if self.images.len() >= self.config.max_files {
            return Err(ImageError::ResourceLimit(format!(
                "图片数量已达上限：{}",
                self.config.max_files
            )));
        }
        let pixels = decode_raw_image(&raw, &self.config)?;
        let id = SourceId(self.next_id);
        self.next_id += 1;
        let byte_size = raw.bytes.len() as u64;
        self.images
            .push(SourceImage::new(id, raw.file_name, raw.mime, byte_size, pixels));
        Ok(id)
    }

    /// 移除并释放指定源图。
    pub fn remove(&mut self, id: SourceId) -> Option<SourceImage> {
        let index = self.images.iter().position(|img| img.id() == id)?;
        Some(self.images.remove(index))
    }

    /// 清空工作区，释放全部源图。
    pub fn clear(&mut self) {
        let count = self.images.len();
        self.images.clear();
        log::debug!("🧹 工作区已清空，释放 {} 张源图", count);
    }

    /// 调整顺序：把 `from` 位置的源图移动到 `to`。
    pub fn move_to(&mut self, from: usize, to: usize) -> Result<(), ImageError> {
        if from >= self.images.len() || to >= self.images.len() {
            return Err(ImageError::InvalidFormat(format!(
                "排序下标越界：{} -> {}（共 {} 张）",
                from,
                to,
                self.images.len()
            )));
        }
        let item = self.images.remove(from);
        self.images.insert(to, item);
        Ok(())
    }

    pub fn get(&self, id: SourceId) -> Option<&SourceImage> {
        self.images.iter().find(|img| img.id() == id)
    }

    pub fn transform_mut(&mut self, id: SourceId) -> Option<&mut TransformState> {
        self.images
            .iter_mut()
            .find(|img| img.id() == id)
            .map(|img| &mut img.transform)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceImage> {
        self.images.iter()
    }

    pub fn images(&self) -> &[SourceImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[test]
    fn rejects_non_images_and_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.png");
        let text = dir.path().join("notes.png");
        std::fs::write(&good, png(4, 3)).expect("write png");
        std::fs::write(&text, b"just some text").expect("write text");

        let mut workspace = Workspace::new(ImageConfig::default());
        let report = workspace.add_files([&text, &good]);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].code, "E_INVALID_FORMAT");
        assert_eq!(workspace.len(), 1);
        assert_eq!(workspace.images()[0].file_name(), "good.png");

        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["accepted"][0], serde_json::json!(report.accepted[0].0));
        assert_eq!(json["rejected"][0]["code"], "E_INVALID_FORMAT");
    }

    #[test]
    fn enforces_count_cap() {
        let config = ImageConfig {
            max_files: 2,
            ..ImageConfig::default()
        };
        let mut workspace = Workspace::new(config);
        workspace.add_bytes("a.png", png(2, 2)).expect("first");
        workspace.add_bytes("b.png", png(2, 2)).expect("second");
        let third = workspace.add_bytes("c.png", png(2, 2));
        assert!(matches!(third, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn remove_and_transform_by_id() {
        let mut workspace = Workspace::new(ImageConfig::default());
        let a = workspace.add_bytes("a.png", png(2, 2)).expect("a");
        let b = workspace.add_bytes("b.png", png(3, 2)).expect("b");
        assert_ne!(a, b);

        workspace.transform_mut(b).expect("b exists").rotate_right();
        assert!(workspace.get(b).expect("b exists").transform.rotation.swaps_axes());

        let removed = workspace.remove(a).expect("a exists");
        assert_eq!(removed.file_name(), "a.png");
        assert!(workspace.get(a).is_none());

        workspace.move_to(0, 0).expect("noop move");
        workspace.clear();
        assert!(workspace.is_empty());
    }
}
