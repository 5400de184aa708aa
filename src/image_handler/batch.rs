//! # 批量导出模块
//!
//! ## 设计思路
//!
//! 图片 × 尺寸的嵌套循环，每组依次执行 渲染 → 编码 → 写入压缩包。
//! 单组失败只记录并跳过，不中断整批；结束时汇总每张图的失败数。
//!
//! ## 实现思路
//!
//! - 外层遍历图片、内层遍历尺寸，条目顺序即遍历顺序。
//! - 渲染与编码放到 `spawn_blocking`，组与组之间 `yield_now` 让出调度。
//! - 每组开始前检查取消钩子，每组结束后上报进度 `completed / total * 100`。
//! - 同名源图通过 `BaseNameAllocator` 追加序号，保证条目名唯一。

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::encoder::{EncodedImage, encode};
use super::model::{RenderConfig, SizeSpec, Watermark};
use super::naming::{BaseNameAllocator, batch_entry_name};
use super::render::render_surface;
use super::source::SourceImage;
use super::{ImageConfig, ImageError};

/// 导出进度（批量与 PDF 共用）。
#[derive(Debug, Clone, Serialize)]
pub struct ExportProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub current: String,
}

/// 成功写入压缩包的条目。
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

/// 被跳过的组。
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub image: String,
    pub size: String,
    pub code: &'static str,
    pub stage: &'static str,
    pub message: String,
}

/// 批量导出结果：压缩包字节 + 条目清单 + 失败清单。
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    #[serde(skip)]
    pub archive: Vec<u8>,
    pub entries: Vec<BatchEntry>,
    pub failures: Vec<BatchFailure>,
    pub total_pairs: usize,
}

impl BatchReport {
    /// 每张源图的失败次数（仅包含有失败的图片）。
    pub fn failure_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.image.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.entries.len() == self.total_pairs
    }
}

/// 导出 `images × sizes` 到一个 ZIP 压缩包。
pub async fn export_batch<P, C>(
    images: &[SourceImage],
    sizes: &[SizeSpec],
    render: &RenderConfig,
    watermark: Option<&Watermark>,
    config: &ImageConfig,
    on_progress: P,
    is_cancelled: C,
) -> Result<BatchReport, ImageError>
where
    P: Fn(ExportProgress) + Send + Sync,
    C: Fn() -> bool + Send + Sync,
{
    if images.is_empty() {
        return Err(ImageError::InvalidFormat("没有可导出的图片".to_string()));
    }
    if sizes.is_empty() {
        return Err(ImageError::InvalidFormat("没有选择输出尺寸".to_string()));
    }
    let mut seen = HashSet::with_capacity(sizes.len());
    for size in sizes {
        size.ensure_within(config.max_output_dimension)?;
        if !seen.insert((size.width(), size.height())) {
            return Err(ImageError::InvalidFormat(format!("输出尺寸重复：{}", size)));
        }
    }

    let started = Instant::now();
    let total = images.len() * sizes.len();
    let shared_config = Arc::new(config.clone());
    let watermark = watermark.filter(|m| m.is_visible()).cloned();
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut names = BaseNameAllocator::new();
    let mut entries = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut completed = 0usize;

    log::info!(
        "📦 开始批量导出 - 图片: {} 尺寸: {} 共 {} 组",
        images.len(),
        sizes.len(),
        total
    );

    for image in images {
        let base = names.allocate(image.file_name());

        for size in sizes {
            if is_cancelled() {
                log::warn!("🛑 批量导出已取消 - 完成 {}/{}", completed, total);
                return Err(ImageError::Cancelled(format!(
                    "批量导出已取消（完成 {}/{}）",
                    completed, total
                )));
            }

            let entry_name =
                batch_entry_name(config.archive_folder.as_deref(), &base, size, render.output_format);

            let pair_started = Instant::now();
            match render_and_encode(image, size, render, watermark.as_ref(), &shared_config).await {
                Ok(encoded) => {
                    zip.start_file(entry_name.as_str(), options)
                        .map_err(|e| ImageError::Archive(format!("写入压缩包条目失败：{}", e)))?;
                    zip.write_all(&encoded.bytes)
                        .map_err(|e| ImageError::Archive(format!("写入压缩包数据失败：{}", e)))?;
                    log::debug!(
                        "✅ {} ({} bytes, {}ms)",
                        entry_name,
                        encoded.bytes.len(),
                        pair_started.elapsed().as_millis()
                    );
                    entries.push(BatchEntry {
                        name: entry_name.clone(),
                        width: encoded.width,
                        height: encoded.height,
                        bytes: encoded.bytes.len(),
                    });
                }
                Err(err) => {
                    log::error!("❌ 跳过 {} @ {}：{}", image.file_name(), size, err);
                    failures.push(BatchFailure {
                        image: image.file_name().to_string(),
                        size: size.to_string(),
                        code: err.code(),
                        stage: err.stage(),
                        message: err.to_string(),
                    });
                }
            }

            completed += 1;
            on_progress(ExportProgress {
                completed,
                total,
                percent: progress_percent(completed, total),
                current: entry_name,
            });

            if config.batch_yield_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.batch_yield_delay_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    if entries.is_empty() {
        return Err(ImageError::Archive(format!(
            "全部 {} 组导出失败，未生成压缩包",
            total
        )));
    }

    let archive = zip
        .finish()
        .map_err(|e| ImageError::Archive(format!("压缩包收尾失败：{}", e)))?
        .into_inner();

    log::info!(
        "📦 批量导出完成 - 成功: {} 失败: {} 压缩包: {:.2} MB total={}ms",
        entries.len(),
        failures.len(),
        archive.len() as f64 / 1024.0 / 1024.0,
        started.elapsed().as_millis()
    );

    Ok(BatchReport {
        archive,
        entries,
        failures,
        total_pairs: total,
    })
}

async fn render_and_encode(
    image: &SourceImage,
    size: &SizeSpec,
    render: &RenderConfig,
    watermark: Option<&Watermark>,
    config: &Arc<ImageConfig>,
) -> Result<EncodedImage, ImageError> {
    let pixels = image.shared_pixels();
    let transform = image.transform;
    let render = *render;
    let watermark = watermark.cloned();
    let config = Arc::clone(config);
    let target = (size.width(), size.height());

    tokio::task::spawn_blocking(move || {
        let surface = render_surface(&pixels, target, transform, &render, watermark.as_ref(), &config)?;
        encode(&surface, render.output_format, render.quality())
    })
    .await
    .map_err(|e| ImageError::Encode(format!("渲染任务异常退出：{}", e)))?
}

/// `round(completed / total * 100)`，总数为 0 时视为完成。
pub(crate) fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
