//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageHandler` 只负责流程编排与配置管理，不直接与 CLI 绑定。
//! 各导出链路固定为：
//! 1. 读取配置快照
//! 2. 校验目标尺寸
//! 3. 渲染（阻塞线程）
//! 4. 编码 / 打包 / 排版
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ImageConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `render/encode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use image::RgbaImage;
use serde::Serialize;

use super::batch::{BatchReport, ExportProgress, export_batch};
use super::document::{DocumentReport, DocumentSettings, export_document};
use super::encoder::{EncodedAsset, encode_async};
use super::model::{OutputFormat, RenderConfig, SizeSpec, Watermark, clamp_quality};
use super::naming::{compressed_name, single_export_name};
use super::render::{render_preview, render_surface};
use super::source::SourceImage;
use super::workspace::Workspace;
use super::{ImageConfig, ImageError, ImagePerformanceProfile};

/// 压缩结果。
#[derive(Debug, Clone, Serialize)]
pub struct CompressReport {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressReport {
    /// 体积变化百分比，正数表示变小。
    pub fn saved_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.original_size as f64) * 100.0
    }
}

/// 图片处理器。
///
/// 封装了配置状态，并编排各子模块实现完整流程。
pub struct ImageHandler {
    config: Arc<RwLock<ImageConfig>>,
}

impl ImageHandler {
    /// 根据初始配置创建处理器。
    ///
    /// # 示例
    /// ```rust
    /// use snapsizes::image_handler::{ImageConfig, ImageHandler};
    ///
    /// let handler = ImageHandler::new(ImageConfig::default())?;
    /// # Ok::<(), snapsizes::image_handler::ImageError>(())
    /// ```
    pub fn new(config: ImageConfig) -> Result<Self, ImageError> {
        if config.max_files == 0 || config.max_output_sizes == 0 {
            return Err(ImageError::InvalidFormat(
                "max_files 与 max_output_sizes 必须大于 0".to_string(),
            ));
        }
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<ImageConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 设置性能档位。
    ///
    /// # 示例
    /// ```rust
    /// use snapsizes::image_handler::{ImageConfig, ImageHandler, ImagePerformanceProfile};
    ///
    /// let handler = ImageHandler::new(ImageConfig::default())?;
    /// handler.set_performance_profile(ImagePerformanceProfile::Speed)?;
    /// assert_eq!(handler.get_performance_profile()?, ImagePerformanceProfile::Speed);
    /// # Ok::<(), snapsizes::image_handler::ImageError>(())
    /// ```
    pub fn set_performance_profile(&self, profile: ImagePerformanceProfile) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_performance_profile(profile);

        log::info!(
            "⚙️ 已切换图片性能档位：{:?}（filter={:?}, blur_sigma={}）",
            profile,
            config.resize_filter,
            config.backdrop_blur_sigma
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn get_performance_profile(&self) -> Result<ImagePerformanceProfile, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_performance_profile())
    }

    /// 用当前配置创建一个空工作区。
    pub fn new_workspace(&self) -> Result<Workspace, ImageError> {
        Ok(Workspace::new(self.config_snapshot()?))
    }

    /// 单图单尺寸导出，文件名为 `{toolPrefix}_{preset}_{base}.{ext}`。
    pub async fn export_single(
        &self,
        source: &SourceImage,
        size: &SizeSpec,
        render: &RenderConfig,
        watermark: Option<&Watermark>,
        tool_prefix: &str,
    ) -> Result<EncodedAsset, ImageError> {
        let config = self.config_snapshot()?;
        size.ensure_within(config.max_output_dimension)?;
        let total_start = Instant::now();

        let render_start = Instant::now();
        let pixels = source.shared_pixels();
        let transform = source.transform;
        let render_config = *render;
        let mark = watermark.cloned();
        let target = (size.width(), size.height());
        let surface = tokio::task::spawn_blocking(move || {
            render_surface(&pixels, target, transform, &render_config, mark.as_ref(), &config)
        })
        .await
        .map_err(|e| ImageError::Decode(format!("渲染任务异常退出：{}", e)))??;
        let render_elapsed = render_start.elapsed();

        let encode_start = Instant::now();
        let encoded = encode_async(surface, render.output_format, render.quality()).await?;
        let encode_elapsed = encode_start.elapsed();

        let filename = single_export_name(tool_prefix, size.label(), source.file_name(), render.output_format);
        log::info!(
            "✅ 单图导出完成 - {} {} render={}ms encode={}ms total={}ms",
            filename,
            size,
            render_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(encoded.named(filename))
    }

    /// 批量导出（带进度与取消钩子）。
    pub async fn export_batch_with_hooks<P, C>(
        &self,
        images: &[SourceImage],
        sizes: &[SizeSpec],
        render: &RenderConfig,
        watermark: Option<&Watermark>,
        on_progress: P,
        is_cancelled: C,
    ) -> Result<BatchReport, ImageError>
    where
        P: Fn(ExportProgress) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        let config = self.config_snapshot()?;
        if sizes.len() > config.max_output_sizes {
            return Err(ImageError::ResourceLimit(format!(
                "输出尺寸数量超过上限：{}（限制：{}）",
                sizes.len(),
                config.max_output_sizes
            )));
        }
        export_batch(images, sizes, render, watermark, &config, on_progress, is_cancelled).await
    }

    /// PDF 导出（带进度与取消钩子）。
    pub async fn export_document_with_hooks<P, C>(
        &self,
        images: &[SourceImage],
        settings: &DocumentSettings,
        on_progress: P,
        is_cancelled: C,
    ) -> Result<DocumentReport, ImageError>
    where
        P: Fn(ExportProgress) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        export_document(images, settings, on_progress, is_cancelled).await
    }

    /// 原尺寸重新编码为 JPEG，输出 `min-{name}.jpg`。
    pub async fn compress(&self, source: &SourceImage, quality: f32) -> Result<CompressReport, ImageError> {
        let total_start = Instant::now();
        let surface: RgbaImage = source.pixels().to_rgba8();
        let encoded = encode_async(surface, OutputFormat::Jpeg, clamp_quality(quality)).await?;

        let report = CompressReport {
            filename: compressed_name(source.file_name()),
            original_size: source.byte_size(),
            compressed_size: encoded.bytes.len() as u64,
            bytes: encoded.bytes,
        };

        log::info!(
            "🗜️ 压缩完成 - {} {} -> {} bytes total={}ms",
            report.filename,
            report.original_size,
            report.compressed_size,
            total_start.elapsed().as_millis()
        );

        Ok(report)
    }

    /// 生成预览画布（最大 360×520）。
    pub fn preview(
        &self,
        source: &SourceImage,
        size: &SizeSpec,
        render: &RenderConfig,
        watermark: Option<&Watermark>,
    ) -> Result<RgbaImage, ImageError> {
        let config = self.config_snapshot()?;
        render_preview(
            source.pixels(),
            (size.width(), size.height()),
            source.transform,
            render,
            watermark,
            &config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::model::{Background, FitMode};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use tokio::runtime::Runtime;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn export_single_names_and_sizes_output() {
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let mut workspace = handler.new_workspace().expect("workspace");
        let id = workspace
            .add_bytes("beach day.png", create_png_bytes(80, 60))
            .expect("ingest should succeed");
        let source = workspace.get(id).expect("source exists");

        let size = SizeSpec::new(108, 108, "Instagram Post").expect("size");
        let render = RenderConfig::new(FitMode::Fill, Background::Blur, OutputFormat::Png, 0.9);
        let asset = Runtime::new()
            .expect("runtime init failed")
            .block_on(handler.export_single(source, &size, &render, None, "SnapSizes"))
            .expect("export should succeed");

        assert_eq!(asset.filename, "SnapSizes_Instagram_Post_beach_day.png");
        assert_eq!((asset.width, asset.height), (108, 108));
    }

    #[test]
    fn batch_rejects_too_many_sizes() {
        let config = ImageConfig {
            max_output_sizes: 1,
            ..ImageConfig::default()
        };
        let handler = ImageHandler::new(config).expect("handler init failed");
        let images = vec![SourceImage::from_image("a.png", DynamicImage::new_rgba8(4, 4))];
        let sizes = vec![
            SizeSpec::new(10, 10, "a").expect("size"),
            SizeSpec::new(20, 20, "b").expect("size"),
        ];
        let result = Runtime::new().expect("runtime init failed").block_on(handler.export_batch_with_hooks(
            &images,
            &sizes,
            &RenderConfig::default(),
            None,
            |_| {},
            || false,
        ));
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn compress_reports_sizes() {
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let mut workspace = handler.new_workspace().expect("workspace");
        let png = create_png_bytes(64, 64);
        let original = png.len() as u64;
        let id = workspace.add_bytes("shot.png", png).expect("ingest should succeed");

        let report = Runtime::new()
            .expect("runtime init failed")
            .block_on(handler.compress(workspace.get(id).expect("source exists"), 0.6))
            .expect("compress should succeed");

        assert_eq!(report.filename, "min-shot.jpg");
        assert_eq!(report.original_size, original);
        assert_eq!(report.compressed_size, report.bytes.len() as u64);
        let decoded = image::load_from_memory(&report.bytes).expect("decode jpeg");
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn preview_uses_profile_snapshot() {
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        handler
            .set_performance_profile(ImagePerformanceProfile::Quality)
            .expect("set profile");
        assert_eq!(
            handler.get_performance_profile().expect("get profile"),
            ImagePerformanceProfile::Quality
        );

        let source = SourceImage::from_image("p.png", DynamicImage::new_rgba8(30, 20));
        let size = SizeSpec::new(1080, 1920, "Story").expect("size");
        let preview = handler
            .preview(&source, &size, &RenderConfig::default(), None)
            .expect("preview should succeed");
        assert_eq!(preview.height(), 520);
    }

    #[test]
    #[ignore = "slow: renders large canvases"]
    fn perf_export_single_multiple_sizes() {
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let runtime = Runtime::new().expect("runtime init failed");
        let source = SourceImage::from_image(
            "big.png",
            image::load_from_memory(&create_png_bytes(3840, 2160)).expect("decode"),
        );
        let render = RenderConfig::new(FitMode::Fit, Background::Blur, OutputFormat::Jpeg, 0.9);

        for (width, height) in [(1080, 1080), (1080, 1920), (1584, 396)] {
            let size = SizeSpec::new(width, height, "perf").expect("size");
            let start = Instant::now();
            let asset = runtime
                .block_on(handler.export_single(&source, &size, &render, None, "Perf"))
                .expect("export should succeed");
            println!(
                "[perf] export {}x{} output={}KB elapsed={}ms",
                width,
                height,
                asset.bytes.len() / 1024,
                start.elapsed().as_millis()
            );
        }
    }
}
