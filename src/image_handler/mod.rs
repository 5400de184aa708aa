//! # 图片处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“导入校验 → 解码 → 几何计算 → 画布渲染 → 编码 → 打包/排版”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：承载可注入状态（`StudioService`）与请求级取消
//! - `handler`：编排单图导出、压缩、预览，以及批量/PDF 的入口
//! - `workspace`：持有源图，决定导出顺序
//! - `loader`：负责文件/内存加载与体积、MIME 校验
//! - `pipeline`：负责受限解码与高质量缩放
//! - `geometry`：纯函数，计算绘制矩形
//! - `render`：把源图画到目标画布（背景、变换、水印）
//! - `encoder`：画布 → JPEG/PNG
//! - `batch` / `document`：ZIP 与 PDF 导出
//! - `config/error/model/source/naming`：配置、错误、数据模型、命名规则
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型，内部细节保持 `mod` 私有。
//!
//! ## 新同事快速上手
//!
//! ```text
//! main.rs（CLI 参数适配）
//!    ↓
//! service.rs（服务入口 + 进度节流 + 取消标志）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ workspace.rs → loader.rs → pipeline.rs（导入 + 受限解码）
//!    ├─ render.rs → geometry.rs（渲染）
//!    ├─ encoder.rs（编码）
//!    └─ batch.rs / document.rs（ZIP / PDF）
//!    ↓
//! 返回 ImageError / AppError
//! ```
//!
//! ## 分层职责建议
//!
//! - 配置与策略变更优先改 `config.rs`
//! - 适配模式、背景语义变更优先改 `model.rs` 与 `render.rs`
//! - 文件命名规则变更只改 `naming.rs`

mod batch;
mod config;
mod document;
mod encoder;
mod error;
mod geometry;
mod handler;
mod loader;
mod model;
mod naming;
mod pipeline;
mod render;
mod service;
mod source;
mod workspace;

pub use batch::{BatchEntry, BatchFailure, BatchReport, ExportProgress};
pub use config::{DEFAULT_JPEG_QUALITY, ImageConfig, ImagePerformanceProfile};
pub use document::{
    DocumentFit, DocumentReport, DocumentSettings, Orientation, PX_TO_MM, PageFormat, PageLayout,
    layout_page,
};
pub use encoder::{EncodedAsset, EncodedImage, encode};
pub use error::ImageError;
pub use geometry::{DrawRect, Extent, compute_draw_rect, compute_original_rect, preview_dimensions};
pub use handler::{CompressReport, ImageHandler};
pub use loader::sniff_image_mime;
pub use model::{
    Background, FitMode, MAX_QUALITY, MIN_QUALITY, OutputFormat, RenderConfig, Rotation, ScaleMode,
    SizeSet, SizeSpec, TransformState, Watermark, clamp_quality,
};
pub use naming::{archive_name, compressed_name, document_name, single_export_name};
pub use render::{PREVIEW_MAX_HEIGHT, PREVIEW_MAX_WIDTH, render_preview, render_surface};
pub use service::{ExportProgressPayload, StudioService};
pub use source::{SourceId, SourceImage, strip_extension};
pub use workspace::{IngestRejection, IngestReport, Workspace};
