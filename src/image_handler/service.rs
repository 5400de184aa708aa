//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `StudioService` 作为上层（CLI / 嵌入方）持有的唯一状态，替代全局单例函数。
//! 好处：
//! 1. 生命周期清晰（由 `main.rs` 统一管理）
//! 2. 测试可创建独立实例，减少共享状态副作用
//! 3. 每个导出请求都有独立的取消标志
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `export_batch_with_progress` / `export_document_with_progress`：带节流进度的导出
//! - `cancel`：按请求 ID 取消进行中的导出
//! - `set_performance_profile` / `get_performance_profile`：切换与读取性能档位

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::RgbaImage;
use serde::Serialize;

use super::batch::{BatchReport, ExportProgress, progress_percent};
use super::document::{DocumentReport, DocumentSettings};
use super::encoder::EncodedAsset;
use super::handler::CompressReport;
use super::model::{RenderConfig, SizeSpec, Watermark};
use super::source::SourceImage;
use super::workspace::Workspace;
use super::{ImageConfig, ImageError, ImageHandler, ImagePerformanceProfile};

const EXPORT_PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(50);
const EXPORT_PROGRESS_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(400);
const EXPORT_PROGRESS_MIN_PERCENT_DELTA: u8 = 1;
const EXPORT_PROGRESS_FORCE_PERCENT_DELTA: u8 = 5;

#[derive(Debug)]
struct ExportProgressThrottleState {
    last_emit_at: Option<Instant>,
    last_percent: u8,
    last_total: usize,
}

impl ExportProgressThrottleState {
    fn new() -> Self {
        Self {
            last_emit_at: None,
            last_percent: 0,
            last_total: 0,
        }
    }

    fn update(&mut self, progress: &ExportProgress) {
        self.last_emit_at = Some(Instant::now());
        self.last_percent = progress.percent;
        self.last_total = progress.total;
    }
}

fn should_emit_export_progress(state: &ExportProgressThrottleState, progress: &ExportProgress) -> bool {
    let Some(last_emit_at) = state.last_emit_at else {
        return true;
    };

    if progress.completed >= progress.total {
        return true;
    }

    let elapsed = last_emit_at.elapsed();
    let percent_delta = progress.percent.saturating_sub(state.last_percent);

    if percent_delta >= EXPORT_PROGRESS_FORCE_PERCENT_DELTA {
        return true;
    }

    if percent_delta >= EXPORT_PROGRESS_MIN_PERCENT_DELTA && elapsed >= EXPORT_PROGRESS_MIN_INTERVAL {
        return true;
    }

    if progress.total != state.last_total {
        return true;
    }

    elapsed >= EXPORT_PROGRESS_HEARTBEAT_INTERVAL
}

/// 导出进度事件。
#[derive(Debug, Clone, Serialize)]
pub struct ExportProgressPayload {
    pub request_id: String,
    pub kind: &'static str,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub current: Option<String>,
    pub status: &'static str,
    pub stage: Option<&'static str>,
    pub error_code: Option<&'static str>,
    pub error_message: Option<String>,
}

/// 导出服务状态。
///
/// 内部持有 `ImageHandler` 与各请求的取消标志。
pub struct StudioService {
    handler: ImageHandler,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl StudioService {
    /// 使用默认配置创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use snapsizes::image_handler::StudioService;
    ///
    /// let service = StudioService::new()?;
    /// # Ok::<(), snapsizes::image_handler::ImageError>(())
    /// ```
    pub fn new() -> Result<Self, ImageError> {
        Self::with_config(ImageConfig::default())
    }

    /// 使用自定义配置创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use snapsizes::image_handler::{ImageConfig, StudioService};
    ///
    /// let mut config = ImageConfig::default();
    /// config.max_files = 10;
    /// let service = StudioService::with_config(config)?;
    /// # Ok::<(), snapsizes::image_handler::ImageError>(())
    /// ```
    pub fn with_config(config: ImageConfig) -> Result<Self, ImageError> {
        let handler = ImageHandler::new(config)?;
        Ok(Self {
            handler,
            cancel_flags: Mutex::new(HashMap::new()),
        })
    }

    pub fn new_workspace(&self) -> Result<Workspace, ImageError> {
        self.handler.new_workspace()
    }

    pub async fn export_single(
        &self,
        source: &SourceImage,
        size: &SizeSpec,
        render: &RenderConfig,
        watermark: Option<&Watermark>,
        tool_prefix: &str,
    ) -> Result<EncodedAsset, ImageError> {
        self.handler
            .export_single(source, size, render, watermark, tool_prefix)
            .await
    }

    pub async fn compress(&self, source: &SourceImage, quality: f32) -> Result<CompressReport, ImageError> {
        self.handler.compress(source, quality).await
    }

    pub fn preview(
        &self,
        source: &SourceImage,
        size: &SizeSpec,
        render: &RenderConfig,
        watermark: Option<&Watermark>,
    ) -> Result<RgbaImage, ImageError> {
        self.handler.preview(source, size, render, watermark)
    }

    /// 批量导出，进度经节流后通过 `on_event` 推送。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use snapsizes::image_handler::{RenderConfig, SizeSpec, StudioService};
    ///
    /// # async fn demo() -> Result<(), snapsizes::image_handler::ImageError> {
    /// let service = StudioService::new()?;
    /// let mut workspace = service.new_workspace()?;
    /// workspace.add_files(["a.jpg", "b.png"]);
    /// let sizes = vec![SizeSpec::new(1080, 1080, "IG Square")?];
    /// let report = service
    ///     .export_batch_with_progress(
    ///         "req-1".into(),
    ///         workspace.images(),
    ///         &sizes,
    ///         &RenderConfig::default(),
    ///         None,
    ///         |event| println!("{}%", event.percent),
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn export_batch_with_progress<E>(
        &self,
        request_id: String,
        images: &[SourceImage],
        sizes: &[SizeSpec],
        render: &RenderConfig,
        watermark: Option<&Watermark>,
        on_event: E,
    ) -> Result<BatchReport, ImageError>
    where
        E: Fn(ExportProgressPayload) + Send + Sync,
    {
        let tracker = ProgressTracker::new(request_id, "batch", &on_event);
        let cancel_flag = self.register(&tracker.request_id)?;

        tracker.emit_started(images.len() * sizes.len());
        let result = self
            .handler
            .export_batch_with_hooks(
                images,
                sizes,
                render,
                watermark,
                |progress| tracker.emit_running(progress),
                || cancel_flag.load(Ordering::SeqCst),
            )
            .await;

        self.unregister(&tracker.request_id)?;
        tracker.emit_finished(result.as_ref().map(|_| ()));
        result
    }

    /// PDF 导出，进度经节流后通过 `on_event` 推送。
    pub async fn export_document_with_progress<E>(
        &self,
        request_id: String,
        images: &[SourceImage],
        settings: &DocumentSettings,
        on_event: E,
    ) -> Result<DocumentReport, ImageError>
    where
        E: Fn(ExportProgressPayload) + Send + Sync,
    {
        let tracker = ProgressTracker::new(request_id, "document", &on_event);
        let cancel_flag = self.register(&tracker.request_id)?;

        tracker.emit_started(images.len());
        let result = self
            .handler
            .export_document_with_hooks(
                images,
                settings,
                |progress| tracker.emit_running(progress),
                || cancel_flag.load(Ordering::SeqCst),
            )
            .await;

        self.unregister(&tracker.request_id)?;
        tracker.emit_finished(result.as_ref().map(|_| ()));
        result
    }

    fn register(&self, request_id: &str) -> Result<Arc<AtomicBool>, ImageError> {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let mut guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("导出取消标志锁已中毒".to_string()))?;
        guard.insert(request_id.to_string(), Arc::clone(&cancel_flag));
        Ok(cancel_flag)
    }

    fn unregister(&self, request_id: &str) -> Result<(), ImageError> {
        let mut guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("导出取消标志锁已中毒".to_string()))?;
        guard.remove(request_id);
        Ok(())
    }

    /// 请求取消；返回该请求是否仍在进行。
    pub fn cancel(&self, request_id: &str) -> Result<bool, ImageError> {
        let guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("导出取消标志锁已中毒".to_string()))?;

        if let Some(flag) = guard.get(request_id) {
            flag.store(true, Ordering::SeqCst);
            log::info!("🛑 已请求取消导出：{}", request_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 取消全部进行中的导出，返回受影响的请求数。
    pub fn cancel_all(&self) -> Result<usize, ImageError> {
        let guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("导出取消标志锁已中毒".to_string()))?;
        for flag in guard.values() {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(guard.len())
    }

    /// 设置性能档位。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use snapsizes::image_handler::StudioService;
    ///
    /// let service = StudioService::new()?;
    /// service.set_performance_profile("speed")?;
    /// # Ok::<(), snapsizes::image_handler::ImageError>(())
    /// ```
    pub fn set_performance_profile(&self, profile: &str) -> Result<(), ImageError> {
        let profile = ImagePerformanceProfile::from_str(profile)?;
        self.handler.set_performance_profile(profile)
    }

    /// 获取当前生效性能档位（字符串）。
    pub fn get_performance_profile(&self) -> Result<String, ImageError> {
        let profile = self.handler.get_performance_profile()?;
        Ok(profile.as_str().to_string())
    }
}

/// 单个请求的进度推送器（带节流）。
struct ProgressTracker<'a, E> {
    request_id: String,
    kind: &'static str,
    on_event: &'a E,
    throttle: Mutex<ExportProgressThrottleState>,
    last: Mutex<(usize, usize)>,
}

impl<'a, E> ProgressTracker<'a, E>
where
    E: Fn(ExportProgressPayload) + Send + Sync,
{
    fn new(request_id: String, kind: &'static str, on_event: &'a E) -> Self {
        Self {
            request_id,
            kind,
            on_event,
            throttle: Mutex::new(ExportProgressThrottleState::new()),
            last: Mutex::new((0, 0)),
        }
    }

    fn payload(&self, status: &'static str, completed: usize, total: usize) -> ExportProgressPayload {
        let percent = match (status, total) {
            ("completed", _) => 100,
            (_, 0) => 0,
            _ => progress_percent(completed, total),
        };
        ExportProgressPayload {
            request_id: self.request_id.clone(),
            kind: self.kind,
            completed,
            total,
            percent,
            current: None,
            status,
            stage: None,
            error_code: None,
            error_message: None,
        }
    }

    fn emit_started(&self, total: usize) {
        if let Ok(mut last) = self.last.lock() {
            *last = (0, total);
        }
        (self.on_event)(self.payload("running", 0, total));
    }

    fn emit_running(&self, progress: ExportProgress) {
        if let Ok(mut last) = self.last.lock() {
            *last = (progress.completed, progress.total);
        }

        let mut guard = match self.throttle.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if !should_emit_export_progress(&guard, &progress) {
            return;
        }
        guard.update(&progress);
        drop(guard);

        let mut payload = self.payload("running", progress.completed, progress.total);
        payload.percent = progress.percent;
        payload.current = Some(progress.current);
        (self.on_event)(payload);
    }

    fn emit_finished(&self, result: Result<(), &ImageError>) {
        let (completed, total) = self.last.lock().map(|last| *last).unwrap_or((0, 0));
        let payload = match result {
            Ok(()) => self.payload("completed", total, total),
            Err(ImageError::Cancelled(_)) => {
                let mut payload = self.payload("cancelled", completed, total);
                payload.error_code = Some("E_CANCELLED");
                payload
            }
            Err(err) => {
                let mut payload = self.payload("failed", completed, total);
                payload.stage = Some(err.stage());
                payload.error_code = Some(err.code());
                payload.error_message = Some(err.to_string());
                payload
            }
        };
        (self.on_event)(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::imageops::FilterType;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::Arc;
    use std::thread;

    fn source(name: &str) -> SourceImage {
        SourceImage::from_image(
            name,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 12, Rgba([10, 20, 30, 255]))),
        )
    }

    fn progress(completed: usize, total: usize) -> ExportProgress {
        ExportProgress {
            completed,
            total,
            percent: progress_percent(completed, total),
            current: String::new(),
        }
    }

    #[test]
    fn throttle_always_emits_first_and_last() {
        let mut state = ExportProgressThrottleState::new();
        assert!(should_emit_export_progress(&state, &progress(1, 1000)));
        state.update(&progress(1, 1000));

        assert!(!should_emit_export_progress(&state, &progress(2, 1000)));
        assert!(should_emit_export_progress(&state, &progress(60, 1000)));
        assert!(should_emit_export_progress(&state, &progress(1000, 1000)));
    }

    #[test]
    fn batch_progress_reports_lifecycle() {
        let service = StudioService::new().expect("service init failed");
        let images = vec![source("a.png"), source("b.png")];
        let sizes = vec![
            SizeSpec::new(20, 20, "s").expect("size"),
            SizeSpec::new(30, 10, "w").expect("size"),
        ];
        let events = Mutex::new(Vec::new());

        let report = tokio::runtime::Runtime::new()
            .expect("runtime init failed")
            .block_on(service.export_batch_with_progress(
                "req-batch".to_string(),
                &images,
                &sizes,
                &RenderConfig::default(),
                None,
                |event| events.lock().expect("events lock").push(event),
            ))
            .expect("batch should succeed");

        assert_eq!(report.entries.len(), 4);
        let events = events.into_inner().expect("events lock");
        assert_eq!(events.first().map(|e| e.status), Some("running"));
        let last = events.last().expect("at least one event");
        assert_eq!(last.status, "completed");
        assert_eq!(last.percent, 100);
        assert!(events.iter().all(|e| e.request_id == "req-batch" && e.kind == "batch"));

        assert!(!service.cancel("req-batch").expect("cancel should succeed"));
    }

    #[test]
    fn cancelled_document_emits_cancelled_event() {
        let service = Arc::new(StudioService::new().expect("service init failed"));
        let images = vec![source("1.png"), source("2.png"), source("3.png")];
        let events = Mutex::new(Vec::new());
        let cancel_service = Arc::clone(&service);

        let result = tokio::runtime::Runtime::new()
            .expect("runtime init failed")
            .block_on(service.export_document_with_progress(
                "req-doc".to_string(),
                &images,
                &DocumentSettings::default(),
                |event| {
                    if event.completed == 1 {
                        let _ = cancel_service.cancel("req-doc");
                    }
                    events.lock().expect("events lock").push(event);
                },
            ));

        assert!(matches!(result, Err(ImageError::Cancelled(_))));
        let events = events.into_inner().expect("events lock");
        let last = events.last().expect("at least one event");
        assert_eq!(last.status, "cancelled");
        assert_eq!(last.error_code, Some("E_CANCELLED"));
    }

    #[test]
    fn failed_batch_emits_error_code() {
        let service = StudioService::new().expect("service init failed");
        let events = Mutex::new(Vec::new());
        let result = tokio::runtime::Runtime::new()
            .expect("runtime init failed")
            .block_on(service.export_batch_with_progress(
                "req-empty".to_string(),
                &[],
                &[SizeSpec::new(10, 10, "x").expect("size")],
                &RenderConfig::default(),
                None,
                |event| events.lock().expect("events lock").push(event),
            ));

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
        let events = events.into_inner().expect("events lock");
        let last = events.last().expect("at least one event");
        assert_eq!(last.status, "failed");
        assert_eq!(last.error_code, Some("E_INVALID_FORMAT"));
    }

    #[test]
    fn profile_strings_reach_handler_config() {
        let service = StudioService::new().expect("service init failed");
        let cases = [
            ("Speed", "speed", FilterType::Nearest),
            (" quality ", "quality", FilterType::CatmullRom),
            ("balanced", "balanced", FilterType::Triangle),
        ];
        for (input, expected, filter) in cases {
            service.set_performance_profile(input).expect("set profile should succeed");
            assert_eq!(service.get_performance_profile().expect("get profile"), expected);
            let config = service.handler.config_snapshot().expect("snapshot");
            assert_eq!(config.resize_filter, filter);
        }

        let result = service.set_performance_profile("turbo");
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
        assert_eq!(service.get_performance_profile().expect("get profile"), "balanced");
    }

    #[test]
    fn concurrent_register_and_cancel_keep_flags_isolated() {
        let service = Arc::new(StudioService::new().expect("service init failed"));
        let mut handles = Vec::new();
        for worker_id in 0..6 {
            let service = Arc::clone(&service);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let id = format!("req-{}-{}", worker_id, i);
                    let flag = service.register(&id).expect("register should succeed");
                    assert!(!flag.load(Ordering::SeqCst));
                    assert!(service.cancel(&id).expect("cancel should succeed"));
                    assert!(flag.load(Ordering::SeqCst));
                    service.unregister(&id).expect("unregister should succeed");
                    assert!(!service.cancel(&id).expect("cancel should succeed"));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread should not panic");
        }
        assert_eq!(service.cancel_all().expect("cancel all"), 0);
    }

    #[test]
    fn cancel_all_flags_every_pending_request() {
        let service = StudioService::new().expect("service init failed");
        let first = service.register("a").expect("register");
        let second = service.register("b").expect("register");
        assert_eq!(service.cancel_all().expect("cancel all"), 2);
        assert!(first.load(Ordering::SeqCst) && second.load(Ordering::SeqCst));
    }
}
