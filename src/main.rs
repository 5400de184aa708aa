//! # SnapSizes 命令行入口
//!
//! 本文件仅负责参数解析、服务初始化与结果落盘。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use snapsizes::error::AppError;
use snapsizes::image_handler::{
    Background, DocumentFit, DocumentSettings, FitMode, ImageConfig, Orientation, OutputFormat,
    PageFormat, RenderConfig, Rotation, SizeSet, SizeSpec, StudioService, Watermark, Workspace,
    archive_name, document_name,
};
use snapsizes::presets::{self, PLATFORM_PRESETS};
use snapsizes::settings::{Settings, load_settings};

/// 📐 Resize, crop, bulk-export and PDF-pack images for social media.
#[derive(Parser, Debug)]
#[command(name = "snapsizes", version)]
struct Cli {
    /// JSON settings file (tool prefix, product name, limits, defaults)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory the exported files are written to
    #[arg(short, long, global = true, default_value = ".")]
    out_dir: PathBuf,

    /// Performance profile: quality, balanced or speed
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the platform presets
    Presets {
        #[arg(long)]
        json: bool,
    },
    /// Export one image at a preset or custom size
    Resize {
        input: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Export every image at every size into one ZIP archive
    Bulk {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Target size as WIDTHxHEIGHT (repeatable, defaults to 1080x1080 and 1920x1080)
        #[arg(short, long = "size")]
        sizes: Vec<String>,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Pack images into a PDF, one page per image
    Pdf {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value = "a4", help = "a4, letter or legal")]
        page: String,
        #[arg(long, default_value = "portrait", help = "portrait or landscape")]
        orientation: String,
        #[arg(long, default_value_t = 10.0, help = "Page margin in millimetres")]
        margin: f64,
        #[arg(long, default_value = "fit", help = "fit, fill or original")]
        fit: String,
        #[arg(long)]
        quality: Option<f32>,
        #[command(flatten)]
        transform: TransformArgs,
    },
    /// Re-encode images as JPEG at their original size
    Compress {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value_t = 0.8)]
        quality: f32,
    },
    /// Write a small PNG preview of a preset or custom size
    Preview {
        input: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Preset key, e.g. ig-story (see `snapsizes presets`)
    #[arg(long, conflicts_with = "size")]
    preset: Option<String>,
    /// Custom size as WIDTHxHEIGHT
    #[arg(long)]
    size: Option<String>,
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// Clockwise rotation in degrees (0, 90, 180, 270)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotate: i32,
    #[arg(long)]
    flip_h: bool,
    #[arg(long)]
    flip_v: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// fit, fill, cover-blur or cover-color
    #[arg(long)]
    fit: Option<String>,
    /// black, white, blur or #rrggbb
    #[arg(long)]
    background: Option<String>,
    /// jpeg or png
    #[arg(long)]
    format: Option<String>,
    #[arg(long)]
    quality: Option<f32>,
    #[command(flatten)]
    transform: TransformArgs,
    /// Watermark text
    #[arg(long)]
    watermark: Option<String>,
    #[arg(long, default_value_t = 40, allow_hyphen_values = true)]
    watermark_x: i32,
    #[arg(long, default_value_t = 40, allow_hyphen_values = true)]
    watermark_y: i32,
    #[arg(long, default_value_t = 24)]
    watermark_size: u32,
    #[arg(long, default_value_t = 0.6)]
    watermark_opacity: f32,
}

impl RenderArgs {
    fn render_config(
        &self,
        settings: &Settings,
        config: &ImageConfig,
        preset_fit: Option<(FitMode, &str)>,
    ) -> Result<RenderConfig, AppError> {
        let (default_fit, default_background) = preset_fit.unwrap_or((FitMode::Fill, "black"));
        let (fit_mode, implied_background) = match &self.fit {
            Some(fit) => FitMode::parse_with_background(fit)?,
            None => (default_fit, None),
        };
        let background = match (&self.background, implied_background) {
            (Some(name), _) => Background::parse(name)?,
            (None, Some(implied)) => implied,
            (None, None) => Background::parse(default_background)?,
        };
        let output_format = match &self.format {
            Some(format) => OutputFormat::parse(format)?,
            None => settings.output_format()?,
        };
        let quality = self.quality.unwrap_or(config.default_quality);
        Ok(RenderConfig::new(fit_mode, background, output_format, quality))
    }

    fn watermark(&self) -> Option<Watermark> {
        self.watermark.as_ref().map(|text| {
            Watermark::new(
                text.clone(),
                self.watermark_x,
                self.watermark_y,
                self.watermark_size,
                self.watermark_opacity,
            )
        })
    }
}

impl TransformArgs {
    fn apply(&self, workspace: &mut Workspace) -> Result<(), AppError> {
        let rotation = Rotation::from_degrees(self.rotate)?;
        let ids: Vec<_> = workspace.iter().map(|img| img.id()).collect();
        for id in ids {
            if let Some(state) = workspace.transform_mut(id) {
                state.rotation = rotation;
                state.flip_horizontal = self.flip_h;
                state.flip_vertical = self.flip_v;
            }
        }
        Ok(())
    }
}

/// 运行上下文：设置、配置快照与服务实例。
struct Context {
    settings: Settings,
    config: ImageConfig,
    service: Arc<StudioService>,
    out_dir: PathBuf,
}

impl Context {
    fn load_workspace(&self, inputs: &[PathBuf]) -> Result<Workspace, AppError> {
        let mut workspace = self.service.new_workspace()?;
        let report = workspace.add_files(inputs);
        for rejection in &report.rejected {
            eprintln!("⚠️  skipped {} [{}]: {}", rejection.name, rejection.code, rejection.message);
        }
        if workspace.is_empty() {
            return Err(AppError::Settings("没有可用的输入图片".to_string()));
        }
        Ok(workspace)
    }

    fn write_output(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(name);
        fs::write(&path, bytes)?;
        println!("💾 {} ({} KB)", path.display(), bytes.len().div_ceil(1024));
        Ok(path)
    }
}

fn resolve_target(target: &TargetArgs) -> Result<(SizeSpec, Option<(FitMode, &'static str)>), AppError> {
    if let Some(key) = &target.preset {
        let preset = presets::find_preset(key)
            .ok_or_else(|| AppError::Settings(format!("未知预设：{}", key)))?;
        return Ok((preset.size_spec()?, Some((preset.fit_mode, preset.background))));
    }
    if let Some(size) = &target.size {
        return Ok((SizeSpec::parse(size, size.as_str())?, None));
    }
    Err(AppError::Settings("请通过 --preset 或 --size 指定目标尺寸".to_string()))
}

fn build_context(cli: &Cli) -> Result<Context, AppError> {
    let settings = load_settings(cli.settings.as_deref())?;
    let config = settings.image_config()?;
    let service = Arc::new(StudioService::with_config(config.clone())?);
    if let Some(profile) = &cli.profile {
        service.set_performance_profile(profile)?;
    }
    Ok(Context {
        settings,
        config,
        service,
        out_dir: cli.out_dir.clone(),
    })
}

/// Ctrl-C → 取消全部进行中的导出。
fn install_cancel_handler(service: &Arc<StudioService>) {
    let service = Arc::clone(service);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            match service.cancel_all() {
                Ok(count) => log::warn!("🛑 收到 Ctrl-C，已取消 {} 个导出", count),
                Err(err) => log::error!("取消导出失败: {}", err),
            }
        }
    });
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if let Command::Presets { json } = &cli.command {
        return print_presets(*json);
    }

    let ctx = build_context(&cli)?;
    install_cancel_handler(&ctx.service);

    match &cli.command {
        Command::Presets { .. } => Ok(()),
        Command::Resize { input, target, render } => {
            let (size, preset_fit) = resolve_target(target)?;
            let render_config = render.render_config(&ctx.settings, &ctx.config, preset_fit)?;
            let mut workspace = ctx.load_workspace(std::slice::from_ref(input))?;
            render.transform.apply(&mut workspace)?;

            let watermark = render.watermark();
            let source = &workspace.images()[0];
            let asset = ctx
                .service
                .export_single(source, &size, &render_config, watermark.as_ref(), &ctx.settings.tool_prefix)
                .await?;
            ctx.write_output(&asset.filename, &asset.bytes)?;
            Ok(())
        }
        Command::Bulk { inputs, sizes, render } => {
            let mut size_set = SizeSet::new(ctx.config.max_output_sizes);
            let requested = if sizes.is_empty() {
                presets::default_bulk_sizes()?
            } else {
                sizes
                    .iter()
                    .map(|s| SizeSpec::parse(s, s.as_str()))
                    .collect::<Result<Vec<_>, _>>()?
            };
            for size in requested {
                size_set.insert(size)?;
            }

            let render_config = render.render_config(&ctx.settings, &ctx.config, None)?;
            let mut workspace = ctx.load_workspace(inputs)?;
            render.transform.apply(&mut workspace)?;

            let watermark = render.watermark();
            let report = ctx
                .service
                .export_batch_with_progress(
                    "bulk".to_string(),
                    workspace.images(),
                    size_set.as_slice(),
                    &render_config,
                    watermark.as_ref(),
                    |event| log::info!("📦 {}% ({}/{})", event.percent, event.completed, event.total),
                )
                .await?;

            for (image, count) in report.failure_counts() {
                eprintln!("⚠️  {} failed for {} size(s)", image, count);
            }
            ctx.write_output(&archive_name(&ctx.settings.product_name), &report.archive)?;
            println!("✅ {} / {} files exported", report.entries.len(), report.total_pairs);
            Ok(())
        }
        Command::Pdf {
            inputs,
            page,
            orientation,
            margin,
            fit,
            quality,
            transform,
        } => {
            let settings = DocumentSettings::new(
                PageFormat::parse(page)?,
                Orientation::parse(orientation)?,
                *margin,
                DocumentFit::parse(fit)?,
                quality.unwrap_or(ctx.config.default_quality),
            );
            let mut workspace = ctx.load_workspace(inputs)?;
            transform.apply(&mut workspace)?;

            let report = ctx
                .service
                .export_document_with_progress("pdf".to_string(), workspace.images(), &settings, |event| {
                    log::info!("📄 {}% ({}/{})", event.percent, event.completed, event.total)
                })
                .await?;

            let name = document_name(&ctx.settings.product_name, chrono::Local::now().date_naive());
            ctx.write_output(&name, &report.bytes)?;
            println!("✅ {} page(s)", report.pages);
            Ok(())
        }
        Command::Compress { inputs, quality } => {
            let workspace = ctx.load_workspace(inputs)?;
            for source in workspace.iter() {
                let report = ctx.service.compress(source, *quality).await?;
                ctx.write_output(&report.filename, &report.bytes)?;
                println!("   {:.1}% smaller", report.saved_percent());
            }
            Ok(())
        }
        Command::Preview { input, target, render } => {
            let (size, preset_fit) = resolve_target(target)?;
            let render_config = render.render_config(&ctx.settings, &ctx.config, preset_fit)?;
            let mut workspace = ctx.load_workspace(std::slice::from_ref(input))?;
            render.transform.apply(&mut workspace)?;

            let source = &workspace.images()[0];
            let surface = ctx
                .service
                .preview(source, &size, &render_config, render.watermark().as_ref())?;
            let encoded = snapsizes::image_handler::encode(&surface, OutputFormat::Png, 1.0)?;
            let name = format!("preview-{}-{}.png", source.base_name(), size);
            ctx.write_output(&name, &encoded.bytes)?;
            Ok(())
        }
    }
}

fn print_presets(json: bool) -> Result<(), AppError> {
    if json {
        let text = serde_json::to_string_pretty(PLATFORM_PRESETS)
            .map_err(|e| AppError::Settings(format!("序列化预设失败: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    for platform in presets::platforms() {
        println!("{}", platform);
        for preset in PLATFORM_PRESETS.iter().filter(|p| p.platform == platform) {
            println!(
                "  {:<12} {:>4}x{:<4} {:<24} {}",
                preset.key,
                preset.width,
                preset.height,
                preset.label,
                preset.badge.unwrap_or("")
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        log::error!("❌ {}", err);
        eprintln!("error: {}", err);
        std::process::exit(err.exit_code());
    }
}
