//! 平台尺寸预设
//!
//! # 设计思路
//!
//! 各社交平台的推荐尺寸集中定义为静态表，CLI 与库调用方按 `key` 查询。
//! 预设只描述“画多大、怎么适配、用什么背景”，不持有任何运行时状态。

use serde::Serialize;

use crate::image_handler::{Background, FitMode, ImageError, OutputFormat, RenderConfig, SizeSpec};

/// 单个平台预设。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Preset {
    pub key: &'static str,
    pub label: &'static str,
    pub platform: &'static str,
    pub width: u32,
    pub height: u32,
    pub fit_mode: FitMode,
    pub background: &'static str,
    pub filename: &'static str,
    pub badge: Option<&'static str>,
}

impl Preset {
    /// 宽高比（宽 / 高）。
    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn size_spec(&self) -> Result<SizeSpec, ImageError> {
        SizeSpec::new(self.width, self.height, self.label)
    }

    /// 以预设的适配模式与背景构造渲染配置。
    pub fn render_config(&self, output_format: OutputFormat, quality: f32) -> Result<RenderConfig, ImageError> {
        Ok(RenderConfig::new(
            self.fit_mode,
            Background::parse(self.background)?,
            output_format,
            quality,
        ))
    }
}

macro_rules! preset {
    ($key:expr, $label:expr, $platform:expr, $w:expr, $h:expr, $fit:ident, $bg:expr, $file:expr, $badge:expr) => {
        Preset {
            key: $key,
            label: $label,
            platform: $platform,
            width: $w,
            height: $h,
            fit_mode: FitMode::$fit,
            background: $bg,
            filename: $file,
            badge: $badge,
        }
    };
}

pub static PLATFORM_PRESETS: &[Preset] = &[
    preset!("ig-post", "Instagram Post", "Instagram", 1080, 1080, Fill, "black", "instagram-post-1080x1080", Some("Recommended")),
    preset!("ig-portrait", "Instagram Portrait", "Instagram", 1080, 1350, Fill, "black", "instagram-portrait-1080x1350", None),
    preset!("ig-story", "Instagram Story / Reel", "Instagram", 1080, 1920, Fit, "blur", "instagram-story-1080x1920", Some("Popular")),
    preset!("yt-shorts", "YouTube Shorts", "YouTube", 1080, 1920, Fit, "blur", "youtube-shorts-1080x1920", Some("Recommended")),
    preset!("yt-thumb", "YouTube Thumbnail", "YouTube", 1280, 720, Fill, "black", "youtube-thumbnail-1280x720", None),
    preset!("wa-dp", "WhatsApp DP", "WhatsApp", 500, 500, Fill, "black", "whatsapp-dp-500x500", None),
    preset!("wa-status", "WhatsApp Status", "WhatsApp", 1080, 1920, Fit, "black", "whatsapp-status-1080x1920", None),
    preset!("li-post", "LinkedIn Post", "LinkedIn", 1200, 1200, Fill, "black", "linkedin-post-1200x1200", None),
    preset!("li-banner", "LinkedIn Banner", "LinkedIn", 1584, 396, Fit, "black", "linkedin-banner-1584x396", None),
    preset!("x-post", "X (Twitter) Post", "X", 1600, 900, Fill, "black", "x-post-1600x900", None),
    preset!("fb-post", "Facebook Post", "Facebook", 1200, 630, Fill, "black", "facebook-post-1200x630", None),
];

/// 按 key 查找预设（大小写不敏感）。
pub fn find_preset(key: &str) -> Option<&'static Preset> {
    let key = key.trim();
    PLATFORM_PRESETS.iter().find(|p| p.key.eq_ignore_ascii_case(key))
}

/// 平台名称，按首次出现顺序去重。
pub fn platforms() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for preset in PLATFORM_PRESETS {
        if !names.contains(&preset.platform) {
            names.push(preset.platform);
        }
    }
    names
}

/// 批量工具默认勾选的尺寸。
pub fn default_bulk_sizes() -> Result<Vec<SizeSpec>, ImageError> {
    Ok(vec![
        SizeSpec::new(1080, 1080, "IG Square")?,
        SizeSpec::new(1920, 1080, "Full HD")?,
    ])
}
