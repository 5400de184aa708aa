//! # 渲染参数模型
//!
//! ## 设计思路
//!
//! 所有预设与导出参数都收敛为字段完整、构造时即校验的强类型，
//! 取代“可选字段随意缺省”的松散对象：
//! - `SizeSpec` / `SizeSet`：输出尺寸与去重集合
//! - `TransformState`：每张图的旋转/翻转状态
//! - `RenderConfig`：适配模式、背景、输出格式、质量
//! - `Watermark`：文字水印参数

use std::fmt;

use image::Rgb;
use serde::Serialize;

use super::ImageError;
use super::config::DEFAULT_JPEG_QUALITY;

/// 质量下限（低于该值 JPEG 画质不可用）。
pub const MIN_QUALITY: f32 = 0.1;
/// 质量上限。
pub const MAX_QUALITY: f32 = 1.0;

/// 将调用方传入的质量收敛到 `[0.1, 1.0]`。
///
/// 非法值（NaN）回退到默认质量。
pub fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        return DEFAULT_JPEG_QUALITY;
    }
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

// ============================================================================
// 输出尺寸
// ============================================================================

/// 目标输出分辨率。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeSpec {
    width: u32,
    height: u32,
    label: String,
}

impl SizeSpec {
    /// 创建并校验输出尺寸，宽高必须大于 0。
    pub fn new(width: u32, height: u32, label: impl Into<String>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidFormat(format!(
                "输出尺寸必须大于 0：{}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            label: label.into(),
        })
    }

    /// 解析 `1080x1920` / `1080X1920` 形式的尺寸字符串。
    pub fn parse(input: &str, label: impl Into<String>) -> Result<Self, ImageError> {
        let (w, h) = input
            .trim()
            .split_once(['x', 'X', '×'])
            .ok_or_else(|| ImageError::InvalidFormat(format!("尺寸格式应为 宽x高：{}", input)))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| ImageError::InvalidFormat(format!("无效宽度：{}", w)))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| ImageError::InvalidFormat(format!("无效高度：{}", h)))?;
        Self::new(width, height, label)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 校验尺寸不超过配置的单边上限。
    pub(crate) fn ensure_within(&self, max_dimension: u32) -> Result<(), ImageError> {
        if self.width > max_dimension || self.height > max_dimension {
            return Err(ImageError::ResourceLimit(format!(
                "输出尺寸过大：{}x{}（单边限制：{}）",
                self.width, self.height, max_dimension
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 按 `(width, height)` 去重的有序尺寸集合。
#[derive(Debug, Clone)]
pub struct SizeSet {
    sizes: Vec<SizeSpec>,
    capacity: usize,
}

impl SizeSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            sizes: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// 添加尺寸；重复尺寸静默忽略，返回是否真正加入。
    pub fn insert(&mut self, size: SizeSpec) -> Result<bool, ImageError> {
        if self.contains(size.width, size.height) {
            log::debug!("♻️ 尺寸 {} 已存在，忽略", size);
            return Ok(false);
        }
        if self.sizes.len() >= self.capacity {
            return Err(ImageError::ResourceLimit(format!(
                "输出尺寸数量已达上限：{}",
                self.capacity
            )));
        }
        self.sizes.push(size);
        Ok(true)
    }

    /// 移除指定下标的尺寸；集合至少保留一个尺寸。
    pub fn remove(&mut self, index: usize) -> Result<SizeSpec, ImageError> {
        if self.sizes.len() <= 1 {
            return Err(ImageError::InvalidFormat("至少需要保留一个输出尺寸".to_string()));
        }
        if index >= self.sizes.len() {
            return Err(ImageError::InvalidFormat(format!("尺寸下标越界：{}", index)));
        }
        Ok(self.sizes.remove(index))
    }

    pub fn contains(&self, width: u32, height: u32) -> bool {
        self.sizes
            .iter()
            .any(|s| s.width == width && s.height == height)
    }

    pub fn as_slice(&self) -> &[SizeSpec] {
        &self.sizes
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

// ============================================================================
// 旋转 / 翻转
// ============================================================================

/// 顺时针旋转角度，仅允许 90° 的整数倍。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Result<Self, ImageError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(ImageError::InvalidFormat(format!(
                "旋转角度必须是 90 的倍数：{}",
                degrees
            ))),
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// 旋转后宽高是否互换。
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    pub fn clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    pub fn counter_clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg270,
            Self::Deg90 => Self::Deg0,
            Self::Deg180 => Self::Deg90,
            Self::Deg270 => Self::Deg180,
        }
    }
}

/// 单张图片的变换状态，仅由用户操作修改，不会自动重置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TransformState {
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl TransformState {
    pub fn rotate_left(&mut self) {
        self.rotation = self.rotation.counter_clockwise();
    }

    pub fn rotate_right(&mut self) {
        self.rotation = self.rotation.clockwise();
    }

    pub fn toggle_flip_horizontal(&mut self) {
        self.flip_horizontal = !self.flip_horizontal;
    }

    pub fn toggle_flip_vertical(&mut self) {
        self.flip_vertical = !self.flip_vertical;
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::Deg0 && !self.flip_horizontal && !self.flip_vertical
    }
}

// ============================================================================
// 渲染配置
// ============================================================================

/// 缩放策略：完整包含或完全覆盖。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Contain,
    Cover,
}

/// 适配模式。
///
/// - `Fit`：完整包含，空白区域按 `Background` 填充
/// - `Fill`：完全覆盖，溢出部分裁掉，不绘制背景
/// - `CoverBlur`：完整包含，背景固定为模糊铺满的原图
/// - `CoverColor`：完整包含，背景固定为纯色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMode {
    Fit,
    Fill,
    CoverBlur,
    CoverColor,
}

impl FitMode {
    /// 兼容各版本工具页使用过的模式名称。
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        Self::parse_with_background(input).map(|(mode, _)| mode)
    }

    /// 同 [`FitMode::parse`]，另外返回名称自带的背景色
    /// （`contain-white` / `contain-black`）。
    pub fn parse_with_background(input: &str) -> Result<(Self, Option<Background>), ImageError> {
        match input.trim().to_lowercase().as_str() {
            "fit" | "contain" => Ok((Self::Fit, None)),
            "fill" | "cover" => Ok((Self::Fill, None)),
            "cover-blur" | "blur" => Ok((Self::CoverBlur, None)),
            "cover-color" => Ok((Self::CoverColor, None)),
            "contain-white" => Ok((Self::CoverColor, Some(Background::Color(Rgb([255, 255, 255]))))),
            "contain-black" => Ok((Self::CoverColor, Some(Background::Color(Rgb([0, 0, 0]))))),
            other => Err(ImageError::InvalidFormat(format!(
                "未知适配模式：{}（可选：fit / fill / cover-blur / cover-color）",
                other
            ))),
        }
    }

    pub fn scale_mode(self) -> ScaleMode {
        match self {
            Self::Fill => ScaleMode::Cover,
            Self::Fit | Self::CoverBlur | Self::CoverColor => ScaleMode::Contain,
        }
    }

    /// 结合背景设置，得出实际需要绘制的背景层。
    pub fn backdrop(self, background: Background) -> Option<Background> {
        match self {
            Self::Fill => None,
            Self::Fit => Some(background),
            Self::CoverBlur => Some(Background::Blur),
            Self::CoverColor => match background {
                Background::Color(color) => Some(Background::Color(color)),
                Background::Blur => Some(Background::Color(Rgb([0, 0, 0]))),
            },
        }
    }
}

/// 背景：纯色或模糊原图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Color(Rgb<u8>),
    Blur,
}

impl Background {
    /// 解析 `black` / `white` / `blur` / `#rrggbb`。
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        let value = input.trim().to_lowercase();
        match value.as_str() {
            "blur" => Ok(Self::Blur),
            "black" => Ok(Self::Color(Rgb([0, 0, 0]))),
            "white" => Ok(Self::Color(Rgb([255, 255, 255]))),
            hex => {
                let digits = hex.strip_prefix('#').unwrap_or(hex);
                if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ImageError::InvalidFormat(format!("无效背景颜色：{}", input)));
                }
                let channel = |range: std::ops::Range<usize>| {
                    u8::from_str_radix(&digits[range], 16)
                        .map_err(|_| ImageError::InvalidFormat(format!("无效背景颜色：{}", input)))
                };
                Ok(Self::Color(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?])))
            }
        }
    }
}

/// 输出编码格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        match input.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" | "image/jpeg" => Ok(Self::Jpeg),
            "png" | "image/png" => Ok(Self::Png),
            other => Err(ImageError::InvalidFormat(format!("不支持的输出格式：{}", other))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// 单次渲染与编码配置。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    pub fit_mode: FitMode,
    pub background: Background,
    pub output_format: OutputFormat,
    quality: f32,
}

impl RenderConfig {
    pub fn new(
        fit_mode: FitMode,
        background: Background,
        output_format: OutputFormat,
        quality: f32,
    ) -> Self {
        Self {
            fit_mode,
            background,
            output_format,
            quality: clamp_quality(quality),
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new(
            FitMode::Fill,
            Background::Color(Rgb([0, 0, 0])),
            OutputFormat::Jpeg,
            DEFAULT_JPEG_QUALITY,
        )
    }
}

/// 文字水印。坐标以画布左上为原点，`y` 为文字基线位置。
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub font_size: u32,
    pub opacity: f32,
}

impl Watermark {
    pub fn new(text: impl Into<String>, x: i32, y: i32, font_size: u32, opacity: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_size: font_size.clamp(8, 256),
            opacity: if opacity.is_nan() { 0.6 } else { opacity.clamp(0.05, 1.0) },
        }
    }

    /// 空白文字视为未设置水印。
    pub fn is_visible(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new("", 40, 40, 24, 0.6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_clamped_to_supported_range() {
        assert_eq!(clamp_quality(1.5), 1.0);
        assert_eq!(clamp_quality(-0.2), MIN_QUALITY);
        assert_eq!(clamp_quality(0.8), 0.8);
        assert_eq!(clamp_quality(f32::NAN), DEFAULT_JPEG_QUALITY);

        let config = RenderConfig::new(FitMode::Fit, Background::Blur, OutputFormat::Jpeg, 1.5);
        assert_eq!(config.quality(), 1.0);
    }

    #[test]
    fn size_spec_rejects_zero_dimensions() {
        assert!(matches!(SizeSpec::new(0, 1080, "x"), Err(ImageError::InvalidFormat(_))));
        assert!(matches!(SizeSpec::new(1080, 0, "x"), Err(ImageError::InvalidFormat(_))));
        let size = SizeSpec::parse(" 1080 x 1920 ", "Story").expect("parse size");
        assert_eq!((size.width(), size.height()), (1080, 1920));
        assert!(SizeSpec::parse("1080", "bad").is_err());
    }

    #[test]
    fn size_set_is_unique_and_capped() {
        let mut set = SizeSet::new(2);
        assert!(set.insert(SizeSpec::new(1080, 1080, "IG Square").unwrap()).unwrap());
        assert!(!set.insert(SizeSpec::new(1080, 1080, "Custom").unwrap()).unwrap());
        assert!(set.insert(SizeSpec::new(1920, 1080, "Full HD").unwrap()).unwrap());
        assert!(matches!(
            set.insert(SizeSpec::new(800, 800, "Custom").unwrap()),
            Err(ImageError::ResourceLimit(_))
        ));

        set.remove(0).expect("remove first size");
        assert!(set.remove(0).is_err(), "last size must stay");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rotation_cycles_in_both_directions() {
        let mut state = TransformState::default();
        state.rotate_left();
        assert_eq!(state.rotation, Rotation::Deg270);
        state.rotate_right();
        state.rotate_right();
        assert_eq!(state.rotation, Rotation::Deg90);
        assert!(state.rotation.swaps_axes());

        state.toggle_flip_horizontal();
        state.toggle_flip_horizontal();
        state.toggle_flip_vertical();
        assert!(!state.flip_horizontal);
        assert!(state.flip_vertical);
        assert!(!state.is_identity());

        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert!(Rotation::from_degrees(45).is_err());
    }

    #[test]
    fn fit_mode_resolves_backdrop() {
        let white = Background::Color(Rgb([255, 255, 255]));
        assert_eq!(FitMode::Fill.backdrop(white), None);
        assert_eq!(FitMode::Fit.backdrop(Background::Blur), Some(Background::Blur));
        assert_eq!(FitMode::CoverBlur.backdrop(white), Some(Background::Blur));
        assert_eq!(
            FitMode::CoverColor.backdrop(Background::Blur),
            Some(Background::Color(Rgb([0, 0, 0])))
        );
        assert_eq!(FitMode::parse("contain-white").unwrap(), FitMode::CoverColor);
        assert_eq!(FitMode::parse("cover").unwrap().scale_mode(), ScaleMode::Cover);
    }

    #[test]
    fn legacy_contain_names_keep_their_colour() {
        let (mode, background) = FitMode::parse_with_background("Contain-White").unwrap();
        assert_eq!(mode, FitMode::CoverColor);
        assert_eq!(background, Some(Background::Color(Rgb([255, 255, 255]))));
        assert_eq!(
            mode.backdrop(background.unwrap_or(Background::Blur)),
            Some(Background::Color(Rgb([255, 255, 255])))
        );

        let (_, black) = FitMode::parse_with_background("contain-black").unwrap();
        assert_eq!(black, Some(Background::Color(Rgb([0, 0, 0]))));
        assert_eq!(FitMode::parse_with_background("cover-color").unwrap().1, None);
        assert!(FitMode::parse_with_background("stretch").is_err());
    }

    #[test]
    fn background_parses_names_and_hex() {
        assert_eq!(Background::parse("blur").unwrap(), Background::Blur);
        assert_eq!(
            Background::parse("#FF8000").unwrap(),
            Background::Color(Rgb([255, 128, 0]))
        );
        assert!(Background::parse("#12").is_err());
        assert!(Background::parse("purple").is_err());
    }

    #[test]
    fn watermark_parameters_are_clamped() {
        let mark = Watermark::new("  ", 0, 0, 2, 3.0);
        assert_eq!(mark.font_size, 8);
        assert_eq!(mark.opacity, 1.0);
        assert!(!mark.is_visible());
    }
}
