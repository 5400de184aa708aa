//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ImageConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中性能档位（quality / balanced / speed）作为高层语义，映射到底层参数组合。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - `ImagePerformanceProfile` 负责档位字符串解析与反向输出。
//! - `apply_performance_profile` 将档位转换为具体缩放滤镜与背景模糊强度。
//! - `infer_performance_profile` 用于从当前配置反推档位（给 CLI 展示状态）。

use image::imageops::FilterType;

use super::ImageError;

/// 默认 JPEG 质量（与画布 `toBlob` 默认值一致）。
pub const DEFAULT_JPEG_QUALITY: f32 = 0.92;

/// 图片处理配置。
///
/// 字段覆盖了导入、解码、渲染、批量导出四个阶段。
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// 导入阶段允许的单文件最大体积（字节）。
    pub max_file_size: u64,
    /// 单个工作区允许导入的最大图片数量。
    pub max_files: usize,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 输出尺寸集合的最大条目数。
    pub max_output_sizes: usize,
    /// 输出画布单边最大值。
    pub max_output_dimension: u32,
    /// 缩放滤镜。
    pub resize_filter: FilterType,
    /// 模糊背景的高斯标准差（像素）。
    pub backdrop_blur_sigma: f32,
    /// 模糊背景的亮度系数（`0.6` 即压暗 40%）。
    pub backdrop_brightness: f32,
    /// 未指定时使用的 JPEG 质量。
    pub default_quality: f32,
    /// 批量导出每组之间的让步延迟（毫秒），`0` 表示仅 `yield_now`。
    pub batch_yield_delay_ms: u64,
    /// 压缩包内的目录名，`None` 表示直接放在根目录。
    pub archive_folder: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 25 * 1024 * 1024,
            max_files: 50,
            max_decoded_pixels: 60_000_000,
            max_decoded_bytes: 256 * 1024 * 1024,
            max_output_sizes: 4,
            max_output_dimension: 8192,
            resize_filter: FilterType::Triangle,
            backdrop_blur_sigma: 30.0,
            backdrop_brightness: 0.6,
            default_quality: DEFAULT_JPEG_QUALITY,
            batch_yield_delay_ms: 0,
            archive_folder: Some("snapsizes-export".to_string()),
        }
    }
}

/// 图片性能档位（面向产品/用户语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与性能平衡
/// - `Speed`：优先导出速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl ImagePerformanceProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use snapsizes::image_handler::ImagePerformanceProfile;
    ///
    /// let p = ImagePerformanceProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), snapsizes::image_handler::ImageError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl ImageConfig {
    /// 基于当前参数反推性能档位。
    pub(crate) fn infer_performance_profile(&self) -> ImagePerformanceProfile {
        match self.resize_filter {
            FilterType::Lanczos3 | FilterType::CatmullRom => ImagePerformanceProfile::Quality,
            FilterType::Nearest => ImagePerformanceProfile::Speed,
            FilterType::Triangle | FilterType::Gaussian => ImagePerformanceProfile::Balanced,
        }
    }

    /// 应用指定性能档位到实际参数。
    ///
    /// 只调整滤镜与模糊强度，尺寸与体积限制保持不变。
    pub(crate) fn apply_performance_profile(&mut self, profile: ImagePerformanceProfile) {
        match profile {
            ImagePerformanceProfile::Quality => {
                self.resize_filter = FilterType::CatmullRom;
                self.backdrop_blur_sigma = 30.0;
            }
            ImagePerformanceProfile::Balanced => {
                self.resize_filter = FilterType::Triangle;
                self.backdrop_blur_sigma = 30.0;
            }
            ImagePerformanceProfile::Speed => {
                self.resize_filter = FilterType::Nearest;
                self.backdrop_blur_sigma = 24.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_roundtrip_through_config() {
        for profile in [
            ImagePerformanceProfile::Quality,
            ImagePerformanceProfile::Balanced,
            ImagePerformanceProfile::Speed,
        ] {
            let mut config = ImageConfig::default();
            config.apply_performance_profile(profile);
            assert_eq!(config.infer_performance_profile(), profile);
        }
    }

    #[test]
    fn profile_parser_is_case_insensitive() {
        assert_eq!(
            ImagePerformanceProfile::from_str("  SPEED ").expect("parse speed"),
            ImagePerformanceProfile::Speed
        );
        assert!(matches!(
            ImagePerformanceProfile::from_str("ultra"),
            Err(ImageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn default_matches_product_limits() {
        let config = ImageConfig::default();
        assert_eq!(config.max_file_size, 25 * 1024 * 1024);
        assert_eq!(config.max_output_sizes, 4);
        assert!((config.backdrop_brightness - 0.6).abs() < f32::EPSILON);
    }
}
