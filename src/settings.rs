//! 用户设置（JSON 文件）
//!
//! 所有字段均可省略，缺失字段取默认值；文件不存在时等同于空设置。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::image_handler::{ImageConfig, ImagePerformanceProfile, OutputFormat, clamp_quality};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// 单图导出文件名前缀。
    pub tool_prefix: String,
    /// 压缩包与 PDF 文件名使用的产品名。
    pub product_name: String,
    pub profile: Option<String>,
    pub max_files: Option<usize>,
    pub max_file_size_mb: Option<u64>,
    pub default_quality: Option<f32>,
    pub output_format: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_prefix: "SnapSizes".to_string(),
            product_name: "SnapSizes".to_string(),
            profile: None,
            max_files: None,
            max_file_size_mb: None,
            default_quality: None,
            output_format: None,
        }
    }
}

impl Settings {
    /// 叠加到默认图片配置上。
    pub fn image_config(&self) -> Result<ImageConfig, AppError> {
        let mut config = ImageConfig::default();

        if let Some(profile) = &self.profile {
            config.apply_performance_profile(ImagePerformanceProfile::from_str(profile)?);
        }
        if let Some(max_files) = self.max_files {
            if max_files == 0 {
                return Err(AppError::Settings("maxFiles 必须大于 0".to_string()));
            }
            config.max_files = max_files;
        }
        if let Some(mb) = self.max_file_size_mb {
            if mb == 0 {
                return Err(AppError::Settings("maxFileSizeMb 必须大于 0".to_string()));
            }
            config.max_file_size = mb
                .checked_mul(1024 * 1024)
                .ok_or_else(|| AppError::Settings(format!("maxFileSizeMb 过大：{}", mb)))?;
        }
        if let Some(quality) = self.default_quality {
            config.default_quality = clamp_quality(quality);
        }

        Ok(config)
    }

    pub fn output_format(&self) -> Result<OutputFormat, AppError> {
        match &self.output_format {
            Some(format) => Ok(OutputFormat::parse(format)?),
            None => Ok(OutputFormat::Jpeg),
        }
    }
}

/// 读取设置文件；路径为空或文件不存在时返回默认设置。
pub fn load_settings(path: Option<&Path>) -> Result<Settings, AppError> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    if !path.exists() {
        log::debug!("设置文件不存在，使用默认设置: {}", path.display());
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)?;
    let settings = serde_json::from_str::<Settings>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;
    log::info!("⚙️ 已加载设置: {}", path.display());
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), AppError> {
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}
