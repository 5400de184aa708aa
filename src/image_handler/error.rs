//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载图片链路（导入 → 解码 → 渲染 → 编码 → 打包）中的所有错误来源，
//! 避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! ## 实现思路
//!
//! - `code()` 提供稳定的机器可读错误码，供 CLI 输出与日志检索。
//! - `stage()` 标识出错阶段，批量导出时按阶段统计失败。

/// 图片处理统一错误类型。
///
/// 该类型会在应用层被上转为 `AppError`，最终由 CLI 输出给用户。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("压缩包错误：{0}")]
    Archive(String),

    #[error("文档错误：{0}")]
    Document(String),

    #[error("已取消：{0}")]
    Cancelled(String),
}

impl ImageError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::Encode(_) => "E_ENCODE",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Archive(_) => "E_ARCHIVE",
            Self::Document(_) => "E_DOCUMENT",
            Self::Cancelled(_) => "E_CANCELLED",
        }
    }

    /// 出错阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::FileSystem(_) | Self::ResourceLimit(_) => "load",
            Self::Decode(_) => "decode",
            Self::InvalidFormat(_) => "config",
            Self::Encode(_) => "encode",
            Self::Archive(_) => "archive",
            Self::Document(_) => "document",
            Self::Cancelled(_) => "cancel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_distinct() {
        let errors = [
            ImageError::Decode(String::new()),
            ImageError::InvalidFormat(String::new()),
            ImageError::Encode(String::new()),
            ImageError::FileSystem(String::new()),
            ImageError::ResourceLimit(String::new()),
            ImageError::Archive(String::new()),
            ImageError::Document(String::new()),
            ImageError::Cancelled(String::new()),
        ];

        let mut codes: Vec<&str> = errors.iter().map(ImageError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(ImageError::Cancelled("x".into()).code(), "E_CANCELLED");
    }

    #[test]
    fn message_keeps_inner_detail() {
        let err = ImageError::Encode("画布导出失败".into());
        assert!(err.to_string().contains("画布导出失败"));
        assert_eq!(err.stage(), "encode");
    }
}
