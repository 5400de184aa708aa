//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理本地文件与内存字节的加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - 内存字节：体积限制。
//! - 两者都用魔数嗅探 MIME，只接受 `image/*`，不信任扩展名。

use std::path::Path;

use super::source::RawImageData;
use super::{ImageConfig, ImageError};

/// 从本地路径加载图片原始字节。
pub(crate) fn load_from_file(path: &Path, config: &ImageConfig) -> Result<RawImageData, ImageError> {
    log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

    if !path.exists() {
        return Err(ImageError::FileSystem(format!("文件不存在：{}", path.display())));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;
    if !metadata.is_file() {
        return Err(ImageError::FileSystem(format!("不是文件：{}", path.display())));
    }
    ensure_within_size(metadata.len(), config)?;

    let bytes = std::fs::read(path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    load_from_bytes(file_name, bytes, config)
}

/// 从内存字节加载（调用方已持有文件内容）。
pub(crate) fn load_from_bytes(
    file_name: impl Into<String>,
    bytes: Vec<u8>,
    config: &ImageConfig,
) -> Result<RawImageData, ImageError> {
    ensure_within_size(bytes.len() as u64, config)?;
    let mime = sniff_image_mime(&bytes)?;

    Ok(RawImageData {
        bytes,
        file_name: file_name.into(),
        mime,
    })
}

fn ensure_within_size(len: u64, config: &ImageConfig) -> Result<(), ImageError> {
    if len > config.max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            len as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }
    Ok(())
}

/// 通过文件签名（magic bytes）识别图片 MIME。
pub fn sniff_image_mime(bytes: &[u8]) -> Result<&'static str, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(kind.mime_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn sniff_accepts_png_and_rejects_pdf() {
        assert_eq!(sniff_image_mime(PNG_SIGNATURE).expect("png"), "image/png");
        assert!(matches!(
            sniff_image_mime(b"%PDF-1.5\n%\xE2\xE3\xCF\xD3"),
            Err(ImageError::InvalidFormat(_))
        ));
        assert!(sniff_image_mime(&[]).is_err());
    }

    #[test]
    fn oversized_bytes_are_rejected_before_sniffing() {
        let config = ImageConfig {
            max_file_size: 4,
            ..ImageConfig::default()
        };
        let result = load_from_bytes("big.png", PNG_SIGNATURE.to_vec(), &config);
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn load_from_file_reports_missing_and_reads_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            load_from_file(&missing, &ImageConfig::default()),
            Err(ImageError::FileSystem(_))
        ));

        let path = dir.path().join("logo.png");
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(PNG_SIGNATURE).expect("write file");
        let raw = load_from_file(&path, &ImageConfig::default()).expect("load should succeed");
        assert_eq!(raw.file_name, "logo.png");
        assert_eq!(raw.mime, "image/png");
    }
}
