//! 输出文件命名。
//!
//! 所有下载名都在这里拼装：单图导出、批量压缩包条目、压缩图、压缩包与 PDF 文件名。

use std::collections::HashSet;

use chrono::NaiveDate;

use super::model::{OutputFormat, SizeSpec};
use super::source::strip_extension;

/// 清洗文件名片段：只保留字母数字与 `.-_`，其余替换为 `_`。
pub fn sanitize_component(input: &str) -> String {
    let sanitized: String = input
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 批量导出时为每个源图分配唯一的基础名。
///
/// 同名源图依次追加 `-2`、`-3`……，保证压缩包内条目不冲突。
#[derive(Debug, Default)]
pub struct BaseNameAllocator {
    used: HashSet<String>,
}

impl BaseNameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, file_name: &str) -> String {
        let base = sanitize_component(&strip_extension(file_name));
        if self.used.insert(base.to_lowercase()) {
            return base;
        }
        let mut suffix = 2usize;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// 压缩包条目名：`{folder/}{base}_{w}x{h}.{ext}`。
pub fn batch_entry_name(
    folder: Option<&str>,
    base: &str,
    size: &SizeSpec,
    format: OutputFormat,
) -> String {
    let file = format!(
        "{}_{}x{}.{}",
        base,
        size.width(),
        size.height(),
        format.extension()
    );
    match folder.map(str::trim).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{}/{}", sanitize_component(folder), file),
        None => file,
    }
}

/// 单图导出名：`{toolPrefix}_{preset}_{base}.{ext}`，预设名中的空白替换为 `_`。
pub fn single_export_name(
    tool_prefix: &str,
    preset_label: &str,
    file_name: &str,
    format: OutputFormat,
) -> String {
    let preset = preset_label.split_whitespace().collect::<Vec<_>>().join("_");
    format!(
        "{}_{}_{}.{}",
        sanitize_component(tool_prefix),
        sanitize_component(&preset),
        sanitize_component(&strip_extension(file_name)),
        format.extension()
    )
}

/// 压缩图名：`min-{原文件名}`，扩展名统一为 `.jpg`。
pub fn compressed_name(file_name: &str) -> String {
    format!(
        "min-{}.{}",
        sanitize_component(&strip_extension(file_name)),
        OutputFormat::Jpeg.extension()
    )
}

/// 批量压缩包名：`{product}-bulk-export.zip`。
pub fn archive_name(product: &str) -> String {
    format!("{}-bulk-export.zip", sanitize_component(product))
}

/// PDF 文件名：`{product}-{YYYY-MM-DD}.pdf`。
pub fn document_name(product: &str, date: NaiveDate) -> String {
    format!("{}-{}.pdf", sanitize_component(product), date.format("%Y-%m-%d"))
}
