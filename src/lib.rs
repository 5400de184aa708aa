//! # SnapSizes 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 CLI (clap, src/main.rs)                  │
//! │   presets · resize · bulk · pdf · compress · preview     │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<(), AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            库 (Rust)                             │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ settings ─── JSON 设置 → ImageConfig                 │
//! │  │                                                       │
//! │  ├─ presets ──── 平台尺寸预设                             │
//! │  │                                                       │
//! │  └─ image_handler                                        │
//! │      ├─ workspace / loader / pipeline   导入·解码         │
//! │      ├─ geometry / render               几何·渲染         │
//! │      ├─ encoder                         JPEG / PNG       │
//! │      └─ batch / document                ZIP / PDF        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 子命令的返回类型 |
//! | [`settings`] | 读取 / 保存 JSON 设置，并叠加到 `ImageConfig` |
//! | [`presets`] | Instagram / YouTube / WhatsApp 等平台的推荐尺寸 |
//! | [`image_handler`] | 导入、几何计算、渲染、编码、批量 ZIP 与 PDF 导出 |

pub mod error;
pub mod image_handler;
pub mod presets;
pub mod settings;
