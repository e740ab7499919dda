//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`        — 数据模型（BookIndex / Volume / ChapterDocument 等）
//! - `progress`      — CLI 进度条
//! - `chapter_pool`  — 章节并发下载工作池
//! - `downloader`    — 分卷处理主流程编排

pub(crate) mod chapter_pool;
pub mod downloader;
pub mod models;
pub(crate) mod progress;
