//! 下载相关的数据模型定义。
//!
//! 顺序敏感的集合一律使用 `Vec`，章节顺序即阅读顺序。

use std::path::PathBuf;

/// 索引页解析结果，构建后不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookIndex {
    pub title: String,
    pub author: String,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub chapters: Vec<ChapterRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    pub name: String,
    pub source_url: String,
}

/// 抓取到的章节原始页面，`index` 为其在卷内目录中的下标。
#[derive(Debug, Clone)]
pub struct RawChapter {
    pub index: usize,
    pub name: String,
    pub source_url: String,
    pub html: String,
}

/// 清洗后的章节；`position` 从 1 开始，决定文件名与所有目录中的顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDocument {
    pub name: String,
    pub body: String,
    pub position: usize,
}

impl ChapterDocument {
    pub fn id(&self) -> String {
        format!("chapter_{}", self.position)
    }

    pub fn file_name(&self) -> String {
        format!("chapter_{}.xhtml", self.position)
    }
}

#[derive(Debug, Clone)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub source_url: String,
}

#[derive(Debug)]
pub enum VolumeOutcome {
    Written(PathBuf),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub volumes: Vec<(String, VolumeOutcome)>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.volumes
            .iter()
            .filter(|(_, o)| matches!(o, VolumeOutcome::Written(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.volumes.len() - self.succeeded()
    }
}
