//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 保存配置
    #[serde(default)]
    pub output_dir: String,
    #[serde(default = "default_true")]
    pub allow_overwrite_files: bool,

    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_wait_time")]
    pub min_wait_time: u64,
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,
    #[serde(default = "default_source_encoding")]
    pub source_encoding: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 页面结构
    #[serde(default = "default_title_id")]
    pub title_id: String,
    #[serde(default = "default_author_id")]
    pub author_id: String,
    #[serde(default = "default_author_prefix")]
    pub author_prefix: String,
    #[serde(default = "default_volume_heading_class")]
    pub volume_heading_class: String,
    #[serde(default = "default_content_id")]
    pub content_id: String,
    #[serde(default = "default_boilerplate")]
    pub boilerplate: Vec<String>,
    #[serde(default = "default_illustration_chapter_name")]
    pub illustration_chapter_name: String,

    // EPUB 配置
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_cover_max_dimension_px")]
    pub cover_max_dimension_px: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: String::new(),
            allow_overwrite_files: default_true(),
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            min_wait_time: default_min_wait_time(),
            max_wait_time: default_max_wait_time(),
            source_encoding: default_source_encoding(),
            user_agent: default_user_agent(),
            title_id: default_title_id(),
            author_id: default_author_id(),
            author_prefix: default_author_prefix(),
            volume_heading_class: default_volume_heading_class(),
            content_id: default_content_id(),
            boilerplate: default_boilerplate(),
            illustration_chapter_name: default_illustration_chapter_name(),
            language: default_language(),
            jpeg_quality: default_jpeg_quality(),
            cover_max_dimension_px: default_cover_max_dimension_px(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 19] = [
            FieldMeta {
                name: "output_dir",
                description: "EPUB 输出目录（留空为当前目录）",
            },
            FieldMeta {
                name: "allow_overwrite_files",
                description: "是否允许覆盖已存在的 EPUB 文件",
            },
            FieldMeta {
                name: "max_workers",
                description: "章节下载并发线程数 (1-16)",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "最大重试次数",
            },
            FieldMeta {
                name: "min_wait_time",
                description: "首次重试前的等待时间, 单位ms",
            },
            FieldMeta {
                name: "max_wait_time",
                description: "重试等待时间上限, 单位ms",
            },
            FieldMeta {
                name: "source_encoding",
                description: "站点页面编码，例如 gbk、utf-8",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "title_id",
                description: "索引页中书名元素的 id",
            },
            FieldMeta {
                name: "author_id",
                description: "索引页中作者元素的 id",
            },
            FieldMeta {
                name: "author_prefix",
                description: "作者文本前需要去掉的标签",
            },
            FieldMeta {
                name: "volume_heading_class",
                description: "分卷标题单元格的 class",
            },
            FieldMeta {
                name: "content_id",
                description: "章节页正文容器的 id",
            },
            FieldMeta {
                name: "boilerplate",
                description: "需要从正文中删除的站点水印文本（精确匹配）",
            },
            FieldMeta {
                name: "illustration_chapter_name",
                description: "插图章节名称（用作封面来源，不计入正文）",
            },
            FieldMeta {
                name: "language",
                description: "EPUB 语言标签",
            },
            FieldMeta {
                name: "jpeg_quality",
                description: "封面 JPEG 转码质量 (1-100)",
            },
            FieldMeta {
                name: "cover_max_dimension_px",
                description: "封面最长边像素上限，0 表示不缩放",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn output_root(&self) -> PathBuf {
        if self.output_dir.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.output_dir)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.clamp(1, 16)
    }
}

/// 将卷名转成可用的文件名；Windows 禁用字符替换为全角字符。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '"' => '＂',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.len() > max_len {
        cleaned = elide_middle(&cleaned, max_len);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    cleaned
}

/// 超长时保留首尾、省略中间：卷名的区分部分（卷号）在末尾，不能被截掉。
/// 按字节计长度，且只在 UTF-8 字符边界处切分。
fn elide_middle(name: &str, max_len: usize) -> String {
    const MARK: &str = "…";
    let budget = max_len.saturating_sub(MARK.len());
    let mut head = budget / 2;
    while !name.is_char_boundary(head) {
        head -= 1;
    }
    let mut tail = name.len() - (budget - head);
    while !name.is_char_boundary(tail) {
        tail += 1;
    }
    format!("{}{MARK}{}", &name[..head], &name[tail..])
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_wait_time() -> u64 {
    500
}

fn default_max_wait_time() -> u64 {
    8000
}

fn default_source_encoding() -> String {
    "gbk".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_title_id() -> String {
    "title".to_string()
}

fn default_author_id() -> String {
    "info".to_string()
}

fn default_author_prefix() -> String {
    "作者：".to_string()
}

fn default_volume_heading_class() -> String {
    "vcss".to_string()
}

fn default_content_id() -> String {
    "content".to_string()
}

fn default_boilerplate() -> Vec<String> {
    vec![
        "本文来自 轻小说文库(http://www.wenku8.com)".to_string(),
        "最新最全的日本动漫轻小说 轻小说文库(http://www.wenku8.com) 为你一网打尽！".to_string(),
    ]
}

fn default_illustration_chapter_name() -> String {
    "插图".to_string()
}

fn default_language() -> String {
    "zh".to_string()
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_cover_max_dimension_px() -> u32 {
    0
}
