//! 流水线错误类型。
//!
//! `Validation` / `Selection` 由交互层就地重试，不会冒泡到卷级别；
//! 其余错误对当前卷致命（索引页解析失败则对整次运行致命）。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookError {
    #[error("获取 {url} 失败: {message}")]
    Fetch { url: String, message: String },

    #[error("解析失败: {0}")]
    Parse(String),

    #[error("输入无效: {0}")]
    Validation(String),

    #[error("选择无效: {0}")]
    Selection(String),

    #[error("分卷 {name} 的输出文件 {file} 与其他分卷重复（会导致互相覆盖）")]
    DuplicateVolume { name: String, file: String },

    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("xml 生成失败: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("用户取消")]
    Cancelled,
}

impl BookError {
    pub fn fetch(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<io::Error> for BookError {
    fn from(source: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

pub type BookResult<T> = Result<T, BookError>;
