//! 每卷独立的临时工作目录。
//!
//! 章节原始页面先落到这里，清洗阶段再从中读回。
//! 目录随 `ScratchSpace` 一起销毁，成功或失败都不会残留到下一卷。

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::error::{BookError, BookResult};

pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub fn new(label: &str) -> BookResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("wenku-epub-{label}-"))
            .tempdir()
            .map_err(|e| BookError::io(std::env::temp_dir(), e))?;
        debug!(target: "scratch", path = %dir.path().display(), "scratch created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 将数据写入工作目录下的相对路径，必要时创建父目录。
    pub fn stage(&self, relative: &str, bytes: &[u8]) -> BookResult<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BookError::io(parent, e))?;
        }
        fs::write(&path, bytes).map_err(|e| BookError::io(&path, e))?;
        Ok(path)
    }

    pub fn read_text(&self, relative: &str) -> BookResult<String> {
        let path = self.dir.path().join(relative);
        fs::read_to_string(&path).map_err(|e| BookError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_files_disappear_with_scratch() {
        let scratch = ScratchSpace::new("test").unwrap();
        let staged = scratch.stage("raw/chapter_1.html", b"<p>hi</p>").unwrap();
        assert!(staged.exists());

        assert_eq!(scratch.read_text("raw/chapter_1.html").unwrap(), "<p>hi</p>");
        assert!(matches!(
            scratch.read_text("raw/missing.html"),
            Err(BookError::Io { .. })
        ));

        let root = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!root.exists());
    }
}
