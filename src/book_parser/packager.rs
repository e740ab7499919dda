//! EPUB 归档写出。
//!
//! `mimetype` 必须是第一个条目且不压缩。归档先写到输出目录下的临时文件，
//! 完整写完后再改名为目标文件，中途失败不会留下半个 `.epub`。

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::base_system::context::{Config, safe_fs_name};
use crate::base_system::error::{BookError, BookResult};

use super::epub_generator::{COVER_IMAGE_FILE, COVER_PAGE_FILE, EpubPackage, NAV_FILE, NCX_FILE};

pub const EPUB_MIMETYPE: &str = "application/epub+zip";

pub struct Packager {
    output_root: PathBuf,
    allow_overwrite: bool,
}

impl Packager {
    pub fn new(cfg: &Config) -> Self {
        Self {
            output_root: cfg.output_root(),
            allow_overwrite: cfg.allow_overwrite_files,
        }
    }

    /// 卷名对应的输出路径：`<输出目录>/<卷名>.epub`
    pub fn output_path_for(&self, volume_name: &str) -> PathBuf {
        self.output_root.join(output_file_name(volume_name))
    }

    pub fn pack(&self, package: &EpubPackage, output_path: &Path) -> BookResult<()> {
        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| BookError::io(parent, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".wenku-epub-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| BookError::io(parent, e))?;

        {
            let mut zip = ZipWriter::new(tmp.as_file_mut());
            write_entries(&mut zip, package)?;
            zip.finish()?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| BookError::io(tmp.path(), e))?;

        let persisted = if self.allow_overwrite {
            tmp.persist(output_path)
        } else {
            tmp.persist_noclobber(output_path)
        };
        persisted.map_err(|e| BookError::io(output_path, e.error))?;

        info!(target: "epub", path = %output_path.display(), chapters = package.chapters.len(), "EPUB 已写出");
        Ok(())
    }
}

/// 卷名转换后的文件名。不同卷名可能映射到同一文件名（替换字符、截断），
/// 判断分卷是否会互相覆盖时应比较这里的结果。
pub fn output_file_name(volume_name: &str) -> String {
    format!("{}.epub", safe_fs_name(volume_name, "_", 120))
}

fn write_entries<W>(zip: &mut ZipWriter<W>, package: &EpubPackage) -> BookResult<()>
where
    W: std::io::Write + std::io::Seek,
{
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(EPUB_MIMETYPE.as_bytes())?;

    let oebps = |name: &str| format!("OEBPS/{name}");
    let mut entries: Vec<(String, &[u8])> = vec![
        (
            "META-INF/container.xml".to_string(),
            package.container_xml.as_bytes(),
        ),
        (oebps("content.opf"), package.content_opf.as_bytes()),
        (oebps(NCX_FILE), package.toc_ncx.as_bytes()),
        (oebps(NAV_FILE), package.nav_xhtml.as_bytes()),
        (oebps(COVER_PAGE_FILE), package.cover_xhtml.as_bytes()),
        (oebps(COVER_IMAGE_FILE), package.cover.bytes.as_slice()),
    ];
    for chapter in &package.chapters {
        entries.push((oebps(&chapter.file_name()), chapter.body.as_bytes()));
    }

    for (name, bytes) in entries {
        debug!(target: "epub", entry = %name, size = bytes.len(), "zip entry");
        zip.start_file(name, deflated)?;
        zip.write_all(bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Read as _;

    use super::*;
    use crate::book_parser::epub_generator::EpubAssembler;
    use crate::book_parser::epub_generator::fixtures::{chapters, cover};

    fn package() -> EpubPackage {
        EpubAssembler::new(&Config::default())
            .assemble("书", "作者", cover(), chapters(&["一", "二"]))
            .unwrap()
    }

    fn packager(dir: &Path, allow_overwrite: bool) -> Packager {
        let cfg = Config {
            output_dir: dir.display().to_string(),
            allow_overwrite_files: allow_overwrite,
            ..Config::default()
        };
        Packager::new(&cfg)
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let packager = packager(dir.path(), true);
        let path = packager.output_path_for("书");
        packager.pack(&package(), &path).unwrap();

        let raw = fs::read(&path).unwrap();
        // 本地文件头固定 30 字节，紧接着是文件名
        assert_eq!(&raw[0..4], b"PK\x03\x04");
        assert_eq!(&raw[30..38], b"mimetype");

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        let mut content = String::new();
        first.read_to_string(&mut content).unwrap();
        assert_eq!(content, "application/epub+zip");
    }

    #[test]
    fn entries_are_written_in_package_order() {
        let dir = tempfile::tempdir().unwrap();
        let packager = packager(dir.path(), true);
        let path = packager.output_path_for("书");
        packager.pack(&package(), &path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let names_in_order: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names_in_order,
            [
                "mimetype",
                "META-INF/container.xml",
                "OEBPS/content.opf",
                "OEBPS/toc.ncx",
                "OEBPS/nav.xhtml",
                "OEBPS/cover.xhtml",
                "OEBPS/cover.jpg",
                "OEBPS/chapter_1.xhtml",
                "OEBPS/chapter_2.xhtml",
            ]
        );
    }

    #[test]
    fn refusing_to_overwrite_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let packager = packager(dir.path(), false);
        let path = packager.output_path_for("书");
        fs::write(&path, b"old").unwrap();

        let err = packager.pack(&package(), &path).unwrap_err();
        assert!(matches!(err, BookError::Io { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"old");
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn overwrite_replaces_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let packager = packager(dir.path(), true);
        let path = packager.output_path_for("书");
        fs::write(&path, b"old").unwrap();
        packager.pack(&package(), &path).unwrap();
        assert!(zip::ZipArchive::new(File::open(&path).unwrap()).is_ok());
    }

    #[test]
    fn long_volume_names_map_to_distinct_files() {
        let packager = packager(Path::new("/tmp/out"), true);
        let title = "书名".repeat(20);
        let first = packager.output_path_for(&format!("{title}第一卷"));
        let second = packager.output_path_for(&format!("{title}第二卷"));
        assert_ne!(first, second);
        assert!(first.to_string_lossy().ends_with("第一卷.epub"));
    }

    #[test]
    fn output_name_is_filesystem_safe() {
        let packager = packager(Path::new("/tmp/out"), true);
        assert_eq!(
            packager.output_path_for("书/第一卷?"),
            Path::new("/tmp/out").join("书、第一卷？.epub")
        );
    }
}
