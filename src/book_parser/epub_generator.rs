//! EPUB 包结构生成。
//!
//! 清单、书脊、NCX 与导航文档都由同一份章节序列派生，
//! 章节 `position` 决定 id、文件名与所有目录中的顺序。

use quick_xml::events::BytesText;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::debug;

use crate::base_system::context::Config;
use crate::base_system::error::{BookError, BookResult};
use crate::download::models::{ChapterDocument, CoverImage};

use super::xhtml::{XmlWriter, finish, pretty_writer, write_decl, xhtml_document};

/// 用于从 "书名, 作者" 确定性生成 UUID v5 的命名空间。
/// 同一本书重复生成时 dc:identifier 不变，阅读器可以恢复进度。
const EPUB_UUID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30, 0xc8,
]);

const OPF_NS: &str = "http://www.idpf.org/2007/opf";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const NCX_NS: &str = "http://www.daisy.org/z3986/2005/ncx/";
const CONTAINER_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:container";

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
pub const COVER_IMAGE_FILE: &str = "cover.jpg";
pub const COVER_PAGE_FILE: &str = "cover.xhtml";
pub const NCX_FILE: &str = "toc.ncx";
pub const NAV_FILE: &str = "nav.xhtml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    pub idref: String,
    pub linear: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub id: String,
    pub play_order: usize,
    pub label: String,
    pub src: String,
}

/// 一卷的完整包模型，生成后交给打包器写出。
#[derive(Debug)]
pub struct EpubPackage {
    pub title: String,
    pub author: String,
    pub identifier: String,
    pub cover: CoverImage,
    pub chapters: Vec<ChapterDocument>,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<SpineItem>,
    pub nav_points: Vec<NavPoint>,
    pub container_xml: String,
    pub content_opf: String,
    pub toc_ncx: String,
    pub nav_xhtml: String,
    pub cover_xhtml: String,
}

pub struct EpubAssembler {
    language: String,
    generator: String,
}

impl EpubAssembler {
    pub fn new(cfg: &Config) -> Self {
        Self {
            language: cfg.language.clone(),
            generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn assemble(
        &self,
        title: &str,
        author: &str,
        cover: CoverImage,
        chapters: Vec<ChapterDocument>,
    ) -> BookResult<EpubPackage> {
        self.assemble_at(title, author, cover, chapters, OffsetDateTime::now_utc())
    }

    pub fn assemble_at(
        &self,
        title: &str,
        author: &str,
        cover: CoverImage,
        chapters: Vec<ChapterDocument>,
        modified: OffsetDateTime,
    ) -> BookResult<EpubPackage> {
        if chapters.is_empty() {
            return Err(BookError::Parse(format!("《{title}》没有可写入的章节")));
        }
        if let Some((i, c)) = chapters
            .iter()
            .enumerate()
            .find(|(i, c)| c.position != i + 1)
        {
            return Err(BookError::Parse(format!(
                "章节序号不连续：第 {} 项的序号为 {}",
                i + 1,
                c.position
            )));
        }

        let identifier = book_identifier(title, author);
        let manifest = manifest_items(&cover, &chapters);
        let spine = spine_items(&chapters);
        let nav_points: Vec<NavPoint> = chapters
            .iter()
            .map(|c| NavPoint {
                id: c.id(),
                play_order: c.position,
                label: c.name.clone(),
                src: c.file_name(),
            })
            .collect();

        let modified = modified
            .to_offset(time::UtcOffset::UTC)
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
            ))
            .map_err(|e| BookError::Parse(format!("时间格式化失败: {e}")))?;

        let content_opf = self.render_opf(title, author, &identifier, &modified, &manifest, &spine)?;
        let toc_ncx = render_ncx(title, author, &identifier, &nav_points)?;
        let nav_xhtml = self.render_nav(title, &nav_points)?;
        let cover_xhtml = self.render_cover_page(title)?;
        let container_xml = render_container()?;
        debug!(target: "epub", %title, chapters = chapters.len(), %identifier, "package assembled");

        Ok(EpubPackage {
            title: title.to_string(),
            author: author.to_string(),
            identifier,
            cover,
            chapters,
            manifest,
            spine,
            nav_points,
            container_xml,
            content_opf,
            toc_ncx,
            nav_xhtml,
            cover_xhtml,
        })
    }

    fn render_opf(
        &self,
        title: &str,
        author: &str,
        identifier: &str,
        modified: &str,
        manifest: &[ManifestItem],
        spine: &[SpineItem],
    ) -> BookResult<String> {
        let mut writer = pretty_writer();
        write_decl(&mut writer)?;
        writer
            .create_element("package")
            .with_attribute(("xmlns", OPF_NS))
            .with_attribute(("version", "3.0"))
            .with_attribute(("unique-identifier", "id"))
            .with_attribute(("xml:lang", self.language.as_str()))
            .write_inner_content(|w| {
                w.create_element("metadata")
                    .with_attribute(("xmlns:dc", DC_NS))
                    .with_attribute(("xmlns:opf", OPF_NS))
                    .write_inner_content(|w| {
                        w.create_element("meta")
                            .with_attribute(("property", "dcterms:modified"))
                            .write_text_content(BytesText::new(modified))?;
                        w.create_element("meta")
                            .with_attribute(("name", "generator"))
                            .with_attribute(("content", self.generator.as_str()))
                            .write_empty()?;
                        w.create_element("dc:identifier")
                            .with_attribute(("id", "id"))
                            .write_text_content(BytesText::new(identifier))?;
                        w.create_element("dc:title")
                            .write_text_content(BytesText::new(title))?;
                        w.create_element("dc:language")
                            .write_text_content(BytesText::new(&self.language))?;
                        w.create_element("dc:creator")
                            .with_attribute(("id", "creator"))
                            .write_text_content(BytesText::new(author))?;
                        w.create_element("meta")
                            .with_attribute(("name", "cover"))
                            .with_attribute(("content", "cover-img"))
                            .write_empty()?;
                        Ok::<(), quick_xml::Error>(())
                    })?;
                w.create_element("manifest").write_inner_content(|w| {
                    for item in manifest {
                        let mut attrs = vec![
                            ("id", item.id.as_str()),
                            ("href", item.href.as_str()),
                            ("media-type", item.media_type.as_str()),
                        ];
                        if let Some(props) = item.properties {
                            attrs.push(("properties", props));
                        }
                        w.create_element("item").with_attributes(attrs).write_empty()?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;
                w.create_element("spine")
                    .with_attribute(("toc", "ncx"))
                    .write_inner_content(|w| {
                        for item in spine {
                            let el = w
                                .create_element("itemref")
                                .with_attribute(("idref", item.idref.as_str()));
                            if item.linear {
                                el.write_empty()?;
                            } else {
                                el.with_attribute(("linear", "no")).write_empty()?;
                            }
                        }
                        Ok::<(), quick_xml::Error>(())
                    })?;
                Ok::<(), quick_xml::Error>(())
            })?;
        finish(writer)
    }

    fn render_nav(&self, title: &str, nav_points: &[NavPoint]) -> BookResult<String> {
        xhtml_document(pretty_writer(), &self.language, title, |w| {
            w.create_element("nav")
                .with_attribute(("epub:type", "toc"))
                .with_attribute(("id", "toc"))
                .with_attribute(("role", "doc-toc"))
                .write_inner_content(|w| {
                    w.create_element("h2")
                        .write_text_content(BytesText::new(title))?;
                    w.create_element("ol").write_inner_content(|w| {
                        for point in nav_points {
                            w.create_element("li").write_inner_content(|w| {
                                w.create_element("a")
                                    .with_attribute(("href", point.src.as_str()))
                                    .write_text_content(BytesText::new(&point.label))?;
                                Ok::<(), quick_xml::Error>(())
                            })?;
                        }
                        Ok::<(), quick_xml::Error>(())
                    })?;
                    Ok::<(), quick_xml::Error>(())
                })?;
            Ok(())
        })
    }

    fn render_cover_page(&self, title: &str) -> BookResult<String> {
        xhtml_document(pretty_writer(), &self.language, title, |w| {
            w.create_element("img")
                .with_attribute(("src", COVER_IMAGE_FILE))
                .with_attribute(("alt", "Cover"))
                .write_empty()?;
            Ok(())
        })
    }
}

/// `urn:uuid:` 形式的稳定标识，由书名与作者决定。
pub fn book_identifier(title: &str, author: &str) -> String {
    let seed = format!("{title}, {author}");
    let id = uuid::Uuid::new_v5(&EPUB_UUID_NAMESPACE, seed.as_bytes());
    format!("urn:uuid:{}", id.hyphenated())
}

fn manifest_items(cover: &CoverImage, chapters: &[ChapterDocument]) -> Vec<ManifestItem> {
    let mut items = vec![
        ManifestItem {
            id: "cover-img".to_string(),
            href: COVER_IMAGE_FILE.to_string(),
            media_type: cover.content_type.clone(),
            properties: Some("cover-image"),
        },
        ManifestItem {
            id: "cover".to_string(),
            href: COVER_PAGE_FILE.to_string(),
            media_type: XHTML_MEDIA_TYPE.to_string(),
            properties: None,
        },
    ];
    items.extend(chapters.iter().map(|c| ManifestItem {
        id: c.id(),
        href: c.file_name(),
        media_type: XHTML_MEDIA_TYPE.to_string(),
        properties: None,
    }));
    items.push(ManifestItem {
        id: "ncx".to_string(),
        href: NCX_FILE.to_string(),
        media_type: "application/x-dtbncx+xml".to_string(),
        properties: None,
    });
    items.push(ManifestItem {
        id: "nav".to_string(),
        href: NAV_FILE.to_string(),
        media_type: XHTML_MEDIA_TYPE.to_string(),
        properties: Some("nav"),
    });
    items
}

/// 封面（非线性）→ 导航 → 章节。
fn spine_items(chapters: &[ChapterDocument]) -> Vec<SpineItem> {
    let mut spine = vec![
        SpineItem {
            idref: "cover".to_string(),
            linear: false,
        },
        SpineItem {
            idref: "nav".to_string(),
            linear: true,
        },
    ];
    spine.extend(chapters.iter().map(|c| SpineItem {
        idref: c.id(),
        linear: true,
    }));
    spine
}

fn render_ncx(
    title: &str,
    author: &str,
    identifier: &str,
    nav_points: &[NavPoint],
) -> BookResult<String> {
    let mut writer = pretty_writer();
    write_decl(&mut writer)?;
    writer
        .create_element("ncx")
        .with_attribute(("xmlns", NCX_NS))
        .with_attribute(("version", "2005-1"))
        .write_inner_content(|w| {
            w.create_element("head").write_inner_content(|w| {
                for (name, content) in [
                    ("dtb:uid", identifier),
                    ("dtb:depth", "1"),
                    ("dtb:totalPageCount", "0"),
                    ("dtb:maxPageNumber", "0"),
                ] {
                    w.create_element("meta")
                        .with_attribute(("name", name))
                        .with_attribute(("content", content))
                        .write_empty()?;
                }
                Ok::<(), quick_xml::Error>(())
            })?;
            write_labelled(w, "docTitle", title)?;
            write_labelled(w, "docAuthor", author)?;
            w.create_element("navMap").write_inner_content(|w| {
                for point in nav_points {
                    let order = point.play_order.to_string();
                    w.create_element("navPoint")
                        .with_attribute(("id", point.id.as_str()))
                        .with_attribute(("playOrder", order.as_str()))
                        .write_inner_content(|w| {
                            write_labelled(w, "navLabel", &point.label)?;
                            w.create_element("content")
                                .with_attribute(("src", point.src.as_str()))
                                .write_empty()?;
                            Ok::<(), quick_xml::Error>(())
                        })?;
                }
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
    finish(writer)
}

/// `<tag><text>…</text></tag>`
fn write_labelled(w: &mut XmlWriter, tag: &str, text: &str) -> quick_xml::Result<()> {
    w.create_element(tag).write_inner_content(|w| {
        w.create_element("text")
            .write_text_content(BytesText::new(text))?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

fn render_container() -> BookResult<String> {
    let mut writer = pretty_writer();
    write_decl(&mut writer)?;
    writer
        .create_element("container")
        .with_attribute(("version", "1.0"))
        .with_attribute(("xmlns", CONTAINER_NS))
        .write_inner_content(|w| {
            w.create_element("rootfiles").write_inner_content(|w| {
                w.create_element("rootfile")
                    .with_attribute(("full-path", "OEBPS/content.opf"))
                    .with_attribute(("media-type", "application/oebps-package+xml"))
                    .write_empty()?;
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
    finish(writer)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{chapters, cover};
    use super::*;
    use regex::Regex;
    use time::macros::datetime;

    fn captures(pattern: &str, haystack: &str) -> Vec<String> {
        Regex::new(pattern)
            .unwrap()
            .captures_iter(haystack)
            .map(|c| c[1].to_string())
            .collect()
    }

    fn assemble(names: &[&str]) -> EpubPackage {
        EpubAssembler::new(&Config::default())
            .assemble_at(
                "书第一卷",
                "作者",
                cover(),
                chapters(names),
                datetime!(2024-03-05 06:07:08 UTC),
            )
            .unwrap()
    }

    #[test]
    fn manifest_spine_and_ncx_follow_chapter_positions() {
        let pkg = assemble(&["序章", "第一章", "第二章"]);

        let ids = captures(r#"<item id="([^"]+)""#, &pkg.content_opf);
        assert_eq!(
            ids,
            ["cover-img", "cover", "chapter_1", "chapter_2", "chapter_3", "ncx", "nav"]
        );
        let spine = captures(r#"<itemref idref="([^"]+)""#, &pkg.content_opf);
        assert_eq!(spine, ["cover", "nav", "chapter_1", "chapter_2", "chapter_3"]);
        assert!(pkg.content_opf.contains(r#"<itemref idref="cover" linear="no"/>"#));

        let nav_ids = captures(r#"<navPoint id="([^"]+)""#, &pkg.toc_ncx);
        assert_eq!(nav_ids, ["chapter_1", "chapter_2", "chapter_3"]);
        let orders = captures(r#"playOrder="(\d+)""#, &pkg.toc_ncx);
        assert_eq!(orders, ["1", "2", "3"]);
        let hrefs = captures(r#"<a href="([^"]+)""#, &pkg.nav_xhtml);
        assert_eq!(hrefs, ["chapter_1.xhtml", "chapter_2.xhtml", "chapter_3.xhtml"]);
    }

    #[test]
    fn metadata_is_complete() {
        let pkg = assemble(&["一"]);
        let opf = &pkg.content_opf;
        assert!(opf.contains(r#"<meta property="dcterms:modified">2024-03-05T06:07:08Z</meta>"#));
        assert!(opf.contains("<dc:language>zh</dc:language>"));
        assert!(opf.contains(r#"<dc:creator id="creator">作者</dc:creator>"#));
        assert!(opf.contains(r#"<meta name="cover" content="cover-img"/>"#));
        assert!(opf.contains(r#"properties="cover-image""#));
        assert!(opf.contains(r#"unique-identifier="id""#));
        assert!(pkg.toc_ncx.contains(&format!(
            r#"<meta name="dtb:uid" content="{}"/>"#,
            pkg.identifier
        )));
        assert!(pkg.cover_xhtml.contains(r#"<img src="cover.jpg" alt="Cover"/>"#));
        assert!(pkg.container_xml.contains(r#"full-path="OEBPS/content.opf""#));
        assert!(pkg.nav_xhtml.contains(r#"epub:type="toc""#));
    }

    #[test]
    fn identifier_is_stable_for_title_and_author() {
        let a = book_identifier("书", "作者");
        assert_eq!(a, book_identifier("书", "作者"));
        assert_ne!(a, book_identifier("书", "别人"));
        assert!(a.starts_with("urn:uuid:"));
    }

    #[test]
    fn markup_in_names_is_escaped() {
        let pkg = EpubAssembler::new(&Config::default())
            .assemble("A & B <C>", "\"某\"", cover(), chapters(&["第<1>章 & 'x'"]))
            .unwrap();
        assert!(pkg.content_opf.contains("<dc:title>A &amp; B &lt;C&gt;</dc:title>"));
        assert!(pkg.toc_ncx.contains("<text>第&lt;1&gt;章 &amp; "));
        assert!(pkg.nav_xhtml.contains("<title>A &amp; B &lt;C&gt;</title>"));
        assert!(!pkg.nav_xhtml.contains("<C>"));
    }

    #[test]
    fn gaps_in_positions_are_rejected() {
        let mut docs = chapters(&["一", "二"]);
        docs[1].position = 3;
        let err = EpubAssembler::new(&Config::default())
            .assemble("书", "作者", cover(), docs)
            .unwrap_err();
        assert!(matches!(err, BookError::Parse(_)));

        let err = EpubAssembler::new(&Config::default())
            .assemble("书", "作者", cover(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, BookError::Parse(_)));
    }
}
