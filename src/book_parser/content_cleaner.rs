//! 章节正文清洗。
//!
//! 只取正文容器内的文本节点，去掉站点水印，规整换行后重新包装为 XHTML。
//! 输出中的正文仍放在同 id 的容器里，所以对输出再次清洗结果不变。

use std::sync::OnceLock;

use quick_xml::events::{BytesText, Event};
use regex::Regex;
use scraper::{Html, Selector as CssSelector};
use tracing::{debug, warn};

use crate::base_system::context::Config;
use crate::base_system::error::{BookError, BookResult};

use super::xhtml::{XmlWriter, compact_writer, xhtml_document};

fn sel_with_id() -> &'static CssSelector {
    static S: OnceLock<CssSelector> = OnceLock::new();
    S.get_or_init(|| CssSelector::parse("[id]").unwrap())
}

fn re_paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

pub struct ContentCleaner {
    content_id: String,
    boilerplate: Vec<String>,
    language: String,
}

impl ContentCleaner {
    pub fn new(cfg: &Config) -> Self {
        Self {
            content_id: cfg.content_id.clone(),
            boilerplate: cfg
                .boilerplate
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            language: cfg.language.clone(),
        }
    }

    pub fn clean(&self, raw_html: &str, chapter_name: &str) -> BookResult<String> {
        let text = self.extract_text(raw_html)?;
        let segments = self.normalize(&text);
        if segments.iter().all(|s| s.trim().is_empty()) {
            warn!(target: "cleaner", chapter = %chapter_name, "章节正文为空");
        }
        debug!(target: "cleaner", chapter = %chapter_name, paragraphs = segments.len(), "cleaned");

        let content_id = self.content_id.as_str();
        xhtml_document(compact_writer(), &self.language, chapter_name, |w| {
            w.create_element("h2")
                .write_text_content(BytesText::new(chapter_name))?;
            w.create_element("div")
                .with_attribute(("id", content_id))
                .write_inner_content(|w| {
                    w.create_element("p").write_inner_content(|w| {
                        for (i, segment) in segments.iter().enumerate() {
                            if i > 0 {
                                write_break(w)?;
                            }
                            w.write_event(Event::Text(BytesText::new(segment)))?;
                        }
                        Ok::<(), quick_xml::Error>(())
                    })?;
                    Ok::<(), quick_xml::Error>(())
                })?;
            Ok(())
        })
    }

    fn extract_text(&self, raw_html: &str) -> BookResult<String> {
        let doc = Html::parse_document(raw_html);
        let container = doc
            .select(sel_with_id())
            .find(|el| el.value().id() == Some(self.content_id.as_str()))
            .ok_or_else(|| {
                BookError::Parse(format!("章节页面缺少正文容器 #{}", self.content_id))
            })?;
        Ok(container.text().collect())
    }

    /// 去水印、统一换行、去首尾空白，再按三个及以上连续换行切分段落。
    fn normalize(&self, text: &str) -> Vec<String> {
        let mut text = text.to_string();
        for mark in &self.boilerplate {
            text = text.replace(mark.as_str(), "");
        }
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        re_paragraph_break()
            .split(text.trim())
            .map(str::to_string)
            .collect()
    }
}

/// 段落分隔：换行 + 两个 `<br/>`，再次提取文本时恰好还原为三个换行。
fn write_break(w: &mut XmlWriter) -> quick_xml::Result<()> {
    w.write_event(Event::Text(BytesText::new("\n")))?;
    w.create_element("br").write_empty()?;
    w.write_event(Event::Text(BytesText::new("\n")))?;
    w.create_element("br").write_empty()?;
    w.write_event(Event::Text(BytesText::new("\n")))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::chapter_page;
    use super::*;

    fn cleaner() -> ContentCleaner {
        ContentCleaner::new(&Config::default())
    }

    #[test]
    fn strips_boilerplate_and_marks_paragraph_breaks() {
        let raw = chapter_page(
            "\n本文来自 轻小说文库(http://www.wenku8.com)\n\u{a0}\u{a0}第一段\n<br />\n<br />\n\u{a0}\u{a0}第二段\n",
        );
        let out = cleaner().clean(&raw, "第一章").unwrap();

        assert!(!out.contains("wenku8"));
        assert!(!out.contains("轻小说文库"));
        assert!(out.contains("<title>第一章</title>"));
        assert!(out.contains("<h2>第一章</h2>"));
        // 首尾空白（含全角与不换行空格）一并去除
        assert!(out.contains("<div id=\"content\"><p>第一段\n<br/>\n<br/>\n\u{a0}\u{a0}第二段</p></div>"));
    }

    #[test]
    fn two_newlines_are_not_a_paragraph_break() {
        let raw = chapter_page("甲\n\n乙");
        let out = cleaner().clean(&raw, "c").unwrap();
        assert!(out.contains("<p>甲\n\n乙</p>"));
    }

    #[test]
    fn carriage_returns_are_normalized() {
        let raw = chapter_page("甲\r\n\r\n\r\n乙");
        let out = cleaner().clean(&raw, "c").unwrap();
        assert!(out.contains("<p>甲\n<br/>\n<br/>\n乙</p>"));
        assert!(!out.contains('\r'));
    }

    #[test]
    fn cleaning_is_idempotent() {
        let raw = chapter_page(
            "  开头\n\n\n\n\n中间 a&lt;b &amp; \"引号\"\n\n结尾\r\n\r\n\r\n最后  ",
        );
        let c = cleaner();
        let once = c.clean(&raw, "第二章 <上>").unwrap();
        let twice = c.clean(&once, "第二章 <上>").unwrap();
        assert_eq!(once, twice);
        assert!(once.contains("<h2>第二章 &lt;上&gt;</h2>"));
    }

    #[test]
    fn missing_content_container_is_a_parse_error() {
        let err = cleaner()
            .clean("<html><body><div id=\"other\">x</div></body></html>", "c")
            .unwrap_err();
        assert!(matches!(err, BookError::Parse(_)));
    }

    #[test]
    fn empty_body_still_produces_a_document() {
        let out = cleaner().clean(&chapter_page(""), "空章").unwrap();
        assert!(out.contains("<div id=\"content\"><p></p></div>"));
    }
}
