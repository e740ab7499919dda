//! XHTML / XML 文档写出的公共部分。
//!
//! 所有文本与属性都经 quick-xml 转义后写出，不拼接原始字符串。

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::base_system::error::{BookError, BookResult};

pub(crate) const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub(crate) const OPS_NS: &str = "http://www.idpf.org/2007/ops";

pub(crate) type XmlWriter = Writer<Vec<u8>>;

/// 带缩进的写出器，用于 OPF / NCX / 导航等结构性文档。
pub(crate) fn pretty_writer() -> XmlWriter {
    Writer::new_with_indent(Vec::new(), b' ', 2)
}

/// 不缩进的写出器；正文文本中的换行必须原样保留。
pub(crate) fn compact_writer() -> XmlWriter {
    Writer::new(Vec::new())
}

pub(crate) fn write_decl(writer: &mut XmlWriter) -> quick_xml::Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
}

pub(crate) fn finish(writer: XmlWriter) -> BookResult<String> {
    String::from_utf8(writer.into_inner())
        .map_err(|e| BookError::Parse(format!("生成的文档不是合法 UTF-8: {e}")))
}

/// 写出完整的 XHTML 文档，`body` 负责 `<body>` 内部内容。
pub(crate) fn xhtml_document<F>(
    mut writer: XmlWriter,
    lang: &str,
    title: &str,
    body: F,
) -> BookResult<String>
where
    F: FnOnce(&mut XmlWriter) -> quick_xml::Result<()>,
{
    write_decl(&mut writer)?;
    writer.write_event(Event::DocType(BytesText::from_escaped("html")))?;
    writer
        .create_element("html")
        .with_attribute(("xmlns", XHTML_NS))
        .with_attribute(("xmlns:epub", OPS_NS))
        .with_attribute(("lang", lang))
        .with_attribute(("xml:lang", lang))
        .write_inner_content(|w| {
            w.create_element("head").write_inner_content(|w| {
                w.create_element("title")
                    .write_text_content(BytesText::new(title))?;
                Ok::<(), quick_xml::Error>(())
            })?;
            w.create_element("body").write_inner_content(body)?;
            Ok::<(), quick_xml::Error>(())
        })?;
    finish(writer)
}
