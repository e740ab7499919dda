//! 索引页解析：书名、作者、分卷与章节链接。
//!
//! 索引页是一张表格，分卷标题单元格带有特定 class（默认 `vcss`），
//! 章节单元格内含 `<a href>`，其余为占位单元格。占位单元格必须先剔除，
//! 否则会打乱标题与章节的相邻关系。

use std::collections::HashSet;
use std::sync::OnceLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector as CssSelector};
use tracing::{debug, info, warn};

use crate::base_system::context::Config;
use crate::base_system::error::{BookError, BookResult};
use crate::download::models::{BookIndex, ChapterRef, Volume};
use crate::ui::selection::{Selector, choose_range};

use super::packager::output_file_name;

fn sel_cells() -> &'static CssSelector {
    static S: OnceLock<CssSelector> = OnceLock::new();
    S.get_or_init(|| CssSelector::parse("td").unwrap())
}

fn sel_links() -> &'static CssSelector {
    static S: OnceLock<CssSelector> = OnceLock::new();
    S.get_or_init(|| CssSelector::parse("a[href]").unwrap())
}

fn sel_with_id() -> &'static CssSelector {
    static S: OnceLock<CssSelector> = OnceLock::new();
    S.get_or_init(|| CssSelector::parse("[id]").unwrap())
}

#[derive(Debug)]
enum Cell {
    Heading(String),
    Chapter(ChapterRef),
}

pub struct IndexParser {
    title_id: String,
    author_id: String,
    author_prefix: String,
    heading_class: String,
}

impl IndexParser {
    pub fn new(cfg: &Config) -> Self {
        Self {
            title_id: cfg.title_id.clone(),
            author_id: cfg.author_id.clone(),
            author_prefix: cfg.author_prefix.clone(),
            heading_class: cfg.volume_heading_class.clone(),
        }
    }

    /// 解析索引页。存在多个分卷时通过 `selector` 选择要保留的连续区间。
    pub fn parse(
        &self,
        html: &str,
        index_url: &str,
        selector: &mut dyn Selector,
    ) -> BookResult<BookIndex> {
        let index_url = Url::parse(index_url)
            .map_err(|e| BookError::Parse(format!("索引页地址无效 {index_url}: {e}")))?;
        let base = base_url(&index_url);
        let doc = Html::parse_document(html);

        let title = text_by_id(&doc, &self.title_id)
            .ok_or_else(|| BookError::Parse(format!("索引页缺少书名元素 #{}", self.title_id)))?;
        let author = text_by_id(&doc, &self.author_id)
            .map(|raw| {
                raw.trim_start_matches(self.author_prefix.as_str())
                    .trim()
                    .to_string()
            })
            .ok_or_else(|| BookError::Parse(format!("索引页缺少作者元素 #{}", self.author_id)))?;

        let cells: Vec<Cell> = doc
            .select(sel_cells())
            .filter_map(|td| self.classify(td, &base))
            .collect();

        let chapter_count = cells
            .iter()
            .filter(|c| matches!(c, Cell::Chapter(_)))
            .count();
        if chapter_count == 0 {
            return Err(BookError::Parse("索引页中没有找到任何章节链接".to_string()));
        }
        let heading_count = cells.len() - chapter_count;
        info!(target: "index", %title, %author, chapters = chapter_count, headings = heading_count, "索引页解析完成");

        let volumes = if heading_count <= 1 {
            let chapters = cells
                .into_iter()
                .filter_map(|c| match c {
                    Cell::Chapter(ch) => Some(ch),
                    Cell::Heading(_) => None,
                })
                .collect();
            vec![Volume {
                name: title.clone(),
                chapters,
            }]
        } else {
            let mut volumes = split_volumes(&title, cells);
            ensure_unique_names(&volumes)?;

            let listing = volumes
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{i}. {} ({} 章)", v.name, v.chapters.len()))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!("检测到 {} 个分卷：\n{listing}\n请选择要下载的分卷", volumes.len());
            let (start, end) = choose_range(selector, &prompt, volumes.len())?;
            info!(target: "index", start, end, "已选择分卷区间");
            volumes.drain(start..=end).collect()
        };

        Ok(BookIndex {
            title,
            author,
            volumes,
        })
    }

    fn classify(&self, td: ElementRef<'_>, base: &Url) -> Option<Cell> {
        if td.value().classes().any(|c| c == self.heading_class) {
            return Some(Cell::Heading(collect_text(td)));
        }
        let link = td.select(sel_links()).next()?;
        let name = collect_text(link);
        let href = link.value().attr("href")?.trim();
        if name.is_empty() || href.is_empty() {
            return None;
        }
        match base.join(href) {
            Ok(url) => Some(Cell::Chapter(ChapterRef {
                name,
                source_url: url.to_string(),
            })),
            Err(e) => {
                warn!(target: "index", %href, "章节链接无法解析，已跳过: {e}");
                None
            }
        }
    }
}

/// 去掉索引地址末尾的文件名段：`.../3348/index.htm` -> `.../3348/`
pub fn base_url(index_url: &Url) -> Url {
    let mut base = index_url.clone();
    if let Ok(mut segments) = base.path_segments_mut() {
        segments.pop().push("");
    }
    base.set_query(None);
    base.set_fragment(None);
    base
}

fn split_volumes(title: &str, cells: Vec<Cell>) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = Vec::new();
    let mut orphans = 0usize;
    for cell in cells {
        match cell {
            Cell::Heading(text) => {
                let token = text.split_whitespace().next().unwrap_or_default();
                debug!(target: "index", heading = %text, "分卷标题");
                volumes.push(Volume {
                    name: format!("{title}{token}"),
                    chapters: Vec::new(),
                });
            }
            Cell::Chapter(ch) => match volumes.last_mut() {
                Some(volume) => volume.chapters.push(ch),
                None => orphans += 1,
            },
        }
    }
    if orphans > 0 {
        warn!(target: "index", orphans, "第一个分卷标题之前的章节不属于任何分卷，已忽略");
    }
    volumes
}

/// 按输出文件名判重：卷名不同但文件名相同（或仅大小写不同）同样会互相覆盖。
fn ensure_unique_names(volumes: &[Volume]) -> BookResult<()> {
    let mut seen = HashSet::new();
    for volume in volumes {
        let file = output_file_name(&volume.name);
        if !seen.insert(file.to_lowercase()) {
            return Err(BookError::DuplicateVolume {
                name: volume.name.clone(),
                file,
            });
        }
    }
    Ok(())
}

fn text_by_id(doc: &Html, id: &str) -> Option<String> {
    doc.select(sel_with_id())
        .find(|el| el.value().id() == Some(id))
        .map(collect_text)
}

fn collect_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
