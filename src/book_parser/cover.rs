//! 封面来源解析。
//!
//! 优先从插图章节中选图；没有插图章节（或其中没有图片）时，
//! 请用户输入图片地址并先探测 Content-Type 再下载。

use std::sync::OnceLock;

use reqwest::Url;
use scraper::{Html, Selector as CssSelector};
use tracing::{info, warn};

use crate::base_system::context::Config;
use crate::base_system::error::{BookError, BookResult};
use crate::download::models::{CoverImage, RawChapter};
use crate::network_parser::network::Fetcher;
use crate::ui::selection::{Selector, choose_index, prompt_until_valid};

use super::image_utils::normalize_to_jpeg;

const ACCEPTED_COVER_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg"];

fn sel_images() -> &'static CssSelector {
    static S: OnceLock<CssSelector> = OnceLock::new();
    S.get_or_init(|| CssSelector::parse("img[src]").unwrap())
}

pub struct CoverResolver {
    illustration_name: String,
    jpeg_quality: u8,
    max_dimension: u32,
}

impl CoverResolver {
    pub fn new(cfg: &Config) -> Self {
        Self {
            illustration_name: cfg.illustration_chapter_name.clone(),
            jpeg_quality: cfg.jpeg_quality,
            max_dimension: cfg.cover_max_dimension_px,
        }
    }

    /// 解析并下载封面。插图章节会从 `chapters` 中移除，其余章节顺序不变。
    pub fn resolve(
        &self,
        chapters: &mut Vec<RawChapter>,
        selector: &mut dyn Selector,
        fetcher: &dyn Fetcher,
    ) -> BookResult<CoverImage> {
        let candidates = match chapters
            .iter()
            .position(|c| c.name.trim() == self.illustration_name)
        {
            Some(i) => {
                let illustration = chapters.remove(i);
                let urls = image_urls(&illustration);
                info!(target: "cover", images = urls.len(), "从插图章节中选择封面");
                urls
            }
            None => Vec::new(),
        };

        let url = if candidates.is_empty() {
            warn!(target: "cover", name = %self.illustration_name, "没有可用的插图，需要手动提供封面地址");
            prompt_until_valid(selector, "请输入封面图片 URL (png/jpeg)", |answer| {
                validate_cover_url(answer, fetcher)
            })?
        } else {
            let picked = choose_index(selector, "请选择封面图片", &candidates)?;
            candidates[picked].clone()
        };

        let fetched = fetcher.fetch_bytes(&url)?;
        let bytes = normalize_to_jpeg(&fetched.bytes, self.jpeg_quality, self.max_dimension)?;
        info!(target: "cover", %url, size = bytes.len(), "封面已下载");
        Ok(CoverImage {
            bytes,
            content_type: "image/jpeg".to_string(),
            source_url: url,
        })
    }
}

/// 插图页中所有 `img[src]`，按文档顺序并解析为绝对地址。
fn image_urls(chapter: &RawChapter) -> Vec<String> {
    let base = Url::parse(&chapter.source_url).ok();
    let doc = Html::parse_document(&chapter.html);
    doc.select(sel_images())
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .filter_map(|src| {
            let resolved = match &base {
                Some(base) => base.join(src),
                None => Url::parse(src),
            };
            match resolved {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    warn!(target: "cover", %src, "图片地址无法解析，已跳过: {e}");
                    None
                }
            }
        })
        .collect()
}

fn validate_cover_url(answer: &str, fetcher: &dyn Fetcher) -> BookResult<String> {
    let url = Url::parse(answer)
        .map_err(|e| BookError::Validation(format!("{answer:?} 不是有效的 URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BookError::Validation(format!("仅支持 http/https 地址: {answer}")));
    }
    let content_type = match fetcher.probe_content_type(url.as_str()) {
        Ok(ct) => ct,
        Err(BookError::Fetch { message, .. }) => {
            return Err(BookError::Validation(format!("无法访问 {url}: {message}")));
        }
        Err(other) => return Err(other),
    };
    match content_type {
        Some(ct) if ACCEPTED_COVER_TYPES.contains(&ct.as_str()) => Ok(url.to_string()),
        Some(ct) => Err(BookError::Validation(format!("不支持的封面类型: {ct}"))),
        None => Err(BookError::Validation(format!("{url} 没有返回 Content-Type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_parser::image_utils::fixtures::encoded;
    use crate::book_parser::image_utils::sniff_mime;
    use crate::network_parser::network::fake::FakeFetcher;
    use crate::ui::selection::scripted::ScriptedSelector;

    fn raw(index: usize, name: &str, html: &str) -> RawChapter {
        RawChapter {
            index,
            name: name.to_string(),
            source_url: format!("https://www.wenku8.net/novel/1/1/{index}.htm"),
            html: html.to_string(),
        }
    }

    fn resolver() -> CoverResolver {
        CoverResolver::new(&Config::default())
    }

    #[test]
    fn picks_image_from_illustration_chapter_and_removes_it() {
        let mut chapters = vec![
            raw(0, "序章", "<div id=\"content\">x</div>"),
            raw(
                1,
                "插图",
                "<div id=\"content\"><img src=\"https://pic.example/a.jpg\"/><img src=\"/pics/b.jpg\"/></div>",
            ),
            raw(2, "第一章", "<div id=\"content\">y</div>"),
        ];
        let jpeg = encoded(4, 4, image::ImageFormat::Jpeg);
        let fetcher = FakeFetcher::default().blob(
            "https://www.wenku8.net/pics/b.jpg",
            jpeg.clone(),
            Some("image/jpeg"),
        );
        let mut selector = ScriptedSelector::with_choices(&[1]);

        let cover = resolver().resolve(&mut chapters, &mut selector, &fetcher).unwrap();
        assert_eq!(cover.source_url, "https://www.wenku8.net/pics/b.jpg");
        assert_eq!(cover.bytes, jpeg);
        let names: Vec<_> = chapters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["序章", "第一章"]);
    }

    #[test]
    fn manual_url_is_reprompted_until_probe_reports_an_image() {
        let mut chapters = vec![raw(0, "序章", "<div id=\"content\">x</div>")];
        let png = encoded(6, 3, image::ImageFormat::Png);
        let fetcher = FakeFetcher::default()
            .blob("https://img.example/anim.gif", b"GIF89a".to_vec(), Some("image/gif"))
            .blob("https://img.example/cover.png", png, Some("image/png"));
        let mut selector = ScriptedSelector::with_answers(&[
            "not a url",
            "ftp://img.example/cover.png",
            "https://img.example/missing.jpg",
            "https://img.example/anim.gif",
            "https://img.example/cover.png",
        ]);

        let cover = resolver().resolve(&mut chapters, &mut selector, &fetcher).unwrap();
        assert_eq!(selector.asked.len(), 5);
        assert_eq!(cover.content_type, "image/jpeg");
        assert_eq!(sniff_mime(&cover.bytes), "image/jpeg");
        assert_eq!(chapters.len(), 1);
    }

    #[test]
    fn illustration_without_images_falls_back_to_manual_url() {
        let mut chapters = vec![raw(0, "插图", "<div id=\"content\">（无图）</div>")];
        let jpeg = encoded(2, 2, image::ImageFormat::Jpeg);
        let fetcher =
            FakeFetcher::default().blob("https://img.example/c.jpg", jpeg, Some("image/jpeg"));
        let mut selector = ScriptedSelector::with_answers(&["https://img.example/c.jpg"]);

        let cover = resolver().resolve(&mut chapters, &mut selector, &fetcher).unwrap();
        assert_eq!(cover.source_url, "https://img.example/c.jpg");
        assert!(chapters.is_empty());
    }

    #[test]
    fn failed_cover_download_is_a_fetch_error() {
        let mut chapters = vec![raw(0, "插图", "<img src=\"https://pic.example/gone.jpg\">")];
        let mut selector = ScriptedSelector::with_choices(&[0]);
        let err = resolver()
            .resolve(&mut chapters, &mut selector, &FakeFetcher::default())
            .unwrap_err();
        assert!(matches!(err, BookError::Fetch { .. }));
    }

    #[test]
    fn cancelled_prompt_propagates() {
        let mut chapters = Vec::new();
        let err = resolver()
            .resolve(&mut chapters, &mut ScriptedSelector::default(), &FakeFetcher::default())
            .unwrap_err();
        assert!(matches!(err, BookError::Cancelled));
    }
}
