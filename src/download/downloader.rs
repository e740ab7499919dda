//! 分卷下载主流程编排。
//!
//! 每卷依次执行：章节下载 → 封面 → 正文清洗 → 组装 → 打包。
//! 单卷失败只记录到汇总中，不影响后续分卷；收到中断信号后不再写出任何文件。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use super::chapter_pool::ChapterPool;
use super::models::{BookIndex, ChapterDocument, RunSummary, Volume, VolumeOutcome};
use super::progress::ChapterProgress;
use crate::base_system::context::Config;
use crate::base_system::error::{BookError, BookResult};
use crate::base_system::scratch::ScratchSpace;
use crate::book_parser::content_cleaner::ContentCleaner;
use crate::book_parser::cover::CoverResolver;
use crate::book_parser::epub_generator::EpubAssembler;
use crate::book_parser::packager::Packager;
use crate::network_parser::network::Fetcher;
use crate::ui::selection::Selector;

pub struct VolumeDownloader<'a> {
    cfg: &'a Config,
    fetcher: &'a dyn Fetcher,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
    cover: CoverResolver,
    cleaner: ContentCleaner,
    assembler: EpubAssembler,
    packager: Packager,
}

impl<'a> VolumeDownloader<'a> {
    pub fn new(cfg: &'a Config, fetcher: &'a dyn Fetcher, cancel: Arc<AtomicBool>) -> Self {
        Self {
            cfg,
            fetcher,
            cancel,
            show_progress: false,
            cover: CoverResolver::new(cfg),
            cleaner: ContentCleaner::new(cfg),
            assembler: EpubAssembler::new(cfg),
            packager: Packager::new(cfg),
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// 按顺序处理所有分卷并返回汇总。
    pub fn run(&self, book: &BookIndex, selector: &mut dyn Selector) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut written: HashSet<PathBuf> = HashSet::new();
        for (i, volume) in book.volumes.iter().enumerate() {
            if self.cancelled() {
                warn!(target: "download", remaining = book.volumes.len() - i, "已取消，跳过剩余分卷");
                for rest in &book.volumes[i..] {
                    summary.volumes.push((
                        rest.name.clone(),
                        VolumeOutcome::Failed(BookError::Cancelled.to_string()),
                    ));
                }
                break;
            }

            info!(target: "download", volume = %volume.name, chapters = volume.chapters.len(), "开始处理分卷 {}/{}", i + 1, book.volumes.len());
            let output = self.packager.output_path_for(&volume.name);
            let result = if written.contains(&output) {
                Err(BookError::DuplicateVolume {
                    name: volume.name.clone(),
                    file: output.display().to_string(),
                })
            } else {
                self.process(book, volume, &output, selector)
            };
            let outcome = match result {
                Ok(()) => {
                    info!(target: "download", volume = %volume.name, path = %output.display(), "分卷完成");
                    written.insert(output.clone());
                    VolumeOutcome::Written(output)
                }
                Err(err) => {
                    error!(target: "download", volume = %volume.name, "分卷失败: {err}");
                    VolumeOutcome::Failed(err.to_string())
                }
            };
            summary.volumes.push((volume.name.clone(), outcome));
        }
        summary
    }

    fn process(
        &self,
        book: &BookIndex,
        volume: &Volume,
        output: &Path,
        selector: &mut dyn Selector,
    ) -> BookResult<()> {
        if volume.chapters.is_empty() {
            return Err(BookError::Parse(format!("分卷 {} 没有任何章节", volume.name)));
        }
        // 每卷独立的临时目录，离开作用域即清理
        let scratch = ScratchSpace::new("volume")?;

        let progress = ChapterProgress::new(&volume.name, volume.chapters.len(), self.show_progress);
        let pool = ChapterPool::new(
            self.fetcher,
            &self.cfg.source_encoding,
            self.cfg.worker_count(),
            &self.cancel,
        );
        let fetched = pool.fetch_all(&volume.chapters, &progress);
        progress.finish();
        let mut raw = fetched?;
        for chapter in &mut raw {
            scratch.stage(&raw_page_file(chapter.index), chapter.html.as_bytes())?;
            // 插图章节的页面留在内存里，封面选择还要用
            if chapter.name.trim() != self.cfg.illustration_chapter_name {
                chapter.html.clear();
            }
        }
        debug!(target: "download", scratch = %scratch.path().display(), pages = raw.len(), "raw pages staged");
        self.check_cancel()?;

        let cover = self.cover.resolve(&mut raw, selector, self.fetcher)?;
        self.check_cancel()?;

        // 插图章节已移除，序号从 1 连续编号
        let documents = raw
            .iter()
            .enumerate()
            .map(|(i, chapter)| {
                let html = scratch.read_text(&raw_page_file(chapter.index))?;
                Ok(ChapterDocument {
                    name: chapter.name.clone(),
                    body: self.cleaner.clean(&html, &chapter.name)?,
                    position: i + 1,
                })
            })
            .collect::<BookResult<Vec<_>>>()?;

        let package = self
            .assembler
            .assemble(&volume.name, &book.author, cover, documents)?;
        self.check_cancel()?;

        self.packager.pack(&package, output)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn check_cancel(&self) -> BookResult<()> {
        if self.cancelled() {
            Err(BookError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn raw_page_file(index: usize) -> String {
    format!("raw/{index:04}.html")
}
