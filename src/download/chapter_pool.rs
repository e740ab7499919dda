//! 章节页面并发下载工作池。
//!
//! 任务按目录下标分发给固定数量的线程，结果带回下标，
//! 全部完成后按目录顺序重新排列，与完成先后无关。

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel as channel;
use tracing::{debug, warn};

use super::models::{ChapterRef, RawChapter};
use super::progress::ChapterProgress;
use crate::base_system::error::{BookError, BookResult};
use crate::network_parser::network::Fetcher;

pub(crate) struct ChapterPool<'a> {
    fetcher: &'a dyn Fetcher,
    encoding: &'a str,
    workers: usize,
    cancel: &'a AtomicBool,
}

impl<'a> ChapterPool<'a> {
    pub(crate) fn new(
        fetcher: &'a dyn Fetcher,
        encoding: &'a str,
        workers: usize,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            fetcher,
            encoding,
            workers: workers.max(1),
            cancel,
        }
    }

    /// 下载全部章节。任一章节失败时停止派发新任务，返回目录中最靠前的那个错误。
    pub(crate) fn fetch_all(
        &self,
        chapters: &[ChapterRef],
        progress: &ChapterProgress,
    ) -> BookResult<Vec<RawChapter>> {
        let (job_tx, job_rx) = channel::unbounded::<usize>();
        let (res_tx, res_rx) = channel::unbounded::<(usize, BookResult<String>)>();
        for index in 0..chapters.len() {
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        let stop = AtomicBool::new(false);
        let workers = self.workers.min(chapters.len()).max(1);
        let mut pages: Vec<Option<String>> = vec![None; chapters.len()];
        let mut first_error: Option<(usize, BookError)> = None;

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                let stop = &stop;
                scope.spawn(move || {
                    while let Ok(index) = job_rx.recv() {
                        if stop.load(Ordering::Relaxed) || self.cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        let chapter = &chapters[index];
                        let page = self.fetcher.fetch_text(&chapter.source_url, self.encoding);
                        if res_tx.send((index, page)).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(res_tx);

            for (index, page) in res_rx.iter() {
                progress.inc();
                match page {
                    Ok(html) => {
                        debug!(target: "download", index, chapter = %chapters[index].name, "fetched");
                        pages[index] = Some(html);
                    }
                    Err(err) => {
                        warn!(target: "download", chapter = %chapters[index].name, "章节下载失败: {err}");
                        stop.store(true, Ordering::Relaxed);
                        if first_error.as_ref().is_none_or(|(i, _)| index < *i) {
                            first_error = Some((index, err));
                        }
                    }
                }
            }
        });

        if self.cancel.load(Ordering::Relaxed) {
            return Err(BookError::Cancelled);
        }
        if let Some((_, err)) = first_error {
            return Err(err);
        }

        chapters
            .iter()
            .zip(pages)
            .enumerate()
            .map(|(index, (chapter, page))| {
                let html = page.ok_or_else(|| {
                    BookError::fetch(&chapter.source_url, "章节未完成下载")
                })?;
                Ok(RawChapter {
                    index,
                    name: chapter.name.clone(),
                    source_url: chapter.source_url.clone(),
                    html,
                })
            })
            .collect()
    }
}
