//! CLI 进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 单卷章节下载进度；不可见时所有操作都是空操作。
pub(crate) struct ChapterProgress {
    bar: ProgressBar,
}

impl ChapterProgress {
    pub(crate) fn new(volume: &str, total: usize, visible: bool) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix(volume.to_string());
        Self { bar }
    }

    pub(crate) fn inc(&self) {
        self.bar.inc(1);
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.bar.position()
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
