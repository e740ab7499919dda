//! 交互选择能力。
//!
//! `Selector` 只负责收集回答；取值校验在这里完成，无效回答记录为
//! `SelectionError` / `ValidationError` 后重新询问，不做截断修正。

use std::str::FromStr;

use tracing::warn;

use crate::base_system::error::{BookError, BookResult};

/// 用户中断（EOF、Ctrl-C 等），当前卷放弃且不写出文件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl From<Cancelled> for BookError {
    fn from(_: Cancelled) -> Self {
        BookError::Cancelled
    }
}

/// 范围回答：单个下标 `k` 或闭区间 `a-b`（均从 0 开始）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAnswer {
    Single(usize),
    Span(usize, usize),
}

impl RangeAnswer {
    pub fn bounds(self) -> (usize, usize) {
        match self {
            RangeAnswer::Single(k) => (k, k),
            RangeAnswer::Span(a, b) => (a, b),
        }
    }
}

impl FromStr for RangeAnswer {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| BookError::Selection(format!("不是有效的编号: {s:?}")))
        };
        match s.split_once('-') {
            Some((a, b)) => Ok(RangeAnswer::Span(parse(a)?, parse(b)?)),
            None => Ok(RangeAnswer::Single(parse(s)?)),
        }
    }
}

pub trait Selector {
    fn select(&mut self, prompt: &str, options: &[String]) -> Result<usize, Cancelled>;

    fn select_range(&mut self, prompt: &str, count: usize) -> Result<RangeAnswer, Cancelled>;

    fn prompt(&mut self, question: &str) -> Result<String, Cancelled>;
}

pub fn check_index(index: usize, count: usize) -> BookResult<usize> {
    if index < count {
        Ok(index)
    } else {
        Err(BookError::Selection(format!(
            "编号 {index} 超出范围，请输入 0 到 {}",
            count.saturating_sub(1)
        )))
    }
}

pub fn check_range(answer: RangeAnswer, count: usize) -> BookResult<(usize, usize)> {
    let (start, end) = answer.bounds();
    check_index(start, count)?;
    check_index(end, count)?;
    if start > end {
        return Err(BookError::Selection(format!(
            "起始编号 {start} 不能大于结束编号 {end}"
        )));
    }
    Ok((start, end))
}

/// 在 `options` 中选择一项，直到回答合法。
pub fn choose_index(
    selector: &mut dyn Selector,
    prompt: &str,
    options: &[String],
) -> BookResult<usize> {
    if options.is_empty() {
        return Err(BookError::Selection("没有可选项".to_string()));
    }
    loop {
        let answer = selector.select(prompt, options)?;
        match check_index(answer, options.len()) {
            Ok(i) => return Ok(i),
            Err(err) => warn!(target: "select", "{err}"),
        }
    }
}

/// 选择连续区间 `[start, end]`，直到回答合法。
pub fn choose_range(
    selector: &mut dyn Selector,
    prompt: &str,
    count: usize,
) -> BookResult<(usize, usize)> {
    if count == 0 {
        return Err(BookError::Selection("没有可选项".to_string()));
    }
    loop {
        let answer = selector.select_range(prompt, count)?;
        match check_range(answer, count) {
            Ok(range) => return Ok(range),
            Err(err) => warn!(target: "select", "{err}"),
        }
    }
}

/// 提问并用 `validate` 检查回答；`ValidationError` 时重新提问，其余错误直接返回。
pub fn prompt_until_valid<T>(
    selector: &mut dyn Selector,
    question: &str,
    mut validate: impl FnMut(&str) -> BookResult<T>,
) -> BookResult<T> {
    loop {
        let answer = selector.prompt(question)?;
        match validate(answer.trim()) {
            Ok(v) => return Ok(v),
            Err(BookError::Validation(msg)) => warn!(target: "select", "输入无效: {msg}"),
            Err(other) => return Err(other),
        }
    }
}
