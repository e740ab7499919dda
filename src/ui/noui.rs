//! 控制台（stdin/stdout）交互实现。

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::selection::{Cancelled, RangeAnswer, Selector};

pub struct ConsoleSelector {
    cancel: Arc<AtomicBool>,
}

impl ConsoleSelector {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    /// EOF 或已收到中断信号时返回 `Cancelled`。
    fn read_line(&self, prompt: &str) -> Result<String, Cancelled> {
        print!("{prompt}");
        io::stdout().flush().ok();
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).map_err(|_| Cancelled)?;
        if read == 0 || self.cancel.load(Ordering::Relaxed) {
            return Err(Cancelled);
        }
        Ok(line.trim().to_string())
    }
}

impl Selector for ConsoleSelector {
    fn select(&mut self, prompt: &str, options: &[String]) -> Result<usize, Cancelled> {
        println!("{prompt}");
        for (idx, option) in options.iter().enumerate() {
            println!("{idx}. {option}");
        }
        loop {
            let line = self.read_line("请输入编号：")?;
            match line.parse::<usize>() {
                Ok(n) => return Ok(n),
                Err(_) => println!("错误：请输入数字编号。"),
            }
        }
    }

    fn select_range(&mut self, prompt: &str, count: usize) -> Result<RangeAnswer, Cancelled> {
        println!("{prompt}");
        loop {
            let line = self.read_line(&format!(
                "请输入编号 (0-{}) 或范围，例如 0-{}：",
                count.saturating_sub(1),
                count.saturating_sub(1)
            ))?;
            match line.parse::<RangeAnswer>() {
                Ok(answer) => return Ok(answer),
                Err(err) => println!("错误：{err}"),
            }
        }
    }

    fn prompt(&mut self, question: &str) -> Result<String, Cancelled> {
        self.read_line(&format!("{question}："))
    }
}
