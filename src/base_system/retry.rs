//! 退避重试策略。

use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn from_millis(max_retries: u32, min_wait_ms: u64, max_wait_ms: u64) -> Self {
        Self {
            max_retries,
            min_wait: Duration::from_millis(min_wait_ms),
            max_wait: Duration::from_millis(max_wait_ms.max(min_wait_ms)),
        }
    }

    /// 第 `attempt` 次重试前的等待时间（从 0 开始，指数增长，封顶 `max_wait`）。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }
}

/// 执行 `op`，失败且 `retryable` 返回 true 时按策略等待后重试。
pub fn with_backoff<T, E, F, R>(policy: &RetryPolicy, mut op: F, retryable: R) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && retryable(&e) => {
                let delay = policy.delay_for(attempt);
                debug!(target: "retry", attempt = attempt + 1, ?delay, "请求失败，稍后重试: {e}");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::from_millis(max_retries, 0, 0)
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let p = RetryPolicy::from_millis(5, 100, 350);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(350));
        assert_eq!(p.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let out: Result<u32, String> = with_backoff(
            &instant_policy(3),
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 { Err("busy".into()) } else { Ok(7) }
            },
            |_| true,
        );
        assert_eq!(out, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_on_non_retryable_error() {
        let calls = Cell::new(0);
        let out: Result<(), String> = with_backoff(
            &instant_policy(5),
            || {
                calls.set(calls.get() + 1);
                Err("404".into())
            },
            |e| e != "404",
        );
        assert!(out.is_err());
        assert_eq!(calls.get(), 1);
    }
}
