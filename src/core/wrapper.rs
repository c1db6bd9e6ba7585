//! 执行包装器
//!
//! 按 RetryPolicy 重试一次操作：每次尝试前检查取消令牌，重试前探测目标应用存活并等待间隔；
//! 停止类错误立即终止，重试耗尽后按策略调用一次停止回调。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::activity::LivenessProbe;
use crate::core::{BotError, BreakState};

/// 重试策略
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// 重试次数（总尝试次数为 limit + 1）
    pub limit: usize,
    pub interval: Duration,
    /// 重试耗尽后是否中断会话
    pub error_stop: bool,
}

impl RetryPolicy {
    pub fn new(limit: usize, interval: Duration) -> Self {
        Self {
            limit,
            interval,
            error_stop: true,
        }
    }

    pub fn with_error_stop(mut self, error_stop: bool) -> Self {
        self.error_stop = error_stop;
        self
    }
}

/// 停止回调：会话中断时调用
#[async_trait]
pub trait StopHandler: Send + Sync {
    async fn on_stop(&self, state: BreakState);
}

pub struct ExecutionWrapper {
    cancel_token: CancellationToken,
    probe: Option<Arc<dyn LivenessProbe>>,
    stop_handler: Arc<dyn StopHandler>,
}

impl ExecutionWrapper {
    pub fn new(cancel_token: CancellationToken, stop_handler: Arc<dyn StopHandler>) -> Self {
        Self {
            cancel_token,
            probe: None,
            stop_handler,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// 执行并重试；成功返回 Some(结果)，失败或被取消返回 None
    pub async fn wrap<T, F, Fut>(&self, name: &str, policy: &RetryPolicy, mut operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut is_stop_error = false;
        let mut err_msg = String::new();

        for attempt in 0..=policy.limit {
            if self.cancel_token.is_cancelled() {
                tracing::info!(op = name, attempt, "cancelled");
                return None;
            }
            if attempt > 0 {
                tracing::warn!(op = name, attempt, "retrying");
                self.check_running(name).await;
                tokio::select! {
                    _ = tokio::time::sleep(policy.interval) => {}
                    _ = self.cancel_token.cancelled() => {
                        tracing::info!(op = name, "cancelled while waiting to retry");
                        return None;
                    }
                }
            }

            match operation().await {
                Ok(value) => return Some(value),
                Err(err) => match err.downcast_ref::<BotError>() {
                    Some(bot) if bot.is_session_expired() => {
                        err_msg = format!("会话超时，{}", bot.full_message());
                        tracing::warn!(op = name, error = %bot, "session expired, waiting for relogin");
                    }
                    Some(bot) => {
                        err_msg = bot.full_message();
                        tracing::warn!(op = name, is_stop = bot.is_stop(), error = %err_msg, "bot error");
                        if bot.is_stop() {
                            is_stop_error = true;
                            break;
                        }
                    }
                    None => {
                        err_msg = format!("{err:#}");
                        tracing::warn!(op = name, error = %err_msg, "unexpected error");
                    }
                },
            }
        }

        if is_stop_error || policy.error_stop {
            tracing::error!(op = name, reason = %err_msg, "execution failed, breaking session");
            self.stop_handler.on_stop(BreakState::broken(err_msg)).await;
        }
        None
    }

    async fn check_running(&self, name: &str) {
        if let Some(probe) = &self.probe {
            if let Err(e) = probe.ensure_running().await {
                tracing::warn!(op = name, error = %e, "liveness check failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingStop {
        states: Mutex<Vec<BreakState>>,
    }

    #[async_trait]
    impl StopHandler for RecordingStop {
        async fn on_stop(&self, state: BreakState) {
            self.states.lock().await.push(state);
        }
    }

    #[derive(Default)]
    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LivenessProbe for CountingProbe {
        async fn ensure_running(&self) -> Result<(), BotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wrapper(stop: Arc<RecordingStop>) -> (ExecutionWrapper, CancellationToken) {
        let token = CancellationToken::new();
        (ExecutionWrapper::new(token.clone(), stop), token)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_k_times_then_succeeds() {
        let stop = Arc::new(RecordingStop::default());
        let probe = Arc::new(CountingProbe::default());
        let (wrapper, _) = wrapper(stop.clone());
        let wrapper = wrapper.with_probe(probe.clone());
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let result = wrapper
            .wrap("query", &policy, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(BotError::network("加载失败").into())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 重试 3 次：3 次等待、3 次存活探测
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert!(stop.states.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_calls_stop_once() {
        let stop = Arc::new(RecordingStop::default());
        let (wrapper, _) = wrapper(stop.clone());
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, Duration::from_secs(1));

        let result: Option<()> = wrapper
            .wrap("query", &policy, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BotError::parse("未获取到列表").into()) }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let states = stop.states.lock().await;
        assert_eq!(states.len(), 1);
        assert!(states[0].is_break);
        assert_eq!(states[0].reason, "解析异常-未获取到列表");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_error_does_not_consume_retries() {
        let stop = Arc::new(RecordingStop::default());
        let (wrapper, _) = wrapper(stop.clone());
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1)).with_error_stop(false);

        let result: Option<()> = wrapper
            .wrap("login", &policy, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BotError::stop("密码错误").into()) }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stop.states.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_stop_callback_without_error_stop() {
        let stop = Arc::new(RecordingStop::default());
        let (wrapper, _) = wrapper(stop.clone());
        let policy = RetryPolicy::new(0, Duration::from_secs(1)).with_error_stop(false);

        let result: Option<()> = wrapper
            .wrap("transfer", &policy, || async { Err(anyhow::anyhow!("device gone")) })
            .await;

        assert!(result.is_none());
        assert!(stop.states.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_and_session_errors_consume_retries() {
        let stop = Arc::new(RecordingStop::default());
        let (wrapper, _) = wrapper(stop.clone());
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        let result = wrapper
            .wrap("history", &policy, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(anyhow::anyhow!("io failure")),
                        1 => Err(BotError::session_expired("会话超时").into()),
                        _ => Ok("ok"),
                    }
                }
            })
            .await;

        assert_eq!(result, Some("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_without_stop_callback() {
        let stop = Arc::new(RecordingStop::default());
        let (wrapper, token) = wrapper(stop.clone());
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let result: Option<()> = wrapper
            .wrap("query", &policy, || {
                calls.fetch_add(1, Ordering::SeqCst);
                token.cancel();
                async { Err(BotError::network("超时").into()) }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(stop.states.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_operation() {
        let stop = Arc::new(RecordingStop::default());
        let (wrapper, token) = wrapper(stop.clone());
        token.cancel();
        let calls = AtomicUsize::new(0);

        let result = wrapper
            .wrap("query", &RetryPolicy::new(3, Duration::from_secs(1)), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
