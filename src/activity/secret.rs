//! 一次性验证码槽：写入一次，读取一次后清空

use std::time::Duration;

use tokio::sync::Mutex;

use crate::core::{BotError, ErrorCategory};

#[derive(Debug, Default)]
pub struct OneShotSecret {
    slot: Mutex<Option<String>>,
}

impl OneShotSecret {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入验证码。槽内只保留最新一条，尚未读取的旧值被覆盖；
    /// 转账结束后由会话调用 `clear` 丢弃未使用的验证码
    pub async fn input(&self, value: impl Into<String>) {
        let value = value.into();
        let mut slot = self.slot.lock().await;
        *slot = if value.trim().is_empty() { None } else { Some(value) };
    }

    /// 读取并清空
    pub async fn consume(&self) -> Option<String> {
        self.slot.lock().await.take()
    }

    /// 丢弃未读取的验证码，返回是否有值被丢弃
    pub async fn clear(&self) -> bool {
        self.slot.lock().await.take().is_some()
    }

    /// 轮询等待验证码，超过次数返回数据错误
    pub async fn wait(&self, limit: usize, interval: Duration) -> Result<String, BotError> {
        for attempt in 1..=limit.max(1) {
            if let Some(code) = self.consume().await {
                tracing::info!(attempt, "one-shot secret received");
                return Ok(code);
            }
            tracing::debug!(attempt, "waiting for one-shot secret");
            tokio::time::sleep(interval).await;
        }
        Err(BotError::category(ErrorCategory::Data, "未获取到短信验证码"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consume_once() {
        let secret = OneShotSecret::new();
        secret.input("123456").await;
        assert_eq!(secret.consume().await.as_deref(), Some("123456"));
        assert_eq!(secret.consume().await, None);
    }

    #[tokio::test]
    async fn test_input_overwrites_unread_value() {
        let secret = OneShotSecret::new();
        secret.input("111111").await;
        secret.input("222222").await;
        assert_eq!(secret.consume().await.as_deref(), Some("222222"));
    }

    #[tokio::test]
    async fn test_clear_discards_unread_value() {
        let secret = OneShotSecret::new();
        secret.input("123456").await;
        assert!(secret.clear().await);
        assert!(!secret.clear().await);
        assert_eq!(secret.consume().await, None);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let secret = OneShotSecret::new();
        secret.input("   ").await;
        assert_eq!(secret.consume().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_with_data_error() {
        let secret = OneShotSecret::new();
        let err = secret.wait(3, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.error_category(), Some(ErrorCategory::Data));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_receives_late_input() {
        let secret = std::sync::Arc::new(OneShotSecret::new());
        let writer = secret.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            writer.input("9527").await;
        });
        let code = secret.wait(5, Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, "9527");
    }
}
