//! 全局监听：每次识别页面前检查并处理弹窗、更新提示等插播页面

use async_trait::async_trait;

use crate::activity::Observation;
use crate::core::BotError;

#[async_trait]
pub trait ActionWatcher: Send + Sync {
    /// 返回 true 表示检测到插播并已处理，调用方需刷新后重新识别；
    /// 返回 Err 表示检测到需上抛的提示（如网络异常、会话超时）
    async fn check(&self, observation: &Observation) -> Result<bool, BotError>;
}
