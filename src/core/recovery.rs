//! 错误恢复引擎
//!
//! 根据 BotError 与当前目标返回 RecoveryAction，供调度器决定是重新登录、重试目标还是上抛。

use crate::activity::GoalType;
use crate::core::{BotError, RecoveryAction};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 流程中途错误的处理建议；转账目标不做重试，避免重复扣款
    pub fn handle(&self, err: &BotError, goal: GoalType) -> RecoveryAction {
        if err.is_session_expired() {
            return RecoveryAction::Relogin;
        }
        if err.is_retryable() && goal != GoalType::Transfer {
            return RecoveryAction::RetryGoal;
        }
        RecoveryAction::Propagate
    }
}
