//! 页面执行类契约
//!
//! 每个 Executor 对应一种 ActivityKind：`check` 判断当前是否处于该页面，`execute` 执行操作或提取数据，
//! `go_next` / `go_back` 在页面间前进与回退。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::{ActivityKind, Observation, OneShotSecret, Surface};
use crate::core::BotError;

/// 当前会话的账户身份
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Account {
    pub alias: String,
    /// 卡号（可能为掩码）
    #[serde(default)]
    pub card_no: String,
    #[serde(default)]
    pub holder: String,
}

/// 执行上下文：最新快照、账户、被控界面与一次性验证码
#[derive(Clone)]
pub struct ActivityContext {
    pub observation: Observation,
    pub account: Option<Account>,
    pub surface: Arc<dyn Surface>,
    pub secret: Arc<OneShotSecret>,
}

impl ActivityContext {
    /// 重新加载页面结构
    pub async fn refresh(&mut self) -> Result<(), BotError> {
        self.observation = self.surface.observe().await?;
        Ok(())
    }
}

/// 页面执行类 trait：名称、页面类型、检查、执行、前进、回退
#[async_trait]
pub trait ActivityExecutor: Send + Sync {
    /// 流程配置中引用的名称
    fn name(&self) -> &str;

    fn kind(&self) -> ActivityKind;

    /// 是否处于当前页面；不得产生外部可见副作用
    async fn check(&self, observation: &Observation) -> bool;

    /// 执行当前页面，流程最后一步返回相关数据
    async fn execute(&self, _ctx: &ActivityContext, _args: Value) -> Result<Value, BotError> {
        Ok(Value::Bool(true))
    }

    /// 跳转到下一个页面类型
    async fn go_next(&self, _ctx: &ActivityContext, _target: ActivityKind) -> Result<(), BotError> {
        Ok(())
    }

    /// 回退，默认触发系统返回
    async fn go_back(&self, ctx: &ActivityContext, _target: ActivityKind) -> Result<(), BotError> {
        tracing::debug!(executor = self.name(), "default back");
        ctx.surface.press_back().await
    }
}
