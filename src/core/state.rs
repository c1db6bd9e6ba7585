//! 状态定义：会话中断状态、上报状态、调度器导航状态

use serde::{Deserialize, Serialize};

/// 会话中断状态；一旦中断，在本会话内不再恢复
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakState {
    pub is_break: bool,
    pub reason: String,
}

impl BreakState {
    pub fn broken(reason: impl Into<String>) -> Self {
        Self {
            is_break: true,
            reason: reason.into(),
        }
    }
}

/// 上报给后台的运行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Idle,
    Starting,
    Running,
    Excepted,
    Pause,
    Warning,
}

/// 调度器单次流程流转中的导航状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavState {
    /// 查找当前可识别页面
    Searching,
    /// 当前页面在目标流程内
    InProcess,
    /// 当前页面不在流程内，需要回退
    OffProcess,
    /// 非登录目标途中遇到登录页
    NeedLogin,
    Done,
}
