//! 自动机错误分类与恢复动作
//!
//! BotError 以「类别 + 是否停止」作为数据，而非类型层级；调度器与执行包装器根据
//! `is_retryable` / `is_stop` / `is_session_expired` 决定重试、重新登录或终止。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// 数据错误，后台提供的信息有误
    Data,
    /// 外部提示，如目标应用维护公告
    ExternalWarning,
    /// 解析异常，如找不到期望节点
    ParseFailure,
    /// 环境异常，如密码输入错误
    Environment,
    /// 网络异常，如加载失败
    Network,
}

impl ErrorCategory {
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::Data => "数据错误",
            ErrorCategory::ExternalWarning => "外部提示",
            ErrorCategory::ParseFailure => "解析异常",
            ErrorCategory::Environment => "环境异常",
            ErrorCategory::Network => "网络异常",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}, {}", self, self.description())
    }
}

/// 自动机运行过程中的领域错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    /// 未分类的领域错误
    #[error("{message}")]
    Running { message: String, is_stop: bool },

    #[error("{}-{message}", category.description())]
    Category {
        category: ErrorCategory,
        message: String,
        is_stop: bool,
    },

    /// 会话超时：由调度器结构化处理（转为重新登录），不参与类别判断
    #[error("会话超时: {message}")]
    SessionExpired { message: String },

    /// 停止错误：终止当前会话并通知后台
    #[error("{message}")]
    Stop { message: String },

    /// 已确认失败的转账（非歧义结果）
    #[error("转账失败: {message}")]
    TransferFailed { message: String, is_stop: bool },

    /// 局部逻辑重试，静默重试，不上抛
    #[error("{message}")]
    LogicRetry { message: String },
}

impl BotError {
    pub fn running(message: impl Into<String>) -> Self {
        BotError::Running {
            message: message.into(),
            is_stop: false,
        }
    }

    pub fn category(category: ErrorCategory, message: impl Into<String>) -> Self {
        BotError::Category {
            category,
            message: message.into(),
            is_stop: false,
        }
    }

    pub fn category_stop(category: ErrorCategory, message: impl Into<String>) -> Self {
        BotError::Category {
            category,
            message: message.into(),
            is_stop: true,
        }
    }

    /// 解析异常（类别固定为 ParseFailure）
    pub fn parse(message: impl Into<String>) -> Self {
        Self::category(ErrorCategory::ParseFailure, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::category(ErrorCategory::Network, message)
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        BotError::SessionExpired {
            message: message.into(),
        }
    }

    pub fn stop(message: impl Into<String>) -> Self {
        BotError::Stop {
            message: message.into(),
        }
    }

    pub fn transfer_failed(message: impl Into<String>) -> Self {
        BotError::TransferFailed {
            message: message.into(),
            is_stop: false,
        }
    }

    pub fn logic_retry(message: impl Into<String>) -> Self {
        BotError::LogicRetry {
            message: message.into(),
        }
    }

    /// 条件成立时返回类别错误，便于 `?` 链式使用
    pub fn ensure(condition: bool, category: ErrorCategory, message: impl Into<String>) -> Result<(), Self> {
        if condition {
            Err(Self::category(category, message))
        } else {
            Ok(())
        }
    }

    pub fn message(&self) -> &str {
        match self {
            BotError::Running { message, .. }
            | BotError::Category { message, .. }
            | BotError::SessionExpired { message }
            | BotError::Stop { message }
            | BotError::TransferFailed { message, .. }
            | BotError::LogicRetry { message } => message,
        }
    }

    /// 是否停止处理（停止当前账户运行，并通知后台）
    pub fn is_stop(&self) -> bool {
        match self {
            BotError::Running { is_stop, .. }
            | BotError::Category { is_stop, .. }
            | BotError::TransferFailed { is_stop, .. } => *is_stop,
            BotError::Stop { .. } => true,
            BotError::SessionExpired { .. } | BotError::LogicRetry { .. } => false,
        }
    }

    pub fn error_category(&self) -> Option<ErrorCategory> {
        match self {
            BotError::Category { category, .. } => Some(*category),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, BotError::SessionExpired { .. })
    }

    /// 可重试：非停止错误中，网络类别与逻辑重试
    pub fn is_retryable(&self) -> bool {
        if self.is_stop() {
            return false;
        }
        match self {
            BotError::Category { category, .. } => *category == ErrorCategory::Network,
            BotError::LogicRetry { .. } => true,
            _ => false,
        }
    }

    /// 上报用的完整消息：类别错误带类别描述前缀
    pub fn full_message(&self) -> String {
        match self {
            BotError::Category {
                category, message, ..
            } => format!("{}-{}", category.description(), message),
            other => other.message().to_string(),
        }
    }
}

/// 恢复引擎根据错误给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 会话失效，先执行登录目标再恢复原目标
    Relogin,
    /// 从流程起点重试当前目标
    RetryGoal,
    /// 上抛给调用方
    Propagate,
}
