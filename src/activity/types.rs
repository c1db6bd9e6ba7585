//! 目标类型与页面类型

use std::fmt;

use serde::{Deserialize, Serialize};

/// 调度目标（对外的操作意图）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalType {
    /// 回到目标应用主页
    Home,
    Authenticate,
    QueryBalance,
    QueryHistory,
    Transfer,
    QueryReceipts,
}

impl GoalType {
    pub fn description(&self) -> &'static str {
        match self {
            GoalType::Home => "主页",
            GoalType::Authenticate => "登录",
            GoalType::QueryBalance => "查询账户",
            GoalType::QueryHistory => "查询流水",
            GoalType::Transfer => "转账",
            GoalType::QueryReceipts => "查询回单",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}, {}", self, self.description())
    }
}

/// 可识别的页面类型，每个 Executor 声明一种
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    /// 未知页面时回退到上页继续查找
    Default,
    Startup,
    Guide,
    /// 过渡页面
    Transition,
    Home,
    Login,
    AccountDetail,
    History,
    HistoryDetail,
    TransferIndex,
    Transfer,
    TransferConfirm,
    TransferVerify,
    TransferResult,
    ReceiptIndex,
    ReceiptDetail,
    ReceiptImage,
}

impl ActivityKind {
    pub fn is_login(&self) -> bool {
        matches!(self, ActivityKind::Login)
    }

    /// 非登录页且非主页
    pub fn is_non_login(&self) -> bool {
        !matches!(self, ActivityKind::Login | ActivityKind::Home)
    }
}
