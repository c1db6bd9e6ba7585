//! 核心编排层：错误与恢复、会话状态、会话监管、执行包装、会话编排

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod wrapper;

pub use builder::SessionBuilder;
pub use error::{BotError, ErrorCategory, RecoveryAction};
pub use orchestrator::{
    QueryReport, SessionOrchestrator, TransferRequest, WorkFlow, WorkParams, WorkResult,
};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{BreakState, NavState, Status};
pub use wrapper::{ExecutionWrapper, RetryPolicy, StopHandler};
