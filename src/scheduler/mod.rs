//! 目标调度层：调度配置、调度会话与状态机

pub mod action;
pub mod config;
pub mod session;

pub use action::ActionScheduler;
pub use config::SchedulerConfig;
pub use session::{SchedulerSession, SchedulerStats};
