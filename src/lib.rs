//! BankBot - 手机银行自动化调度
//!
//! 模块划分：
//! - **activity**: 页面类型、页面执行类契约与注册表、被控界面与全局监听接口
//! - **collector**: 翻页抓取的去重收集器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与恢复、执行包装、会话监管、会话编排
//! - **factory**: 银行适配层注册表
//! - **helpers**: 金额换算、卡号掩码与回单匹配
//! - **report**: 结果上报
//! - **scheduler**: 目标调度器（流程导航状态机）
//! - **sim**: 内存模拟银行，用于演示与测试

pub mod activity;
pub mod collector;
pub mod config;
pub mod core;
pub mod factory;
pub mod helpers;
pub mod observability;
pub mod report;
pub mod scheduler;
pub mod sim;
