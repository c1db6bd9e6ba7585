//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BANKBOT__*` 覆盖（双下划线表示嵌套，如 `BANKBOT__SCHEDULER__LOOP_LIMIT=80`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub wrapper: WrapperSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// [app] 段：适配器标识与账户
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 适配器标识（银行代码），用于 AdapterRegistry 查找
    #[serde(default = "default_bank")]
    pub bank: String,
    #[serde(default = "default_account_alias")]
    pub account_alias: String,
    #[serde(default)]
    pub card_no: String,
    #[serde(default)]
    pub holder: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            bank: default_bank(),
            account_alias: default_account_alias(),
            card_no: String::new(),
            holder: String::new(),
        }
    }
}

fn default_bank() -> String {
    "sim".to_string()
}

fn default_account_alias() -> String {
    "default".to_string()
}

/// [scheduler] 段：页面查找与流程重试的上限
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// 单次流程流转的循环次数上限
    #[serde(default = "default_loop_limit")]
    pub loop_limit: usize,
    /// 连续未识别页面次数上限
    #[serde(default = "default_none_activity_limit")]
    pub none_activity_limit: usize,
    /// 停留同一页面的等待次数
    #[serde(default = "default_same_activity_limit")]
    pub same_activity_limit: usize,
    /// 同一目标重复进入流程的上限
    #[serde(default = "default_goal_retry_limit")]
    pub goal_retry_limit: usize,
    /// 流程中途重新登录次数
    #[serde(default = "default_login_retry_limit")]
    pub login_retry_limit: usize,
    /// 单次识别当前页面的轮询次数
    #[serde(default = "default_find_retry_limit")]
    pub find_retry_limit: usize,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl SchedulerSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            loop_limit: default_loop_limit(),
            none_activity_limit: default_none_activity_limit(),
            same_activity_limit: default_same_activity_limit(),
            goal_retry_limit: default_goal_retry_limit(),
            login_retry_limit: default_login_retry_limit(),
            find_retry_limit: default_find_retry_limit(),
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_loop_limit() -> usize {
    60
}

fn default_none_activity_limit() -> usize {
    5
}

fn default_same_activity_limit() -> usize {
    5
}

fn default_goal_retry_limit() -> usize {
    3
}

fn default_login_retry_limit() -> usize {
    2
}

fn default_find_retry_limit() -> usize {
    60
}

fn default_interval_ms() -> u64 {
    1000
}

/// [wrapper] 段：执行包装器重试间隔
#[derive(Debug, Clone, Deserialize)]
pub struct WrapperSection {
    #[serde(default = "default_interval_ms")]
    pub retry_interval_ms: u64,
}

impl WrapperSection {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for WrapperSection {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_interval_ms(),
        }
    }
}

/// [session] 段：查询节流窗口与各操作重试次数
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 两次余额查询的最小间隔（秒）
    #[serde(default = "default_balance_window_secs")]
    pub balance_window_secs: u64,
    /// 余额未变时，流水查询的最小间隔（秒）
    #[serde(default = "default_history_window_secs")]
    pub history_window_secs: u64,
    #[serde(default = "default_query_retries")]
    pub balance_retries: usize,
    #[serde(default = "default_query_retries")]
    pub history_retries: usize,
    #[serde(default = "default_receipt_retries")]
    pub receipt_retries: usize,
    #[serde(default = "default_history_max_count")]
    pub history_max_count: usize,
    #[serde(default = "default_receipt_max_count")]
    pub receipt_max_count: usize,
}

impl SessionSection {
    pub fn balance_window(&self) -> Duration {
        Duration::from_secs(self.balance_window_secs)
    }

    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.history_window_secs)
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            balance_window_secs: default_balance_window_secs(),
            history_window_secs: default_history_window_secs(),
            balance_retries: default_query_retries(),
            history_retries: default_query_retries(),
            receipt_retries: default_receipt_retries(),
            history_max_count: default_history_max_count(),
            receipt_max_count: default_receipt_max_count(),
        }
    }
}

fn default_balance_window_secs() -> u64 {
    30
}

fn default_history_window_secs() -> u64 {
    120
}

fn default_query_retries() -> usize {
    5
}

fn default_receipt_retries() -> usize {
    1
}

fn default_history_max_count() -> usize {
    30
}

fn default_receipt_max_count() -> usize {
    2
}

/// 从 config 目录加载配置，环境变量 BANKBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BANKBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BANKBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
