//! 适配器注册表：按银行标识创建调度配置、被控界面与存活探测

use std::collections::HashMap;
use std::sync::Arc;

use crate::activity::{LivenessProbe, Surface};
use crate::config::AppSection;
use crate::core::BotError;
use crate::scheduler::SchedulerConfig;
use crate::sim::{SimBank, SimSettings};

/// 一个银行适配层的全部组成
pub struct Adapter {
    pub config: SchedulerConfig,
    pub surface: Arc<dyn Surface>,
    pub probe: Option<Arc<dyn LivenessProbe>>,
}

pub type AdapterFactory = fn(&AppSection) -> Result<Adapter, BotError>;

#[derive(Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置适配层
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sim", sim_adapter);
        registry
    }

    pub fn register(&mut self, bank: impl Into<String>, factory: AdapterFactory) {
        self.factories.insert(bank.into(), factory);
    }

    pub fn create(&self, app: &AppSection) -> Result<Adapter, BotError> {
        let factory = self
            .factories
            .get(&app.bank)
            .ok_or_else(|| BotError::stop(format!("不支持的银行 {}", app.bank)))?;
        tracing::info!(bank = %app.bank, "creating adapter");
        factory(app)
    }

    pub fn banks(&self) -> Vec<&str> {
        let mut banks: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        banks.sort_unstable();
        banks
    }
}

/// 模拟银行：户名与卡号取自配置，未配置时使用默认数据
pub fn sim_adapter(app: &AppSection) -> Result<Adapter, BotError> {
    let mut settings = SimSettings::default();
    if !app.card_no.is_empty() {
        settings.card_no = app.card_no.clone();
    }
    if !app.holder.is_empty() {
        settings.holder = app.holder.clone();
    }
    Ok(sim_adapter_from(Arc::new(SimBank::new(settings))))
}

/// 由已有的模拟银行组装适配层，调用方保留句柄用于观察
pub fn sim_adapter_from(bank: Arc<SimBank>) -> Adapter {
    Adapter {
        config: bank.scheduler_config(),
        surface: bank.clone(),
        probe: Some(bank),
    }
}
