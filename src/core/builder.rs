//! 会话构建器：配置 -> 适配层 -> 调度器 -> 会话编排器

use std::sync::Arc;

use crate::activity::Account;
use crate::config::AppConfig;
use crate::core::{BotError, SessionOrchestrator};
use crate::factory::{Adapter, AdapterRegistry};
use crate::report::{LogReporter, Reporter};
use crate::scheduler::{ActionScheduler, SchedulerSession};

pub struct SessionBuilder {
    config: AppConfig,
    reporter: Arc<dyn Reporter>,
    registry: AdapterRegistry,
}

impl SessionBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            reporter: Arc::new(LogReporter),
            registry: AdapterRegistry::with_defaults(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 配置中的账户身份
    pub fn account(&self) -> Account {
        Account {
            alias: self.config.app.account_alias.clone(),
            card_no: self.config.app.card_no.clone(),
            holder: self.config.app.holder.clone(),
        }
    }

    /// 按配置的银行标识创建适配层并构建
    pub fn build(&self) -> Result<SessionOrchestrator, BotError> {
        let adapter = self.registry.create(&self.config.app)?;
        self.build_with(adapter)
    }

    pub fn build_with(&self, adapter: Adapter) -> Result<SessionOrchestrator, BotError> {
        let account = self.account();
        let session = Arc::new(SchedulerSession::new(Some(account.clone())));
        let scheduler = ActionScheduler::new(
            adapter.config,
            adapter.surface,
            session,
            self.config.scheduler.clone(),
        )?;
        tracing::info!(alias = %account.alias, bank = %self.config.app.bank, "session built");
        Ok(SessionOrchestrator::new(
            account,
            Arc::new(scheduler),
            self.reporter.clone(),
            adapter.probe,
            &self.config,
        ))
    }
}
