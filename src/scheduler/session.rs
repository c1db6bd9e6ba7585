//! 调度会话：单飞锁、账户身份、一次性验证码与运行统计
//!
//! 每个设备 / 会话一份；多个会话各自持锁，互不阻塞。

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::activity::{Account, OneShotSecret};

/// 调度统计，便于排查与测试断言
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// 流程流转次数（含重试与登录插入）
    pub passes: usize,
    /// 单次流转内的最大循环次数
    pub max_iterations: usize,
    /// 流程中途触发重新登录的次数
    pub relogins: usize,
}

pub struct SchedulerSession {
    id: String,
    lock: Mutex<()>,
    account: RwLock<Option<Account>>,
    secret: Arc<OneShotSecret>,
    stats: Mutex<SchedulerStats>,
}

impl SchedulerSession {
    pub fn new(account: Option<Account>) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            lock: Mutex::new(()),
            account: RwLock::new(account),
            secret: Arc::new(OneShotSecret::new()),
            stats: Mutex::new(SchedulerStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 获取单飞锁，持有期间其他调用方等待
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    pub async fn account(&self) -> Option<Account> {
        self.account.read().await.clone()
    }

    pub async fn set_account(&self, account: Account) {
        *self.account.write().await = Some(account);
    }

    pub fn secret(&self) -> Arc<OneShotSecret> {
        self.secret.clone()
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.lock().await.clone()
    }

    pub(crate) async fn record_pass(&self, iterations: usize) {
        let mut stats = self.stats.lock().await;
        stats.passes += 1;
        stats.max_iterations = stats.max_iterations.max(iterations);
    }

    pub(crate) async fn record_relogin(&self) {
        self.stats.lock().await.relogins += 1;
    }
}
