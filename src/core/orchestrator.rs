//! 会话编排器
//!
//! 将调度器、执行包装器组合为粗粒度的会话操作：查询余额与流水（带节流）、转账（不重试）、查询回单。
//! 任一操作按策略中断会话后，中断状态保持到会话重建；`stop` 取消进行中的执行。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::activity::{Account, GoalType, LivenessProbe};
use crate::config::{AppConfig, SessionSection};
use crate::core::{
    BreakState, ExecutionWrapper, RetryPolicy, SessionSupervisor, Status, StopHandler,
};
use crate::report::Reporter;
use crate::scheduler::ActionScheduler;

/// 外部驱动的工作流指令
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkFlow {
    /// 启动会话
    Start,
    GoHome,
    Login,
    Transfer,
    Transaction,
    Receipt,
    /// 输入短信验证码
    Sms,
    /// 查询是否已中断
    Break,
    Stop,
}

/// 工作流参数
#[derive(Clone, Debug, Default)]
pub struct WorkParams {
    pub last_transaction: Option<Value>,
    pub transfer: Option<TransferRequest>,
    pub sms: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkResult {
    /// 会话已中断或缺少参数，未执行
    Skipped,
    Flag(bool),
    Break(BreakState),
}

/// 转账请求，金额单位为分
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub order_id: String,
    pub amount: i64,
    /// 收款账号
    pub account: String,
    /// 收款户名
    pub holder: String,
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub postscript: String,
}

/// 转账执行类返回的结果
#[derive(Debug, Deserialize)]
struct TransferOutcome {
    success: bool,
    #[serde(default)]
    message: String,
}

/// 余额与流水查询结果；流水被节流跳过时为 None
#[derive(Clone, Debug, PartialEq)]
pub struct QueryReport {
    pub balance: i64,
    pub records: Option<Vec<Value>>,
}

/// 停止回调落点：记录中断状态并上报异常
struct BreakSink {
    alias: String,
    reporter: Arc<dyn Reporter>,
    state: Mutex<BreakState>,
}

#[async_trait]
impl StopHandler for BreakSink {
    async fn on_stop(&self, state: BreakState) {
        {
            let mut current = self.state.lock().await;
            if current.is_break {
                tracing::warn!(reason = %state.reason, "session already broken");
                return;
            }
            *current = state.clone();
        }
        self.reporter
            .status(&self.alias, Status::Excepted, &state.reason)
            .await;
    }
}

#[derive(Debug, Default)]
struct Debounce {
    last_balance: Option<i64>,
    last_balance_at: Option<Instant>,
    last_history_at: Option<Instant>,
}

pub struct SessionOrchestrator {
    account: Account,
    scheduler: Arc<ActionScheduler>,
    wrapper: ExecutionWrapper,
    supervisor: SessionSupervisor,
    sink: Arc<BreakSink>,
    reporter: Arc<dyn Reporter>,
    probe: Option<Arc<dyn LivenessProbe>>,
    settings: SessionSection,
    retry_interval: Duration,
    debounce: Mutex<Debounce>,
    last_transfer: Mutex<Option<TransferRequest>>,
    op_lock: Mutex<()>,
}

impl SessionOrchestrator {
    pub fn new(
        account: Account,
        scheduler: Arc<ActionScheduler>,
        reporter: Arc<dyn Reporter>,
        probe: Option<Arc<dyn LivenessProbe>>,
        cfg: &AppConfig,
    ) -> Self {
        let supervisor = SessionSupervisor::new();
        let sink = Arc::new(BreakSink {
            alias: account.alias.clone(),
            reporter: reporter.clone(),
            state: Mutex::new(BreakState::default()),
        });
        let mut wrapper = ExecutionWrapper::new(supervisor.cancel_token(), sink.clone());
        if let Some(probe) = &probe {
            wrapper = wrapper.with_probe(probe.clone());
        }
        Self {
            account,
            scheduler,
            wrapper,
            supervisor,
            sink,
            reporter,
            probe,
            settings: cfg.session.clone(),
            retry_interval: cfg.wrapper.retry_interval(),
            debounce: Mutex::new(Debounce::default()),
            last_transfer: Mutex::new(None),
            op_lock: Mutex::new(()),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    /// 启动、中断查询与停止始终可执行；其他工作流在中断或停止后被拒绝
    pub async fn can_run(&self, workflow: WorkFlow) -> bool {
        if matches!(workflow, WorkFlow::Start | WorkFlow::Break | WorkFlow::Stop) {
            return true;
        }
        let state = self.break_state().await;
        if state.is_break {
            tracing::info!(?workflow, reason = %state.reason, "session broken, skip");
            return false;
        }
        true
    }

    pub async fn break_state(&self) -> BreakState {
        let state = self.sink.state.lock().await.clone();
        if state.is_break {
            return state;
        }
        if self.supervisor.is_stopped() {
            return BreakState::broken("程序已停止");
        }
        BreakState::default()
    }

    /// 停止：取消进行中的执行并标记会话停止
    pub fn stop(&self) {
        tracing::info!(alias = %self.account.alias, "stopping session");
        self.supervisor.stop();
    }

    pub async fn input_one_shot_secret(&self, value: impl Into<String>) {
        self.scheduler.session().secret().input(value).await;
    }

    pub async fn consume_one_shot_secret(&self) -> Option<String> {
        self.scheduler.session().secret().consume().await
    }

    /// 启动会话：拉起目标应用并上报运行中
    pub async fn start(&self) -> bool {
        self.reporter
            .status(&self.account.alias, Status::Starting, "")
            .await;
        self.scheduler.session().set_account(self.account.clone()).await;
        if let Some(probe) = &self.probe {
            if let Err(e) = probe.ensure_running().await {
                tracing::error!(error = %e, "failed to launch target app");
                self.sink.on_stop(BreakState::broken(e.full_message())).await;
                return false;
            }
        }
        self.reporter
            .status(&self.account.alias, Status::Running, "")
            .await;
        true
    }

    pub async fn go_home(&self) -> bool {
        let _guard = self.op_lock.lock().await;
        let policy = RetryPolicy::new(1, self.retry_interval).with_error_stop(false);
        self.run_goal("回到主页", &policy, GoalType::Home, Value::Null)
            .await
            .is_some()
    }

    pub async fn login(&self) -> bool {
        let _guard = self.op_lock.lock().await;
        let policy = RetryPolicy::new(1, self.retry_interval);
        self.run_goal("登录", &policy, GoalType::Authenticate, Value::Null)
            .await
            .is_some()
    }

    /// 查询余额，余额变化或超过节流窗口时再查询流水并上报
    pub async fn query_balance_and_history(&self, last_known: Option<Value>) -> Option<QueryReport> {
        let _guard = self.op_lock.lock().await;

        let wait = {
            let debounce = self.debounce.lock().await;
            debounce
                .last_balance_at
                .map(|at| self.settings.balance_window().saturating_sub(at.elapsed()))
                .filter(|remain| !remain.is_zero())
        };
        if let Some(remain) = wait {
            tracing::info!(remain_ms = remain.as_millis() as u64, "waiting before balance query");
            let token = self.supervisor.cancel_token();
            tokio::select! {
                _ = tokio::time::sleep(remain) => {}
                _ = token.cancelled() => return None,
            }
        }

        let policy = RetryPolicy::new(self.settings.balance_retries, self.retry_interval);
        let account = self
            .run_goal("查询余额", &policy, GoalType::QueryBalance, Value::Null)
            .await?;
        let balance = account.get("balance").and_then(Value::as_i64).unwrap_or(0);
        tracing::info!(balance, "balance queried");

        let skip_history = {
            let mut debounce = self.debounce.lock().await;
            let unchanged = debounce.last_balance == Some(balance);
            let recent = debounce
                .last_history_at
                .is_some_and(|at| at.elapsed() < self.settings.history_window());
            debounce.last_balance = Some(balance);
            debounce.last_balance_at = Some(Instant::now());
            unchanged && recent
        };
        if skip_history {
            tracing::info!(balance, "balance unchanged, skip history query");
            return Some(QueryReport {
                balance,
                records: None,
            });
        }

        let policy = RetryPolicy::new(self.settings.history_retries, self.retry_interval);
        let args = json!({
            "last_trans": last_known,
            "max_query_count": self.settings.history_max_count,
        });
        let history = self
            .run_goal("查询流水", &policy, GoalType::QueryHistory, args)
            .await?;
        let records = match history {
            Value::Array(records) => records,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        tracing::info!(count = records.len(), "history queried");
        self.debounce.lock().await.last_history_at = Some(Instant::now());
        self.reporter
            .transactions(&self.account.alias, balance, &records)
            .await;
        Some(QueryReport {
            balance,
            records: Some(records),
        })
    }

    /// 转账：不重试、失败不中断会话；无论成败都上报结果
    pub async fn transfer(&self, request: TransferRequest) -> bool {
        let _guard = self.op_lock.lock().await;
        let policy = RetryPolicy::new(0, self.retry_interval).with_error_stop(false);
        let alias = self.account.alias.clone();

        let result = self
            .wrapper
            .wrap("转账", &policy, || {
                let scheduler = self.scheduler.clone();
                let reporter = self.reporter.clone();
                let request = request.clone();
                let alias = alias.clone();
                async move {
                    let outcome = scheduler
                        .execute(GoalType::Transfer, json!({ "transferee": request }))
                        .await;
                    let (success, message) = match &outcome {
                        Ok(value) => match serde_json::from_value::<TransferOutcome>(value.clone()) {
                            Ok(o) => (o.success, o.message),
                            Err(e) => (false, format!("转账结果无法解析: {e}")),
                        },
                        Err(e) => (false, e.full_message()),
                    };
                    tracing::info!(order_id = %request.order_id, success, message = %message, "transfer finished");
                    reporter
                        .transfer_result(&alias, &request.order_id, success, &message)
                        .await;
                    outcome?;
                    Ok::<bool, anyhow::Error>(success)
                }
            })
            .await;

        // 本次未用上的验证码不能留给下一笔转账
        if self.scheduler.session().secret().clear().await {
            tracing::warn!(order_id = %request.order_id, "discarding unused sms code");
        }
        let success = result.unwrap_or(false);
        if success {
            *self.last_transfer.lock().await = Some(request);
        }
        success
    }

    /// 查询回单，重试耗尽后中断会话
    pub async fn fetch_receipts(&self, request: Option<TransferRequest>) -> Option<Vec<Value>> {
        let _guard = self.op_lock.lock().await;
        let request = match request {
            Some(r) => Some(r),
            None => self.last_transfer.lock().await.clone(),
        };
        let policy = RetryPolicy::new(self.settings.receipt_retries, self.retry_interval);
        let args = json!({
            "last_transferee": request,
            "max_query_count": self.settings.receipt_max_count,
        });
        let receipts = match self
            .run_goal("查询回单", &policy, GoalType::QueryReceipts, args)
            .await?
        {
            Value::Array(list) => list,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        tracing::info!(count = receipts.len(), "receipts queried");
        self.reporter.receipts(&self.account.alias, &receipts).await;
        Some(receipts)
    }

    /// 按工作流指令分发
    pub async fn do_work(&self, workflow: WorkFlow, params: WorkParams) -> WorkResult {
        if !self.can_run(workflow).await {
            return WorkResult::Skipped;
        }
        match workflow {
            WorkFlow::Start => WorkResult::Flag(self.start().await),
            WorkFlow::Stop => {
                self.stop();
                self.reporter
                    .status(&self.account.alias, Status::Idle, "程序已停止")
                    .await;
                WorkResult::Flag(true)
            }
            WorkFlow::GoHome => WorkResult::Flag(self.go_home().await),
            WorkFlow::Login => WorkResult::Flag(self.login().await),
            WorkFlow::Transaction => WorkResult::Flag(
                self.query_balance_and_history(params.last_transaction)
                    .await
                    .is_some(),
            ),
            WorkFlow::Transfer => match params.transfer {
                Some(request) => WorkResult::Flag(self.transfer(request).await),
                None => {
                    tracing::warn!("transfer requested without order");
                    WorkResult::Skipped
                }
            },
            WorkFlow::Receipt => WorkResult::Flag(self.fetch_receipts(params.transfer).await.is_some()),
            WorkFlow::Sms => match params.sms {
                Some(code) => {
                    self.input_one_shot_secret(code).await;
                    WorkResult::Flag(true)
                }
                None => WorkResult::Skipped,
            },
            WorkFlow::Break => WorkResult::Break(self.break_state().await),
        }
    }

    /// 一轮工作：有待付订单时先转账并查回单，再查询余额流水；返回会话是否仍可继续
    pub async fn run_cycle(&self, pending: Option<TransferRequest>, last_known: Option<Value>) -> bool {
        let state = self.break_state().await;
        if state.is_break {
            tracing::error!(reason = %state.reason, "session broken");
            return false;
        }

        if let Some(request) = pending {
            self.do_work(
                WorkFlow::Transfer,
                WorkParams {
                    transfer: Some(request.clone()),
                    ..Default::default()
                },
            )
            .await;
            self.do_work(WorkFlow::GoHome, WorkParams::default()).await;
            self.do_work(
                WorkFlow::Receipt,
                WorkParams {
                    transfer: Some(request),
                    ..Default::default()
                },
            )
            .await;
            self.do_work(WorkFlow::GoHome, WorkParams::default()).await;
        }

        self.do_work(
            WorkFlow::Transaction,
            WorkParams {
                last_transaction: last_known,
                ..Default::default()
            },
        )
        .await;
        self.do_work(WorkFlow::GoHome, WorkParams::default()).await;

        !self.break_state().await.is_break
    }

    async fn run_goal(&self, name: &str, policy: &RetryPolicy, goal: GoalType, args: Value) -> Option<Value> {
        self.wrapper
            .wrap(name, policy, || {
                let scheduler = self.scheduler.clone();
                let args = args.clone();
                async move {
                    scheduler
                        .execute(goal, args)
                        .await
                        .map_err(anyhow::Error::from)
                }
            })
            .await
    }
}
