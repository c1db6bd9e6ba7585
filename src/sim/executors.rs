//! 模拟银行的页面执行类、全局监听与数字键盘识别

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::activity::{
    ActionWatcher, ActivityContext, ActivityExecutor, ActivityKind, DigitClassifier, Observation,
};
use crate::collector::DedupCollector;
use crate::core::{BotError, ErrorCategory, TransferRequest};
use crate::helpers::{is_transfer_receipt, sort_by_time_desc};
use crate::sim::{SimBank, SimScreen};

fn on_screen(observation: &Observation, screen: SimScreen) -> bool {
    match screen.activity() {
        Some(activity) => observation.activity_is(activity),
        None => false,
    }
}

/// 键盘图片中每个字节为一位 ASCII 数字
#[derive(Debug, Default)]
pub struct SimKeypadClassifier;

impl DigitClassifier for SimKeypadClassifier {
    fn classify(&self, image: &[u8]) -> Result<Vec<u8>, BotError> {
        image
            .iter()
            .map(|b| match b {
                b'0'..=b'9' => Ok(b - b'0'),
                _ => Err(BotError::parse("数字键盘识别失败")),
            })
            .collect()
    }
}

/// 弹窗监听：普通提示直接关闭，会话超时提示关闭后上抛
pub struct SimWatcher {
    bank: Arc<SimBank>,
}

impl SimWatcher {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActionWatcher for SimWatcher {
    async fn check(&self, observation: &Observation) -> Result<bool, BotError> {
        if !on_screen(observation, SimScreen::Popup) {
            return Ok(false);
        }
        self.bank.dismiss_dialog().await;
        if observation.contains("登录已超时") {
            self.bank.record("watcher.expired").await;
            return Err(BotError::session_expired("登录已超时"));
        }
        self.bank.record("watcher.dismiss").await;
        Ok(true)
    }
}

pub struct HomeExecutor {
    bank: Arc<SimBank>,
}

impl HomeExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActivityExecutor for HomeExecutor {
    fn name(&self) -> &str {
        "main"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Home
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::Home)
    }

    async fn go_next(&self, _ctx: &ActivityContext, target: ActivityKind) -> Result<(), BotError> {
        self.bank.record(format!("main.go_next({target:?})")).await;
        let screen = match target {
            ActivityKind::Login => SimScreen::Login,
            ActivityKind::AccountDetail => SimScreen::Account,
            ActivityKind::History => SimScreen::History,
            ActivityKind::TransferIndex => SimScreen::TransferIndex,
            ActivityKind::ReceiptIndex => SimScreen::ReceiptIndex,
            other => {
                return Err(BotError::stop(format!("主页无法跳转到 {other:?}")));
            }
        };
        self.bank.navigate_to(screen).await;
        Ok(())
    }

    /// 主页不回退
    async fn go_back(&self, _ctx: &ActivityContext, _target: ActivityKind) -> Result<(), BotError> {
        Ok(())
    }
}

pub struct LoginExecutor {
    bank: Arc<SimBank>,
    classifier: Arc<dyn DigitClassifier>,
}

impl LoginExecutor {
    pub fn new(bank: Arc<SimBank>, classifier: Arc<dyn DigitClassifier>) -> Self {
        Self { bank, classifier }
    }
}

#[async_trait]
impl ActivityExecutor for LoginExecutor {
    fn name(&self) -> &str {
        "login"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Login
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::Login)
    }

    async fn execute(&self, ctx: &ActivityContext, _args: Value) -> Result<Value, BotError> {
        self.bank.record("login.execute").await;
        self.bank.take_failure(self.name()).await?;
        BotError::ensure(
            !ctx.observation.contains("<keypad/>"),
            ErrorCategory::ParseFailure,
            "未找到密码键盘",
        )?;

        let layout = self.classifier.classify(&self.bank.keypad_image().await)?;
        for ch in self.bank.settings().password.chars() {
            let digit = ch
                .to_digit(10)
                .ok_or_else(|| BotError::category_stop(ErrorCategory::Data, "登录密码必须为数字"))?;
            let digit = digit as u8;
            let position = layout
                .iter()
                .position(|d| *d == digit)
                .ok_or_else(|| BotError::parse(format!("键盘上未找到数字 {digit}")))?;
            self.bank.tap_key(position).await;
        }
        self.bank.submit_login().await?;
        if let Some(account) = &ctx.account {
            tracing::info!(alias = %account.alias, "sim bank logged in");
        }
        Ok(Value::Bool(true))
    }
}

pub struct AccountExecutor {
    bank: Arc<SimBank>,
}

impl AccountExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActivityExecutor for AccountExecutor {
    fn name(&self) -> &str {
        "account"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::AccountDetail
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::Account)
    }

    async fn execute(&self, _ctx: &ActivityContext, _args: Value) -> Result<Value, BotError> {
        self.bank.record("account.execute").await;
        self.bank.take_failure(self.name()).await?;
        Ok(self.bank.account_info().await)
    }
}

pub struct HistoryExecutor {
    bank: Arc<SimBank>,
}

impl HistoryExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

fn same_transaction(a: &Value, b: &Value) -> bool {
    ["time", "amount", "balance"].iter().all(|k| a.get(k) == b.get(k))
}

#[async_trait]
impl ActivityExecutor for HistoryExecutor {
    fn name(&self) -> &str {
        "history"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::History
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::History)
    }

    /// 从最新一条向下翻页，遇到上次已上报的记录或达到数量上限时停止
    async fn execute(&self, _ctx: &ActivityContext, args: Value) -> Result<Value, BotError> {
        self.bank.record("history.execute").await;
        self.bank.take_failure(self.name()).await?;
        let last_trans = args.get("last_trans").filter(|v| !v.is_null());
        let max_count = args
            .get("max_query_count")
            .and_then(Value::as_u64)
            .unwrap_or(30) as usize;

        let mut collector = DedupCollector::new();
        'pages: loop {
            for (key, record) in self.bank.visible_history().await {
                if last_trans.is_some_and(|last| same_transaction(&record, last)) {
                    tracing::debug!(key = %key, "reached last reported transaction");
                    break 'pages;
                }
                if collector.contains_either_and_alias(&key, &record) {
                    continue;
                }
                collector.append(key, record);
                if collector.count() >= max_count {
                    break 'pages;
                }
            }
            if !self.bank.scroll_history().await {
                break;
            }
        }

        let mut records = collector.into_values();
        sort_by_time_desc(&mut records);
        Ok(Value::Array(records))
    }
}

pub struct TransferIndexExecutor {
    bank: Arc<SimBank>,
}

impl TransferIndexExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActivityExecutor for TransferIndexExecutor {
    fn name(&self) -> &str {
        "transfer_index"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::TransferIndex
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::TransferIndex)
    }

    async fn go_next(&self, _ctx: &ActivityContext, target: ActivityKind) -> Result<(), BotError> {
        self.bank.record(format!("transfer_index.go_next({target:?})")).await;
        self.bank.navigate_to(SimScreen::Transfer).await;
        Ok(())
    }
}

pub struct TransferExecutor {
    bank: Arc<SimBank>,
}

impl TransferExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActivityExecutor for TransferExecutor {
    fn name(&self) -> &str {
        "transfer"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Transfer
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::Transfer)
    }

    /// 填写收款信息，等待短信验证码后提交
    async fn execute(&self, ctx: &ActivityContext, args: Value) -> Result<Value, BotError> {
        self.bank.record("transfer.execute").await;
        let request: TransferRequest =
            serde_json::from_value(args.get("transferee").cloned().unwrap_or(Value::Null)).map_err(
                |e| BotError::category_stop(ErrorCategory::Data, format!("转账参数错误: {e}")),
            )?;
        BotError::ensure(request.amount <= 0, ErrorCategory::Data, "转账金额必须大于 0")?;
        self.bank.take_failure(self.name()).await?;

        let settings = self.bank.settings();
        let code = ctx
            .secret
            .wait(settings.sms_wait_limit, settings.sms_interval)
            .await?;
        tracing::info!(order_id = %request.order_id, code_len = code.len(), "sms code received");

        self.bank.complete_transfer(&request).await?;
        Ok(serde_json::json!({ "success": true, "message": "转账成功" }))
    }
}

pub struct TransferResultExecutor {
    bank: Arc<SimBank>,
}

impl TransferResultExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActivityExecutor for TransferResultExecutor {
    fn name(&self) -> &str {
        "transfer_result"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::TransferResult
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::TransferResult)
    }

    /// 结果页点「完成」直接回到主页
    async fn go_back(&self, ctx: &ActivityContext, _target: ActivityKind) -> Result<(), BotError> {
        self.bank.record("transfer_result.finish").await;
        while !matches!(self.bank.current_screen().await, SimScreen::Home | SimScreen::Launcher) {
            ctx.surface.press_back().await?;
        }
        Ok(())
    }
}

pub struct ReceiptIndexExecutor {
    bank: Arc<SimBank>,
}

impl ReceiptIndexExecutor {
    pub fn new(bank: Arc<SimBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl ActivityExecutor for ReceiptIndexExecutor {
    fn name(&self) -> &str {
        "receipt_index"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::ReceiptIndex
    }

    async fn check(&self, observation: &Observation) -> bool {
        on_screen(observation, SimScreen::ReceiptIndex)
    }

    async fn execute(&self, _ctx: &ActivityContext, args: Value) -> Result<Value, BotError> {
        self.bank.record("receipt_index.execute").await;
        self.bank.take_failure(self.name()).await?;
        let request: Option<TransferRequest> = args
            .get("last_transferee")
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| BotError::parse(format!("回单查询参数错误: {e}")))?;
        let max_count = args
            .get("max_query_count")
            .and_then(Value::as_u64)
            .unwrap_or(2) as usize;

        let receipts: Vec<Value> = self
            .bank
            .receipts()
            .await
            .into_iter()
            .filter(|r| request.as_ref().map_or(true, |req| is_transfer_receipt(r, req)))
            .take(max_count)
            .collect();
        Ok(Value::Array(receipts))
    }
}
