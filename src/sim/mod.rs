//! 模拟银行适配层
//!
//! 以内存中的页面栈模拟手机银行：主页、登录、账户、流水、转账、回单与弹窗。
//! 实现 Surface 与 LivenessProbe，并记录每次页面操作，供演示与测试断言调度行为。

mod executors;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::activity::{GoalType, LivenessProbe, Observation, Surface};
use crate::core::{BotError, TransferRequest};
use crate::scheduler::SchedulerConfig;

pub use executors::{
    AccountExecutor, HistoryExecutor, HomeExecutor, LoginExecutor, ReceiptIndexExecutor,
    SimKeypadClassifier, SimWatcher, TransferExecutor, TransferIndexExecutor,
    TransferResultExecutor,
};

const HISTORY_PAGE_SIZE: usize = 4;
/// 翻页步长小于页大小，相邻两页有一条重叠
const HISTORY_PAGE_STEP: usize = 3;

/// 模拟页面
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimScreen {
    Home,
    Login,
    Account,
    History,
    TransferIndex,
    Transfer,
    TransferResult,
    ReceiptIndex,
    /// 普通弹窗（公告、更新提示）
    Popup,
    /// 会话超时弹窗
    Expired,
    /// 无法识别的页面
    Blank,
    /// 应用未运行，停留在桌面
    Launcher,
}

impl SimScreen {
    pub fn activity(&self) -> Option<&'static str> {
        match self {
            SimScreen::Home => Some("cn.sim.bank.MainActivity"),
            SimScreen::Login => Some("cn.sim.bank.LoginActivity"),
            SimScreen::Account => Some("cn.sim.bank.AccountActivity"),
            SimScreen::History => Some("cn.sim.bank.HistoryActivity"),
            SimScreen::TransferIndex => Some("cn.sim.bank.TransferIndexActivity"),
            SimScreen::Transfer => Some("cn.sim.bank.TransferActivity"),
            SimScreen::TransferResult => Some("cn.sim.bank.TransferResultActivity"),
            SimScreen::ReceiptIndex => Some("cn.sim.bank.ReceiptActivity"),
            SimScreen::Popup | SimScreen::Expired => Some("cn.sim.bank.DialogActivity"),
            SimScreen::Launcher => Some("com.android.launcher3.Launcher"),
            SimScreen::Blank => None,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            SimScreen::Home => "首页",
            SimScreen::Login => "登录",
            SimScreen::Account => "账户详情",
            SimScreen::History => "交易明细",
            SimScreen::TransferIndex => "转账汇款",
            SimScreen::Transfer => "向他人转账",
            SimScreen::TransferResult => "转账结果",
            SimScreen::ReceiptIndex => "电子回单",
            SimScreen::Popup => "系统提示：新版本已发布",
            SimScreen::Expired => "系统提示：登录已超时，请重新登录",
            SimScreen::Blank | SimScreen::Launcher => "",
        }
    }

    fn requires_login(&self) -> bool {
        matches!(
            self,
            SimScreen::Account
                | SimScreen::History
                | SimScreen::TransferIndex
                | SimScreen::Transfer
                | SimScreen::ReceiptIndex
        )
    }
}

/// 模拟银行初始数据
#[derive(Clone, Debug)]
pub struct SimSettings {
    pub password: String,
    pub card_no: String,
    pub holder: String,
    pub logged_in: bool,
    /// 余额，单位分
    pub balance: i64,
    /// 交易明细，最新在前
    pub history: Vec<Value>,
    pub sms_wait_limit: usize,
    pub sms_interval: Duration,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            password: "147258".to_string(),
            card_no: "6217852600028354869".to_string(),
            holder: "张三".to_string(),
            logged_in: false,
            balance: 1_000_000,
            history: seed_history(),
            sms_wait_limit: 60,
            sms_interval: Duration::from_secs(1),
        }
    }
}

fn seed_history() -> Vec<Value> {
    let rows = [
        ("2024-03-08 16:20:11", -12_000, 1_000_000, "李四"),
        ("2024-03-08 09:12:45", 50_000, 1_012_000, "王五"),
        ("2024-03-07 18:02:30", -3_500, 962_000, "赵六"),
        ("2024-03-07 11:41:09", 100_000, 965_500, "孙七"),
        ("2024-03-06 20:15:00", -8_800, 865_500, "周八"),
        ("2024-03-06 08:30:27", 20_000, 874_300, "吴九"),
        ("2024-03-05 13:05:51", -1_200, 854_300, "郑十"),
        ("2024-03-05 10:00:00", 300_000, 855_500, "钱一"),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (time, amount, balance, name))| {
            json!({
                "time": time,
                "amount": amount,
                "balance": balance,
                "name": name,
                "customerAccount": format!("62220200000000{:05}", i),
                "postscript": "",
            })
        })
        .collect()
}

struct World {
    running: bool,
    stack: Vec<SimScreen>,
    logged_in: bool,
    always_expire: bool,
    stuck: bool,
    balance: i64,
    history: Vec<Value>,
    history_page: usize,
    receipts: Vec<Value>,
    logins: usize,
    typed: String,
    failures: HashMap<String, VecDeque<BotError>>,
    journal: Vec<String>,
}

impl World {
    fn current(&self) -> SimScreen {
        if !self.running {
            return SimScreen::Launcher;
        }
        self.stack.last().copied().unwrap_or(SimScreen::Home)
    }

    fn open(&mut self, target: SimScreen) {
        let screen = if target.requires_login() && !self.logged_in {
            SimScreen::Login
        } else {
            target
        };
        if screen == SimScreen::History {
            self.history_page = 0;
        }
        self.stack.push(screen);
    }

    fn keypad(&self) -> Vec<u8> {
        // 每次进入登录页数字键盘顺序轮换
        let shift = self.logins % 10;
        (0..10u8).map(|i| b'0' + (i + shift as u8) % 10).collect()
    }
}

pub struct SimBank {
    settings: SimSettings,
    world: Mutex<World>,
}

impl SimBank {
    pub fn new(settings: SimSettings) -> Self {
        let world = World {
            running: true,
            stack: vec![SimScreen::Home],
            logged_in: settings.logged_in,
            always_expire: false,
            stuck: false,
            balance: settings.balance,
            history: settings.history.clone(),
            history_page: 0,
            receipts: Vec::new(),
            logins: 0,
            typed: String::new(),
            failures: HashMap::new(),
            journal: Vec::new(),
        };
        Self {
            settings,
            world: Mutex::new(world),
        }
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// 各目标的流程：从主页到目标页面的执行类名称
    pub fn processes() -> Vec<(GoalType, Vec<&'static str>)> {
        vec![
            (GoalType::Home, vec!["main"]),
            (GoalType::Authenticate, vec!["main", "login"]),
            (GoalType::QueryBalance, vec!["main", "account"]),
            (GoalType::QueryHistory, vec!["main", "history"]),
            (GoalType::Transfer, vec!["main", "transfer_index", "transfer"]),
            (GoalType::QueryReceipts, vec!["main", "receipt_index"]),
        ]
    }

    /// 注册全部执行类与流程的调度配置
    pub fn scheduler_config(self: &Arc<Self>) -> SchedulerConfig {
        let mut registry = crate::activity::ExecutorRegistry::new();
        registry.register(HomeExecutor::new(self.clone()));
        registry.register(LoginExecutor::new(self.clone(), Arc::new(SimKeypadClassifier)));
        registry.register(AccountExecutor::new(self.clone()));
        registry.register(HistoryExecutor::new(self.clone()));
        registry.register(TransferIndexExecutor::new(self.clone()));
        registry.register(TransferExecutor::new(self.clone()));
        registry.register(TransferResultExecutor::new(self.clone()));
        registry.register(ReceiptIndexExecutor::new(self.clone()));

        Self::processes()
            .into_iter()
            .fold(SchedulerConfig::new(registry), |config, (goal, names)| {
                config.with_process(goal, names)
            })
            .with_watcher(Arc::new(SimWatcher::new(self.clone())))
    }

    pub async fn journal(&self) -> Vec<String> {
        self.world.lock().await.journal.clone()
    }

    pub async fn clear_journal(&self) {
        self.world.lock().await.journal.clear();
    }

    pub async fn current_screen(&self) -> SimScreen {
        self.world.lock().await.current()
    }

    pub async fn balance(&self) -> i64 {
        self.world.lock().await.balance
    }

    pub async fn is_logged_in(&self) -> bool {
        self.world.lock().await.logged_in
    }

    /// 登录成功次数
    pub async fn logins(&self) -> usize {
        self.world.lock().await.logins
    }

    /// 使会话立即超时
    pub async fn expire_session(&self) {
        self.world.lock().await.logged_in = false;
    }

    /// 登录后仍保持超时，模拟账户被踢下线
    pub async fn set_always_expire(&self, value: bool) {
        self.world.lock().await.always_expire = value;
    }

    /// 主页跳转失效，页面不再变化
    pub async fn set_stuck(&self, value: bool) {
        self.world.lock().await.stuck = value;
    }

    /// 弹出会话超时弹窗并使会话失效
    pub async fn show_expired_dialog(&self) {
        let mut world = self.world.lock().await;
        world.logged_in = false;
        world.stack.push(SimScreen::Expired);
    }

    pub async fn push_screen(&self, screen: SimScreen) {
        self.world.lock().await.stack.push(screen);
    }

    /// 退出应用，回到桌面
    pub async fn kill_app(&self) {
        let mut world = self.world.lock().await;
        world.running = false;
        world.journal.push("kill".to_string());
    }

    /// 注入执行类下次执行的错误，按顺序逐次消耗
    pub async fn inject_failure(&self, executor: &str, error: BotError) {
        self.world
            .lock()
            .await
            .failures
            .entry(executor.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn add_income(&self, amount: i64, name: &str) {
        let mut world = self.world.lock().await;
        world.balance += amount;
        let record = json!({
            "time": now(),
            "amount": amount,
            "balance": world.balance,
            "name": name,
            "customerAccount": "6222020000000099999",
            "postscript": "",
        });
        world.history.insert(0, record);
    }

    pub(crate) async fn record(&self, entry: impl Into<String>) {
        self.world.lock().await.journal.push(entry.into());
    }

    pub(crate) async fn take_failure(&self, executor: &str) -> Result<(), BotError> {
        let mut world = self.world.lock().await;
        match world.failures.get_mut(executor).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) async fn navigate_to(&self, target: SimScreen) {
        let mut world = self.world.lock().await;
        if world.stuck && world.current() == SimScreen::Home {
            return;
        }
        world.open(target);
    }

    pub(crate) async fn dismiss_dialog(&self) {
        let mut world = self.world.lock().await;
        if matches!(world.current(), SimScreen::Popup | SimScreen::Expired) {
            world.stack.pop();
        }
    }

    pub(crate) async fn keypad_image(&self) -> Vec<u8> {
        self.world.lock().await.keypad()
    }

    pub(crate) async fn tap_key(&self, position: usize) {
        let mut world = self.world.lock().await;
        if let Some(digit) = world.keypad().get(position).copied() {
            world.typed.push(char::from(digit));
        }
    }

    /// 提交登录：密码正确时关闭登录页
    pub(crate) async fn submit_login(&self) -> Result<(), BotError> {
        let mut world = self.world.lock().await;
        let typed = std::mem::take(&mut world.typed);
        if typed != self.settings.password {
            return Err(BotError::category_stop(
                crate::core::ErrorCategory::Environment,
                "登录密码错误",
            ));
        }
        world.logins += 1;
        world.logged_in = !world.always_expire;
        if world.current() == SimScreen::Login {
            world.stack.pop();
        }
        Ok(())
    }

    pub(crate) async fn account_info(&self) -> Value {
        let world = self.world.lock().await;
        json!({
            "balance": world.balance,
            "card_no": self.settings.card_no,
            "holder": self.settings.holder,
        })
    }

    /// 当前页可见的流水：(位置 key, 记录)
    pub(crate) async fn visible_history(&self) -> Vec<(String, Value)> {
        let world = self.world.lock().await;
        let start = world.history_page * HISTORY_PAGE_STEP;
        world
            .history
            .iter()
            .enumerate()
            .skip(start)
            .take(HISTORY_PAGE_SIZE)
            .map(|(i, record)| (format!("row-{}-{}", world.history_page, i - start), record.clone()))
            .collect()
    }

    /// 下滑一页，已到底返回 false
    pub(crate) async fn scroll_history(&self) -> bool {
        let mut world = self.world.lock().await;
        let next_start = (world.history_page + 1) * HISTORY_PAGE_STEP;
        if next_start >= world.history.len() {
            return false;
        }
        world.history_page += 1;
        world.journal.push("history.scroll".to_string());
        true
    }

    /// 完成转账：扣款、记流水与回单，进入结果页
    pub(crate) async fn complete_transfer(&self, request: &TransferRequest) -> Result<(), BotError> {
        let mut world = self.world.lock().await;
        if world.balance < request.amount {
            return Err(BotError::transfer_failed("余额不足"));
        }
        world.balance -= request.amount;
        let time = now();
        let record = json!({
            "time": time,
            "amount": -request.amount,
            "balance": world.balance,
            "name": request.holder,
            "customerAccount": request.account,
            "postscript": request.postscript,
        });
        world.history.insert(0, record);
        let receipt = json!({
            "order_no": format!("R{}", uuid::Uuid::new_v4().simple()),
            "time": time,
            "name": request.holder,
            "amount": request.amount,
            "customerAccount": request.account,
            "postscript": request.postscript,
        });
        world.receipts.insert(0, receipt);
        world.stack.push(SimScreen::TransferResult);
        Ok(())
    }

    pub(crate) async fn receipts(&self) -> Vec<Value> {
        self.world.lock().await.receipts.clone()
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl Surface for SimBank {
    async fn observe(&self) -> Result<Observation, BotError> {
        let world = self.world.lock().await;
        let screen = world.current();
        let mut source = format!("<screen title=\"{}\">", screen.title());
        if screen == SimScreen::Login {
            source.push_str("<keypad/>");
        }
        Ok(Observation::new(screen.activity().map(str::to_string), source))
    }

    async fn press_back(&self) -> Result<(), BotError> {
        let mut world = self.world.lock().await;
        world.journal.push("back".to_string());
        if world.running && world.stack.len() > 1 {
            world.stack.pop();
        }
        Ok(())
    }
}

#[async_trait]
impl LivenessProbe for SimBank {
    async fn ensure_running(&self) -> Result<(), BotError> {
        let mut world = self.world.lock().await;
        if !world.running {
            tracing::info!("sim bank not running, relaunching");
            world.running = true;
            world.stack = vec![SimScreen::Home];
            world.journal.push("launch".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_requires_login() {
        let bank = SimBank::new(SimSettings::default());
        bank.navigate_to(SimScreen::Account).await;
        assert_eq!(bank.current_screen().await, SimScreen::Login);
        bank.press_back().await.unwrap();
        assert_eq!(bank.current_screen().await, SimScreen::Home);
    }

    #[tokio::test]
    async fn test_history_pages_overlap() {
        let bank = SimBank::new(SimSettings {
            logged_in: true,
            ..Default::default()
        });
        bank.navigate_to(SimScreen::History).await;
        let first = bank.visible_history().await;
        assert!(bank.scroll_history().await);
        let second = bank.visible_history().await;
        assert_eq!(first.len(), HISTORY_PAGE_SIZE);
        assert_eq!(first[3].1, second[0].1);
        assert_ne!(first[3].0, second[0].0);
    }

    #[tokio::test]
    async fn test_relaunch_after_kill() {
        let bank = SimBank::new(SimSettings::default());
        bank.kill_app().await;
        let observation = bank.observe().await.unwrap();
        assert!(observation.activity_is("com.android.launcher3.Launcher"));
        bank.ensure_running().await.unwrap();
        assert_eq!(bank.current_screen().await, SimScreen::Home);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance() {
        let bank = SimBank::new(SimSettings {
            balance: 100,
            ..Default::default()
        });
        let request = TransferRequest {
            order_id: "1".into(),
            amount: 101,
            account: "6222".into(),
            holder: "李四".into(),
            bank_name: String::new(),
            postscript: String::new(),
        };
        let err = bank.complete_transfer(&request).await.unwrap_err();
        assert_eq!(err, BotError::transfer_failed("余额不足"));
        assert_eq!(bank.balance().await, 100);
    }
}
