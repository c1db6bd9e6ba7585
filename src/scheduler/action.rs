//! 目标调度器
//!
//! 根据当前页面与目标流程判断前进或回退：不在流程内的页面先回退，流程内的页面依次 `go_next`，
//! 到达流程末尾后调用目标页面的 `execute`。流程中途遇到登录页时先完成登录目标再恢复原目标。
//! 整个 `execute` 在会话单飞锁内执行。

use std::sync::Arc;

use serde_json::Value;

use crate::activity::{ActivityContext, ActivityExecutor, ActivityKind, GoalType, Surface};
use crate::config::SchedulerSection;
use crate::core::{BotError, NavState, RecoveryAction, RecoveryEngine};
use crate::scheduler::{SchedulerConfig, SchedulerSession};

/// 单次流程流转的结果
enum NavOutcome {
    /// 到达目标页面，等待执行
    Destination(Arc<dyn ActivityExecutor>),
    /// 目标已满足（如已登录时再执行登录）
    AlreadyExecuted,
    /// 途中检测到登录页
    NeedLogin,
}

/// 一次目标执行后的下一步
enum GoalStep {
    Finished(Value),
    /// 登录完成，恢复原目标
    Resume,
    NeedLogin,
}

pub struct ActionScheduler {
    config: SchedulerConfig,
    surface: Arc<dyn Surface>,
    session: Arc<SchedulerSession>,
    limits: SchedulerSection,
    recovery: RecoveryEngine,
}

impl ActionScheduler {
    pub fn new(
        config: SchedulerConfig,
        surface: Arc<dyn Surface>,
        session: Arc<SchedulerSession>,
        limits: SchedulerSection,
    ) -> Result<Self, BotError> {
        config.validate()?;
        Ok(Self {
            config,
            surface,
            session,
            limits,
            recovery: RecoveryEngine::new(),
        })
    }

    pub fn session(&self) -> &Arc<SchedulerSession> {
        &self.session
    }

    /// 执行目标：导航到目标流程末尾的页面并执行，返回其结果
    pub async fn execute(&self, goal: GoalType, args: Value) -> Result<Value, BotError> {
        let _guard = self.session.acquire().await;
        tracing::info!(goal = %goal, session = self.session.id(), "start executing");
        let result = self.execute_locked(goal, args).await;
        match &result {
            Ok(_) => tracing::info!(goal = %goal, "execution finished"),
            Err(e) => tracing::warn!(goal = %goal, error = %e, "execution failed"),
        }
        result
    }

    async fn execute_locked(&self, goal: GoalType, args: Value) -> Result<Value, BotError> {
        let mut current_goal = goal;
        let mut retry_goal: Option<GoalType> = None;
        let mut retry_count = 0;
        let mut login_budget = self.limits.login_retry_limit;
        let mut force_refresh = true;

        loop {
            let process = self.config.process(current_goal).ok_or_else(|| {
                BotError::stop(format!("未找到目标 [{current_goal}] 的执行流程"))
            })?;

            if retry_goal == Some(current_goal) {
                retry_count += 1;
                if retry_count >= self.limits.goal_retry_limit {
                    return Err(BotError::parse(format!(
                        "执行多次，仍停留在目标 {current_goal}"
                    )));
                }
            } else {
                retry_count = 0;
                retry_goal = Some(current_goal);
            }

            // 因可重试错误重跑时沿用本次的刷新设置，登录页上的重试不回退
            let step = match self.run_goal(current_goal, goal, process, force_refresh, &args).await {
                Ok(step) => {
                    force_refresh = true;
                    step
                }
                Err(err) => match self.recovery.handle(&err, current_goal) {
                    RecoveryAction::Relogin => {
                        tracing::warn!(goal = %current_goal, error = %err, "session expired, relogin");
                        GoalStep::NeedLogin
                    }
                    RecoveryAction::RetryGoal => {
                        tracing::warn!(goal = %current_goal, error = %err, "retryable error, restarting goal");
                        continue;
                    }
                    RecoveryAction::Propagate => return Err(err),
                },
            };

            match step {
                GoalStep::Finished(value) => return Ok(value),
                GoalStep::Resume => {
                    tracing::info!(goal = %goal, "logged in, resuming original goal");
                    current_goal = goal;
                }
                GoalStep::NeedLogin => {
                    if login_budget == 0 {
                        return Err(BotError::stop("登录多次后仍会话超时"));
                    }
                    login_budget -= 1;
                    self.session.record_relogin().await;
                    tracing::info!(goal = %goal, login_budget, "login required");
                    current_goal = GoalType::Authenticate;
                    // 已经在登录页，无需刷新
                    force_refresh = false;
                }
            }
        }
    }

    async fn run_goal(
        &self,
        current_goal: GoalType,
        original_goal: GoalType,
        process: &[String],
        refresh: bool,
        args: &Value,
    ) -> Result<GoalStep, BotError> {
        let (outcome, ctx) = self.navigate(current_goal, process, refresh).await?;
        let is_original = current_goal == original_goal;

        match outcome {
            NavOutcome::NeedLogin => Ok(GoalStep::NeedLogin),
            NavOutcome::AlreadyExecuted if is_original => Ok(GoalStep::Finished(Value::Bool(true))),
            NavOutcome::AlreadyExecuted => Ok(GoalStep::Resume),
            NavOutcome::Destination(executor) if is_original => {
                executor.execute(&ctx, args.clone()).await.map(GoalStep::Finished)
            }
            NavOutcome::Destination(executor) if current_goal == GoalType::Authenticate => {
                // 登录不依赖原目标的参数
                executor.execute(&ctx, Value::Null).await?;
                Ok(GoalStep::Resume)
            }
            NavOutcome::Destination(_) => Err(BotError::stop(format!(
                "未知处理情况 {current_goal}, {original_goal}"
            ))),
        }
    }

    /// 流程流转：识别当前页面，按流程前进 / 回退，直到到达目标页面或检测到需登录
    async fn navigate(
        &self,
        goal: GoalType,
        process: &[String],
        refresh: bool,
    ) -> Result<(NavOutcome, ActivityContext), BotError> {
        let mut ctx = self.new_context().await?;
        let mut navigated = false;
        let mut none_activity_count = 0;
        let mut last_kind: Option<ActivityKind> = None;
        let mut same_activity_count = 0;
        let mut iterations = 0;

        let outcome = loop {
            if iterations >= self.limits.loop_limit {
                self.session.record_pass(iterations).await;
                return Err(BotError::parse("检查当前页面次数达到限制，疑似页面执行有互相依赖"));
            }
            iterations += 1;
            tracing::trace!(goal = %goal, iterations, "checking current activity");

            ctx.refresh().await?;
            let Some(current) = self.find_current(&mut ctx).await? else {
                let state = NavState::Searching;
                if none_activity_count >= self.limits.none_activity_limit {
                    self.session.record_pass(iterations).await;
                    return Err(BotError::parse("未识别到当前运行页面"));
                }
                none_activity_count += 1;
                tracing::warn!(?state, goal = %goal, attempt = none_activity_count, "unknown activity, pressing back");
                self.surface.press_back().await?;
                self.wait().await;
                continue;
            };
            none_activity_count = 0;
            let kind = current.kind();

            if kind == ActivityKind::Home && matches!(goal, GoalType::Home | GoalType::Authenticate) {
                tracing::info!(goal = %goal, "already at home");
                break if goal == GoalType::Home {
                    NavOutcome::Destination(current)
                } else {
                    NavOutcome::AlreadyExecuted
                };
            }
            if navigated && goal == GoalType::Authenticate && kind.is_non_login() {
                break NavOutcome::AlreadyExecuted;
            }

            let position = process.iter().position(|n| n == current.name());
            let state = nav_state(goal, navigated, kind, position, process.len());
            if state == NavState::NeedLogin {
                tracing::debug!(?state, executor = current.name(), "login page on the way");
                break NavOutcome::NeedLogin;
            }

            if last_kind == Some(kind) {
                if same_activity_count < self.limits.same_activity_limit {
                    same_activity_count += 1;
                    tracing::debug!(?kind, same_activity_count, "still on the same activity");
                    self.wait().await;
                    continue;
                }
            } else {
                same_activity_count = 0;
                last_kind = Some(kind);
            }

            match state {
                NavState::OffProcess => {
                    tracing::debug!(?state, executor = current.name(), "not in process, going back");
                    current.go_back(&ctx, ActivityKind::Default).await?;
                }
                NavState::InProcess => {
                    let next_name = position
                        .and_then(|p| process.get(p + 1))
                        .ok_or_else(|| BotError::stop("流程位置异常"))?;
                    let next_kind = self.config.executors.kind_of(next_name).ok_or_else(|| {
                        BotError::stop(format!("未找到页面执行类 {next_name}"))
                    })?;
                    tracing::info!(?state, from = current.name(), to = %next_name, "go next");
                    current.go_next(&ctx, next_kind).await?;
                    navigated = true;
                }
                NavState::Done if !navigated && refresh => {
                    // 未触发过页面跳转时先回退再进入，避免使用缓存页；回退不视为已跳转
                    tracing::debug!(executor = current.name(), "refreshing destination");
                    current.go_back(&ctx, ActivityKind::Default).await?;
                }
                NavState::Done => {
                    tracing::info!(?state, goal = %goal, executor = current.name(), kind = ?kind, "reached destination");
                    break NavOutcome::Destination(current);
                }
                NavState::Searching | NavState::NeedLogin => continue,
            }
        };

        self.session.record_pass(iterations).await;
        Ok((outcome, ctx))
    }

    /// 识别当前页面：先由全局监听处理插播，再依序轮询执行类的 `check`
    async fn find_current(
        &self,
        ctx: &mut ActivityContext,
    ) -> Result<Option<Arc<dyn ActivityExecutor>>, BotError> {
        for attempt in 0..self.limits.find_retry_limit.max(1) {
            if attempt > 0 {
                self.wait().await;
                ctx.refresh().await?;
            }
            if let Some(watcher) = &self.config.watcher {
                if watcher.check(&ctx.observation).await? {
                    tracing::debug!("watcher handled an interstitial");
                    continue;
                }
            }
            if let Some(executor) = self.config.executors.find_current(&ctx.observation).await {
                return Ok(Some(executor));
            }
        }
        Ok(None)
    }

    async fn new_context(&self) -> Result<ActivityContext, BotError> {
        Ok(ActivityContext {
            observation: self.surface.observe().await?,
            account: self.session.account().await,
            surface: self.surface.clone(),
            secret: self.session.secret(),
        })
    }

    async fn wait(&self) {
        let interval = self.limits.interval();
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
}

/// 由当前页面在流程中的位置得出导航状态
fn nav_state(
    goal: GoalType,
    navigated: bool,
    kind: ActivityKind,
    position: Option<usize>,
    process_len: usize,
) -> NavState {
    if navigated && goal != GoalType::Authenticate && kind.is_login() {
        return NavState::NeedLogin;
    }
    match position {
        None => NavState::OffProcess,
        Some(p) if p + 1 < process_len => NavState::InProcess,
        Some(_) => NavState::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Account;
    use crate::core::ErrorCategory;
    use crate::sim::{SimBank, SimScreen, SimSettings};
    use serde_json::json;

    fn limits() -> SchedulerSection {
        SchedulerSection {
            interval_ms: 0,
            ..Default::default()
        }
    }

    fn setup_with(bank: Arc<SimBank>, config: SchedulerConfig) -> ActionScheduler {
        let session = Arc::new(SchedulerSession::new(Some(Account {
            alias: "test".into(),
            ..Default::default()
        })));
        ActionScheduler::new(config, bank, session, limits()).unwrap()
    }

    fn setup(logged_in: bool) -> (Arc<SimBank>, ActionScheduler) {
        let bank = Arc::new(SimBank::new(SimSettings {
            logged_in,
            ..Default::default()
        }));
        let scheduler = setup_with(bank.clone(), bank.scheduler_config());
        (bank, scheduler)
    }

    #[tokio::test]
    async fn test_query_balance_from_home() {
        let (bank, scheduler) = setup(true);
        let result = scheduler.execute(GoalType::QueryBalance, Value::Null).await.unwrap();
        assert_eq!(result["balance"], 1_000_000);
        assert_eq!(
            bank.journal().await,
            vec!["main.go_next(AccountDetail)", "account.execute"]
        );
        let stats = scheduler.session().stats().await;
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.relogins, 0);
    }

    #[tokio::test]
    async fn test_login_interrupts_and_resumes() {
        let (bank, scheduler) = setup(false);
        let result = scheduler.execute(GoalType::QueryBalance, Value::Null).await.unwrap();
        assert_eq!(result["holder"], "张三");
        assert_eq!(
            bank.journal().await,
            vec![
                "main.go_next(AccountDetail)",
                "login.execute",
                "main.go_next(AccountDetail)",
                "account.execute"
            ]
        );
        assert_eq!(scheduler.session().stats().await.relogins, 1);
        assert!(bank.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_login_budget_exhausted() {
        let (bank, scheduler) = setup(false);
        bank.set_always_expire(true).await;
        let err = scheduler
            .execute(GoalType::QueryBalance, Value::Null)
            .await
            .unwrap_err();
        assert!(err.is_stop());
        assert_eq!(err.message(), "登录多次后仍会话超时");
        assert_eq!(bank.logins().await, 2);
    }

    #[tokio::test]
    async fn test_missing_process_stops() {
        let bank = Arc::new(SimBank::new(SimSettings::default()));
        let mut config = bank.scheduler_config();
        config.processes.remove(&GoalType::Transfer);
        let scheduler = setup_with(bank.clone(), config);
        let err = scheduler.execute(GoalType::Transfer, Value::Null).await.unwrap_err();
        assert!(err.is_stop());
        assert!(bank.journal().await.is_empty());
    }

    #[test]
    fn test_unregistered_executor_rejected() {
        let bank = Arc::new(SimBank::new(SimSettings::default()));
        let config = bank
            .scheduler_config()
            .with_process(GoalType::QueryHistory, ["main", "statement"]);
        let session = Arc::new(SchedulerSession::new(None));
        let result = ActionScheduler::new(config, bank, session, limits());
        assert!(matches!(result, Err(e) if e.is_stop()));
    }

    #[tokio::test]
    async fn test_loop_limit_reports_parse_failure() {
        let (bank, scheduler) = setup(true);
        bank.set_stuck(true).await;
        let err = scheduler
            .execute(GoalType::QueryBalance, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.error_category(), Some(ErrorCategory::ParseFailure));
        let stats = scheduler.session().stats().await;
        assert_eq!(stats.max_iterations, limits().loop_limit);
        assert_eq!(stats.passes, 1);
    }

    #[tokio::test]
    async fn test_network_error_restarts_goal() {
        let (bank, scheduler) = setup(true);
        bank.inject_failure("account", BotError::network("加载失败")).await;
        let result = scheduler.execute(GoalType::QueryBalance, Value::Null).await;
        assert!(result.is_ok());
        assert_eq!(
            bank.journal().await,
            vec![
                "main.go_next(AccountDetail)",
                "account.execute",
                "back",
                "main.go_next(AccountDetail)",
                "account.execute"
            ]
        );
        assert_eq!(scheduler.session().stats().await.passes, 2);
    }

    #[tokio::test]
    async fn test_repeated_network_error_gives_up() {
        let (bank, scheduler) = setup(true);
        for _ in 0..5 {
            bank.inject_failure("account", BotError::network("加载失败")).await;
        }
        let err = scheduler
            .execute(GoalType::QueryBalance, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.error_category(), Some(ErrorCategory::ParseFailure));
        let executed = bank
            .journal()
            .await
            .iter()
            .filter(|e| *e == "account.execute")
            .count();
        assert_eq!(executed, limits().goal_retry_limit);
    }

    #[tokio::test]
    async fn test_transfer_error_not_retried() {
        let (bank, scheduler) = setup(true);
        bank.inject_failure("transfer", BotError::network("提交超时")).await;
        let args = json!({
            "transferee": {
                "order_id": "10001",
                "amount": 500,
                "account": "6222020000000000001",
                "holder": "李四"
            }
        });
        let err = scheduler.execute(GoalType::Transfer, args).await.unwrap_err();
        assert_eq!(err.error_category(), Some(ErrorCategory::Network));
        let executed = bank
            .journal()
            .await
            .iter()
            .filter(|e| *e == "transfer.execute")
            .count();
        assert_eq!(executed, 1);
        assert_eq!(bank.balance().await, 1_000_000);
    }

    #[tokio::test]
    async fn test_unknown_screen_goes_back() {
        let (bank, scheduler) = setup(true);
        bank.push_screen(SimScreen::Blank).await;
        scheduler.execute(GoalType::QueryBalance, Value::Null).await.unwrap();
        assert_eq!(
            bank.journal().await,
            vec!["back", "main.go_next(AccountDetail)", "account.execute"]
        );
    }

    #[tokio::test]
    async fn test_login_network_error_retries_in_place() {
        let (bank, scheduler) = setup(false);
        bank.inject_failure("login", BotError::network("键盘加载超时")).await;
        let result = scheduler.execute(GoalType::QueryBalance, Value::Null).await;
        assert!(result.is_ok());
        assert_eq!(
            bank.journal().await,
            vec![
                "main.go_next(AccountDetail)",
                "login.execute",
                "login.execute",
                "main.go_next(AccountDetail)",
                "account.execute"
            ]
        );
        assert_eq!(scheduler.session().stats().await.relogins, 1);
        assert_eq!(bank.logins().await, 1);
    }

    #[tokio::test]
    async fn test_persistent_unknown_screen_gives_up() {
        let (bank, scheduler) = setup(true);
        bank.kill_app().await;
        let err = scheduler
            .execute(GoalType::QueryBalance, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.error_category(), Some(ErrorCategory::ParseFailure));
        assert_eq!(err.message(), "未识别到当前运行页面");
        let backs = bank
            .journal()
            .await
            .iter()
            .filter(|e| *e == "back")
            .count();
        assert_eq!(backs, limits().none_activity_limit);
    }

    #[tokio::test]
    async fn test_authenticate_satisfied_on_non_login_page() {
        let bank = Arc::new(SimBank::new(SimSettings {
            logged_in: true,
            ..Default::default()
        }));
        let config = bank
            .scheduler_config()
            .with_process(GoalType::Authenticate, ["transfer_index", "transfer"]);
        let scheduler = setup_with(bank.clone(), config);
        bank.push_screen(SimScreen::TransferIndex).await;

        let result = scheduler.execute(GoalType::Authenticate, Value::Null).await.unwrap();
        assert_eq!(result, Value::Bool(true));
        assert_eq!(bank.journal().await, vec!["transfer_index.go_next(Transfer)"]);
        assert_eq!(bank.logins().await, 0);
    }

    #[test]
    fn test_nav_state_from_process_position() {
        let kind = ActivityKind::AccountDetail;
        assert_eq!(nav_state(GoalType::QueryBalance, false, kind, None, 2), NavState::OffProcess);
        assert_eq!(nav_state(GoalType::QueryBalance, false, kind, Some(0), 2), NavState::InProcess);
        assert_eq!(nav_state(GoalType::QueryBalance, true, kind, Some(1), 2), NavState::Done);
        assert_eq!(
            nav_state(GoalType::QueryBalance, true, ActivityKind::Login, None, 2),
            NavState::NeedLogin
        );
        assert_eq!(
            nav_state(GoalType::Authenticate, true, ActivityKind::Login, Some(1), 2),
            NavState::Done
        );
    }

    #[tokio::test]
    async fn test_watcher_dismisses_popup() {
        let (bank, scheduler) = setup(true);
        bank.push_screen(SimScreen::Popup).await;
        scheduler.execute(GoalType::QueryBalance, Value::Null).await.unwrap();
        assert_eq!(
            bank.journal().await,
            vec!["watcher.dismiss", "main.go_next(AccountDetail)", "account.execute"]
        );
    }

    #[tokio::test]
    async fn test_expired_dialog_triggers_relogin() {
        let (bank, scheduler) = setup(true);
        bank.show_expired_dialog().await;
        scheduler.execute(GoalType::QueryBalance, Value::Null).await.unwrap();
        assert_eq!(bank.logins().await, 1);
        assert_eq!(scheduler.session().stats().await.relogins, 2);
        assert_eq!(bank.journal().await.first().map(String::as_str), Some("watcher.expired"));
    }

    #[tokio::test]
    async fn test_authenticate_at_home_is_satisfied() {
        let (bank, scheduler) = setup(false);
        let result = scheduler.execute(GoalType::Authenticate, Value::Null).await.unwrap();
        assert_eq!(result, Value::Bool(true));
        assert!(bank.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_home_goal_backs_out() {
        let (bank, scheduler) = setup(true);
        bank.push_screen(SimScreen::Account).await;
        scheduler.execute(GoalType::Home, Value::Null).await.unwrap();
        assert_eq!(bank.journal().await, vec!["back"]);
        assert_eq!(bank.current_screen().await, SimScreen::Home);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_serialized() {
        let (bank, scheduler) = setup(true);
        let scheduler = Arc::new(scheduler);
        let (a, b) = tokio::join!(
            scheduler.execute(GoalType::QueryBalance, Value::Null),
            scheduler.execute(GoalType::QueryBalance, Value::Null)
        );
        assert!(a.is_ok() && b.is_ok());
        let journal = bank.journal().await;
        assert_eq!(journal.iter().filter(|e| *e == "account.execute").count(), 2);
        // 第二次进入时已在账户页，先回退刷新
        assert_eq!(journal[2], "back");
    }
}
