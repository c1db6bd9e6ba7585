//! 调度配置：执行类、各目标的流程、全局监听

use std::collections::HashMap;
use std::sync::Arc;

use crate::activity::{ActionWatcher, ExecutorRegistry, GoalType};
use crate::core::BotError;

#[derive(Clone, Default)]
pub struct SchedulerConfig {
    pub executors: ExecutorRegistry,
    /// 目标 -> 从默认页面到目标页面的执行类名称序列
    pub processes: HashMap<GoalType, Vec<String>>,
    pub watcher: Option<Arc<dyn ActionWatcher>>,
}

impl SchedulerConfig {
    pub fn new(executors: ExecutorRegistry) -> Self {
        Self {
            executors,
            processes: HashMap::new(),
            watcher: None,
        }
    }

    pub fn with_process<I, S>(mut self, goal: GoalType, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processes
            .insert(goal, names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn ActionWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn process(&self, goal: GoalType) -> Option<&[String]> {
        self.processes
            .get(&goal)
            .map(Vec::as_slice)
            .filter(|p| !p.is_empty())
    }

    /// 流程中引用的执行类必须全部注册
    pub fn validate(&self) -> Result<(), BotError> {
        for (goal, process) in &self.processes {
            if let Some(missing) = process.iter().find(|n| self.executors.get(n).is_none()) {
                return Err(BotError::stop(format!(
                    "目标 [{goal}] 的流程引用了未注册的页面执行类 {missing}"
                )));
            }
        }
        Ok(())
    }
}
