//! 页面执行类注册表
//!
//! 按注册顺序保存 Arc<dyn ActivityExecutor>：识别当前页面时依序轮询 `check`，流程跳转时按名称查找。

use std::sync::Arc;

use crate::activity::{ActivityExecutor, ActivityKind, Observation};

#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: Vec<Arc<dyn ActivityExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册执行类；同名时替换旧的并保持原位置
    pub fn register(&mut self, executor: impl ActivityExecutor + 'static) {
        self.register_arc(Arc::new(executor));
    }

    pub fn register_arc(&mut self, executor: Arc<dyn ActivityExecutor>) {
        match self.executors.iter().position(|e| e.name() == executor.name()) {
            Some(idx) => self.executors[idx] = executor,
            None => self.executors.push(executor),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActivityExecutor>> {
        self.executors.iter().find(|e| e.name() == name).cloned()
    }

    pub fn kind_of(&self, name: &str) -> Option<ActivityKind> {
        self.executors.iter().find(|e| e.name() == name).map(|e| e.kind())
    }

    /// 按注册顺序返回第一个 `check` 命中的执行类
    pub async fn find_current(&self, observation: &Observation) -> Option<Arc<dyn ActivityExecutor>> {
        for executor in &self.executors {
            if executor.check(observation).await {
                return Some(executor.clone());
            }
        }
        None
    }

    pub fn names(&self) -> Vec<String> {
        self.executors.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Marker {
        name: &'static str,
        kind: ActivityKind,
        needle: &'static str,
    }

    #[async_trait]
    impl ActivityExecutor for Marker {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ActivityKind {
            self.kind
        }

        async fn check(&self, observation: &Observation) -> bool {
            observation.contains(self.needle)
        }
    }

    fn registry() -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new();
        registry.register(Marker { name: "home", kind: ActivityKind::Home, needle: "tab_home" });
        registry.register(Marker { name: "login", kind: ActivityKind::Login, needle: "pwd" });
        registry
    }

    #[tokio::test]
    async fn test_find_current_in_registration_order() {
        let registry = registry();
        let both = Observation::new(None, "tab_home pwd");
        assert_eq!(registry.find_current(&both).await.unwrap().name(), "home");
        let login = Observation::new(None, "pwd");
        assert_eq!(registry.find_current(&login).await.unwrap().name(), "login");
        assert!(registry.find_current(&Observation::new(None, "?")).await.is_none());
    }

    #[tokio::test]
    async fn test_check_is_stable_for_same_snapshot() {
        let registry = registry();
        let snapshot = Observation::new(Some("Main".into()), "tab_home");
        let home = registry.get("home").unwrap();
        assert_eq!(home.check(&snapshot).await, home.check(&snapshot).await);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Marker { name: "home", kind: ActivityKind::Guide, needle: "x" });
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["home".to_string(), "login".to_string()]);
        assert_eq!(registry.kind_of("home"), Some(ActivityKind::Guide));
    }
}
