//! 页面执行契约：目标 / 页面类型、执行类 trait、注册表、全局监听与外部协作方接口

pub mod executor;
pub mod registry;
pub mod secret;
pub mod surface;
pub mod types;
pub mod watcher;

pub use executor::{Account, ActivityContext, ActivityExecutor};
pub use registry::ExecutorRegistry;
pub use secret::OneShotSecret;
pub use surface::{DigitClassifier, LivenessProbe, Observation, Surface};
pub use types::{ActivityKind, GoalType};
pub use watcher::ActionWatcher;
