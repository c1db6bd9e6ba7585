//! 外部协作方接口：被控界面、存活探测、数字键盘识别
//!
//! 核心只依赖这些 trait；具体设备传输（快照 / 点击 / 输入 / 滑动）由适配层实现。

use std::time::Instant;

use async_trait::async_trait;

use crate::core::BotError;

/// 某一时刻的界面快照
#[derive(Clone, Debug)]
pub struct Observation {
    /// 前台页面标识（Android 中为 Activity 名）
    pub activity: Option<String>,
    /// 界面结构（层级 dump）
    pub source: String,
    pub captured_at: Instant,
}

impl Observation {
    pub fn new(activity: Option<String>, source: impl Into<String>) -> Self {
        Self {
            activity,
            source: source.into(),
            captured_at: Instant::now(),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.source.contains(needle)
    }

    pub fn activity_is(&self, name: &str) -> bool {
        self.activity.as_deref() == Some(name)
    }
}

/// 被控界面：刷新快照与默认返回
#[async_trait]
pub trait Surface: Send + Sync {
    async fn observe(&self) -> Result<Observation, BotError>;

    /// 默认返回（系统返回键）
    async fn press_back(&self) -> Result<(), BotError>;
}

/// 目标应用存活探测：不在前台时重新拉起
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn ensure_running(&self) -> Result<(), BotError>;
}

/// 随机数字键盘识别，仅供具体适配层使用
pub trait DigitClassifier: Send + Sync {
    /// 输入图片区域，返回按位置排列的数字序列
    fn classify(&self, image: &[u8]) -> Result<Vec<u8>, BotError>;
}
