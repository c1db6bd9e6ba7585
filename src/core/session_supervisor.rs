//! 会话监管：取消令牌与停止标记
//!
//! 外部 stop 时取消令牌；执行包装器在每次尝试前与重试等待中检查，正在进行的尝试会先跑完。

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    stopped: AtomicBool,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 取消进行中的执行并标记为已停止
    pub fn stop(&self) {
        if !self.cancel_token.is_cancelled() {
            self.cancel_token.cancel();
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
