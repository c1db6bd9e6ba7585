//! 结果上报协作方
//!
//! 会话编排器通过 Reporter 上报状态、流水批次、转账结果与回单；具体传输协议由外部实现。
//! LogReporter 仅写日志；MemoryReporter 记录到内存，供演示与测试断言。

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::Status;

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn status(&self, alias: &str, status: Status, message: &str);

    /// 余额与流水，金额单位为分
    async fn transactions(&self, alias: &str, balance: i64, records: &[Value]);

    async fn transfer_result(&self, alias: &str, order_id: &str, success: bool, message: &str);

    async fn receipts(&self, alias: &str, receipts: &[Value]);
}

#[derive(Debug, Default)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    async fn status(&self, alias: &str, status: Status, message: &str) {
        tracing::info!(alias, ?status, message, "report status");
    }

    async fn transactions(&self, alias: &str, balance: i64, records: &[Value]) {
        tracing::info!(alias, balance, count = records.len(), "report transactions");
    }

    async fn transfer_result(&self, alias: &str, order_id: &str, success: bool, message: &str) {
        tracing::info!(alias, order_id, success, message, "report transfer result");
    }

    async fn receipts(&self, alias: &str, receipts: &[Value]) {
        tracing::info!(alias, count = receipts.len(), "report receipts");
    }
}

/// 一条上报记录
#[derive(Clone, Debug, PartialEq)]
pub enum Report {
    Status { status: Status, message: String },
    Transactions { balance: i64, records: Vec<Value> },
    TransferResult { order_id: String, success: bool, message: String },
    Receipts(Vec<Value>),
}

#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }

    async fn push(&self, report: Report) {
        self.reports.lock().await.push(report);
    }
}

#[async_trait]
impl Reporter for MemoryReporter {
    async fn status(&self, _alias: &str, status: Status, message: &str) {
        self.push(Report::Status {
            status,
            message: message.to_string(),
        })
        .await;
    }

    async fn transactions(&self, _alias: &str, balance: i64, records: &[Value]) {
        self.push(Report::Transactions {
            balance,
            records: records.to_vec(),
        })
        .await;
    }

    async fn transfer_result(&self, _alias: &str, order_id: &str, success: bool, message: &str) {
        self.push(Report::TransferResult {
            order_id: order_id.to_string(),
            success,
            message: message.to_string(),
        })
        .await;
    }

    async fn receipts(&self, _alias: &str, receipts: &[Value]) {
        self.push(Report::Receipts(receipts.to_vec())).await;
    }
}
