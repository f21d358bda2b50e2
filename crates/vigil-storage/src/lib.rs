//! Storage layer for the latest value of every metric.
//!
//! Three backends implement [`Storage`]:
//!
//! - [`memory::MemStorage`] keeps everything in a single locked map.
//! - [`file::FileStorage`] wraps the memory backend and snapshots it to a
//!   line-delimited JSON file, either periodically or on every write.
//! - [`database::DbStorage`] persists to SQLite or PostgreSQL through
//!   SeaORM, with an all-or-nothing batch path.
//!
//! Every backend merges incoming metrics with [`vigil_common::merge`] and
//! signs what it stores with the configured hash key.

pub mod database;
pub mod entities;
pub mod error;
pub mod file;
pub mod memory;


use async_trait::async_trait;
use vigil_common::{Metric, MetricKind};

pub use database::DbStorage;
pub use error::{Result, StorageError};
pub use file::{FileStorage, FileStorageConfig};
pub use memory::MemStorage;

/// 指标最新值存储，由服务端请求处理与 Agent 采集循环共享。
///
/// 实现必须可跨任务共享（`Send + Sync`），进程内后端不得跨 `.await` 持锁。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 查询 `(kind, id)` 对应的指标。
    async fn get(&self, kind: MetricKind, id: &str) -> Result<Option<Metric>>;

    /// 校验并与已存值合并，返回签名后的结果。
    async fn update(&self, metric: Metric) -> Result<Metric>;

    /// 批量写入。非法条目的处理由后端决定：内存与文件后端跳过该条，
    /// 数据库后端回滚整批。
    async fn update_all(&self, metrics: Vec<Metric>) -> Result<()>;

    /// 返回全部指标，按 `(kind, id)` 排序。
    async fn all(&self) -> Result<Vec<Metric>>;

    /// 健康检查。
    async fn ping(&self) -> Result<()>;

    /// 刷盘并释放资源，可重复调用。
    async fn close(&self) -> Result<()>;
}
