//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（数据库连接），只暴露能力：
//! - `CurriculumLookup`：按 (年级, 科目) 查询课程标准参考
//! - `QuestionStore`：查询桶内最大序号、逐条写入题目
//!
//! 连接在进程启动时创建一次，以 `Arc<dyn ...>` 形式显式传递给需要的服务

pub mod memory;
pub mod mongo;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Bucket, PersistedQuestion};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// 课程标准查询（只读）
#[async_trait]
pub trait CurriculumLookup: Send + Sync {
    /// 查询课程标准参考，没有记录或记录不含参考时返回 `None`
    async fn find_reference(&self, bucket: &Bucket) -> Result<Option<String>, StoreError>;
}

/// 题库存储
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// 本桶ID前缀（`Bucket::id_prefix`）下已有题目ID的最大尾部序号，没有时返回 `None`
    async fn max_sequence(&self, bucket: &Bucket) -> Result<Option<u64>, StoreError>;

    /// 写入单条题目，返回存储层生成的ID
    async fn insert_question(&self, question: &PersistedQuestion) -> Result<String, StoreError>;

    /// 连通性检查
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// 为数据库操作加超时，超时视为该操作失败
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            seconds: limit.as_secs(),
        }),
    }
}
