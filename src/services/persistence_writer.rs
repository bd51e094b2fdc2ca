//! 题目保存服务 - 业务能力层
//!
//! 为每道通过校验的题目分配ID并逐条写入题库：
//! 1. 查询桶内已有的最大尾部序号
//! 2. 桶为空时序号从 1 起算，分配前先加一，因此新桶首题为 `000002`
//!    （保留的历史行为，可通过 `legacy_sequence_offset = false` 改为从 `000001` 开始）
//! 3. 按批次顺序分配 `GR_<年级>_<科目去空格>_<6位序号>`，每题之后序号加一
//! 4. 逐条写入，不做整批原子写入；中途失败时已写入的前缀保留，不回滚
//!
//! 同一进程内按ID前缀加锁，从读取最大序号到最后一条写入期间串行化同前缀的写入；
//! 跨进程的冲突由存储层的唯一索引拒绝。科目只差空格的桶共用一个ID前缀，
//! 因此序号查询和加锁都以ID前缀为准

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::infrastructure::{bounded, QuestionStore};
use crate::models::{CandidateQuestion, PersistedQuestion, StudentRequirements};

/// 按ID前缀划分的异步锁
///
/// 锁释放后没有其他持有者的条目会被移除
#[derive(Default)]
pub struct BucketLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// 持有期间同前缀的其他写入等待
pub struct BucketGuard<'a> {
    locks: &'a BucketLocks,
    prefix: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BucketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某个ID前缀的锁
    pub async fn lock(&self, prefix: &str) -> BucketGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(prefix.to_string()).or_default().clone()
        };
        BucketGuard {
            locks: self,
            prefix: prefix.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// 当前登记的前缀数量
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 移除没有持有者也没有等待者的条目
    fn prune(&self, prefix: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(prefix)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(prefix);
        }
    }
}

impl Drop for BucketGuard<'_> {
    fn drop(&mut self) {
        // 先释放锁，再检查是否还有等待者
        self.guard.take();
        self.locks.prune(&self.prefix);
    }
}

/// 计算本批第一题的序号，序号用尽时返回 `None`
pub fn next_sequence(max_existing: Option<u64>, legacy_offset: bool) -> Option<u64> {
    match max_existing {
        Some(max) => max.checked_add(1),
        None if legacy_offset => Some(2),
        None => Some(1),
    }
}

/// 保存结果
#[derive(Debug, Clone)]
pub struct PersistedBatch {
    /// 原始批次（供调用方展示）
    pub questions: Vec<CandidateQuestion>,
    /// 与 `questions` 一一对应的题目ID
    pub question_ids: Vec<String>,
    /// 存储层生成的ID
    pub storage_ids: Vec<String>,
}

/// 题目保存服务
pub struct PersistenceWriter {
    store: Arc<dyn QuestionStore>,
    locks: Arc<BucketLocks>,
    created_by: String,
    legacy_sequence_offset: bool,
    db_timeout: Duration,
}

impl PersistenceWriter {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        locks: Arc<BucketLocks>,
        created_by: impl Into<String>,
        legacy_sequence_offset: bool,
        db_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            created_by: created_by.into(),
            legacy_sequence_offset,
            db_timeout,
        }
    }

    /// 保存一批题目
    pub async fn persist(
        &self,
        batch: Vec<CandidateQuestion>,
        requirements: &StudentRequirements,
    ) -> Result<PersistedBatch, PersistenceError> {
        let bucket = requirements.bucket();
        let prefix = bucket.id_prefix();
        let _guard = self.locks.lock(&prefix).await;

        let max_existing = bounded(
            "questions.max_sequence",
            self.db_timeout,
            self.store.max_sequence(&bucket),
        )
        .await
        .map_err(PersistenceError::Sequence)?;

        let exhausted = || PersistenceError::SequenceExhausted {
            prefix: prefix.clone(),
            max: max_existing.unwrap_or_default(),
        };
        let first = next_sequence(max_existing, self.legacy_sequence_offset).ok_or_else(exhausted)?;
        let last_offset = batch.len().saturating_sub(1) as u64;
        first.checked_add(last_offset).ok_or_else(exhausted)?;
        debug!("{} 最大序号: {:?}, 本批起始序号: {}", prefix, max_existing, first);

        let mut question_ids = Vec::with_capacity(batch.len());
        let mut storage_ids = Vec::with_capacity(batch.len());

        for (index, candidate) in batch.iter().enumerate() {
            let question_id = bucket.question_id(first + index as u64);
            let record = PersistedQuestion::from_candidate(
                question_id.clone(),
                candidate,
                requirements,
                &self.created_by,
                Utc::now(),
            );

            let inserted = bounded(
                "questions.insert_question",
                self.db_timeout,
                self.store.insert_question(&record),
            )
            .await;

            match inserted {
                Ok(storage_id) => {
                    info!("✅ 题目保存成功: {} (存储ID: {})", question_id, storage_id);
                    question_ids.push(question_id);
                    storage_ids.push(storage_id);
                }
                Err(source) => {
                    return Err(PersistenceError::Partial {
                        persisted: question_ids,
                        failed_index: index,
                        source,
                    });
                }
            }
        }

        Ok(PersistedBatch {
            questions: batch,
            question_ids,
            storage_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::infrastructure::MemoryStore;
    use crate::models::{Bucket, Difficulty, Grade, QuestionOption, QuestionType};
    use async_trait::async_trait;
    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn requirements(subject: &str) -> StudentRequirements {
        StudentRequirements {
            grade: Grade::Ninth,
            subject: subject.to_string(),
            topic: "polynomials".to_string(),
            subtopic: None,
            difficulty: Difficulty::Advanced,
            question_count: NonZeroU32::new(2).unwrap(),
            reference: String::new(),
        }
    }

    fn candidate(n: usize) -> CandidateQuestion {
        CandidateQuestion {
            question_type: QuestionType::SingleSelect,
            question_text: format!("Question {n}"),
            options: vec![QuestionOption {
                id: "A".to_string(),
                text: "answer".to_string(),
            }],
            correct_option: "A".to_string(),
            explanation: "because".to_string(),
            hint: "think".to_string(),
        }
    }

    fn writer_with(store: Arc<dyn QuestionStore>, locks: Arc<BucketLocks>, legacy: bool) -> PersistenceWriter {
        PersistenceWriter::new(store, locks, "tester", legacy, Duration::from_secs(5))
    }

    fn writer(store: Arc<dyn QuestionStore>, legacy: bool) -> PersistenceWriter {
        writer_with(store, Arc::new(BucketLocks::new()), legacy)
    }

    fn existing(question_id: &str, subject: &str) -> PersistedQuestion {
        PersistedQuestion::from_candidate(
            question_id.to_string(),
            &candidate(0),
            &requirements(subject),
            "someone",
            Utc::now(),
        )
    }

    /// 第 `fail_on` 次写入失败的存储
    struct FlakyStore {
        inner: MemoryStore,
        fail_on: usize,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl QuestionStore for FlakyStore {
        async fn max_sequence(&self, bucket: &Bucket) -> Result<Option<u64>, StoreError> {
            self.inner.max_sequence(bucket).await
        }

        async fn insert_question(&self, question: &PersistedQuestion) -> Result<String, StoreError> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                return Err(StoreError::InsertFailed {
                    collection: "questions".to_string(),
                    message: "connection reset".to_string(),
                });
            }
            self.inner.insert_question(question).await
        }
    }

    #[test]
    fn test_next_sequence() {
        assert_eq!(next_sequence(None, true), Some(2));
        assert_eq!(next_sequence(None, false), Some(1));
        assert_eq!(next_sequence(Some(41), true), Some(42));
        assert_eq!(next_sequence(Some(41), false), Some(42));
        assert_eq!(next_sequence(Some(u64::MAX), true), None);
    }

    #[tokio::test]
    async fn test_empty_bucket_starts_at_two() {
        let store = Arc::new(MemoryStore::new());
        let result = writer(store.clone(), true)
            .persist(vec![candidate(1), candidate(2)], &requirements("Algebra 1"))
            .await
            .unwrap();

        assert_eq!(
            result.question_ids,
            vec!["GR_9_Algebra1_000002", "GR_9_Algebra1_000003"]
        );
        assert_eq!(result.questions.len(), 2);

        let saved = store.questions().await;
        assert_eq!(saved[0].created_by, "tester");
        assert_eq!(saved[0].topic, "polynomials");
        assert_eq!(saved[1].question_text, "Question 2");
    }

    #[tokio::test]
    async fn test_sequence_continues_and_never_repeats() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone(), false);
        let reqs = requirements("Algebra 1");

        let first = writer.persist(vec![candidate(1)], &reqs).await.unwrap();
        let second = writer
            .persist(vec![candidate(2), candidate(3)], &reqs)
            .await
            .unwrap();

        assert_eq!(first.question_ids, vec!["GR_9_Algebra1_000001"]);
        assert_eq!(
            second.question_ids,
            vec!["GR_9_Algebra1_000002", "GR_9_Algebra1_000003"]
        );
    }

    #[tokio::test]
    async fn test_spacing_variants_share_one_sequence() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone(), true);

        let spaced = writer
            .persist(vec![candidate(1)], &requirements("Algebra 1"))
            .await
            .unwrap();
        let compact = writer
            .persist(vec![candidate(2)], &requirements("Algebra1"))
            .await
            .unwrap();
        let compact_again = writer
            .persist(vec![candidate(3)], &requirements("Algebra1"))
            .await
            .unwrap();
        let double_space = writer
            .persist(vec![candidate(4)], &requirements("Algebra  1"))
            .await
            .unwrap();

        assert_eq!(spaced.question_ids, vec!["GR_9_Algebra1_000002"]);
        assert_eq!(compact.question_ids, vec!["GR_9_Algebra1_000003"]);
        assert_eq!(compact_again.question_ids, vec!["GR_9_Algebra1_000004"]);
        assert_eq!(double_space.question_ids, vec!["GR_9_Algebra1_000005"]);
        assert_eq!(store.questions().await.len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_writers_same_prefix_do_not_collide() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(BucketLocks::new());
        let writer = Arc::new(writer_with(store.clone(), locks.clone(), true));

        let mut handles = Vec::new();
        for i in 0..8 {
            let writer = writer.clone();
            // 一半请求使用不带空格的科目名
            let reqs = requirements(if i % 2 == 0 { "Algebra 1" } else { "Algebra1" });
            handles.push(tokio::spawn(async move {
                writer.persist(vec![candidate(i), candidate(i + 100)], &reqs).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut sequences: Vec<u64> = store
            .questions()
            .await
            .iter()
            .filter_map(|q| crate::models::sequence_of(&q.question_id))
            .collect();
        sequences.sort_unstable();
        let expected: Vec<u64> = (2..18).collect();
        assert_eq!(sequences, expected);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_entries_are_pruned() {
        let locks = BucketLocks::new();
        let guard = locks.lock("GR_9_Algebra1").await;
        let other = locks.lock("GR_10_Geometry").await;
        assert_eq!(locks.len(), 2);

        drop(guard);
        assert_eq!(locks.len(), 1);
        drop(other);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_partial_write_keeps_prefix() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_on: 1,
            inserts: AtomicUsize::new(0),
        });

        let err = writer(store.clone(), true)
            .persist(vec![candidate(1), candidate(2), candidate(3)], &requirements("Algebra 1"))
            .await
            .unwrap_err();

        match err {
            PersistenceError::Partial {
                persisted,
                failed_index,
                source,
            } => {
                assert_eq!(persisted, vec!["GR_9_Algebra1_000002"]);
                assert_eq!(failed_index, 1);
                assert!(matches!(source, StoreError::InsertFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        // 已写入的题目不回滚
        assert_eq!(store.inner.questions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_sequence_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let at_max = format!("GR_9_Algebra1_{}", u64::MAX);
        store.insert_question(&existing(&at_max, "Algebra 1")).await.unwrap();

        let err = writer(store.clone(), true)
            .persist(vec![candidate(1)], &requirements("Algebra 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::SequenceExhausted { max: u64::MAX, .. }));
        assert_eq!(store.questions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_that_would_overflow_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let near_max = format!("GR_9_Algebra1_{}", u64::MAX - 1);
        store.insert_question(&existing(&near_max, "Algebra 1")).await.unwrap();

        let err = writer(store.clone(), true)
            .persist(vec![candidate(1), candidate(2)], &requirements("Algebra 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::SequenceExhausted { .. }));
        assert_eq!(store.questions().await.len(), 1);
    }
}
