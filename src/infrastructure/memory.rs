//! 内存存储
//!
//! 同时实现 `CurriculumLookup` 和 `QuestionStore`，用于本地试运行和测试。
//! 题目ID唯一性与 MongoDB 的唯一索引行为一致

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CurriculumLookup, QuestionStore};
use crate::error::StoreError;
use crate::models::{Bucket, CurriculumRecord, PersistedQuestion};

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    curriculum: HashMap<Bucket, Option<String>>,
    questions: RwLock<Vec<PersistedQuestion>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用课程标准记录创建
    pub fn with_curriculum(records: Vec<CurriculumRecord>) -> Self {
        let curriculum = records
            .into_iter()
            .map(|r| (Bucket::new(r.grade, r.subject), r.reference))
            .collect();
        Self {
            curriculum,
            questions: RwLock::new(Vec::new()),
        }
    }

    /// 当前所有题目（按写入顺序）
    pub async fn questions(&self) -> Vec<PersistedQuestion> {
        self.questions.read().await.clone()
    }

    /// 某个桶内的题目（按写入顺序）
    pub async fn questions_in(&self, bucket: &Bucket) -> Vec<PersistedQuestion> {
        self.questions
            .read()
            .await
            .iter()
            .filter(|q| q.grade == bucket.grade && q.subject == bucket.subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CurriculumLookup for MemoryStore {
    async fn find_reference(&self, bucket: &Bucket) -> Result<Option<String>, StoreError> {
        Ok(self.curriculum.get(bucket).cloned().flatten())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn max_sequence(&self, bucket: &Bucket) -> Result<Option<u64>, StoreError> {
        let questions = self.questions.read().await;
        Ok(questions
            .iter()
            .filter_map(|q| bucket.sequence_in(&q.question_id))
            .max())
    }

    async fn insert_question(&self, question: &PersistedQuestion) -> Result<String, StoreError> {
        let mut questions = self.questions.write().await;
        if questions.iter().any(|q| q.question_id == question.question_id) {
            return Err(StoreError::DuplicateId {
                question_id: question.question_id.clone(),
            });
        }
        questions.push(question.clone());
        let storage_id = format!("mem-{}", questions.len());
        debug!("内存存储写入: {} -> {}", question.question_id, storage_id);
        Ok(storage_id)
    }
}
