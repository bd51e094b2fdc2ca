//! MongoDB 存储 - 基础设施层
//!
//! 唯一的数据库连接持有者，进程启动时连接一次，之后以 `Arc` 共享。
//!
//! - `questions` 集合：题库，`question_id` 上建唯一索引
//! - `curriculum` 集合：课程标准，只读
//!
//! 连接与建索引自带超时；查询与写入的超时由调用方（服务层）统一施加

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

use super::{bounded, CurriculumLookup, QuestionStore};
use crate::config::Config;
use crate::error::StoreError;
use crate::models::{Bucket, PersistedQuestion};

/// 唯一索引冲突的错误码
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB 存储
pub struct MongoStore {
    db: Database,
    questions: Collection<Document>,
    curriculum: Collection<Document>,
    timeout: Duration,
}

impl MongoStore {
    /// 连接数据库，检查连通性并确保索引存在
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let timeout = config.db_timeout();
        let uri = config.mongo_uri.clone();

        let client = bounded("connect", timeout, async {
            Client::with_uri_str(&uri)
                .await
                .map_err(|e| StoreError::ConnectionFailed {
                    uri: uri.clone(),
                    message: e.to_string(),
                })
        })
        .await?;

        let db = client.database(&config.mongo_database);
        let store = Self {
            questions: db.collection(&config.questions_collection),
            curriculum: db.collection(&config.curriculum_collection),
            db,
            timeout,
        };

        store.ping().await.map_err(|e| StoreError::ConnectionFailed {
            uri: config.mongo_uri.clone(),
            message: e.to_string(),
        })?;
        info!("✓ 已连接到 MongoDB: {}", config.mongo_database);

        store.ensure_indexes().await?;
        Ok(store)
    }

    /// 创建索引：`question_id` 唯一，同时用于序号聚合的前缀匹配
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_id = IndexModel::builder()
            .keys(doc! { "question_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        bounded("create_indexes", self.timeout, async {
            self.questions
                .create_index(unique_id)
                .await
                .map_err(|e| query_failed(&self.questions, e))
        })
        .await?;

        debug!("题库索引已就绪: {}", self.questions.name());
        Ok(())
    }
}

#[async_trait]
impl CurriculumLookup for MongoStore {
    async fn find_reference(&self, bucket: &Bucket) -> Result<Option<String>, StoreError> {
        let filter = doc! {
            "grade": bucket.grade.code(),
            "subject": bucket.subject.as_str(),
        };

        let found = self
            .curriculum
            .find_one(filter)
            .projection(doc! { "reference": 1, "_id": 0 })
            .await
            .map_err(|e| query_failed(&self.curriculum, e))?;

        Ok(found.and_then(|d| d.get_str("reference").ok().map(str::to_string)))
    }
}

#[async_trait]
impl QuestionStore for MongoStore {
    async fn max_sequence(&self, bucket: &Bucket) -> Result<Option<u64>, StoreError> {
        let pipeline = sequence_pipeline(bucket);

        let mut cursor = self
            .questions
            .aggregate(pipeline)
            .await
            .map_err(|e| query_failed(&self.questions, e))?;
        let first = cursor
            .try_next()
            .await
            .map_err(|e| query_failed(&self.questions, e))?;

        let max_number = match first.as_ref().and_then(|d| d.get("max_number")) {
            Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
            Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
            _ => None,
        };
        debug!("{} 当前最大序号: {:?}", bucket, max_number);
        Ok(max_number)
    }

    async fn insert_question(&self, question: &PersistedQuestion) -> Result<String, StoreError> {
        let mut document =
            bson::to_document(question).map_err(|e| StoreError::InsertFailed {
                collection: self.questions.name().to_string(),
                message: e.to_string(),
            })?;
        document.insert(
            "created_at",
            Bson::DateTime(bson::DateTime::from_millis(
                question.created_at.timestamp_millis(),
            )),
        );

        let result = self.questions.insert_one(document).await.map_err(|e| {
            if is_duplicate_key(&e) {
                StoreError::DuplicateId {
                    question_id: question.question_id.clone(),
                }
            } else {
                StoreError::InsertFailed {
                    collection: self.questions.name().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        Ok(match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        bounded("ping", self.timeout, async {
            self.db
                .run_command(doc! { "ping": 1 })
                .await
                .map(|_| ())
                .map_err(|e| StoreError::QueryFailed {
                    collection: "admin".to_string(),
                    message: e.to_string(),
                })
        })
        .await
    }
}

/// 匹配本桶ID前缀的题目ID：`^<前缀>_<数字>$`
fn id_pattern(bucket: &Bucket) -> String {
    format!("^{}_[0-9]+$", regex::escape(&bucket.id_prefix()))
}

/// 查询ID前缀内最大尾部序号的聚合管道
///
/// 按题目ID前缀过滤而不是按 (grade, subject)，科目只差空格的桶共用一条序号。
/// 前缀锚定的正则可以使用 `question_id` 唯一索引
fn sequence_pipeline(bucket: &Bucket) -> Vec<Document> {
    vec![
        doc! {
            "$match": {
                "question_id": { "$regex": id_pattern(bucket) },
            }
        },
        doc! {
            "$project": {
                "question_id": 1,
                "numeric_part": {
                    "$convert": {
                        "input": {
                            "$arrayElemAt": [ { "$split": ["$question_id", "_"] }, -1 ]
                        },
                        "to": "long",
                        "onError": Bson::Null,
                        "onNull": Bson::Null,
                    }
                }
            }
        },
        doc! {
            "$group": {
                "_id": Bson::Null,
                "max_number": { "$max": "$numeric_part" },
            }
        },
    ]
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn query_failed(collection: &Collection<Document>, err: mongodb::error::Error) -> StoreError {
    StoreError::QueryFailed {
        collection: collection.name().to_string(),
        message: err.to_string(),
    }
}
