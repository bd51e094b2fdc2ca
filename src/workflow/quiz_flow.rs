//! 出题流程 - 流程层
//!
//! 核心职责：定义"一次出题请求"的完整处理流程
//!
//! 流程顺序：
//! 1. 需求提取（含课程标准查询）
//! 2. 生成题目 → 校验，未通过时带上原因重新生成，最多 `max_validation_retries` 次
//! 3. 分配ID并逐条保存
//!
//! 各步骤严格顺序执行，任一步骤失败即终止本次流程

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{Config, StoreBackend};
use crate::error::{FlowResult, ValidationError};
use crate::infrastructure::{CurriculumLookup, QuestionStore};
use crate::models::{CandidateQuestion, StudentRequirements};
use crate::services::{
    AnswerValidator, BucketLocks, LanguageModel, PersistenceWriter, QuestionGenerator,
    RequirementExtractor, Verdict,
};
use crate::utils::truncate_text;
use crate::workflow::flow_ctx::FlowCtx;

/// 流程依赖的共享连接
///
/// 所有流程共用同一组模型和存储连接
#[derive(Clone)]
pub struct FlowDeps {
    /// 提取需求和出题使用的模型
    pub model: Arc<dyn LanguageModel>,
    /// 审核模型，`None` 时跳过逻辑检查
    pub reviewer: Option<Arc<dyn LanguageModel>>,
    pub curriculum: Arc<dyn CurriculumLookup>,
    pub store: Arc<dyn QuestionStore>,
    pub locks: Arc<BucketLocks>,
}

/// 一次成功流程的结果
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub requirements: StudentRequirements,
    pub questions: Vec<CandidateQuestion>,
    /// 与 `questions` 一一对应
    pub question_ids: Vec<String>,
    /// 因校验未通过而重新生成的次数
    pub regenerations: u32,
    /// 保存位置（用于摘要）
    pub saved_to: String,
}

impl FlowReport {
    /// 一行摘要
    pub fn summary(&self) -> String {
        format!(
            "Successfully generated a quiz. Contains {} questions. Saved to {}.",
            self.question_ids.len(),
            self.saved_to
        )
    }
}

/// 出题流程
///
/// - 编排 提取 → 生成 → 校验 → 保存
/// - 决定何时重新生成、何时终止
/// - 不持有任何连接之外的可变状态
pub struct QuizFlow {
    extractor: RequirementExtractor,
    generator: QuestionGenerator,
    validator: AnswerValidator,
    writer: PersistenceWriter,
    max_validation_retries: u32,
    saved_to: String,
    verbose_logging: bool,
}

impl QuizFlow {
    /// 创建新的出题流程
    pub fn new(config: &Config, deps: FlowDeps) -> Self {
        let llm_timeout = config.llm_timeout();
        let db_timeout = config.db_timeout();
        let reviewer = if config.enable_logic_review {
            deps.reviewer
        } else {
            None
        };

        Self {
            extractor: RequirementExtractor::new(
                deps.model.clone(),
                deps.curriculum,
                config.llm_output_retries,
                llm_timeout,
                db_timeout,
            ),
            generator: QuestionGenerator::new(deps.model, config.llm_output_retries, llm_timeout),
            validator: AnswerValidator::new(reviewer, llm_timeout),
            writer: PersistenceWriter::new(
                deps.store,
                deps.locks,
                config.created_by.clone(),
                config.legacy_sequence_offset,
                db_timeout,
            ),
            max_validation_retries: config.max_validation_retries,
            saved_to: storage_label(config),
            verbose_logging: config.verbose_logging,
        }
    }

    pub async fn run(&self, ctx: &FlowCtx) -> FlowResult<FlowReport> {
        info!("{} 请求: {}", ctx, truncate_text(&ctx.user_input, 80));

        // ========== 步骤 1: 需求提取 ==========
        let requirements = self.extractor.extract(&ctx.user_input).await?;
        info!(
            "{} {} 知识点: {} | 难度: {} | {} 题",
            ctx,
            requirements.bucket(),
            requirements.topic,
            requirements.difficulty,
            requirements.question_count
        );

        // ========== 步骤 2: 生成 + 校验 ==========
        let (batch, regenerations) = self.generate_validated(ctx, &requirements).await?;

        // ========== 步骤 3: 保存 ==========
        let persisted = self.writer.persist(batch, &requirements).await?;
        info!(
            "{} ✅ 已保存 {} 道题目: {}",
            ctx,
            persisted.question_ids.len(),
            persisted.question_ids.join(", ")
        );

        Ok(FlowReport {
            requirements,
            questions: persisted.questions,
            question_ids: persisted.question_ids,
            regenerations,
            saved_to: self.saved_to.clone(),
        })
    }

    /// 生成并校验，返回通过校验的批次和重新生成的次数
    async fn generate_validated(
        &self,
        ctx: &FlowCtx,
        requirements: &StudentRequirements,
    ) -> FlowResult<(Vec<CandidateQuestion>, u32)> {
        let mut rejection: Option<String> = None;
        let mut regenerations = 0;

        loop {
            let batch = self
                .generator
                .generate(requirements, rejection.as_deref())
                .await?;

            if self.verbose_logging {
                self.log_batch(ctx, &batch);
            }

            let verdict = self
                .validator
                .validate(&batch)
                .await
                .map_err(ValidationError::Review)?;

            match verdict {
                Verdict::Accepted => {
                    info!("{} ✓ 校验通过 (重新生成 {} 次)", ctx, regenerations);
                    return Ok((batch, regenerations));
                }
                Verdict::Rejected(r) if regenerations < self.max_validation_retries => {
                    regenerations += 1;
                    warn!(
                        "{} ⚠️ 校验未通过 ({:?})，第 {}/{} 次重新生成: {}",
                        ctx, r.stage, regenerations, self.max_validation_retries, r.reason
                    );
                    rejection = Some(r.reason);
                }
                Verdict::Rejected(r) => {
                    error!("{} ❌ 已达到最大重试次数，放弃本次请求: {}", ctx, r.reason);
                    return Err(ValidationError::RetriesExhausted {
                        retries: self.max_validation_retries,
                        last_reason: r.reason,
                    }
                    .into());
                }
            }
        }
    }

    // ========== 日志辅助方法 ==========

    fn log_batch(&self, ctx: &FlowCtx, batch: &[CandidateQuestion]) {
        for (i, question) in batch.iter().enumerate() {
            info!(
                "{}   {}. [{:?}] {} (答案: {})",
                ctx,
                i + 1,
                question.question_type,
                truncate_text(&question.question_text, 60),
                question.correct_option
            );
        }
    }
}

fn storage_label(config: &Config) -> String {
    match config.store_backend {
        StoreBackend::Mongo => format!("{}.{}", config.mongo_database, config.questions_collection),
        StoreBackend::Memory => "memory".to_string(),
    }
}
