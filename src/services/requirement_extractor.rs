//! 需求提取服务 - 业务能力层
//!
//! 把用户的自由文本转换为 `StudentRequirements`：
//! 1. 模型只能输出一个结构化动作（更新需求 / 请求澄清）
//! 2. 收到更新后按 (年级, 科目) 查询课程标准，有参考时覆盖模型提取的参考
//!
//! 缺少必填字段时返回澄清请求，不使用默认值继续

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::infrastructure::{bounded, CurriculumLookup};
use crate::models::{Difficulty, Grade, StudentRequirements};
use crate::services::llm_service::{ask, LanguageModel};
use crate::services::structured_output::{parse_model_output, ModelOutput, StructuredOutput};

const EXTRACTOR_SYSTEM_PROMPT: &str = r#"You extract quiz requirements from a student's or educator's request.
Respond with exactly ONE JSON object and nothing else. Choose one action:

1. {"action": "update_requirements",
    "grade": one of "6","7","8","9","10","11","12","99" (use "99" for any other level),
    "subject": string, "topic": string, "subtopic": string or null,
    "reference": string (syllabus / textbook reference if mentioned, else ""),
    "difficulty": one of "Beginner","Intermediate","Advanced" ("hard" means "Advanced", "easy" means "Beginner"),
    "number_of_questions": positive integer}

2. {"action": "request_clarification", "question": string}
   Use this when the grade, subject or topic cannot be determined from the request."#;

/// 模型可输出的动作
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExtractorAction {
    UpdateRequirements(RequirementsUpdate),
    RequestClarification { question: String },
}

impl StructuredOutput for ExtractorAction {}

/// 更新需求动作的参数
#[derive(Debug, Clone, Deserialize)]
pub struct RequirementsUpdate {
    pub grade: Grade,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subtopic: Option<String>,
    pub difficulty: Difficulty,
    pub number_of_questions: NonZeroU32,
}

impl RequirementsUpdate {
    /// 转换为学生需求，科目或知识点为空时要求澄清
    pub fn into_requirements(self) -> Result<StudentRequirements, ExtractionError> {
        let mut missing = Vec::new();
        if self.subject.trim().is_empty() {
            missing.push("subject");
        }
        if self.topic.trim().is_empty() {
            missing.push("topic");
        }
        if !missing.is_empty() {
            return Err(ExtractionError::NeedsClarification {
                question: format!("Please specify the {} for the questions.", missing.join(" and ")),
            });
        }

        Ok(StudentRequirements {
            grade: self.grade,
            subject: self.subject.trim().to_string(),
            topic: self.topic.trim().to_string(),
            subtopic: self
                .subtopic
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            difficulty: self.difficulty,
            question_count: self.number_of_questions,
            reference: self.reference.trim().to_string(),
        })
    }
}

/// 需求提取服务
pub struct RequirementExtractor {
    model: Arc<dyn LanguageModel>,
    curriculum: Arc<dyn CurriculumLookup>,
    output_retries: u32,
    llm_timeout: Duration,
    db_timeout: Duration,
}

impl RequirementExtractor {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        curriculum: Arc<dyn CurriculumLookup>,
        output_retries: u32,
        llm_timeout: Duration,
        db_timeout: Duration,
    ) -> Self {
        Self {
            model,
            curriculum,
            output_retries,
            llm_timeout,
            db_timeout,
        }
    }

    /// 从用户输入中提取需求
    pub async fn extract(&self, user_input: &str) -> Result<StudentRequirements, ExtractionError> {
        let attempts = self.output_retries + 1;
        let mut feedback: Option<String> = None;

        for attempt in 1..=attempts {
            let prompt = build_extraction_prompt(user_input, feedback.as_deref());
            let response = ask(
                self.model.as_ref(),
                &prompt,
                Some(EXTRACTOR_SYSTEM_PROMPT),
                self.llm_timeout,
            )
            .await?;

            match parse_model_output::<ExtractorAction>(&response) {
                ModelOutput::Valid(ExtractorAction::UpdateRequirements(update)) => {
                    let mut requirements = update.into_requirements()?;
                    self.apply_curriculum(&mut requirements).await?;
                    info!(
                        "✓ 需求提取完成: 年级 {} | {} | {} | {} | {} 题",
                        requirements.grade,
                        requirements.subject,
                        requirements.topic,
                        requirements.difficulty,
                        requirements.question_count
                    );
                    return Ok(requirements);
                }
                ModelOutput::Valid(ExtractorAction::RequestClarification { question }) => {
                    info!("模型请求用户澄清: {}", question);
                    return Err(ExtractionError::NeedsClarification { question });
                }
                ModelOutput::Retry(reason) => {
                    warn!("需求提取输出无效 (第 {}/{} 次): {}", attempt, attempts, reason);
                    feedback = Some(reason);
                }
            }
        }

        Err(ExtractionError::InvalidOutput {
            attempts,
            reason: feedback.unwrap_or_default(),
        })
    }

    /// 查询课程标准，有参考时覆盖模型提取的参考
    async fn apply_curriculum(&self, requirements: &mut StudentRequirements) -> Result<(), ExtractionError> {
        let bucket = requirements.bucket();
        let found = bounded(
            "curriculum.find_reference",
            self.db_timeout,
            self.curriculum.find_reference(&bucket),
        )
        .await
        .map_err(ExtractionError::Curriculum)?;

        match found {
            Some(reference) if !reference.trim().is_empty() => {
                debug!("{} 使用课程标准参考: {}", bucket, reference);
                requirements.reference = reference;
            }
            _ => debug!("{} 没有课程标准参考，保留提取结果", bucket),
        }
        Ok(())
    }
}

fn build_extraction_prompt(user_input: &str, feedback: Option<&str>) -> String {
    match feedback {
        Some(reason) => format!(
            "{}\n\nYour previous reply was rejected: {}\nReply again with exactly one valid JSON action.",
            user_input, reason
        ),
        None => user_input.to_string(),
    }
}
