//! 题目生成服务 - 业务能力层
//!
//! 根据学生需求生成恰好 `question_count` 道候选题目。
//! 输出不符合 `QuestionBank` 结构或数量不对时，在输出重试次数内重新请求

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::GenerationError;
use crate::models::{CandidateQuestion, QuestionBank, StudentRequirements};
use crate::services::llm_service::{ask, LanguageModel};
use crate::services::structured_output::{parse_model_output, ModelOutput, StructuredOutput};

const TUTOR_SYSTEM_PROMPT: &str = r#"You are a Middle and High school STEM tutor. Generate high-quality questions.
Wrap math in $...$ and use \\ for LaTeX commands. Use \lt and \gt instead of < and > inside math.
Respond with ONE JSON object only, matching this schema:
{"questions": [{
  "question_type": "multiple_choice" | "single_select" | "true_false",
  "question_text": string,
  "options": [{"id": "A", "text": string}, ...]   (ids A, B, C, D; "True"/"False" for true_false),
  "correct_option": string   (e.g. "A,C" for multiple_choice, "B" for single_select, "True" for true_false),
  "explanation": string   (MAX 3 LINES, explain the logic clearly),
  "hint": string   (MAX 3 LINES, a helpful nudge)
}]}"#;

impl StructuredOutput for QuestionBank {
    fn check(&self) -> Result<(), String> {
        for (index, question) in self.questions.iter().enumerate() {
            question
                .check_structure()
                .map_err(|reason| format!("question {}: {}", index + 1, reason))?;
        }
        Ok(())
    }
}

/// 题目生成服务
pub struct QuestionGenerator {
    model: Arc<dyn LanguageModel>,
    output_retries: u32,
    llm_timeout: Duration,
}

impl QuestionGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, output_retries: u32, llm_timeout: Duration) -> Self {
        Self {
            model,
            output_retries,
            llm_timeout,
        }
    }

    /// 生成一批候选题目
    ///
    /// # 参数
    /// - `requirements`: 学生需求
    /// - `rejection`: 上一批被校验拒绝的原因（原文附加到指令中）
    pub async fn generate(
        &self,
        requirements: &StudentRequirements,
        rejection: Option<&str>,
    ) -> Result<Vec<CandidateQuestion>, GenerationError> {
        let directive = build_directive(requirements, rejection);
        debug!("出题指令: {}", directive);

        let attempts = self.output_retries + 1;
        let mut schema_feedback: Option<String> = None;

        for attempt in 1..=attempts {
            let prompt = match &schema_feedback {
                Some(reason) => format!(
                    "{}\n\nYour previous output did not match the required schema: {}\nReturn the full JSON again.",
                    directive, reason
                ),
                None => directive.clone(),
            };

            let response = ask(
                self.model.as_ref(),
                &prompt,
                Some(TUTOR_SYSTEM_PROMPT),
                self.llm_timeout,
            )
            .await?;

            match parse_model_output::<QuestionBank>(&response) {
                ModelOutput::Valid(bank) if bank.questions.len() == requirements.target_count() => {
                    info!("✓ 生成 {} 道候选题目", bank.questions.len());
                    return Ok(bank.questions);
                }
                ModelOutput::Valid(bank) => {
                    let reason = format!(
                        "expected exactly {} questions, got {}",
                        requirements.target_count(),
                        bank.questions.len()
                    );
                    warn!("题目数量不符 (第 {}/{} 次): {}", attempt, attempts, reason);
                    schema_feedback = Some(reason);
                }
                ModelOutput::Retry(reason) => {
                    warn!("题目输出不符合结构 (第 {}/{} 次): {}", attempt, attempts, reason);
                    schema_feedback = Some(reason);
                }
            }
        }

        Err(GenerationError::InvalidOutput {
            attempts,
            reason: schema_feedback.unwrap_or_default(),
        })
    }
}

/// 构建出题指令，包含全部需求字段
pub fn build_directive(requirements: &StudentRequirements, rejection: Option<&str>) -> String {
    let subtopic = requirements.subtopic.as_deref().unwrap_or("any subtopic");
    let reference = if requirements.reference.is_empty() {
        "the standard curriculum"
    } else {
        requirements.reference.as_str()
    };

    let mut directive = format!(
        "Create {count} {subject} questions on {topic} ({subtopic}) for grade {grade} level with {difficulty} difficulty. Refer to {reference}.",
        count = requirements.question_count,
        subject = requirements.subject,
        topic = requirements.topic,
        subtopic = subtopic,
        grade = requirements.grade,
        difficulty = requirements.difficulty,
        reference = reference,
    );

    if let Some(reason) = rejection {
        directive.push_str("\n\nThe previous batch was rejected by validation: ");
        directive.push_str(reason);
        directive.push_str("\nFix these problems in the new batch.");
    }

    directive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, Grade};
    use crate::testing::ScriptedModel;
    use std::num::NonZeroU32;

    fn requirements(count: u32) -> StudentRequirements {
        StudentRequirements {
            grade: Grade::Ninth,
            subject: "Algebra 1".to_string(),
            topic: "polynomials".to_string(),
            subtopic: Some("factoring".to_string()),
            difficulty: Difficulty::Advanced,
            question_count: NonZeroU32::new(count).unwrap(),
            reference: "CCSS HSA-APR".to_string(),
        }
    }

    fn bank_json(count: usize) -> String {
        let questions: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"question_type": "single_select", "question_text": "Factor $x^2-{n}$",
                        "options": [{{"id": "A", "text": "yes"}}, {{"id": "B", "text": "no"}}],
                        "correct_option": "A", "explanation": "Difference of squares.", "hint": "Think squares."}}"#,
                    n = (i + 1) * (i + 1)
                )
            })
            .collect();
        format!(r#"{{"questions": [{}]}}"#, questions.join(","))
    }

    #[test]
    fn test_directive_embeds_all_fields() {
        let directive = build_directive(&requirements(2), None);
        for needle in ["2", "Algebra 1", "polynomials", "factoring", "grade 9", "Advanced", "CCSS HSA-APR"] {
            assert!(directive.contains(needle), "missing {needle} in {directive}");
        }
        assert!(!directive.contains("rejected"));
    }

    #[test]
    fn test_directive_appends_rejection_verbatim() {
        let reason = "FIX: the distractor options are not mutually exclusive";
        let directive = build_directive(&requirements(1), Some(reason));
        assert!(directive.contains(reason));
    }

    #[tokio::test]
    async fn test_generate_exact_count() {
        let model = Arc::new(ScriptedModel::new(vec![bank_json(2)]));
        let generator = QuestionGenerator::new(model, 1, Duration::from_secs(5));
        let batch = generator.generate(&requirements(2), None).await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_count_is_retried() {
        let model = Arc::new(ScriptedModel::new(vec![bank_json(1), bank_json(2)]));
        let generator = QuestionGenerator::new(model.clone(), 1, Duration::from_secs(5));
        let batch = generator.generate(&requirements(2), None).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(model.prompts()[1].contains("expected exactly 2 questions, got 1"));
    }

    #[tokio::test]
    async fn test_bad_label_exhausts_retries() {
        let bad = r#"{"questions": [{"question_type": "single_select", "question_text": "Q",
            "options": [{"id": "A", "text": "x"}], "correct_option": "C",
            "explanation": "e", "hint": "h"}]}"#;
        let model = Arc::new(ScriptedModel::new(vec![bad, bad]));
        let generator = QuestionGenerator::new(model, 1, Duration::from_secs(5));
        let err = generator.generate(&requirements(1), None).await.unwrap_err();
        match err {
            GenerationError::InvalidOutput { attempts, reason } => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("question 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let generator = QuestionGenerator::new(model, 3, Duration::from_secs(5));
        let err = generator.generate(&requirements(1), None).await.unwrap_err();
        assert!(matches!(err, GenerationError::Llm(_)));
    }
}
