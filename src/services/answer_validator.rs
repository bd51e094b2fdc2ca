//! 题目校验服务 - 业务能力层
//!
//! 对一批候选题目给出 `Verdict`：
//! 1. 格式检查（本地、确定性）：`$` 定界符成对、数学区域内不出现 `<` `>`、解析/提示行数
//! 2. 逻辑检查（可选，交给审核模型）：回复中包含 `FIX:`（不区分大小写）即拒绝
//!
//! 拒绝是一个普通的返回值，重试由流程层的有界循环决定

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::models::question::MAX_TEXT_LINES;
use crate::models::CandidateQuestion;
use crate::services::llm_service::{ask, LanguageModel};

/// 审核回复中表示"需要修改"的标记
pub const SENTINEL: &str = "FIX:";

const REVIEWER_SYSTEM_PROMPT: &str = "You are a strict STEM professor. Check the questions for logical, factual and \
mathematical accuracy, and check that exactly the listed correct options are correct. \
If anything is wrong, reply with 'FIX: [reason]'. If everything is correct, reply with 'OK'.";

/// 拒绝发生在哪一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionStage {
    Format,
    Logic,
}

/// 拒绝原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: RejectionStage,
    pub reason: String,
}

/// 校验结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

/// 统计未转义的 `$`（前面不是 `\` 的 `$`）
pub fn count_unescaped_delimiters(text: &str) -> usize {
    text.matches('$').count() - text.matches("\\$").count()
}

/// 检查一段可能包含数学公式的文本
///
/// 只要文本里出现 `$` 就视为"在数学区域内"，这是有意的宽松规则
pub fn check_math_text(field: &str, text: &str) -> Result<(), String> {
    let delimiters = count_unescaped_delimiters(text);
    if delimiters % 2 != 0 {
        return Err(format!(
            "{}: unbalanced math delimiters ({} unescaped $). Ensure every $ is closed.",
            field, delimiters
        ));
    }
    if (text.contains('<') || text.contains('>')) && text.contains('$') {
        return Err(format!(
            "{}: use \\lt or \\gt instead of < or > inside math blocks.",
            field
        ));
    }
    Ok(())
}

fn check_line_bound(field: &str, text: &str) -> Result<(), String> {
    let lines = text.trim().lines().count();
    if lines > MAX_TEXT_LINES {
        return Err(format!(
            "{}: must be at most {} lines, got {}.",
            field, MAX_TEXT_LINES, lines
        ));
    }
    Ok(())
}

/// 格式检查，返回第一条问题
pub fn check_format(batch: &[CandidateQuestion]) -> Result<(), Rejection> {
    for (index, question) in batch.iter().enumerate() {
        let n = index + 1;
        check_math_text(&format!("question {} text", n), &question.question_text)
            .and_then(|_| check_math_text(&format!("question {} explanation", n), &question.explanation))
            .and_then(|_| check_line_bound(&format!("question {} explanation", n), &question.explanation))
            .and_then(|_| check_line_bound(&format!("question {} hint", n), &question.hint))
            .map_err(|reason| Rejection {
                stage: RejectionStage::Format,
                reason,
            })?;
    }
    Ok(())
}

/// 审核模型的用户消息，包含完整批次的 JSON
fn review_prompt(model: &str, batch: &[CandidateQuestion]) -> Result<String, LlmError> {
    let batch_json = serde_json::to_string(batch).map_err(|e| LlmError::RequestBuildFailed {
        model: model.to_string(),
        message: format!("无法序列化待审核题目: {}", e),
    })?;
    Ok(format!("Review these: {}", batch_json))
}

/// 题目校验服务
pub struct AnswerValidator {
    reviewer: Option<Arc<dyn LanguageModel>>,
    llm_timeout: Duration,
}

impl AnswerValidator {
    /// `reviewer` 为 `None` 时只做格式检查
    pub fn new(reviewer: Option<Arc<dyn LanguageModel>>, llm_timeout: Duration) -> Self {
        Self {
            reviewer,
            llm_timeout,
        }
    }

    /// 校验一批题目，通过时批次原样保留
    pub async fn validate(&self, batch: &[CandidateQuestion]) -> Result<Verdict, LlmError> {
        if let Err(rejection) = check_format(batch) {
            warn!("格式检查未通过: {}", rejection.reason);
            return Ok(Verdict::Rejected(rejection));
        }
        debug!("✓ 格式检查通过");

        let Some(reviewer) = &self.reviewer else {
            return Ok(Verdict::Accepted);
        };

        let critique = ask(
            reviewer.as_ref(),
            &review_prompt(reviewer.model_name(), batch)?,
            Some(REVIEWER_SYSTEM_PROMPT),
            self.llm_timeout,
        )
        .await?;

        if critique.to_uppercase().contains(SENTINEL) {
            warn!("逻辑检查未通过: {}", critique);
            return Ok(Verdict::Rejected(Rejection {
                stage: RejectionStage::Logic,
                reason: critique.trim().to_string(),
            }));
        }

        info!("✓ 逻辑检查通过");
        Ok(Verdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionOption, QuestionType};
    use crate::testing::ScriptedModel;

    fn question(text: &str, explanation: &str) -> CandidateQuestion {
        CandidateQuestion {
            question_type: QuestionType::SingleSelect,
            question_text: text.to_string(),
            options: vec![
                QuestionOption {
                    id: "A".to_string(),
                    text: "$x=1$".to_string(),
                },
                QuestionOption {
                    id: "B".to_string(),
                    text: "$x=2$".to_string(),
                },
            ],
            correct_option: "A".to_string(),
            explanation: explanation.to_string(),
            hint: "Subtract 1.".to_string(),
        }
    }

    #[test]
    fn test_count_unescaped_delimiters() {
        assert_eq!(count_unescaped_delimiters("Solve $x+1=2$"), 2);
        assert_eq!(count_unescaped_delimiters("Solve $x+1=2"), 1);
        assert_eq!(count_unescaped_delimiters("It costs \\$5 and $x$"), 2);
        assert_eq!(count_unescaped_delimiters("no math"), 0);
    }

    #[test]
    fn test_unbalanced_question_rejected() {
        let batch = vec![question("Solve $x+1=2", "Subtract.")];
        let rejection = check_format(&batch).unwrap_err();
        assert_eq!(rejection.stage, RejectionStage::Format);
        assert!(rejection.reason.contains("unbalanced math delimiters"));
    }

    #[test]
    fn test_unbalanced_explanation_rejected() {
        let batch = vec![question("Solve $x+1=2$", "Subtract $1 from both sides.")];
        let rejection = check_format(&batch).unwrap_err();
        assert!(rejection.reason.contains("explanation"));
    }

    #[test]
    fn test_angle_bracket_in_math_rejected() {
        let batch = vec![question("Is $x < 3$ when $x=2$?", "Yes.")];
        let rejection = check_format(&batch).unwrap_err();
        assert!(rejection.reason.contains("\\lt"));

        let plain = vec![question("Is 2 < 3?", "Yes.")];
        assert!(check_format(&plain).is_ok());
    }

    #[test]
    fn test_long_hint_rejected() {
        let mut q = question("Solve $x+1=2$", "Subtract.");
        q.hint = "one\ntwo\nthree\nfour".to_string();
        assert!(check_format(&[q]).unwrap_err().reason.contains("hint"));
    }

    #[tokio::test]
    async fn test_reviewer_fix_rejects_verbatim() {
        let reviewer = Arc::new(ScriptedModel::new(vec![
            "FIX: the distractor options are not mutually exclusive",
        ]));
        let validator = AnswerValidator::new(Some(reviewer), Duration::from_secs(5));
        let verdict = validator
            .validate(&[question("Solve $x+1=2$", "Subtract 1.")])
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::Rejected(Rejection {
                stage: RejectionStage::Logic,
                reason: "FIX: the distractor options are not mutually exclusive".to_string(),
            })
        );
    }

    #[test]
    fn test_review_prompt_carries_whole_batch() {
        let batch = vec![
            question("Solve $x+1=2$", "Subtract 1."),
            question("Solve $2x=4$", "Divide by 2."),
        ];
        let prompt = review_prompt("reviewer", &batch).unwrap();
        let json = prompt.strip_prefix("Review these: ").unwrap();
        let parsed: Vec<CandidateQuestion> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, batch);
    }

    #[tokio::test]
    async fn test_reviewer_sees_serialized_batch() {
        let reviewer = Arc::new(ScriptedModel::new(vec!["OK"]));
        let validator = AnswerValidator::new(Some(reviewer.clone()), Duration::from_secs(5));
        let verdict = validator
            .validate(&[question("Solve $x+1=2$", "Subtract 1.")])
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Accepted);

        let prompts = reviewer.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Review these: ["));
        assert!(prompts[0].contains("Solve $x+1=2$"));
    }

    #[tokio::test]
    async fn test_reviewer_sentinel_case_insensitive() {
        let reviewer = Arc::new(ScriptedModel::new(vec!["Please fix: option B is also correct"]));
        let validator = AnswerValidator::new(Some(reviewer), Duration::from_secs(5));
        let verdict = validator
            .validate(&[question("Solve $x+1=2$", "Subtract 1.")])
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Rejected(r) if r.stage == RejectionStage::Logic));
    }

    #[tokio::test]
    async fn test_format_failure_skips_reviewer() {
        let reviewer = Arc::new(ScriptedModel::new(vec!["OK"]));
        let validator = AnswerValidator::new(Some(reviewer.clone()), Duration::from_secs(5));
        let verdict = validator
            .validate(&[question("Solve $x+1=2", "Subtract 1.")])
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Rejected(r) if r.stage == RejectionStage::Format));
        assert!(reviewer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_accepts_without_reviewer() {
        let validator = AnswerValidator::new(None, Duration::from_secs(5));
        let verdict = validator
            .validate(&[question("Solve $x+1=2$", "Subtract 1.")])
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Accepted);
    }
}
