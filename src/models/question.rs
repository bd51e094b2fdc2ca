//! 题目数据结构
//!
//! - `CandidateQuestion`：模型生成的候选题目（临时数据）
//! - `QuestionBank`：模型一次输出的题目列表
//! - `PersistedQuestion`：写入题库的完整记录

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::grade::Grade;
use super::requirements::{Difficulty, StudentRequirements};

/// 解析/说明/提示的最大行数
pub const MAX_TEXT_LINES: usize = 3;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// 多选
    MultipleChoice,
    /// 单选
    SingleSelect,
    /// 判断
    TrueFalse,
}

/// 选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// 选项标识（A/B/C/D，判断题为 True/False）
    pub id: String,
    pub text: String,
}

/// 候选题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub question_type: QuestionType,
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    /// 正确选项标识，多个时用逗号连接，例如 "A,C"
    pub correct_option: String,
    pub explanation: String,
    pub hint: String,
}

impl CandidateQuestion {
    /// 拆分正确选项标识
    pub fn correct_labels(&self) -> Vec<&str> {
        self.correct_option
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .collect()
    }

    /// 检查题目结构约束
    ///
    /// 选项标识唯一且非空、选项内容非空、正确选项必须引用已有选项。
    /// 标识比较忽略大小写（判断题常见 "true" 对应选项 "True"）
    pub fn check_structure(&self) -> Result<(), String> {
        if self.question_text.trim().is_empty() {
            return Err("question_text is empty".to_string());
        }
        if self.options.is_empty() {
            return Err("options are empty".to_string());
        }

        let mut labels = HashSet::new();
        for option in &self.options {
            let label = option.id.trim().to_lowercase();
            if label.is_empty() {
                return Err("option id is empty".to_string());
            }
            if option.text.trim().is_empty() {
                return Err(format!("option {} has empty text", option.id));
            }
            if !labels.insert(label) {
                return Err(format!("duplicate option id {}", option.id));
            }
        }

        let correct = self.correct_labels();
        if correct.is_empty() {
            return Err("correct_option is empty".to_string());
        }
        for label in &correct {
            if !labels.contains(&label.to_lowercase()) {
                return Err(format!(
                    "correct_option {} does not match any option id",
                    label
                ));
            }
        }

        match self.question_type {
            QuestionType::SingleSelect if correct.len() != 1 => Err(format!(
                "single_select must have exactly one correct option, got {}",
                self.correct_option
            )),
            QuestionType::TrueFalse if self.options.len() != 2 => Err(format!(
                "true_false must have exactly two options, got {}",
                self.options.len()
            )),
            QuestionType::TrueFalse if correct.len() != 1 => Err(format!(
                "true_false must have exactly one correct option, got {}",
                self.correct_option
            )),
            _ => Ok(()),
        }
    }
}

/// 模型一次输出的题目列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub questions: Vec<CandidateQuestion>,
}

/// 题库中的题目记录（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQuestion {
    pub question_id: String,
    pub grade: Grade,
    pub subject: String,
    pub topic: String,
    pub subtopic: Option<String>,
    pub difficulty: Difficulty,
    pub question_type: QuestionType,
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub correct_option: String,
    pub explanation: String,
    pub hint: String,
    /// 创建者（agent 或教师ID）
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl PersistedQuestion {
    /// 由候选题目和学生需求组装题库记录
    pub fn from_candidate(
        question_id: String,
        candidate: &CandidateQuestion,
        requirements: &StudentRequirements,
        created_by: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id,
            grade: requirements.grade,
            subject: requirements.subject.clone(),
            topic: requirements.topic.clone(),
            subtopic: requirements.subtopic.clone(),
            difficulty: requirements.difficulty,
            question_type: candidate.question_type,
            question_text: candidate.question_text.clone(),
            options: candidate.options.clone(),
            correct_option: candidate.correct_option.clone(),
            explanation: candidate.explanation.clone(),
            hint: candidate.hint.clone(),
            created_by: created_by.to_string(),
            created_at,
        }
    }
}
