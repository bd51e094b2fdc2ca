//! 学生需求与题目分桶

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use super::grade::Grade;

/// 题目难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 学生出题需求
///
/// 每次流程独占一份，由需求提取器填充，课程标准查询可能覆盖 `reference`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRequirements {
    pub grade: Grade,
    pub subject: String,
    pub topic: String,
    pub subtopic: Option<String>,
    pub difficulty: Difficulty,
    /// 目标题目数量（至少 1 道）
    pub question_count: NonZeroU32,
    /// 课程标准 / 教材参考
    pub reference: String,
}

impl StudentRequirements {
    /// 该需求对应的题目分桶
    pub fn bucket(&self) -> Bucket {
        Bucket::new(self.grade, self.subject.clone())
    }

    /// 目标题目数量
    pub fn target_count(&self) -> usize {
        self.question_count.get() as usize
    }
}

/// 题目分桶：(年级, 科目)
///
/// 题目ID的序号在同一个ID前缀内递增。科目只差空格的桶（"Algebra 1" 与 "Algebra1"）
/// 共用同一个ID前缀，也共用同一条序号
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub grade: Grade,
    pub subject: String,
}

impl Bucket {
    pub fn new(grade: Grade, subject: impl Into<String>) -> Self {
        Self {
            grade,
            subject: subject.into(),
        }
    }

    /// 题目ID前缀，例如 `GR_9_Algebra1`
    ///
    /// 只去掉空格，其余字符原样保留
    pub fn id_prefix(&self) -> String {
        format!("GR_{}_{}", self.grade.code(), self.subject.replace(' ', ""))
    }

    /// 生成指定序号的题目ID
    pub fn question_id(&self, sequence: u64) -> String {
        format!("{}_{:06}", self.id_prefix(), sequence)
    }

    /// 解析属于本桶ID前缀的题目ID（`<前缀>_<数字>`）的序号，其他ID返回 `None`
    pub fn sequence_in(&self, question_id: &str) -> Option<u64> {
        let digits = question_id
            .strip_prefix(self.id_prefix().as_str())?
            .strip_prefix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[年级 {} | {}]", self.grade, self.subject)
    }
}

/// 从题目ID中解析尾部序号（按 `_` 分割取最后一段）
pub fn sequence_of(question_id: &str) -> Option<u64> {
    question_id.rsplit('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_id_format() {
        let bucket = Bucket::new(Grade::Ninth, "Algebra 1");
        assert_eq!(bucket.id_prefix(), "GR_9_Algebra1");
        assert_eq!(bucket.question_id(2), "GR_9_Algebra1_000002");
        assert_eq!(bucket.question_id(1234567), "GR_9_Algebra1_1234567");
    }

    #[test]
    fn test_sequence_in_shares_prefix_across_spacing() {
        let spaced = Bucket::new(Grade::Ninth, "Algebra 1");
        let compact = Bucket::new(Grade::Ninth, "Algebra1");
        assert_eq!(spaced.id_prefix(), compact.id_prefix());
        assert_eq!(compact.sequence_in("GR_9_Algebra1_000007"), Some(7));
        assert_eq!(spaced.sequence_in("GR_9_Algebra1_000007"), Some(7));

        assert_eq!(spaced.sequence_in("GR_9_Algebra1_B_000007"), None);
        assert_eq!(spaced.sequence_in("GR_99_Algebra1_000007"), None);
        assert_eq!(spaced.sequence_in("GR_9_Algebra1_+7"), None);
        assert_eq!(spaced.sequence_in("GR_9_Algebra1_"), None);
    }

    #[test]
    fn test_sequence_of() {
        assert_eq!(sequence_of("GR_9_Algebra1_000042"), Some(42));
        assert_eq!(sequence_of("GR_12_AP Physics_000100"), Some(100));
        assert_eq!(sequence_of("legacy-id"), None);
        assert_eq!(sequence_of(""), None);
    }

    #[test]
    fn test_difficulty_serde() {
        let d: Difficulty = serde_json::from_str("\"Advanced\"").unwrap();
        assert_eq!(d, Difficulty::Advanced);
        assert!(serde_json::from_str::<Difficulty>("\"hard\"").is_err());
    }
}
