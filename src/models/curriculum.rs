use serde::{Deserialize, Serialize};

use super::grade::Grade;

/// 课程标准记录，按 (年级, 科目) 索引，只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumRecord {
    pub grade: Grade,
    pub subject: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// 课程标准种子文件
///
/// ```toml
/// [[curriculum]]
/// grade = "9"
/// subject = "Algebra 1"
/// reference = "CCSS HSA-APR.A.1"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurriculumFile {
    #[serde(default)]
    pub curriculum: Vec<CurriculumRecord>,
}
