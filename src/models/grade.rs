use serde::{Deserialize, Serialize};

/// 年级枚举
///
/// 序列化为年级数字字符串（"6" ~ "12"），其他年级统一为 "99"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "6")]
    Sixth,
    #[serde(rename = "7")]
    Seventh,
    #[serde(rename = "8")]
    Eighth,
    #[serde(rename = "9")]
    Ninth,
    #[serde(rename = "10")]
    Tenth,
    #[serde(rename = "11")]
    Eleventh,
    #[serde(rename = "12")]
    Twelfth,
    #[serde(rename = "99")]
    Others,
}

impl Grade {
    /// 获取年级代码（用于题目ID和数据库过滤）
    pub fn code(self) -> &'static str {
        match self {
            Grade::Sixth => "6",
            Grade::Seventh => "7",
            Grade::Eighth => "8",
            Grade::Ninth => "9",
            Grade::Tenth => "10",
            Grade::Eleventh => "11",
            Grade::Twelfth => "12",
            Grade::Others => "99",
        }
    }

    /// 从代码解析年级
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "6" => Some(Grade::Sixth),
            "7" => Some(Grade::Seventh),
            "8" => Some(Grade::Eighth),
            "9" => Some(Grade::Ninth),
            "10" => Some(Grade::Tenth),
            "11" => Some(Grade::Eleventh),
            "12" => Some(Grade::Twelfth),
            "99" => Some(Grade::Others),
            _ => None,
        }
    }

    /// 全部年级代码（用于提示词中的枚举说明）
    pub fn all_codes() -> [&'static str; 8] {
        ["6", "7", "8", "9", "10", "11", "12", "99"]
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
