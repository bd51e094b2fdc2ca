//! 结构化输出
//!
//! 模型输出的结构约束是显式的 serde 数据定义，每次调用后本地校验。
//! 校验失败不抛错，而是返回 `ModelOutput::Retry`，由调用方决定是否重试

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

/// 模型输出的结构约束
pub trait StructuredOutput: DeserializeOwned {
    /// 反序列化之后的语义校验
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 一次模型输出的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutput<T> {
    /// 符合约束
    Valid(T),
    /// 不符合约束，附带反馈给模型的原因
    Retry(String),
}

/// 解析并校验模型输出
pub fn parse_model_output<T: StructuredOutput>(raw: &str) -> ModelOutput<T> {
    let json = extract_json(raw);
    if json.is_empty() {
        return ModelOutput::Retry("response did not contain a JSON object".to_string());
    }

    let value: T = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => return ModelOutput::Retry(format!("response is not valid against the schema: {}", e)),
    };

    match value.check() {
        Ok(()) => ModelOutput::Valid(value),
        Err(reason) => ModelOutput::Retry(reason),
    }
}

fn fenced_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").ok())
        .as_ref()
}

/// 从模型回复中取出 JSON 文本
///
/// 优先取 ``` 代码块内容，否则取第一个 `{` 到最后一个 `}` 之间的内容
pub fn extract_json(raw: &str) -> &str {
    let raw = raw.trim();

    if let Some(inner) = fenced_block_regex()
        .and_then(|re| re.captures(raw))
        .and_then(|cap| cap.get(1))
    {
        return inner.as_str().trim();
    }

    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => "",
    }
}
