//! 单元测试用的模型替身

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::services::LanguageModel;

/// 按顺序返回预设回复的模型，并记录收到的用户消息
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的用户消息
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn send_to_llm(&self, user_message: &str, _system: Option<&str>) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(user_message.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::ApiCallFailed {
                model: "scripted-model".to_string(),
                message: "no scripted response left".to_string(),
            })
    }
}
