//! 出题流程上下文
//!
//! 封装"我正在处理第几个出题请求"这一信息

use std::fmt::Display;

/// 出题流程上下文
#[derive(Debug, Clone)]
pub struct FlowCtx {
    /// 请求索引（从1开始，仅用于日志显示）
    pub flow_index: usize,

    /// 用户原始输入
    pub user_input: String,
}

impl FlowCtx {
    /// 创建新的流程上下文
    pub fn new(flow_index: usize, user_input: impl Into<String>) -> Self {
        Self {
            flow_index,
            user_input: user_input.into(),
        }
    }
}

impl Display for FlowCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[流程 {}]", self.flow_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ctx = FlowCtx::new(3, "two algebra questions");
        assert_eq!(ctx.to_string(), "[流程 3]");
        assert_eq!(ctx.user_input, "two algebra questions");
    }
}
