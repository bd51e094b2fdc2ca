use thiserror::Error;

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 构建请求失败
    #[error("构建 LLM 请求失败 (模型: {model}): {message}")]
    RequestBuildFailed { model: String, message: String },

    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },

    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },

    /// 调用超时
    #[error("LLM 调用超时 (模型: {model}, {seconds}秒)")]
    Timeout { model: String, seconds: u64 },
}

/// 存储（题库 / 课程标准）错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 连接数据库失败
    #[error("无法连接到数据库 ({uri}): {message}")]
    ConnectionFailed { uri: String, message: String },

    /// 查询失败
    #[error("查询失败 ({collection}): {message}")]
    QueryFailed { collection: String, message: String },

    /// 写入失败
    #[error("写入失败 ({collection}): {message}")]
    InsertFailed { collection: String, message: String },

    /// 题目ID重复（唯一索引冲突）
    #[error("题目ID重复: {question_id}")]
    DuplicateId { question_id: String },

    /// 操作超时
    #[error("数据库操作超时 ({operation}, {seconds}秒)")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

/// 需求提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// 无法提取必需字段，需要用户补充信息
    #[error("需要用户补充信息: {question}")]
    NeedsClarification { question: String },

    /// 模型多次输出均不符合结构约束
    #[error("需求提取输出无效 (已尝试 {attempts} 次): {reason}")]
    InvalidOutput { attempts: u32, reason: String },

    #[error(transparent)]
    Llm(#[from] LlmError),

    /// 课程标准查询失败
    #[error("课程标准查询失败: {0}")]
    Curriculum(#[source] StoreError),
}

/// 题目生成错误
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 模型多次输出均不符合题目结构约束
    #[error("题目生成输出无效 (已尝试 {attempts} 次): {reason}")]
    InvalidOutput { attempts: u32, reason: String },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// 题目校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 超过最大重试次数仍未通过校验
    #[error("校验未通过 (已重新生成 {retries} 次): {last_reason}")]
    RetriesExhausted { retries: u32, last_reason: String },

    /// 审核模型调用失败
    #[error("审核模型调用失败: {0}")]
    Review(#[source] LlmError),
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// 查询最大序号失败
    #[error("查询最大序号失败: {0}")]
    Sequence(#[source] StoreError),

    /// 序号已到上限，无法为本批分配ID
    #[error("题目序号已用尽 ({prefix}, 当前最大序号 {max})")]
    SequenceExhausted { prefix: String, max: u64 },

    /// 写入中途失败，已写入的前缀不会回滚
    #[error("第 {failed_index} 题写入失败 (已写入 {} 题): {source}", .persisted.len())]
    Partial {
        persisted: Vec<String>,
        failed_index: usize,
        #[source]
        source: StoreError,
    },
}

/// 单次流程的终止错误
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("需求提取失败: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("题目生成失败: {0}")]
    Generation(#[from] GenerationError),

    #[error("题目校验失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("题目保存失败: {0}")]
    Persistence(#[from] PersistenceError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },

    /// 取值不合法
    #[error("配置项 {name} 取值不合法: {value}")]
    InvalidValue { name: String, value: String },
}

impl FlowError {
    /// 是否为需要用户补充信息的情况
    pub fn is_clarification(&self) -> bool {
        matches!(
            self,
            FlowError::Extraction(ExtractionError::NeedsClarification { .. })
        )
    }
}

/// 流程结果类型
pub type FlowResult<T> = Result<T, FlowError>;
