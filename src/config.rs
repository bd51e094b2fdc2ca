use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 题库存储后端
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// MongoDB
    Mongo,
    /// 进程内存（试运行）
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时运行的出题流程数量
    pub max_concurrent_flows: usize,
    /// 存储后端
    pub store_backend: StoreBackend,
    // --- MongoDB 配置 ---
    pub mongo_uri: String,
    pub mongo_database: String,
    pub questions_collection: String,
    pub curriculum_collection: String,
    /// 内存后端的课程标准种子文件（TOML）
    pub curriculum_seed_file: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 审核模型，未设置时与出题模型相同
    pub llm_reviewer_model_name: Option<String>,
    /// 模型输出不符合结构约束时的重试次数
    pub llm_output_retries: u32,
    /// 校验未通过时重新生成的最大次数
    pub max_validation_retries: u32,
    /// 是否启用审核模型的逻辑检查
    pub enable_logic_review: bool,
    pub llm_timeout_secs: u64,
    pub db_timeout_secs: u64,
    // --- 题目记录 ---
    pub created_by: String,
    /// 保留空桶首题序号从 2 开始的历史行为
    pub legacy_sequence_offset: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_flows: 4,
            store_backend: StoreBackend::Mongo,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "lumi_db".to_string(),
            questions_collection: "questions".to_string(),
            curriculum_collection: "curriculum".to_string(),
            curriculum_seed_file: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-3-flash-preview".to_string(),
            llm_reviewer_model_name: None,
            llm_output_retries: 3,
            max_validation_retries: 3,
            enable_logic_review: true,
            llm_timeout_secs: 120,
            db_timeout_secs: 10,
            created_by: "lumi_agent".to_string(),
            legacy_sequence_offset: true,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        let config = Self {
            max_concurrent_flows: env_parse("MAX_CONCURRENT_FLOWS", "usize", default.max_concurrent_flows)?,
            store_backend: env_parse("STORE_BACKEND", "mongo|memory", default.store_backend)?,
            mongo_uri: std::env::var("MONGO_URI").unwrap_or(default.mongo_uri),
            mongo_database: std::env::var("MONGO_DATABASE").unwrap_or(default.mongo_database),
            questions_collection: std::env::var("QUESTIONS_COLLECTION").unwrap_or(default.questions_collection),
            curriculum_collection: std::env::var("CURRICULUM_COLLECTION").unwrap_or(default.curriculum_collection),
            curriculum_seed_file: std::env::var("CURRICULUM_SEED_FILE").ok().or(default.curriculum_seed_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_reviewer_model_name: std::env::var("LLM_REVIEWER_MODEL_NAME").ok().or(default.llm_reviewer_model_name),
            llm_output_retries: env_parse("LLM_OUTPUT_RETRIES", "u32", default.llm_output_retries)?,
            max_validation_retries: env_parse("MAX_VALIDATION_RETRIES", "u32", default.max_validation_retries)?,
            enable_logic_review: env_parse("ENABLE_LOGIC_REVIEW", "bool", default.enable_logic_review)?,
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", "u64", default.llm_timeout_secs)?,
            db_timeout_secs: env_parse("DB_TIMEOUT_SECS", "u64", default.db_timeout_secs)?,
            created_by: std::env::var("CREATED_BY").unwrap_or(default.created_by),
            legacy_sequence_offset: env_parse("LEGACY_SEQUENCE_OFFSET", "bool", default.legacy_sequence_offset)?,
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool", default.verbose_logging)?,
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        };
        config.validate()?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_flows == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CONCURRENT_FLOWS".to_string(),
                value: "0".to_string(),
            });
        }
        if self.llm_timeout_secs == 0 || self.db_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "LLM_TIMEOUT_SECS / DB_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// 审核模型名称
    pub fn reviewer_model_name(&self) -> &str {
        self.llm_reviewer_model_name
            .as_deref()
            .unwrap_or(&self.llm_model_name)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }
}

/// 读取并解析环境变量，未设置时使用默认值，设置了但无法解析时报错
fn env_parse<T: FromStr>(var_name: &str, expected_type: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => parse_value(var_name, expected_type, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(var_name: &str, expected_type: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
        var_name: var_name.to_string(),
        value: value.to_string(),
        expected_type: expected_type.to_string(),
    })
}
