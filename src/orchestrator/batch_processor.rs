//! 批量出题处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量出题请求的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：连接题库、创建模型客户端（日志文件在 `run` 开始时创建）
//! 2. **并发控制**：使用 Semaphore 限制同时运行的流程数量
//! 3. **资源管理**：持有存储和模型连接，以 `Arc` 共享给所有流程
//! 4. **全局统计**：汇总所有请求的处理结果
//! 5. **连通性检查**：ping 存储并向模型发送一条简单消息

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{Config, StoreBackend};
use crate::infrastructure::{bounded, CurriculumLookup, MemoryStore, MongoStore, QuestionStore};
use crate::models::load_curriculum_toml;
use crate::services::{ask, BucketLocks, LanguageModel, LlmService};
use crate::utils::logging;
use crate::workflow::{FlowCtx, FlowDeps, FlowReport, QuizFlow};

/// 应用主结构
pub struct App {
    config: Config,
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn QuestionStore>,
    flow: Arc<QuizFlow>,
}

/// 单个请求的处理结果
#[derive(Debug)]
pub struct RequestOutcome {
    pub flow_index: usize,
    pub result: std::result::Result<FlowReport, String>,
}

/// 处理统计
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    pub outcomes: Vec<RequestOutcome>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(config.max_concurrent_flows);

        let (curriculum, store) = connect_store(&config).await?;

        let model: Arc<dyn LanguageModel> = Arc::new(LlmService::new(&config));
        let reviewer: Arc<dyn LanguageModel> = match &config.llm_reviewer_model_name {
            Some(name) => Arc::new(LlmService::with_model(&config, name.clone())),
            None => model.clone(),
        };
        info!("🤖 出题模型: {} | 审核模型: {}", model.model_name(), config.reviewer_model_name());

        let deps = FlowDeps {
            model: model.clone(),
            reviewer: Some(reviewer),
            curriculum,
            store: store.clone(),
            locks: Arc::new(BucketLocks::new()),
        };

        Ok(Self::with_deps(config, deps, model, store))
    }

    /// 使用现成的依赖创建（测试和嵌入场景）
    pub fn with_deps(
        config: Config,
        deps: FlowDeps,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn QuestionStore>,
    ) -> Self {
        let flow = Arc::new(QuizFlow::new(&config, deps));
        Self {
            config,
            model,
            store,
            flow,
        }
    }

    /// 运行所有出题请求
    pub async fn run(&self, requests: Vec<String>) -> Result<ProcessingStats> {
        if requests.is_empty() {
            warn!("⚠️ 没有出题请求，程序结束");
            return Ok(ProcessingStats::default());
        }

        // 只有真正处理请求时才重建日志文件，连通性检查不覆盖上一次的日志
        logging::init_log_file(&self.config.output_log_file)?;
        logging::log_requests_loaded(requests.len(), self.config.max_concurrent_flows);

        let stats = self.process_all(requests).await?;

        logging::print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            &self.config.output_log_file,
        );

        Ok(stats)
    }

    /// 并发处理所有请求
    async fn process_all(&self, requests: Vec<String>) -> Result<ProcessingStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_flows));
        let mut stats = ProcessingStats {
            total: requests.len(),
            ..Default::default()
        };

        let mut handles = Vec::new();
        for (idx, request) in requests.into_iter().enumerate() {
            let ctx = FlowCtx::new(idx + 1, request);
            let permit = semaphore.clone().acquire_owned().await?;
            let flow = self.flow.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                flow.run(&ctx).await
            });
            handles.push((idx + 1, handle));
        }

        for (flow_index, handle) in handles {
            let result = match handle.await {
                Ok(Ok(report)) => {
                    info!("[流程 {}] {}", flow_index, report.summary());
                    stats.success += 1;
                    Ok(report)
                }
                Ok(Err(e)) if e.is_clarification() => {
                    warn!("[流程 {}] ❓ {}", flow_index, e);
                    stats.failed += 1;
                    Err(e.to_string())
                }
                Ok(Err(e)) => {
                    error!("[流程 {}] ❌ 处理过程中发生错误: {}", flow_index, e);
                    stats.failed += 1;
                    Err(e.to_string())
                }
                Err(e) => {
                    error!("[流程 {}] 任务执行失败: {}", flow_index, e);
                    stats.failed += 1;
                    Err(e.to_string())
                }
            };

            let line = match &result {
                Ok(report) => format!(
                    "[流程 {}] 成功: {}",
                    flow_index,
                    report.question_ids.join(", ")
                ),
                Err(reason) => format!("[流程 {}] 失败: {}", flow_index, reason),
            };
            if let Err(e) = logging::append_log_line(&self.config.output_log_file, &line) {
                warn!("写入日志文件失败: {}", e);
            }

            stats.outcomes.push(RequestOutcome { flow_index, result });
        }

        Ok(stats)
    }

    /// 检查存储和模型的连通性
    pub async fn check_connections(&self) -> Result<()> {
        info!("🔌 正在检查存储连接...");
        bounded("store.ping", self.config.db_timeout(), self.store.ping())
            .await
            .context("存储连接检查失败")?;
        info!("✓ 存储连接正常");

        info!("🔌 正在检查模型连接 ({})...", self.model.model_name());
        let reply = ask(
            self.model.as_ref(),
            "Reply with the single word: pong",
            None,
            self.config.llm_timeout(),
        )
        .await
        .context("模型连接检查失败")?;
        info!("✓ 模型连接正常，回复: {}", logging::truncate_text(&reply, 40));

        Ok(())
    }
}

/// 按配置创建存储
async fn connect_store(
    config: &Config,
) -> Result<(Arc<dyn CurriculumLookup>, Arc<dyn QuestionStore>)> {
    match config.store_backend {
        StoreBackend::Mongo => {
            info!("🗄️ 正在连接 MongoDB: {}", config.mongo_database);
            let store = Arc::new(MongoStore::connect(config).await?);
            info!("✓ MongoDB 连接成功");
            let curriculum: Arc<dyn CurriculumLookup> = store.clone();
            let questions: Arc<dyn QuestionStore> = store;
            Ok((curriculum, questions))
        }
        StoreBackend::Memory => {
            let records = match &config.curriculum_seed_file {
                Some(path) => load_curriculum_toml(Path::new(path)).await?,
                None => Vec::new(),
            };
            info!("🗄️ 使用内存存储 (课程标准 {} 条)", records.len());
            let store = Arc::new(MemoryStore::with_curriculum(records));
            let curriculum: Arc<dyn CurriculumLookup> = store.clone();
            let questions: Arc<dyn QuestionStore> = store;
            Ok((curriculum, questions))
        }
    }
}
