//! # Lumi Quiz
//!
//! 面向初高中 STEM 学科的出题流程：从一句自然语言请求生成经过校验的题目并保存到题库
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有数据库连接，只暴露能力
//! - `CurriculumLookup` - 按 (年级, 科目) 查询课程标准
//! - `QuestionStore` - 查询最大序号、逐条写入题目
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `RequirementExtractor` - 自由文本 → 学生需求
//! - `QuestionGenerator` - 学生需求 → 候选题目
//! - `AnswerValidator` - 格式检查 + 审核模型逻辑检查
//! - `PersistenceWriter` - 分配题目ID并保存
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次出题请求"的完整处理流程
//! - `FlowCtx` - 上下文封装
//! - `QuizFlow` - 流程编排（提取 → 生成 ⇄ 校验 → 保存）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量请求处理器，管理连接和并发
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型
pub use config::{Config, StoreBackend};
pub use error::{FlowError, FlowResult};
pub use models::{Bucket, CandidateQuestion, Grade, StudentRequirements};
pub use orchestrator::App;
pub use workflow::{FlowCtx, FlowDeps, FlowReport, QuizFlow};
