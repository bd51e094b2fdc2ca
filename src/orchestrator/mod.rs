//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 批量出题处理器
//! - 管理应用生命周期（初始化、运行）
//! - 控制并发数量（Semaphore）
//! - 持有存储和模型连接
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<用户请求>)
//!     ↓
//! workflow::QuizFlow (处理单个请求)
//!     ↓
//! services (能力层：extract / generate / validate / persist)
//!     ↓
//! infrastructure (基础设施：MongoStore / MemoryStore)
//! ```
//!
//! 编排层只做调度和统计，不做具体业务判断

pub mod batch_processor;

pub use batch_processor::{App, ProcessingStats, RequestOutcome};
