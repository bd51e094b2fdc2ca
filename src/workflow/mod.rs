pub mod flow_ctx;
pub mod quiz_flow;

pub use flow_ctx::FlowCtx;
pub use quiz_flow::{FlowDeps, FlowReport, QuizFlow};
