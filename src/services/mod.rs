pub mod answer_validator;
pub mod llm_service;
pub mod persistence_writer;
pub mod question_generator;
pub mod requirement_extractor;
pub mod structured_output;

pub use answer_validator::{AnswerValidator, Rejection, RejectionStage, Verdict};
pub use llm_service::{ask, LanguageModel, LlmService};
pub use persistence_writer::{BucketLocks, PersistedBatch, PersistenceWriter};
pub use question_generator::QuestionGenerator;
pub use requirement_extractor::RequirementExtractor;
pub use structured_output::{parse_model_output, ModelOutput, StructuredOutput};
