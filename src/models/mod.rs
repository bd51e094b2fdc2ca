pub mod curriculum;
pub mod grade;
pub mod loaders;
pub mod question;
pub mod requirements;

pub use curriculum::{CurriculumFile, CurriculumRecord};
pub use grade::Grade;
pub use loaders::load_curriculum_toml;
pub use question::{CandidateQuestion, PersistedQuestion, QuestionBank, QuestionOption, QuestionType};
pub use requirements::{sequence_of, Bucket, Difficulty, StudentRequirements};
