pub mod answer;
pub mod exam;
pub mod lenient;
pub mod loaders;
pub mod module;
pub mod question;

pub use answer::{AnswerValue, QuestionId, QuestionStatus, Status};
pub use exam::{
    ExamData, ExamResponse, FinishRequest, NestedAnswers, SecurityEvent, SecurityEventKind,
    SyncEnvelope, WritingResponses, WritingTask,
};
pub use loaders::load_exam_fixture;
pub use module::{ExamLocation, ExamModule};
pub use question::{BlockData, BlockType, DropZone, QuestionBlock, QuestionItem};
