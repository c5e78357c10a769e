pub mod exam_session;
pub mod progression;
pub mod session_ctx;

pub use exam_session::{load_exam, word_count, ExamSession, LoadedExam, ModuleCarryover};
pub use progression::{ModuleTransition, ProgressionCoordinator, SubmissionOutcome};
pub use session_ctx::SessionCtx;
