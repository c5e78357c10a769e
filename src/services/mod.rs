pub mod answer_store;
pub mod catalog_normalizer;
pub mod exam_timer;
pub mod sync_service;

pub use answer_store::{
    flatten_answers, flatten_saved_answers, nest_answers, AnswerStore, FlatAnswers,
};
pub use catalog_normalizer::{CatalogNormalizer, CatalogSection, QuestionCatalog};
pub use exam_timer::{ClockTick, ExamClock, ListeningPhase, ListeningPhaseMachine};
pub use sync_service::SyncService;
