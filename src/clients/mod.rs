pub mod exam_api;
pub mod exam_client;
pub mod in_memory;

pub use exam_api::ExamApi;
pub use exam_client::ExamClient;
pub use in_memory::InMemoryExamStore;
