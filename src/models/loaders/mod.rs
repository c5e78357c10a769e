pub mod fixture_loader;

pub use fixture_loader::load_exam_fixture;
