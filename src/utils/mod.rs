pub mod logging;

pub use logging::{format_clock, init_log_file, init_tracing, truncate_text};
