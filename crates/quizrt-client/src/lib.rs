//! quizrt-client: Backend integrations.
//!
//! Implements the `QuizBackend` trait over the assessment server's REST API,
//! loads client configuration, and provides a scripted in-memory backend
//! for tests and offline runs.

pub mod config;
pub mod http;
pub mod mock;

pub use config::{create_backend, load_config_from, QuizrtConfig};
pub use http::HttpBackend;
pub use mock::{MockBackend, MockSubmit};
