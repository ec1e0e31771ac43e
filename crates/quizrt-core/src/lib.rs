//! quizrt-core: Quiz attempt runtime.
//!
//! This crate holds the data model, backend trait, and the client-side
//! machinery of one quiz attempt: countdown, draft answers, submission
//! dispatch, evaluation polling, and the session state machine that ties
//! them together.

pub mod answer_cache;
pub mod dispatcher;
pub mod error;
pub mod feedback;
pub mod model;
pub mod poller;
pub mod runner;
pub mod script;
pub mod session;
pub mod timer;
pub mod traits;
