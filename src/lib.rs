// Library interface for siftlog
// Exposes the pipeline stages for the binary, tests and embedding applications

pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod producer;
pub mod splitter;
pub mod store;

pub use error::{PipelineError, Result};
