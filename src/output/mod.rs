//! Progress rendering and output file writing

pub mod progress;
pub mod writer;

pub use progress::{ConsoleProgress, JsonProgress, ProgressReporter};
pub use writer::OutputWriter;
