//! Three-process transfer tests: link simulator, receiver, sender.

pub mod inputs;
pub mod orchestrator;
pub mod scenario;
pub mod variants;

pub use inputs::{InputFiles, InputKind};
pub use orchestrator::{Timings, Transfer};
pub use scenario::*;
pub use variants::*;
