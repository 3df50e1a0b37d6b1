pub mod discovery;
pub mod installer;
pub mod invoker;
pub mod launcher;
pub mod precheck;

pub use crate::domain::model::{
    FlowKind, Interpreter, Invocation, LaunchReport, LaunchState, RunOutcome, StepRecord,
};
pub use crate::domain::ports::ProcessRunner;
pub use crate::utils::error::Result;
