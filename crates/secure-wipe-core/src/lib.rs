pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod flood;
pub mod naming;
pub mod overwrite;
pub mod platform;
pub mod progress;
pub mod query;
pub mod rename;
pub mod report;
pub mod scanner;
pub mod validation;

pub use cancel::CancelToken;
pub use config::{EngineConfig, PassConfig};
pub use engine::{AlwaysConfirm, Confirmer, DeletionOrchestrator, RunState};
pub use error::{Error, FailureKind};
pub use flood::{FloodKind, FloodPlan, FloodReport, FloodSizing, StopReason};
pub use progress::{ProgressReporter, SilentReporter};
pub use query::{FixedQuery, QueryError, SystemQuery, UnavailableQuery};
pub use report::{RunOutcome, RunReport, Step, TargetFailure};
pub use validation::{ResidueCheck, ValidationHook, ValidationVerdict};
