//! Classification-to-playback dispatch pipeline

pub mod admission;
pub mod classifier;
pub mod dispatcher;
pub mod pool;

pub use admission::{Admission, AdmissionGate, CompletionToken, TaskId};
pub use classifier::{Classifier, Direction, ToneMap, PROTOCOL_PRECEDENCE};
pub use dispatcher::{DispatchLimits, DispatchStats, Dispatcher, Offer, ShutdownReport, StatsSnapshot};
pub use pool::WorkerPool;
