//! Analysis orchestration
//!
//! A run moves through RESOLVING, FETCHING, one ANALYZING step per category
//! and SYNTHESIZING before it is DONE. Any state may end in FAILED.

pub mod analysis_engine;
pub mod progress;
pub mod state;

pub use analysis_engine::{AnalysisEngine, AnalysisEngineBuilder, FetchedPayloads, input_hash};
pub use progress::{Progress, ProgressEmitter, ProgressStream};
pub use state::{RunReport, RunState};
