//! Run states and the report of a finished run

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Category, Market, SignalResult, Synthesis};
use crate::sources::SourceRole;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "category")]
pub enum RunState {
    Resolving,
    Fetching,
    Analyzing(Category),
    Synthesizing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Move to FAILED, returning the state the run failed in
    pub fn fail(&mut self) -> RunState {
        std::mem::replace(self, Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolving => f.write_str("RESOLVING"),
            Self::Fetching => f.write_str("FETCHING"),
            Self::Analyzing(category) => write!(f, "ANALYZING({category})"),
            Self::Synthesizing => f.write_str("SYNTHESIZING"),
            Self::Done => f.write_str("DONE"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// Everything a successful run persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub symbol: String,
    /// Symbol the sources were queried with
    pub trading_symbol: String,
    pub market: Market,
    /// In analysis order
    pub signals: Vec<SignalResult>,
    pub synthesis: Synthesis,
    /// Sources that failed and were replaced by an empty payload
    pub degraded_sources: Vec<SourceRole>,
}

impl RunReport {
    pub fn signal(&self, category: Category) -> Option<&SignalResult> {
        self.signals.iter().find(|s| s.category == category)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty()
    }
}
