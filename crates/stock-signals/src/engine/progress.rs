//! Progress events emitted while a run advances

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::model::Category;

/// Step text of the final event of a successful run
pub const COMPLETE_STEP: &str = "Complete";

/// One advisory step of a run
///
/// A run emits any number of events with `done == false` followed by exactly
/// one with `done == true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub symbol: String,
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub done: bool,
}

impl Progress {
    pub fn step(symbol: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            step: step.into(),
            category: None,
            done: false,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn complete(symbol: impl Into<String>) -> Self {
        Self {
            done: true,
            ..Self::step(symbol, COMPLETE_STEP)
        }
    }

    pub fn failed(symbol: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            done: true,
            ..Self::step(symbol, format!("error: {message}"))
        }
    }

    pub fn is_error(&self) -> bool {
        self.done && self.step.starts_with("error:")
    }
}

/// Sending half handed to a run
///
/// Sends never block and never fail the run; a closed receiver just means
/// nobody is listening any more.
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    tx: Option<UnboundedSender<Progress>>,
}

impl ProgressEmitter {
    /// Emitter that drops every event
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, UnboundedReceiver<Progress>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: Progress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Lazy, finite sequence of events from one spawned run
///
/// Dropping the stream aborts the run at its next suspension point. Rows
/// already persisted stay.
pub struct ProgressStream {
    rx: UnboundedReceiver<Progress>,
    task: JoinHandle<()>,
}

impl ProgressStream {
    pub(crate) fn new(rx: UnboundedReceiver<Progress>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }
}

impl Stream for ProgressStream {
    type Item = Progress;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
