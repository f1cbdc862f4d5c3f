//! Deferred execution handles
//!
//! Store and find operations with `_later` variants run on a spawned
//! worker thread and hand back a [`Deferred`] to await. Waiting re-raises
//! the worker's error; a worker panic is converted into
//! [`Error::Internal`] carrying the rendered panic payload instead of
//! propagating the unwind.

use crate::error::{Error, Result};
use std::any::Any;
use std::thread::{self, JoinHandle};

/// A handle to work running on a background thread
#[derive(Debug)]
pub struct Deferred<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Run `work` on a fresh thread
    pub fn spawn(work: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Deferred {
            handle: thread::spawn(work),
        }
    }

    /// Block until the worker finishes and take its result
    pub fn wait(self) -> Result<T> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => Err(Error::Internal {
                reason: panic_text(panic),
            }),
        }
    }

    /// Whether the worker has already finished
    pub fn is_done(&self) -> bool {
        self.handle.is_finished()
    }
}

fn panic_text(panic: Box<dyn Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "worker panicked".to_string()
    }
}
