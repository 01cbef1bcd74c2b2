use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::TailerError;

/// Receiver of events produced by a `Tailer`
///
/// All methods are called synchronously from the thread running `Tailer::run`, so a slow listener
/// delays tailing. Every method has an empty default body, implement only what you need.
pub trait TailerListener {
    /// Called once when `run` starts. The handle may be kept to stop the tailer later.
    fn on_init(&mut self, _handle: &TailerHandle) {}

    /// Tailed path does not exist. Called when the file is first found missing, not on every poll.
    fn on_file_not_found(&mut self) {}

    /// File was truncated or replaced, reading starts over.
    fn on_file_rotated(&mut self) {}

    /// A complete line without its terminator.
    fn on_new_line(&mut self, line: String);

    /// Recoverable error while polling, tailer keeps running.
    fn on_error(&mut self, _error: TailerError) {}
}

impl<L: TailerListener + ?Sized> TailerListener for &mut L {
    fn on_init(&mut self, handle: &TailerHandle) {
        (**self).on_init(handle)
    }

    fn on_file_not_found(&mut self) {
        (**self).on_file_not_found()
    }

    fn on_file_rotated(&mut self) {
        (**self).on_file_rotated()
    }

    fn on_new_line(&mut self, line: String) {
        (**self).on_new_line(line)
    }

    fn on_error(&mut self, error: TailerError) {
        (**self).on_error(error)
    }
}

impl<L: TailerListener + ?Sized> TailerListener for Box<L> {
    fn on_init(&mut self, handle: &TailerHandle) {
        (**self).on_init(handle)
    }

    fn on_file_not_found(&mut self) {
        (**self).on_file_not_found()
    }

    fn on_file_rotated(&mut self) {
        (**self).on_file_rotated()
    }

    fn on_new_line(&mut self, line: String) {
        (**self).on_new_line(line)
    }

    fn on_error(&mut self, error: TailerError) {
        (**self).on_error(error)
    }
}

/// Cloneable handle that can stop a running `Tailer` from any thread.
#[derive(Clone, Debug)]
pub struct TailerHandle {
    path: Arc<PathBuf>,
    stopped: Arc<AtomicBool>,
}

impl TailerHandle {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask tailer to exit at the next poll boundary. Does not wait for it.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Path watched by the tailer this handle belongs to
    pub fn path(&self) -> &Path {
        &self.path
    }
}
