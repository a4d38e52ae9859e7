//! Deferring work to a later turn, and the queue of entry points waiting for
//! their dependencies
mod queue;

use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use tracing::error;

pub(crate) use queue::{enqueue, schedule_flush, Queue};

use crate::installer::Installer;

/// The primitive that runs work on a later turn of the host's event loop.
/// Deferred work must never run inside the call that deferred it.
pub trait Defer {
  /// Run the task after the current call stack has unwound
  fn defer(&self, task: LocalBoxFuture<'static, ()>);
}

impl Defer for LocalSpawner {
  fn defer(&self, task: LocalBoxFuture<'static, ()>) {
    if let Err(e) = self.spawn_local(task) {
      error!(error = %e, "executor refused deferred work");
    }
  }
}

/// Bookkeeping for deferred work that hasn't started. A task that is dropped
/// without running, for instance because the executor refused it, calls
/// `on_drop` so that the flags and waiters it owned are released.
pub(crate) struct Unstarted {
  inst: Option<Installer>,
  on_drop: fn(&Installer),
}
impl Unstarted {
  pub fn new(inst: Installer, on_drop: fn(&Installer)) -> Self { Self { inst: Some(inst), on_drop } }

  /// Mark the task as running
  pub fn start(mut self) -> Option<Installer> { self.inst.take() }
}
impl Drop for Unstarted {
  fn drop(&mut self) {
    if let Some(inst) = self.inst.take() {
      (self.on_drop)(&inst)
    }
  }
}

/// Spawner closures in the shape host event loops usually expose
impl Defer for Rc<dyn Fn(LocalBoxFuture<'static, ()>)> {
  fn defer(&self, task: LocalBoxFuture<'static, ()>) { self(task) }
}
