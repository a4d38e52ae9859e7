use std::collections::VecDeque;

use futures::FutureExt;
use tracing::{error, trace, warn};

use crate::evaluate::evaluate;
use crate::installer::Installer;
use crate::readiness::ready;
use crate::scheduler::Unstarted;
use crate::tree::node::Node;

/// Anonymous entry points in the order they were queued, and whether a flush
/// has been deferred and not yet started
#[derive(Default)]
pub(crate) struct Queue {
  entries: VecDeque<Node>,
  pending: bool,
}
impl Queue {
  pub fn len(&self) -> usize { self.entries.len() }
}

/// Append an entry point. The first entry of an empty queue schedules a flush;
/// otherwise the entries ahead of it will.
pub(crate) fn enqueue(inst: &Installer, entry: Node) {
  let first = {
    let mut queue = inst.queue().borrow_mut();
    queue.entries.push_back(entry);
    queue.entries.len() == 1
  };
  if first {
    schedule_flush(inst);
  }
}

/// Defer a flush unless one is already pending
pub(crate) fn schedule_flush(inst: &Installer) {
  {
    let mut queue = inst.queue().borrow_mut();
    if queue.pending {
      return;
    }
    queue.pending = true;
  }
  let task = Unstarted::new(inst.clone(), flush_dropped);
  inst.config().defer.defer(
    async move {
      if let Some(inst) = task.start() {
        flush(&inst)
      }
    }
    .boxed_local(),
  );
}

/// A flush that never ran leaves the queue ready to schedule another
fn flush_dropped(inst: &Installer) {
  if let Ok(mut queue) = inst.queue().try_borrow_mut() {
    warn!(waiting = queue.entries.len(), "deferred flush dropped before it ran");
    queue.pending = false;
  }
}

/// Evaluate the head if it's ready, scheduling the next flush first so that a
/// failing entry doesn't stall the rest. An unready head blocks the queue
/// until the next install.
fn flush(inst: &Installer) {
  let head = {
    let mut queue = inst.queue().borrow_mut();
    queue.pending = false;
    queue.entries.front().cloned()
  };
  let Some(head) = head else { return };
  if !ready(inst, &head) {
    trace!(waiting = inst.queue().borrow().len(), "queue head not ready");
    return;
  }
  schedule_flush(inst);
  inst.queue().borrow_mut().entries.pop_front();
  trace!("running queued entry point");
  if let Err(e) = evaluate(inst, &head, head.parent().as_ref()) {
    error!(error = %e, "queued entry point failed");
    if let Some(on_error) = &inst.config().on_error {
      on_error(e);
    }
  }
}
