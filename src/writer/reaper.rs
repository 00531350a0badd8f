use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::writer::registry::WriterRegistry;

/// Outcome of one idle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
  /// Writers found idle (closed now or already closed).
  pub idle: usize,
  /// Writers removed from the registry.
  pub evicted: usize,
  /// Writers whose close failed. The failure is logged.
  pub failed: usize,
}

/// Closes and evicts every writer idle for at least `idle_timeout`.
///
/// Busy writers are skipped rather than waited for. A failure on one entry
/// is logged and the sweep moves on.
pub(crate) fn sweep(registry: &WriterRegistry, idle_timeout: Duration) -> SweepStats {
  let mut stats = SweepStats::default();

  for (key, writer) in registry.snapshot() {
    let idle = match writer.close_if_idle(idle_timeout) {
      Ok(idle) => idle,
      Err(e) => {
        error!(target: "ironsink::reaper", "Failed to close idle writer for partition {}: {}", key, e);
        stats.failed += 1;
        true
      }
    };
    if !idle {
      continue;
    }
    stats.idle += 1;

    if registry.remove_if(&key, |w| w.retire_if_idle(idle_timeout)) {
      debug!(target: "ironsink::reaper", "Evicted idle writer for partition {}", key);
      stats.evicted += 1;
    }
  }
  stats
}

/// Background thread running `sweep` every `interval` until stopped.
pub(crate) struct IdleReaper {
  stop: Arc<(Mutex<bool>, Condvar)>,
  handle: Option<JoinHandle<()>>,
}

impl IdleReaper {
  pub fn spawn(registry: Arc<WriterRegistry>, idle_timeout: Duration, interval: Duration) -> Result<Self> {
    let stop = Arc::new((Mutex::new(false), Condvar::new()));
    let signal = stop.clone();

    let handle = thread::Builder::new()
      .name("ironsink-reaper".into())
      .spawn(move || {
        let (lock, cvar) = &*signal;
        let mut stopped = lock.lock();
        while !*stopped {
          cvar.wait_for(&mut stopped, interval);
          if *stopped {
            break;
          }
          MutexGuard::unlocked(&mut stopped, || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| sweep(&registry, idle_timeout)));
            match result {
              Ok(stats) if stats.evicted > 0 || stats.failed > 0 => {
                info!(
                  target: "ironsink::reaper",
                  "Idle sweep evicted {} writer(s), {} failure(s), {} still open",
                  stats.evicted,
                  stats.failed,
                  registry.len()
                );
              }
              Ok(_) => {}
              Err(_) => error!(target: "ironsink::reaper", "Idle sweep panicked; continuing"),
            }
          });
        }
      })?;

    info!(
      target: "ironsink::reaper",
      "Idle reaper started (timeout {:?}, interval {:?})",
      idle_timeout, interval
    );
    Ok(Self {
      stop,
      handle: Some(handle),
    })
  }

  /// Signals the thread and waits for the current sweep to finish.
  pub fn stop(&mut self) {
    let (lock, cvar) = &*self.stop;
    *lock.lock() = true;
    cvar.notify_all();

    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        error!(target: "ironsink::reaper", "Idle reaper thread panicked");
      }
      info!(target: "ironsink::reaper", "Idle reaper stopped");
    }
  }
}

impl Drop for IdleReaper {
  fn drop(&mut self) {
    self.stop();
  }
}
