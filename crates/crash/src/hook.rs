use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::{
    panic::{self, PanicHookInfo},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};
use tracing::{debug, warn};

use crate::{report::CrashReport, sink::CrashSink};

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

lazy_static! {
    // Ids of the registrations currently installed, innermost last.
    static ref INSTALLED: Mutex<Vec<u64>> = Mutex::new(Vec::new());
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-wide panic hook that reports every panic to a [`CrashSink`]
/// and then runs the hook that was installed before it.
///
/// Dropping the registration uninstalls it. If another hook was installed on
/// top in the meantime, that hook is left in place and this one only stops
/// capturing.
pub struct FailureHookRegistration {
    id: u64,
    active: Arc<AtomicBool>,
    previous: Arc<PanicHook>,
    sink: Arc<CrashSink>,
}

impl FailureHookRegistration {
    pub fn install(sink: Arc<CrashSink>) -> Self {
        let mut installed = INSTALLED.lock();

        let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
        let active = Arc::new(AtomicBool::new(true));
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let hook_sink = sink.clone();
        let hook_active = active.clone();
        let hook_previous = previous.clone();
        panic::set_hook(Box::new(move |info| {
            if hook_active.load(Ordering::Acquire) {
                hook_sink.capture(&CrashReport::from_panic(info));
            }
            hook_previous(info);
        }));

        installed.push(id);
        debug!(id, "failure hook installed");
        Self {
            id,
            active,
            previous,
            sink,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub const fn sink(&self) -> &Arc<CrashSink> {
        &self.sink
    }

    /// Stops capturing and restores the previous hook when this one is still
    /// the innermost. Later calls do nothing.
    pub fn uninstall(&self) {
        let mut installed = INSTALLED.lock();
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let innermost = installed.last() == Some(&self.id);
        installed.retain(|id| *id != self.id);

        // The hook cannot be swapped while this thread is unwinding.
        if innermost && !thread::panicking() {
            let previous = self.previous.clone();
            panic::set_hook(Box::new(move |info| previous(info)));
            debug!(id = self.id, "failure hook uninstalled");
        } else {
            warn!(id = self.id, "failure hook left in place, capture disabled");
        }
    }
}

impl Drop for FailureHookRegistration {
    fn drop(&mut self) {
        self.uninstall();
    }
}
