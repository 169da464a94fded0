//! Dialog state machine and dialog cache
//!
//! A dialog models one correlated asynchronous signalling exchange. The
//! cache tracks live dialogs by id and periodically sweeps expired ones:
//! terminal dialogs are evicted, stalled ones are escalated one step at
//! a time.

use crate::gateway::MapGateway;
use crate::transport::{DialogId, Primitive, TransportEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sgw_appconn::scheduler::{self, TimerHandle};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const TIME_10S: Duration = Duration::from_secs(10);
pub const TIME_20S: Duration = Duration::from_secs(20);
pub const TIME_60S: Duration = Duration::from_secs(60);
pub const TIME_120S: Duration = Duration::from_secs(120);

/// Default dialog expiry
pub const DEFAULT_EXPIRY: Duration = TIME_60S;

/// Cache sweep period
pub const CHECK_PERIOD: Duration = Duration::from_secs(16);

/// Dialog lifecycle states. `Close1` and `Abort1` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    New,
    Open,
    WOpen,
    Invoke,
    WInvoke,
    Close0,
    Close1,
    WClose0,
    WClose1,
    Abort0,
    Abort1,
}

/// Identity, state and expiry shared by every dialog flavor.
pub struct DialogCore {
    dialog_id: AtomicU32,
    invoke_id: AtomicI32,
    state: Mutex<DialogState>,
    deadline: Mutex<Instant>,
}

impl DialogCore {
    pub fn new() -> DialogCore {
        DialogCore::with_expiry(DEFAULT_EXPIRY)
    }

    pub fn with_expiry(expiry: Duration) -> DialogCore {
        DialogCore {
            dialog_id: AtomicU32::new(0),
            invoke_id: AtomicI32::new(0),
            state: Mutex::new(DialogState::New),
            deadline: Mutex::new(Instant::now() + expiry),
        }
    }

    pub fn dialog_id(&self) -> DialogId {
        self.dialog_id.load(Ordering::SeqCst)
    }

    pub fn set_dialog_id(&self, dialog_id: DialogId) {
        self.dialog_id.store(dialog_id, Ordering::SeqCst);
    }

    pub fn invoke_id(&self) -> i32 {
        self.invoke_id.load(Ordering::SeqCst)
    }

    pub fn set_invoke_id(&self, invoke_id: i32) {
        self.invoke_id.store(invoke_id, Ordering::SeqCst);
    }

    pub fn state(&self) -> DialogState {
        *self.state.lock()
    }

    /// Requests a state transition. Once the dialog is closing or
    /// aborting, every transition is ignored except the matching stage-1
    /// advance; completion logic depends on late transitions being
    /// droppable here.
    pub fn set_state(&self, next: DialogState) {
        let mut state = self.state.lock();
        let accepted = match *state {
            DialogState::Close0 => next == DialogState::Close1,
            DialogState::Abort0 => next == DialogState::Abort1,
            DialogState::Close1 | DialogState::Abort1 => false,
            _ => true,
        };
        if accepted {
            *state = next;
        }
    }

    pub fn deadline(&self) -> Instant {
        *self.deadline.lock()
    }

    pub fn set_deadline(&self, deadline: Instant) {
        *self.deadline.lock() = deadline;
    }
}

impl Default for DialogCore {
    fn default() -> Self {
        DialogCore::new()
    }
}

/// One asynchronous signalling exchange. Flavors differ only in what
/// triggers `init`, the payload they extract from transport events and
/// what they forward to the application layer.
#[async_trait]
pub trait Dialog: Send + Sync + 'static {
    fn core(&self) -> &DialogCore;

    /// Starts the dialog; application-initiated flavors emit their
    /// opening block sequence here.
    fn init(self: Arc<Self>);

    /// One escalation step, applied by the sweep once the expiry passed.
    fn check(self: Arc<Self>);

    /// Advances the state machine on one transport event.
    fn handle_event(self: Arc<Self>, event: TransportEvent);

    /// Forwards to the application layer; runs on the worker pool.
    async fn run(self: Arc<Self>);
}

/// The escalation ladder shared by all flavors: one step per sweep,
/// never jumping states.
pub fn escalate(dialog: Arc<dyn Dialog>, gateway: &MapGateway) {
    let core = dialog.core();
    match core.state() {
        DialogState::WInvoke => core.set_state(DialogState::WClose0),
        DialogState::Close0 => core.set_state(DialogState::Close1),
        DialogState::WClose0 => core.set_state(DialogState::WClose1),
        DialogState::WClose1 => gateway.push(dialog.clone(), Primitive::UserAbort),
        DialogState::Abort0 => core.set_state(DialogState::Abort1),
        _ => {}
    }
}

/// Live dialogs keyed by dialog id, with the expiry sweep.
pub struct DialogCache {
    dialogs: DashMap<DialogId, Arc<dyn Dialog>>,
    check_timer: Mutex<Option<TimerHandle>>,
}

impl DialogCache {
    pub fn new() -> Arc<DialogCache> {
        let cache = Arc::new(DialogCache {
            dialogs: DashMap::new(),
            check_timer: Mutex::new(None),
        });
        let weak = Arc::downgrade(&cache);
        let handle = scheduler::schedule_at_fixed_rate(CHECK_PERIOD, CHECK_PERIOD, move || {
            let weak = weak.clone();
            async move {
                if let Some(cache) = weak.upgrade() {
                    cache.check();
                }
            }
        });
        *cache.check_timer.lock() = Some(handle);
        cache
    }

    pub fn get(&self, dialog_id: DialogId) -> Option<Arc<dyn Dialog>> {
        self.dialogs.get(&dialog_id).map(|entry| entry.clone())
    }

    /// Inserts a dialog under its current id, replacing any previous one.
    pub fn put(&self, dialog: Arc<dyn Dialog>) {
        self.dialogs.insert(dialog.core().dialog_id(), dialog);
    }

    pub fn remove(&self, dialog_id: DialogId) {
        self.dialogs.remove(&dialog_id);
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// Sweeps expired dialogs: terminal ones are evicted, the rest get
    /// one escalation step and a fresh short deadline. Iterates over a
    /// snapshot so slow work never runs under the table lock.
    pub fn check(&self) {
        let now = Instant::now();
        let snapshot: Vec<(DialogId, Arc<dyn Dialog>)> = self
            .dialogs
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (dialog_id, dialog) in snapshot {
            if dialog.core().deadline() >= now {
                continue;
            }
            match dialog.core().state() {
                DialogState::Close1 | DialogState::Abort1 => {
                    debug!(dialog_id, "evicting terminal dialog");
                    self.remove(dialog_id);
                }
                _ => {
                    dialog.core().set_deadline(now + TIME_10S);
                    dialog.check();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_before_closing_are_free() {
        let core = DialogCore::new();
        assert_eq!(core.state(), DialogState::New);
        core.set_state(DialogState::WInvoke);
        assert_eq!(core.state(), DialogState::WInvoke);
        core.set_state(DialogState::Invoke);
        assert_eq!(core.state(), DialogState::Invoke);
    }

    #[test]
    fn test_closing_only_accepts_stage_one_advance() {
        let core = DialogCore::new();
        core.set_state(DialogState::Close0);
        core.set_state(DialogState::WInvoke);
        assert_eq!(core.state(), DialogState::Close0);
        core.set_state(DialogState::Abort1);
        assert_eq!(core.state(), DialogState::Close0);
        core.set_state(DialogState::Close1);
        assert_eq!(core.state(), DialogState::Close1);
    }

    #[test]
    fn test_aborting_only_accepts_stage_one_advance() {
        let core = DialogCore::new();
        core.set_state(DialogState::Abort0);
        core.set_state(DialogState::Close1);
        assert_eq!(core.state(), DialogState::Abort0);
        core.set_state(DialogState::Abort1);
        assert_eq!(core.state(), DialogState::Abort1);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let core = DialogCore::new();
        core.set_state(DialogState::Close0);
        core.set_state(DialogState::Close1);
        core.set_state(DialogState::WInvoke);
        assert_eq!(core.state(), DialogState::Close1);
    }
}
