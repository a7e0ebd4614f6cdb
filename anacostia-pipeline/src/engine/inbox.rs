//! Signal inbox
//!
//! Each node owns one inbox mapping predecessor identity to the signal it
//! sent for the current run. Entries are monotone within a run: once a
//! predecessor's signal is recorded it is never overwritten until the next
//! run begins, which is what makes delivery idempotent by `(from, run_id)`.
//!
//! Signals that arrive before the node has observed the run boundary are
//! buffered keyed by run id and swapped in at `begin_run`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anacostia_core::domain::signal::{Signal, SignalKind};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Result of waiting for predecessor signals for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every predecessor signalled success
    AllSuccess,
    /// Every predecessor signalled, at least one failure or skip
    NotSuccess,
    /// The run deadline elapsed before the inbox was complete
    DeadlineElapsed,
}

#[derive(Default)]
struct InboxState {
    current_run: Option<i64>,
    signals: HashMap<String, Signal>,
    buffered: BTreeMap<i64, HashMap<String, Signal>>,
}

/// Per-node signal inbox
pub struct SignalInbox {
    state: Mutex<InboxState>,
    notify: Notify,
}

impl SignalInbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InboxState::default()),
            notify: Notify::new(),
        }
    }

    /// Deliver a signal
    ///
    /// Returns false for duplicates and for signals belonging to an already
    /// finished run. A signal for a future run is buffered.
    pub fn deliver(&self, signal: Signal) -> bool {
        let key = signal.from.to_string();
        let fresh = {
            let mut state = self.state.lock().unwrap();
            match state.current_run {
                Some(current) if signal.run_id == current => {
                    insert_if_absent(&mut state.signals, key, signal)
                }
                Some(current) if signal.run_id < current => false,
                _ => {
                    let slot = state.buffered.entry(signal.run_id).or_default();
                    insert_if_absent(slot, key, signal)
                }
            }
        };

        if fresh {
            self.notify.notify_waiters();
        }
        fresh
    }

    /// Switch the inbox to a new run, adopting any buffered signals for it
    ///
    /// Buffers for older runs are dropped; run ids only move forward.
    pub fn begin_run(&self, run_id: i64) {
        {
            let mut state = self.state.lock().unwrap();
            state.signals = state.buffered.remove(&run_id).unwrap_or_default();
            state.buffered = state.buffered.split_off(&(run_id + 1));
            state.current_run = Some(run_id);
        }
        self.notify.notify_waiters();
    }

    /// Clear the inbox at the end of a run
    ///
    /// Scoped to the run being finalised so it cannot wipe signals of a
    /// run that has already begun.
    pub fn clear_run(&self, run_id: i64) {
        let mut state = self.state.lock().unwrap();
        if state.current_run == Some(run_id) {
            state.current_run = None;
            state.signals.clear();
        }
    }

    /// The signal recorded for a predecessor in the current run, if any
    pub fn signal_from(&self, predecessor: &str) -> Option<Signal> {
        let state = self.state.lock().unwrap();
        state.signals.get(predecessor).cloned()
    }

    /// Wait until every expected predecessor has signalled for `run_id`
    ///
    /// An empty expectation completes immediately with `AllSuccess`.
    /// Cancellation and shutdown are handled by the caller racing this
    /// future in a select.
    pub async fn wait_for(
        &self,
        run_id: i64,
        expected: &[String],
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        loop {
            let notified = self.notify.notified();

            {
                let state = self.state.lock().unwrap();
                if state.current_run == Some(run_id)
                    && expected.iter().all(|key| state.signals.contains_key(key))
                {
                    let all_success = expected
                        .iter()
                        .all(|key| state.signals[key].kind == SignalKind::Success);
                    return if all_success {
                        WaitOutcome::AllSuccess
                    } else {
                        WaitOutcome::NotSuccess
                    };
                }
            }

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => return WaitOutcome::DeadlineElapsed,
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for SignalInbox {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_if_absent(map: &mut HashMap<String, Signal>, key: String, signal: Signal) -> bool {
    use std::collections::hash_map::Entry;
    match map.entry(key) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(signal);
            true
        }
    }
}
