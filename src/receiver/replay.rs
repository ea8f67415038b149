//! Time-bounded cache of seen (origin, nonce) pairs

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::message::{InvalidationMessage, Nonce};
use crate::metrics::ReceiverMetrics;
use crate::signer::Signature;

use super::ReceiveOutcome;

type ReplayKey = (String, Nonce);

struct ReplayEntry {
    signature: Signature,
    timestamp_ms: i64,
    /// First applied outcome, `None` while the first delivery is still being applied
    outcome: Option<ReceiveOutcome>,
}

#[derive(Default)]
struct ReplayState {
    entries: HashMap<ReplayKey, ReplayEntry>,
    /// Message timestamp -> keys, for pruning in timestamp order
    by_time: BTreeMap<i64, Vec<ReplayKey>>,
}

/// How a message relates to what the cache has already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// First sighting, now recorded
    New,
    /// Byte-identical redelivery of a seen message, with its first outcome if known
    Redelivery(Option<ReceiveOutcome>),
    /// Seen (origin, nonce) carrying a different signature
    Replay,
}

/// Replay cache holding only entries whose timestamps are within the
/// acceptance window. Anything older would be rejected as stale anyway.
pub struct ReplayCache {
    window_ms: i64,
    state: Mutex<ReplayState>,
}

impl ReplayCache {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms: i64::try_from(window_ms).unwrap_or(i64::MAX),
            state: Mutex::new(ReplayState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Classify `message` and record it if new. Prunes expired entries first.
    pub fn check_and_insert(&self, message: &InvalidationMessage, now_ms: i64) -> ReplayCheck {
        let mut state = self.lock();
        Self::prune_locked(&mut state, now_ms.saturating_sub(self.window_ms));

        let key = (message.origin_node_id.clone(), message.nonce);
        let check = match state.entries.get(&key) {
            Some(entry) if entry.signature == message.signature => {
                ReplayCheck::Redelivery(entry.outcome)
            }
            Some(_) => ReplayCheck::Replay,
            None => {
                state.entries.insert(
                    key.clone(),
                    ReplayEntry {
                        signature: message.signature,
                        timestamp_ms: message.timestamp_ms,
                        outcome: None,
                    },
                );
                state.by_time.entry(message.timestamp_ms).or_default().push(key);
                ReplayCheck::New
            }
        };

        ReceiverMetrics::set_replay_cache_size(state.entries.len());
        check
    }

    /// Remember the outcome of the first application of a message
    pub fn record_outcome(&self, message: &InvalidationMessage, outcome: ReceiveOutcome) {
        let mut state = self.lock();
        let key = (message.origin_node_id.clone(), message.nonce);
        if let Some(entry) = state.entries.get_mut(&key) {
            if entry.outcome.is_none() {
                entry.outcome = Some(outcome);
            }
        }
    }

    /// Drop a message so a later delivery is treated as new
    pub fn forget(&self, message: &InvalidationMessage) {
        let mut state = self.lock();
        let key = (message.origin_node_id.clone(), message.nonce);
        if let Some(entry) = state.entries.remove(&key) {
            if let Some(keys) = state.by_time.get_mut(&entry.timestamp_ms) {
                keys.retain(|k| k != &key);
                if keys.is_empty() {
                    state.by_time.remove(&entry.timestamp_ms);
                }
            }
        }
        ReceiverMetrics::set_replay_cache_size(state.entries.len());
    }

    /// Remove entries with timestamps older than `now_ms - window`
    pub fn prune(&self, now_ms: i64) -> usize {
        let mut state = self.lock();
        let removed = Self::prune_locked(&mut state, now_ms.saturating_sub(self.window_ms));
        ReceiverMetrics::set_replay_cache_size(state.entries.len());
        removed
    }

    fn prune_locked(state: &mut ReplayState, cutoff: i64) -> usize {
        let retained = state.by_time.split_off(&cutoff);
        let expired = std::mem::replace(&mut state.by_time, retained);

        let mut removed = 0;
        for key in expired.into_values().flatten() {
            if state.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
