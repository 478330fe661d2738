//! Shared alarm registry and the timer wake-up protocol.
//!
//! The registry keeps every pending [`AlarmEntry`] in a map ordered by
//! `(due tick, id)` plus an id index, all behind one mutex. Due times are
//! whole `time_unit` ticks counted from the registry's creation, so alarms
//! submitted within the same tick with the same delay tie and fire in id
//! order. A single consumer blocks on the paired condition variable with a
//! deadline equal to the current head's due time. Every mutation signals the condition variable
//! and the consumer re-derives its deadline from the head after each wake,
//! so it never sleeps past an alarm that became earliest mid-wait.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::{Condvar, Mutex};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::entry::{AlarmEntry, AlarmId, AlarmMessage, AlarmNotice, PendingAlarm};
use crate::error::{AlarmError, AlarmResult};

/// Configuration for an [`AlarmRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Wall-clock length of one unit of `delay_seconds`.
    pub time_unit: Duration,
    /// Name given to the timer thread.
    pub worker_name: &'static str,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_secs(1),
            worker_name: "alarm-timer",
        }
    }
}

impl RegistryConfig {
    /// Creates a new registry configuration builder.
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

/// Builder for ergonomic registry configuration construction.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Sets the length of one delay unit.
    pub fn time_unit(mut self, unit: Duration) -> Self {
        self.config.time_unit = unit;
        self
    }

    /// Sets the timer thread name.
    pub fn worker_name(mut self, name: &'static str) -> Self {
        self.config.worker_name = name;
        self
    }

    /// Builds the registry configuration.
    pub fn build(self) -> RegistryConfig {
        self.config
    }
}

/// Running counters kept under the registry lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RegistryStats {
    pub submitted: u64,
    pub replaced: u64,
    pub cancelled: u64,
    pub fired: u64,
    pub discarded: u64,
}

/// An entry the consumer has taken out of the registry.
#[derive(Debug, Clone)]
pub enum Due {
    /// Due and live; deliver it.
    Fire(AlarmEntry),
    /// Cancelled entry reaped at its due time; never deliver it.
    Discard(AlarmEntry),
}

/// Ordering key. `seq` keeps a reused id apart from a cancelled
/// predecessor that is still waiting to be reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AlarmKey {
    tick: u64,
    id: AlarmId,
    seq: u64,
}

#[derive(Default)]
struct RegistryState {
    queue: BTreeMap<AlarmKey, AlarmEntry>,
    index: HashMap<AlarmId, AlarmKey>,
    next_seq: u64,
    closed: bool,
    stats: RegistryStats,
}

impl RegistryState {
    fn ensure_open(&self) -> AlarmResult<()> {
        if self.closed {
            Err(AlarmError::Closed)
        } else {
            Ok(())
        }
    }

    fn next_key(&mut self, id: AlarmId, tick: u64) -> AlarmKey {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        AlarmKey { tick, id, seq }
    }

    /// Key of the live (not cancelled) entry for `id`.
    fn live_key(&self, id: AlarmId) -> Option<AlarmKey> {
        let key = self.index.get(&id)?;
        self.queue
            .get(key)
            .filter(|entry| !entry.is_cancelled())
            .map(|_| *key)
    }

    fn is_earliest(&self, key: &AlarmKey) -> bool {
        self.queue
            .first_key_value()
            .map_or(true, |(head, _)| key <= head)
    }

    fn retire(&mut self, key: AlarmKey, entry: AlarmEntry) -> Due {
        // A cancelled predecessor must not unlink a newer entry reusing its id.
        if self.index.get(&key.id) == Some(&key) {
            self.index.remove(&key.id);
        }
        if entry.is_cancelled() {
            self.stats.discarded += 1;
            info!("discarding cancelled alarm {}", key.id);
            Due::Discard(entry)
        } else {
            self.stats.fired += 1;
            debug!("alarm {} is due", key.id);
            Due::Fire(entry)
        }
    }
}

/// The shared, time-ordered collection of pending alarms.
///
/// Producers call [`insert`](Self::insert), [`replace`](Self::replace) and
/// [`cancel`](Self::cancel) from any thread. Exactly one consumer calls
/// [`take_due_or_wait`](Self::take_due_or_wait) or [`next_due`](Self::next_due).
pub struct AlarmRegistry {
    config: RegistryConfig,
    /// Tick zero.
    epoch: Instant,
    state: Mutex<RegistryState>,
    wakeup: Condvar,
}

impl Default for AlarmRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl AlarmRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            epoch: Instant::now(),
            state: Mutex::new(RegistryState::default()),
            wakeup: Condvar::new(),
        }
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Adds a new alarm due `delay_seconds` units from now.
    ///
    /// Fails with [`AlarmError::DuplicateId`] if a live alarm already uses
    /// `id`. The id of a cancelled alarm may be reused.
    pub fn insert(&self, id: AlarmId, delay_seconds: u32, message: AlarmMessage) -> AlarmResult<()> {
        if delay_seconds == 0 {
            return Err(AlarmError::InvalidDelay);
        }
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.live_key(id).is_some() {
            return Err(AlarmError::DuplicateId(id));
        }

        let (tick, due_at) = self.due_after(delay_seconds)?;
        let key = state.next_key(id, tick);
        let earliest = state.is_earliest(&key);
        state
            .queue
            .insert(key, AlarmEntry::new(id, delay_seconds, due_at, message));
        state.index.insert(id, key);
        state.stats.submitted += 1;
        drop(state);

        debug!("inserted alarm {id} due at tick {tick} (earliest: {earliest})");
        self.wakeup.notify_one();
        Ok(())
    }

    /// Moves the live alarm `id` to a new due time and message.
    ///
    /// Fails with [`AlarmError::NotFound`] if no live alarm uses `id`.
    pub fn replace(&self, id: AlarmId, delay_seconds: u32, message: AlarmMessage) -> AlarmResult<()> {
        if delay_seconds == 0 {
            return Err(AlarmError::InvalidDelay);
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;
        let old_key = state.live_key(id).ok_or(AlarmError::NotFound(id))?;
        let (tick, due_at) = self.due_after(delay_seconds)?;
        let mut entry = state
            .queue
            .remove(&old_key)
            .ok_or(AlarmError::NotFound(id))?;

        entry.apply_replacement(delay_seconds, due_at, message);
        let key = state.next_key(id, tick);
        let earliest = state.is_earliest(&key);
        state.queue.insert(key, entry);
        state.index.insert(id, key);
        state.stats.replaced += 1;
        drop(guard);

        debug!("replaced alarm {id}, now due at tick {tick} (earliest: {earliest})");
        self.wakeup.notify_one();
        Ok(())
    }

    /// Marks alarm `id` cancelled. The entry keeps its slot and is reaped
    /// unfired when the consumer reaches it.
    pub fn cancel(&self, id: AlarmId) -> AlarmResult<AlarmNotice> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;
        let key = state.index.get(&id).copied().ok_or(AlarmError::NotFound(id))?;
        let entry = state.queue.get_mut(&key).ok_or(AlarmError::NotFound(id))?;
        if !entry.cancel() {
            return Err(AlarmError::AlreadyCancelled(id));
        }
        let notice = entry.notice();
        state.stats.cancelled += 1;
        drop(guard);

        debug!("cancelled alarm {id}");
        self.wakeup.notify_one();
        Ok(notice)
    }

    /// Blocks until the head entry is due, then removes and returns it.
    ///
    /// Returns `None` once the registry is closed. Consumer-only.
    pub fn next_due(&self) -> Option<Due> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }

            let now = Instant::now();
            let head = state
                .queue
                .first_key_value()
                .map(|(key, entry)| (key.id, entry.due_at()));
            match head {
                None => {
                    debug!("registry empty, waiting for work");
                    self.wakeup.wait(&mut state);
                }
                Some((id, due_at)) if due_at > now => {
                    debug!(
                        "waiting {:?} for alarm {id}",
                        due_at.saturating_duration_since(now)
                    );
                    let _ = self.wakeup.wait_until(&mut state, due_at);
                }
                Some(_) => {
                    if let Some((key, entry)) = state.queue.pop_first() {
                        return Some(state.retire(key, entry));
                    }
                }
            }
        }
    }

    /// Blocks until a live alarm is due and returns it, silently dropping
    /// cancelled entries on the way.
    ///
    /// Returns `None` once the registry is closed. Consumer-only.
    pub fn take_due_or_wait(&self) -> Option<AlarmEntry> {
        loop {
            match self.next_due()? {
                Due::Fire(entry) => return Some(entry),
                Due::Discard(_) => continue,
            }
        }
    }

    /// Closes the registry, drops every pending entry and wakes the
    /// consumer. Returns how many live alarms were abandoned.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        state.closed = true;
        let abandoned = state
            .queue
            .values()
            .filter(|entry| !entry.is_cancelled())
            .count();
        state.queue.clear();
        state.index.clear();
        drop(state);

        info!("alarm registry closed, {abandoned} pending alarm(s) abandoned");
        self.wakeup.notify_all();
        abandoned
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Every entry still held, cancelled ones included, in firing order.
    pub fn snapshot(&self) -> Vec<PendingAlarm> {
        let state = self.state.lock();
        let now = Instant::now();
        state
            .queue
            .values()
            .map(|entry| PendingAlarm::from_entry(entry, now))
            .collect()
    }

    /// Number of live (not cancelled) alarms.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .queue
            .values()
            .filter(|entry| !entry.is_cancelled())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        self.state.lock().stats
    }

    /// Due tick and deadline for an alarm `delay_seconds` units from now.
    ///
    /// The current tick is rounded down, so an alarm may fire up to one unit
    /// short of its full delay.
    fn due_after(&self, delay_seconds: u32) -> AlarmResult<(u64, Instant)> {
        let unit = self.unit_nanos();
        let current = self.epoch.elapsed().as_nanos() / unit;
        let tick = u64::try_from(current)
            .ok()
            .and_then(|now| now.checked_add(u64::from(delay_seconds)))
            .ok_or(AlarmError::InvalidDelay)?;
        Ok((tick, self.tick_deadline(tick)?))
    }

    fn tick_deadline(&self, tick: u64) -> AlarmResult<Instant> {
        let offset = self
            .unit_nanos()
            .checked_mul(u128::from(tick))
            .and_then(|nanos| u64::try_from(nanos).ok())
            .ok_or(AlarmError::InvalidDelay)?;
        self.epoch
            .checked_add(Duration::from_nanos(offset))
            .ok_or(AlarmError::InvalidDelay)
    }

    fn unit_nanos(&self) -> u128 {
        self.config.time_unit.as_nanos().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AlarmRegistry {
        AlarmRegistry::new(RegistryConfig::builder().time_unit(Duration::from_secs(60)).build())
    }

    fn msg(text: &str) -> AlarmMessage {
        AlarmMessage::truncated(text)
    }

    #[test]
    fn keys_order_by_due_time_then_id() {
        let mut keys = vec![
            AlarmKey { tick: 4, id: AlarmId(1), seq: 0 },
            AlarmKey { tick: 3, id: AlarmId(9), seq: 1 },
            AlarmKey { tick: 3, id: AlarmId(2), seq: 2 },
        ];
        keys.sort();
        let ids: Vec<_> = keys.iter().map(|key| key.id.0).collect();
        assert_eq!(ids, vec![2, 9, 1]);
    }

    #[test]
    fn same_delay_in_same_tick_orders_by_id() {
        let registry = registry();
        registry.insert(AlarmId(9), 1, msg("nine")).unwrap();
        registry.insert(AlarmId(2), 1, msg("two")).unwrap();
        registry.insert(AlarmId(5), 1, msg("five")).unwrap();

        let ids: Vec<_> = registry.snapshot().iter().map(|alarm| alarm.id.0).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn due_time_lands_on_a_tick_boundary() {
        let registry = registry();
        let (tick, due_at) = registry.due_after(3).unwrap();
        assert_eq!(tick, 3);
        assert_eq!(due_at.duration_since(registry.epoch), Duration::from_secs(180));
    }

    #[test]
    fn duplicate_live_id_is_rejected() {
        let registry = registry();
        registry.insert(AlarmId(4), 3, msg("first")).unwrap();
        assert_eq!(
            registry.insert(AlarmId(4), 5, msg("second")),
            Err(AlarmError::DuplicateId(AlarmId(4)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn zero_delay_is_rejected() {
        let registry = registry();
        assert_eq!(
            registry.insert(AlarmId(1), 0, msg("now")),
            Err(AlarmError::InvalidDelay)
        );
    }

    #[test]
    fn replace_updates_in_place_and_reorders() {
        let registry = registry();
        registry.insert(AlarmId(1), 5, msg("one")).unwrap();
        registry.insert(AlarmId(2), 10, msg("two")).unwrap();
        registry.replace(AlarmId(2), 1, msg("two, sooner")).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, AlarmId(2));
        assert_eq!(snapshot[0].delay_seconds, 1);
        assert_eq!(snapshot[0].message.as_str(), "two, sooner");
        assert!(snapshot[0].replaced);
        assert!(!snapshot[1].replaced);
        assert_eq!(registry.stats().replaced, 1);
    }

    #[test]
    fn replace_unknown_id_is_not_found() {
        let registry = registry();
        assert_eq!(
            registry.replace(AlarmId(3), 1, msg("x")),
            Err(AlarmError::NotFound(AlarmId(3)))
        );
    }

    #[test]
    fn cancel_is_at_most_once() {
        let registry = registry();
        registry.insert(AlarmId(8), 2, msg("bye")).unwrap();

        let notice = registry.cancel(AlarmId(8)).unwrap();
        assert_eq!(notice.id, AlarmId(8));
        assert_eq!(notice.delay_seconds, 2);
        assert_eq!(
            registry.cancel(AlarmId(8)),
            Err(AlarmError::AlreadyCancelled(AlarmId(8)))
        );
        assert_eq!(
            registry.cancel(AlarmId(99)),
            Err(AlarmError::NotFound(AlarmId(99)))
        );

        // Lazily removed: still listed, but no longer live.
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.snapshot()[0].cancelled);
        assert!(registry.is_empty());
    }

    #[test]
    fn cancelled_entry_cannot_be_replaced_but_id_can_be_reused() {
        let registry = registry();
        registry.insert(AlarmId(5), 2, msg("old")).unwrap();
        registry.cancel(AlarmId(5)).unwrap();

        assert_eq!(
            registry.replace(AlarmId(5), 1, msg("new")),
            Err(AlarmError::NotFound(AlarmId(5)))
        );
        registry.insert(AlarmId(5), 1, msg("new")).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(snapshot[0].message.as_str(), "new");
        assert!(!snapshot[0].cancelled);
        assert!(snapshot[1].cancelled);
    }

    #[test]
    fn closed_registry_rejects_mutations() {
        let registry = registry();
        registry.insert(AlarmId(1), 1, msg("a")).unwrap();
        registry.insert(AlarmId(2), 1, msg("b")).unwrap();
        registry.cancel(AlarmId(2)).unwrap();

        assert_eq!(registry.close(), 1);
        assert_eq!(registry.close(), 0);
        assert!(registry.is_closed());
        assert_eq!(registry.insert(AlarmId(3), 1, msg("c")), Err(AlarmError::Closed));
        assert_eq!(registry.cancel(AlarmId(1)), Err(AlarmError::Closed));
        assert!(registry.take_due_or_wait().is_none());
    }
}
