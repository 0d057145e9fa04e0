//! Deferred simulation events.
//!
//! The native engine reports contact and trigger transitions synchronously
//! from inside `fetch_results`, on its own call stack. Running user code
//! there could destroy shapes or create actors while the engine is still
//! finalizing the step, so the capture path only *records*: it resolves both
//! sides of a pair through the registry, deduplicates against the per-handle
//! pair sets, and pushes a pooled record onto a FIFO queue.
//!
//! After `fetch_results` returns, [`drain_queued_events`] replays the
//! contact queue first, then the trigger queue, invoking each user callback
//! exactly once in discovery order. A callback may despawn nodes; records
//! whose owner was destroyed mid-drain are skipped instead of erroring.
//! Records return to a pool after use so steady-state stepping allocates
//! nothing.

use std::sync::Arc;

use glam::Vec3;
use smallvec::SmallVec;

use crate::physics::native::{ContactPhase, NativeActorId, SimulationEvents};
use crate::physics::registry::{ActorKey, ActorRegistry};
use crate::world::World;

// ============================================================================
// User-facing payloads
// ============================================================================

/// Payload handed to contact callbacks. Describes the *other* side of the
/// pair. Valid only for the duration of the callback invocation.
#[derive(Debug, Default, Clone)]
pub struct ContactEvent {
    pub tag: Option<String>,
    pub player_id: Option<u32>,
    /// World-space contact positions accumulated for this transition.
    /// Empty for contact-end events.
    pub contacts: SmallVec<[Vec3; 4]>,
}

impl ContactEvent {
    fn reset(&mut self) {
        self.tag = None;
        self.player_id = None;
        self.contacts.clear();
    }
}

/// Payload handed to trigger callbacks. Describes the shape that entered or
/// left the trigger volume.
#[derive(Debug, Default, Clone)]
pub struct TriggerEvent {
    pub tag: Option<String>,
    pub player_id: Option<u32>,
}

impl TriggerEvent {
    fn reset(&mut self) {
        self.tag = None;
        self.player_id = None;
    }
}

/// User contact callback. Receives the world so it may mutate the tree
/// (spawn, despawn, reconfigure) — by the time it runs, the native step has
/// fully finalized.
pub type ContactCallback = dyn Fn(&mut World, &ContactEvent) + Send + Sync;

/// User trigger callback.
pub type TriggerCallback = dyn Fn(&mut World, &TriggerEvent) + Send + Sync;

// ============================================================================
// Pooled queue records
// ============================================================================

#[derive(Default)]
struct ContactRecord {
    /// Handle whose callback this is; re-validated at drain time.
    target: Option<ActorKey>,
    callback: Option<Arc<ContactCallback>>,
    event: ContactEvent,
}

impl ContactRecord {
    fn reset(&mut self) {
        self.target = None;
        self.callback = None;
        self.event.reset();
    }
}

#[derive(Default)]
struct TriggerRecord {
    target: Option<ActorKey>,
    callback: Option<Arc<TriggerCallback>>,
    event: TriggerEvent,
}

impl TriggerRecord {
    fn reset(&mut self) {
        self.target = None;
        self.callback = None;
        self.event.reset();
    }
}

// ============================================================================
// Queue
// ============================================================================

/// FIFO queues of deferred callbacks captured during one fixed step.
#[derive(Default)]
pub struct SimulationEventQueue {
    contacts: Vec<ContactRecord>,
    triggers: Vec<TriggerRecord>,
    contact_pool: Vec<ContactRecord>,
    trigger_pool: Vec<TriggerRecord>,
    /// True exactly while `fetch_results` is running.
    capturing: bool,
}

impl SimulationEventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_capture(&mut self) {
        debug_assert!(!self.capturing, "nested capture");
        self.capturing = true;
    }

    pub(crate) fn end_capture(&mut self) {
        self.capturing = false;
    }

    /// True while the native step is still finalizing. User callbacks must
    /// never run while this holds.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Queued contact callbacks awaiting replay.
    #[must_use]
    pub fn pending_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Queued trigger callbacks awaiting replay.
    #[must_use]
    pub fn pending_triggers(&self) -> usize {
        self.triggers.len()
    }

    fn push_contact(
        &mut self,
        target: ActorKey,
        callback: Arc<ContactCallback>,
        tag: Option<String>,
        player_id: Option<u32>,
        points: &[Vec3],
    ) {
        let mut record = self.contact_pool.pop().unwrap_or_default();
        record.target = Some(target);
        record.callback = Some(callback);
        record.event.tag = tag;
        record.event.player_id = player_id;
        record.event.contacts.extend_from_slice(points);
        self.contacts.push(record);
    }

    fn push_trigger(
        &mut self,
        target: ActorKey,
        callback: Arc<TriggerCallback>,
        tag: Option<String>,
        player_id: Option<u32>,
    ) {
        let mut record = self.trigger_pool.pop().unwrap_or_default();
        record.target = Some(target);
        record.callback = Some(callback);
        record.event.tag = tag;
        record.event.player_id = player_id;
        self.triggers.push(record);
    }
}

// ============================================================================
// Capture sink (the native entry points)
// ============================================================================

/// Borrowed view handed to `fetch_results`: resolves pairs, deduplicates,
/// and queues. No user code runs in here.
pub(crate) struct CaptureSink<'a> {
    pub registry: &'a mut ActorRegistry,
    pub queue: &'a mut SimulationEventQueue,
}

impl SimulationEvents for CaptureSink<'_> {
    fn on_contact(
        &mut self,
        first: NativeActorId,
        second: NativeActorId,
        phase: ContactPhase,
        points: &[Vec3],
    ) {
        debug_assert!(self.queue.capturing, "contact reported outside a step");
        let (Some(key_a), Some(key_b)) = (self.registry.resolve(first), self.registry.resolve(second))
        else {
            log::debug!("contact pair with unregistered actor, dropped");
            return;
        };
        let Some((handle_a, handle_b)) = self.registry.get_pair_mut(key_a, key_b) else {
            return;
        };

        match phase {
            ContactPhase::Found => {
                // The pair-set insert deduplicates: "touch found" queues at
                // most once per continuous contact, per side.
                if handle_a.contacted.insert(key_b)
                    && let Some(cb) = &handle_a.on_contact_start
                {
                    let (cb, tag, pid) = (cb.clone(), handle_b.tag.clone(), handle_b.player_id);
                    self.queue.push_contact(key_a, cb, tag, pid, points);
                }
                if handle_b.contacted.insert(key_a)
                    && let Some(cb) = &handle_b.on_contact_start
                {
                    let (cb, tag, pid) = (cb.clone(), handle_a.tag.clone(), handle_a.player_id);
                    self.queue.push_contact(key_b, cb, tag, pid, points);
                }
            }
            ContactPhase::Lost => {
                if handle_a.contacted.remove(&key_b)
                    && let Some(cb) = &handle_a.on_contact_end
                {
                    let (cb, tag, pid) = (cb.clone(), handle_b.tag.clone(), handle_b.player_id);
                    self.queue.push_contact(key_a, cb, tag, pid, &[]);
                }
                if handle_b.contacted.remove(&key_a)
                    && let Some(cb) = &handle_b.on_contact_end
                {
                    let (cb, tag, pid) = (cb.clone(), handle_a.tag.clone(), handle_a.player_id);
                    self.queue.push_contact(key_b, cb, tag, pid, &[]);
                }
            }
        }
    }

    fn on_trigger(&mut self, trigger: NativeActorId, other: NativeActorId, phase: ContactPhase) {
        debug_assert!(self.queue.capturing, "trigger reported outside a step");
        let (Some(key_t), Some(key_o)) = (self.registry.resolve(trigger), self.registry.resolve(other))
        else {
            log::debug!("trigger pair with unregistered actor, dropped");
            return;
        };
        let Some((handle_t, handle_o)) = self.registry.get_pair_mut(key_t, key_o) else {
            return;
        };

        // Overlap state is recorded on both handles; callbacks fire on the
        // trigger's side, describing the shape that crossed it.
        match phase {
            ContactPhase::Found => {
                let fresh = handle_t.triggered.insert(key_o);
                handle_o.triggered.insert(key_t);
                if fresh && let Some(cb) = &handle_t.on_trigger_enter {
                    let (cb, tag, pid) = (cb.clone(), handle_o.tag.clone(), handle_o.player_id);
                    self.queue.push_trigger(key_t, cb, tag, pid);
                }
            }
            ContactPhase::Lost => {
                let was_inside = handle_t.triggered.remove(&key_o);
                handle_o.triggered.remove(&key_t);
                if was_inside && let Some(cb) = &handle_t.on_trigger_leave {
                    let (cb, tag, pid) = (cb.clone(), handle_o.tag.clone(), handle_o.player_id);
                    self.queue.push_trigger(key_t, cb, tag, pid);
                }
            }
        }
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Replays everything captured during the last fixed step: contacts first,
/// then triggers, FIFO within each. Each record's owner is re-validated
/// immediately before invocation — a callback earlier in the queue may have
/// destroyed it.
pub(crate) fn drain_queued_events(world: &mut World) {
    debug_assert!(
        !world.physics.events.capturing,
        "draining while the native step is still in flight"
    );

    let mut contacts = std::mem::take(&mut world.physics.events.contacts);
    for mut record in contacts.drain(..) {
        let target = record.target;
        let callback = record.callback.take();
        let alive = target.is_some_and(|key| world.physics.registry.contains(key));
        if alive {
            if let Some(cb) = callback {
                (*cb)(world, &record.event);
            }
        } else {
            log::debug!("skipping contact callback for destroyed handle");
        }
        record.reset();
        world.physics.events.contact_pool.push(record);
    }
    world.physics.events.contacts = contacts;

    let mut triggers = std::mem::take(&mut world.physics.events.triggers);
    for mut record in triggers.drain(..) {
        let target = record.target;
        let callback = record.callback.take();
        let alive = target.is_some_and(|key| world.physics.registry.contains(key));
        if alive {
            if let Some(cb) = callback {
                (*cb)(world, &record.event);
            }
        } else {
            log::debug!("skipping trigger callback for destroyed handle");
        }
        record.reset();
        world.physics.events.trigger_pool.push(record);
    }
    world.physics.events.triggers = triggers;
}
