//! Physics actor registry.
//!
//! The native engine only speaks [`NativeActorId`]s; simulation callbacks
//! hand those back and nothing else. The registry maps them to logical
//! ownership records ([`ActorHandle`]) in O(1) so event capture can resolve
//! who owns a pair, which user callbacks to defer, and what per-pair contact
//! state already exists.

use std::sync::Arc;

use glam::{Quat, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{SlotMap, new_key_type};

use crate::physics::events::{ContactCallback, TriggerCallback};
use crate::physics::native::{NativeActorId, Pose};
use crate::scene::NodeHandle;

new_key_type! {
    /// Stable key for one registered actor handle.
    pub struct ActorKey;
}

/// Interpolation samples bracketing the current render frame.
#[derive(Debug, Clone, Copy)]
pub struct PoseSamples {
    pub previous: Pose,
    pub latest: Pose,
}

impl PoseSamples {
    #[must_use]
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            previous: pose,
            latest: pose,
        }
    }

    /// Blends between the bracketing fixed-step poses.
    #[must_use]
    pub fn blend(&self, alpha: f32) -> Pose {
        Pose {
            position: Vec3::lerp(self.previous.position, self.latest.position, alpha),
            rotation: Quat::slerp(self.previous.rotation, self.latest.rotation, alpha),
        }
    }

    /// Shifts `latest` into `previous` and records a fresh engine pose.
    pub fn push(&mut self, pose: Pose) {
        self.previous = self.latest;
        self.latest = pose;
    }
}

/// Logical ownership record for one native actor.
pub struct ActorHandle {
    pub(crate) native: NativeActorId,
    /// The node whose mount created the actor, when there is one.
    pub(crate) node: Option<NodeHandle>,
    /// User identification carried into event payloads.
    pub(crate) tag: Option<String>,
    pub(crate) player_id: Option<u32>,

    // Deferred user callbacks, cloned into queue records at capture time.
    pub(crate) on_contact_start: Option<Arc<ContactCallback>>,
    pub(crate) on_contact_end: Option<Arc<ContactCallback>>,
    pub(crate) on_trigger_enter: Option<Arc<TriggerCallback>>,
    pub(crate) on_trigger_leave: Option<Arc<TriggerCallback>>,

    /// Handles currently touching this one. Guarantees "touch found" fires
    /// once per continuous contact.
    pub(crate) contacted: FxHashSet<ActorKey>,
    /// Handles currently overlapping this one's trigger shapes.
    pub(crate) triggered: FxHashSet<ActorKey>,

    /// Present while the engine reports this actor as active.
    pub(crate) samples: Option<PoseSamples>,
}

impl ActorHandle {
    #[must_use]
    pub fn native(&self) -> NativeActorId {
        self.native
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    /// Handles currently in contact with this one.
    #[must_use]
    pub fn contacted(&self) -> &FxHashSet<ActorKey> {
        &self.contacted
    }

    /// Handles currently overlapping this one's triggers.
    #[must_use]
    pub fn triggered(&self) -> &FxHashSet<ActorKey> {
        &self.triggered
    }
}

/// Fields a node supplies when registering a freshly created actor.
#[derive(Default)]
pub struct ActorFields {
    pub node: Option<NodeHandle>,
    pub tag: Option<String>,
    pub player_id: Option<u32>,
    pub on_contact_start: Option<Arc<ContactCallback>>,
    pub on_contact_end: Option<Arc<ContactCallback>>,
    pub on_trigger_enter: Option<Arc<TriggerCallback>>,
    pub on_trigger_leave: Option<Arc<TriggerCallback>>,
}

/// Map between native actor identities and logical handles.
#[derive(Default)]
pub struct ActorRegistry {
    actors: SlotMap<ActorKey, ActorHandle>,
    by_native: FxHashMap<NativeActorId, ActorKey>,
}

impl ActorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native actor and returns its key.
    pub fn add_actor(&mut self, native: NativeActorId, fields: ActorFields) -> ActorKey {
        let key = self.actors.insert(ActorHandle {
            native,
            node: fields.node,
            tag: fields.tag,
            player_id: fields.player_id,
            on_contact_start: fields.on_contact_start,
            on_contact_end: fields.on_contact_end,
            on_trigger_enter: fields.on_trigger_enter,
            on_trigger_leave: fields.on_trigger_leave,
            contacted: FxHashSet::default(),
            triggered: FxHashSet::default(),
            samples: None,
        });
        self.by_native.insert(native, key);
        key
    }

    /// Unregisters a handle: removes the native mapping, clears its pair
    /// state, and scrubs the key out of every surviving handle's pair sets
    /// so stale keys cannot accumulate. Idempotent — destroying an already
    /// destroyed key is a no-op. The native actor itself is *not* released
    /// here; the owning node's unmount does that.
    pub fn destroy(&mut self, key: ActorKey) {
        let Some(handle) = self.actors.remove(key) else {
            return;
        };
        self.by_native.remove(&handle.native);
        for (_, other) in &mut self.actors {
            other.contacted.remove(&key);
            other.triggered.remove(&key);
        }
    }

    /// Resolves a native actor identity back to its logical key.
    #[must_use]
    pub fn resolve(&self, native: NativeActorId) -> Option<ActorKey> {
        self.by_native.get(&native).copied()
    }

    #[must_use]
    pub fn contains(&self, key: ActorKey) -> bool {
        self.actors.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: ActorKey) -> Option<&ActorHandle> {
        self.actors.get(key)
    }

    pub fn get_mut(&mut self, key: ActorKey) -> Option<&mut ActorHandle> {
        self.actors.get_mut(key)
    }

    /// Simultaneous mutable access to two distinct handles.
    pub fn get_pair_mut(
        &mut self,
        a: ActorKey,
        b: ActorKey,
    ) -> Option<(&mut ActorHandle, &mut ActorHandle)> {
        self.actors.get_disjoint_mut([a, b]).map(|[a, b]| (a, b))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
