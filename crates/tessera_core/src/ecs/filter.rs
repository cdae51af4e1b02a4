//! # Filters
//!
//! A filter keeps the set of entities satisfying one `Matcher` up to date
//! from a stream of membership events, so consumers never rescan.
//!
//! ## Locking
//!
//! While a consumer iterates, its filters are locked: incoming events are
//! queued instead of applied, so the result it is walking cannot change
//! under it. When the consumer finishes, post-handling unlocks, runs the
//! deferred reset and replays the queue in arrival order.
//!
//! ```text
//!   pre-handling ──► LOCKED ──(events queued)──► post-handling
//!                                                   │ unlock
//!                                                   │ deferred reset
//!                                                   ▼ replay FIFO
//!                                                UNLOCKED
//! ```
//!
//! ## Variants
//!
//! | kind     | visible result                                         |
//! |----------|--------------------------------------------------------|
//! | Job      | every matching entity, durable                         |
//! | Reactive | matching entities that changed since the last reset    |

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tessera_shared::{EntityId, TupleKind};

use super::matcher::Matcher;
use crate::bit::{BitCode, CompositeBitSet};
use crate::memory::OrderedIdSet;

/// Membership event delivered to filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// First evaluation of an entity against a filter.
    Init(EntityId),
    /// A trait or tag was added.
    Added(EntityId, BitCode),
    /// A trait or tag was removed.
    Removed(EntityId, BitCode),
    /// A trait signalled a change.
    Changed(EntityId, BitCode),
    /// The entity left the world.
    Dropped(EntityId),
}

impl Event {
    /// Entity the event concerns.
    #[must_use]
    pub const fn entity(self) -> EntityId {
        match self {
            Self::Init(id)
            | Self::Added(id, _)
            | Self::Removed(id, _)
            | Self::Changed(id, _)
            | Self::Dropped(id) => id,
        }
    }

    /// Bit the event concerns, for per-bit dispatch.
    #[must_use]
    pub const fn code(self) -> Option<BitCode> {
        match self {
            Self::Added(_, code) | Self::Removed(_, code) | Self::Changed(_, code) => Some(code),
            Self::Init(_) | Self::Dropped(_) => None,
        }
    }
}

/// Looks up an entity's current live set.
///
/// Queued events are evaluated against the live set at replay time, not at
/// arrival time. An absent entity never matches.
pub trait LiveSetSource {
    /// Live set of `id`, if the entity is live.
    fn live_set(&self, id: EntityId) -> Option<&CompositeBitSet>;
}

/// Live set of a single entity.
pub struct SingleLive<'a> {
    /// The entity.
    pub id: EntityId,
    /// Its live set.
    pub live: &'a CompositeBitSet,
}

impl LiveSetSource for SingleLive<'_> {
    fn live_set(&self, id: EntityId) -> Option<&CompositeBitSet> {
        (id == self.id).then_some(self.live)
    }
}

/// What a filter tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterScope {
    /// At most one entity, the owner of the registry.
    Single,
    /// Any number of entities, in match order.
    Group,
}

/// Shared handle to a filter.
///
/// Job filters may be shared between consumers; compare handles with
/// `Arc::ptr_eq`.
pub type FilterRef = Arc<Filter>;

/// Membership bookkeeping.
///
/// `matched` follows the predicate exactly. `visible` is what consumers
/// read; for job filters it mirrors `matched`, for reactive filters it
/// only holds matched entities that changed since the last reset.
#[derive(Debug)]
enum Members {
    Single {
        matched: Option<EntityId>,
        visible: Option<EntityId>,
    },
    Group {
        matched: HashSet<EntityId>,
        visible: OrderedIdSet,
        changed: OrderedIdSet,
    },
}

impl Members {
    fn new(scope: FilterScope) -> Self {
        match scope {
            FilterScope::Single => Self::Single {
                matched: None,
                visible: None,
            },
            FilterScope::Group => Self::Group {
                matched: HashSet::new(),
                visible: OrderedIdSet::new(),
                changed: OrderedIdSet::new(),
            },
        }
    }

    fn is_matched(&self, id: EntityId) -> bool {
        match self {
            Self::Single { matched, .. } => *matched == Some(id),
            Self::Group { matched, .. } => matched.contains(&id),
        }
    }

    fn mark(&mut self, id: EntityId) {
        match self {
            Self::Single { matched, .. } => *matched = Some(id),
            Self::Group { matched, .. } => {
                matched.insert(id);
            }
        }
    }

    fn unmark(&mut self, id: EntityId) {
        match self {
            Self::Single { matched, visible } => {
                if *matched == Some(id) {
                    *matched = None;
                }
                if *visible == Some(id) {
                    *visible = None;
                }
            }
            Self::Group {
                matched,
                visible,
                changed,
            } => {
                matched.remove(&id);
                visible.remove(id);
                changed.remove(id);
            }
        }
    }

    fn show(&mut self, id: EntityId) {
        match self {
            Self::Single { visible, .. } => *visible = Some(id),
            Self::Group { visible, .. } => {
                visible.insert(id);
            }
        }
    }

    fn note_changed(&mut self, id: EntityId) {
        if let Self::Group { changed, .. } = self {
            changed.insert(id);
        }
    }

    fn reset_pulse(&mut self, kind: TupleKind) {
        match (self, kind) {
            (Self::Group { changed, .. }, TupleKind::Job) => changed.clear(),
            (Self::Group { visible, .. }, TupleKind::Reactive) => visible.clear(),
            (Self::Single { visible, .. }, TupleKind::Reactive) => *visible = None,
            (Self::Single { .. }, TupleKind::Job) => {}
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Single { visible, .. } => usize::from(visible.is_some()),
            Self::Group { visible, .. } => visible.len(),
        }
    }

    fn contains(&self, id: EntityId) -> bool {
        match self {
            Self::Single { visible, .. } => *visible == Some(id),
            Self::Group { visible, .. } => visible.contains(id),
        }
    }

    fn first(&self) -> Option<EntityId> {
        match self {
            Self::Single { visible, .. } => *visible,
            Self::Group { visible, .. } => visible.first(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        let (single, group) = match self {
            Self::Single { visible, .. } => (*visible, None),
            Self::Group { visible, .. } => (None, Some(visible.iter())),
        };
        single.into_iter().chain(group.into_iter().flatten())
    }
}

/// Incrementally maintained query result.
#[derive(Debug)]
pub struct Filter {
    matcher: Matcher,
    kind: TupleKind,
    scope: FilterScope,
    locked: AtomicBool,
    pending: Mutex<VecDeque<Event>>,
    members: RwLock<Members>,
}

impl Filter {
    /// Creates an empty, unlocked filter.
    #[must_use]
    pub fn new(matcher: Matcher, kind: TupleKind, scope: FilterScope) -> Self {
        Self {
            matcher,
            kind,
            scope,
            locked: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
            members: RwLock::new(Members::new(scope)),
        }
    }

    /// The predicate.
    #[inline]
    #[must_use]
    pub const fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Job or reactive.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> TupleKind {
        self.kind
    }

    /// Single or group.
    #[inline]
    #[must_use]
    pub const fn scope(&self) -> FilterScope {
        self.scope
    }

    /// Returns true while a consumer is iterating.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Events waiting for post-handling.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Applies `event` now, or queues it while locked.
    pub fn dispatch(&self, event: Event, source: &dyn LiveSetSource) {
        if self.is_locked() {
            self.pending.lock().push_back(event);
            return;
        }
        let mut members = self.members.write();
        self.apply(&mut members, event, source);
    }

    /// Locks the filter for the duration of a consumer's iteration.
    pub fn on_pre_handling(&self) {
        self.locked.store(true, Ordering::Release);
    }

    /// Unlocks, runs the deferred reset, then replays queued events.
    pub fn on_post_handling(&self, source: &dyn LiveSetSource) {
        self.locked.store(false, Ordering::Release);
        let mut members = self.members.write();
        members.reset_pulse(self.kind);

        let queued = std::mem::take(&mut *self.pending.lock());
        for event in queued {
            self.apply(&mut members, event, source);
        }
    }

    fn apply(&self, members: &mut Members, event: Event, source: &dyn LiveSetSource) {
        match event {
            Event::Init(id) => {
                if !members.is_matched(id) && self.satisfied(id, source) {
                    self.on_matched(members, id);
                }
            }
            Event::Added(id, code) => {
                if members.is_matched(id) {
                    if self.matcher.excluded().contains_code(code) {
                        members.unmark(id);
                    }
                } else if self.satisfied(id, source) {
                    self.on_matched(members, id);
                }
            }
            Event::Removed(id, code) => {
                if members.is_matched(id) {
                    if self.matcher.required().contains_code(code) {
                        members.unmark(id);
                    }
                } else if self.satisfied(id, source) {
                    self.on_matched(members, id);
                }
            }
            Event::Changed(id, _) => {
                if members.is_matched(id) {
                    match self.kind {
                        TupleKind::Job => members.note_changed(id),
                        TupleKind::Reactive => members.show(id),
                    }
                }
            }
            Event::Dropped(id) => members.unmark(id),
        }
    }

    fn satisfied(&self, id: EntityId, source: &dyn LiveSetSource) -> bool {
        source
            .live_set(id)
            .is_some_and(|live| self.matcher.matches(live))
    }

    fn on_matched(&self, members: &mut Members, id: EntityId) {
        members.mark(id);
        if self.kind == TupleKind::Job {
            members.show(id);
        }
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Number of visible entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Returns true if nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `id` is visible.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.members.read().contains(id)
    }

    /// Oldest visible entity.
    #[must_use]
    pub fn first(&self) -> Option<EntityId> {
        self.members.read().first()
    }

    /// Visible target of a single filter (first entity of a group filter).
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        self.first()
    }

    /// Returns true if a single filter's target is visible.
    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.is_empty()
    }

    /// Returns true if `id` satisfies the predicate, visible or not.
    #[must_use]
    pub fn tracks(&self, id: EntityId) -> bool {
        self.members.read().is_matched(id)
    }

    /// Copy of the visible entities in match order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.members.read().iter().collect()
    }

    /// Matched entities that signalled a change since the last reset.
    ///
    /// Only job group filters record this; reactive filters expose the
    /// same information as their visible result.
    #[must_use]
    pub fn recently_changed(&self) -> Vec<EntityId> {
        match &*self.members.read() {
            Members::Group { changed, .. } => changed.to_vec(),
            Members::Single { .. } => Vec::new(),
        }
    }

    /// Borrows the visible result without copying.
    ///
    /// The view holds a read lock. Events dispatched to an unlocked filter
    /// block on it, so only keep a view alive between pre- and
    /// post-handling or while the world is not being mutated.
    #[must_use]
    pub fn read(&self) -> FilterView<'_> {
        FilterView {
            members: self.members.read(),
        }
    }
}

/// Borrowed view of a filter's visible result.
pub struct FilterView<'a> {
    members: RwLockReadGuard<'a, Members>,
}

impl FilterView<'_> {
    /// Iterates visible entities in match order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter()
    }

    /// Number of visible entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.len() == 0
    }
}
