//! # Filter Registry
//!
//! Owns every filter of one scope (one entity, or the whole world).
//!
//! ## Layout
//!
//! ```text
//! groups[kind][consumer] ─► [filter, filter, ...]   pre/post handling
//! shared                 ─► every job filter          sharing lookup
//! quick[bit index]       ─► filters touching the bit  event fan-out
//! ```
//!
//! A trait or tag event only reaches the filters whose matcher mentions its
//! bit, so dispatch costs O(k) in the number of interested filters rather
//! than the number of filters.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_shared::{ConsumerId, EntityId, TupleKind};

use super::filter::{Event, Filter, FilterRef, FilterScope, LiveSetSource};
use super::matcher::Matcher;

/// Registry of filters for one scope.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    /// Per kind, per consumer, in creation order.
    groups: [HashMap<ConsumerId, Vec<FilterRef>>; 2],
    /// Every job filter, for cross-consumer sharing.
    shared: Vec<FilterRef>,
    /// Every distinct filter.
    all: Vec<FilterRef>,
    /// Filters by touched bit index.
    quick: Vec<Vec<FilterRef>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds a filter with an equal matcher for `consumer`.
    ///
    /// Falls back to the shared pool for job filters; a hit there is
    /// attached to `consumer` so its pre/post handling covers it.
    /// Reactive filters are never shared.
    pub fn get_filter(
        &mut self,
        consumer: ConsumerId,
        kind: TupleKind,
        matcher: &Matcher,
    ) -> Option<FilterRef> {
        let own = self.groups[kind.slot()]
            .get(&consumer)
            .and_then(|list| list.iter().find(|f| f.matcher() == matcher))
            .cloned();
        if own.is_some() || kind == TupleKind::Reactive {
            return own;
        }

        let shared = self
            .shared
            .iter()
            .find(|f| f.matcher() == matcher)
            .cloned()?;
        self.groups[kind.slot()]
            .entry(consumer)
            .or_default()
            .push(Arc::clone(&shared));
        Some(shared)
    }

    /// Registers a new filter for `consumer`.
    pub fn add_filter(&mut self, consumer: ConsumerId, filter: FilterRef) -> FilterRef {
        let kind = filter.kind();
        self.groups[kind.slot()]
            .entry(consumer)
            .or_default()
            .push(Arc::clone(&filter));
        if kind == TupleKind::Job {
            self.shared.push(Arc::clone(&filter));
        }
        for index in filter.matcher().touched() {
            let index = index as usize;
            if self.quick.len() <= index {
                self.quick.resize_with(index + 1, Vec::new);
            }
            self.quick[index].push(Arc::clone(&filter));
        }
        self.all.push(Arc::clone(&filter));
        filter
    }

    /// Returns the filter for `(consumer, kind, matcher)`, creating it if
    /// needed.
    ///
    /// A new filter receives `Init` for each of `targets` before it is
    /// registered.
    pub fn get_or_add<I>(
        &mut self,
        consumer: ConsumerId,
        kind: TupleKind,
        matcher: &Matcher,
        scope: FilterScope,
        targets: I,
        source: &dyn LiveSetSource,
    ) -> FilterRef
    where
        I: IntoIterator<Item = EntityId>,
    {
        if let Some(filter) = self.get_filter(consumer, kind, matcher) {
            return filter;
        }

        let filter = Arc::new(Filter::new(matcher.clone(), kind, scope));
        for id in targets {
            filter.dispatch(Event::Init(id), source);
        }
        tracing::debug!(
            "New {:?} {:?} filter for consumer {} ({} matched)",
            scope,
            kind,
            consumer.0,
            filter.len()
        );
        self.add_filter(consumer, filter)
    }

    /// Delivers a bit event to the filters touching that bit.
    ///
    /// Events without a bit (`Init`, `Dropped`) go to every filter.
    pub fn dispatch(&self, event: Event, source: &dyn LiveSetSource) {
        let Some(code) = event.code() else {
            self.dispatch_all(event, source);
            return;
        };
        if let Some(filters) = self.quick.get(code.index() as usize) {
            for filter in filters {
                filter.dispatch(event, source);
            }
        }
    }

    /// Delivers an event to every filter.
    pub fn dispatch_all(&self, event: Event, source: &dyn LiveSetSource) {
        for filter in &self.all {
            filter.dispatch(event, source);
        }
    }

    /// Locks every filter of `consumer`.
    pub fn on_pre_handling(&self, consumer: ConsumerId) {
        for filter in self.consumer_filters(consumer) {
            filter.on_pre_handling();
        }
    }

    /// Unlocks every filter of `consumer` and replays their queues.
    pub fn on_post_handling(&self, consumer: ConsumerId, source: &dyn LiveSetSource) {
        for filter in self.consumer_filters(consumer) {
            filter.on_post_handling(source);
        }
    }

    /// Forgets `consumer` and every filter only it was using.
    ///
    /// Job filters still attached to another consumer stay registered.
    /// Returns the number of filters dropped.
    pub fn remove_consumer(&mut self, consumer: ConsumerId) -> usize {
        let released: Vec<FilterRef> = self
            .groups
            .iter_mut()
            .filter_map(|group| group.remove(&consumer))
            .flatten()
            .collect();
        let orphans: Vec<FilterRef> = released
            .into_iter()
            .filter(|filter| {
                !self
                    .groups
                    .iter()
                    .flat_map(HashMap::values)
                    .flatten()
                    .any(|other| Arc::ptr_eq(other, filter))
            })
            .collect();
        if orphans.is_empty() {
            return 0;
        }

        let orphaned = |filter: &FilterRef| orphans.iter().any(|o| Arc::ptr_eq(o, filter));
        self.shared.retain(|f| !orphaned(f));
        self.all.retain(|f| !orphaned(f));
        for list in &mut self.quick {
            list.retain(|f| !orphaned(f));
        }
        tracing::debug!("Dropped {} filters of consumer {}", orphans.len(), consumer.0);
        orphans.len()
    }

    /// Drops every filter.
    pub fn reset(&mut self) {
        for group in &mut self.groups {
            group.clear();
        }
        self.shared.clear();
        self.all.clear();
        self.quick.clear();
    }

    /// Number of distinct filters.
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.all.len()
    }

    /// Number of filters registered under bit `index`.
    #[must_use]
    pub fn quick_count(&self, index: u32) -> usize {
        self.quick.get(index as usize).map_or(0, Vec::len)
    }

    /// Filters of `consumer`, job filters first.
    pub fn consumer_filters(&self, consumer: ConsumerId) -> impl Iterator<Item = &FilterRef> {
        self.groups
            .iter()
            .filter_map(move |group| group.get(&consumer))
            .flatten()
    }
}
