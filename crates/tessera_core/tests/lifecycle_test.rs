//! # Lifecycle Tests
//!
//! Entity and trait pooling, controls, systems, templates, deferred
//! actions and configuration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_core::{
    ApplyDomain, Control, ControlContext, CoreError, EntityId, FilterRef, Mutation, SharedWorld,
    System, SystemContext, Trait, TupleKind, World, WorldConfig, WorldMode,
};

#[derive(Default)]
struct Health(i64);
impl Trait for Health {
    fn on_reset(&mut self) {
        self.0 = 0;
    }
}

#[derive(Default)]
struct Poison;
impl Trait for Poison {}

// ============================================================================
// POOLING
// ============================================================================

/// Test: after repeated create/destroy cycles every count returns to zero.
#[test]
fn test_pool_counts_return_to_zero() {
    let mut world = World::default();

    for _ in 0..10 {
        let ids: Vec<EntityId> = (0..8)
            .map(|_| {
                let id = world.create_entity(false, None).unwrap();
                world.add_trait::<Health>(id).unwrap();
                world.add_tag(id, "mob").unwrap();
                id
            })
            .collect();
        for id in ids {
            world.dispose_entity(id);
        }
        world.update(0.016);
    }

    assert_eq!(world.len(), 0);
    assert_eq!(world.live_trait_count(), 0);
    assert_eq!(world.pooled_trait_count(), 8);
    assert_eq!(world.pooled_entity_count(), 8);
}

/// Test: a reused slot comes back empty with a fresh id.
#[test]
fn test_reused_slot_is_clean() {
    let mut world = World::default();
    let old = world.create_entity(false, None).unwrap();
    world.add_trait::<Health>(old).unwrap().0 = 50;
    world.add_tag(old, "boss").unwrap();
    world.dispose_entity(old);
    world.update(0.016);

    let new = world.create_entity(false, None).unwrap();
    assert_ne!(old, new);
    assert_eq!(world.pooled_entity_count(), 0);

    let entity = world.entity(new).unwrap();
    assert!(entity.live_set().is_empty());
    assert_eq!(entity.trait_count(), 0);
    assert_eq!(entity.tag_count(), 0);
    assert!(!world.has_tag(new, "boss"));
    assert_eq!(world.add_trait::<Health>(new).unwrap().0, 0);
}

/// Test: destroyed entities leave every filter, including exclude-only ones.
#[test]
fn test_release_removes_from_filters() {
    let mut world = World::default();
    let consumer = world.register_consumer();
    let healthy = world.matcher().has_trait::<Health>().build().unwrap();
    let clean = world.matcher().except_trait::<Poison>().build().unwrap();
    let healthy = world.filter(consumer, TupleKind::Job, &healthy);
    let clean = world.filter(consumer, TupleKind::Job, &clean);

    let id = world.create_entity(false, None).unwrap();
    world.add_trait::<Health>(id).unwrap();
    assert!(healthy.contains(id));
    assert!(clean.contains(id));

    world.dispose_entity(id);
    assert!(healthy.contains(id));
    world.update(0.016);
    assert!(healthy.is_empty());
    assert!(clean.is_empty());
}

// ============================================================================
// CONTROLS
// ============================================================================

#[derive(Default)]
struct Ticker {
    ticks: u32,
}

impl Control for Ticker {
    fn on_update(&mut self, _ctx: &mut ControlContext<'_>, _dt: f32) {
        self.ticks += 1;
    }
}

#[derive(Default)]
struct Spawner {
    spawned: Option<EntityId>,
}

impl Control for Spawner {
    fn on_update(&mut self, ctx: &mut ControlContext<'_>, _dt: f32) {
        if self.spawned.is_none() {
            let id = ctx.create_entity(false, None).unwrap();
            ctx.add_control::<Ticker>(id).unwrap();
            self.spawned = Some(id);
        }
    }
}

/// Test: entities created during the pass are updated in the same pass.
#[test]
fn test_controls_reach_entities_created_this_frame() {
    let mut world = World::default();
    let root = world.create_entity(false, None).unwrap();
    world.add_control::<Spawner>(root).unwrap();

    world.update(0.016);
    let child = world.control::<Spawner>(root).unwrap().spawned.unwrap();
    assert_eq!(world.control::<Ticker>(child).unwrap().ticks, 1);

    world.update(0.016);
    assert_eq!(world.control::<Ticker>(child).unwrap().ticks, 2);
    assert_eq!(world.len(), 2);
}

/// Watches its own entity for the "armed" tag.
#[derive(Default)]
struct Trigger {
    armed: Option<FilterRef>,
    fired: u32,
}

impl Control for Trigger {
    fn on_init(&mut self, ctx: &mut ControlContext<'_>) {
        let matcher = ctx.matcher().has_tag("armed").build().unwrap();
        self.armed = ctx.filter(TupleKind::Job, &matcher).ok();
    }

    fn on_update(&mut self, ctx: &mut ControlContext<'_>, _dt: f32) {
        let armed = self.armed.as_ref().unwrap();
        if armed.is_matched() {
            self.fired += 1;
            let id = ctx.entity();
            ctx.remove_tag(id, "armed");
            // Still matched until post-handling.
            assert!(armed.is_matched());
        }
    }
}

/// Test: a control's entity filter is bracketed like a system's.
#[test]
fn test_control_entity_filter() {
    let mut world = World::default();
    let id = world.create_entity(false, None).unwrap();
    world.add_control::<Trigger>(id).unwrap();

    world.update(0.016);
    world.add_tag(id, "armed").unwrap();
    world.update(0.016);
    world.update(0.016);

    let trigger = world.control::<Trigger>(id).unwrap();
    assert_eq!(trigger.fired, 1);
    assert!(!trigger.armed.as_ref().unwrap().is_matched());
}

#[derive(Default)]
struct ServerOnly;

impl Control for ServerOnly {
    fn domain(&self) -> ApplyDomain {
        ApplyDomain::Server
    }

    fn on_update(&mut self, _ctx: &mut ControlContext<'_>, _dt: f32) {}
}

/// Test: controls outside the world's domain are not attached.
#[test]
fn test_apply_domain() {
    let mut client = World::new(WorldConfig::with_mode(WorldMode::Client)).unwrap();
    let id = client.create_entity(false, None).unwrap();
    assert!(client.add_control::<ServerOnly>(id).unwrap().is_none());

    let mut server = World::new(WorldConfig::with_mode(WorldMode::Server)).unwrap();
    let id = server.create_entity(false, None).unwrap();
    assert!(server.add_control::<ServerOnly>(id).unwrap().is_some());

    let mut standalone = World::default();
    let id = standalone.create_entity(false, None).unwrap();
    assert!(standalone.add_control::<ServerOnly>(id).unwrap().is_some());
}

/// Test: controls are resolvable by name once registered.
#[test]
fn test_add_control_named() {
    let mut world = World::default();
    world.types_mut().register_control::<Ticker>();
    let id = world.create_entity(false, None).unwrap();

    let consumer = world.add_control_named(id, "Ticker").unwrap();
    assert!(consumer.is_some());
    assert_eq!(world.add_control_named(id, "Ticker").unwrap(), consumer);
    assert_eq!(
        world.add_control_named(id, "Missing"),
        Err(CoreError::UnknownToken("Missing".into()))
    );
}

// ============================================================================
// SYSTEMS
// ============================================================================

static DISPOSED: AtomicUsize = AtomicUsize::new(0);

/// Destroys everything that is poisoned.
#[derive(Default)]
struct Reaper {
    poisoned: Option<FilterRef>,
}

impl System for Reaper {
    fn on_init(&mut self, ctx: &mut SystemContext<'_>) {
        let matcher = ctx.matcher().has_trait::<Poison>().build().unwrap();
        self.poisoned = Some(ctx.filter(TupleKind::Job, &matcher));
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
        let targets = self.poisoned.as_ref().unwrap().entities();
        for id in targets {
            ctx.dispose_entity(id);
        }
    }

    fn on_dispose(&mut self, _world: &mut World) {
        DISPOSED.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test: a system destroying entities mid-iteration, then being removed.
#[test]
fn test_system_disposes_entities() {
    let mut world = World::default();
    assert!(world.add_system::<Reaper>().is_some());
    assert!(world.add_system::<Reaper>().is_some());
    assert_eq!(world.system_count(), 1);

    let victims: Vec<EntityId> = (0..3)
        .map(|_| {
            let id = world.create_entity(false, None).unwrap();
            world.add_trait::<Poison>(id).unwrap();
            id
        })
        .collect();
    let survivor = world.create_entity(false, None).unwrap();

    world.update(0.016);
    assert!(victims.iter().all(|&id| !world.contains_entity(id)));
    assert!(world.contains_entity(survivor));
    assert!(world.system::<Reaper>().unwrap().poisoned.as_ref().unwrap().is_empty());

    assert!(world.remove_system::<Reaper>());
    assert!(!world.remove_system::<Reaper>());
    assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
}

/// Reacts to `Health` changes and keeps an eye on poisoned entities.
#[derive(Default)]
struct Watcher {
    changed: Option<FilterRef>,
    poisoned: Option<FilterRef>,
}

impl System for Watcher {
    fn on_init(&mut self, ctx: &mut SystemContext<'_>) {
        let health = ctx.matcher().has_trait::<Health>().build().unwrap();
        self.changed = Some(ctx.filter(TupleKind::Reactive, &health));
        let poison = ctx.matcher().has_trait::<Poison>().build().unwrap();
        self.poisoned = Some(ctx.filter(TupleKind::Job, &poison));
    }

    fn on_update(&mut self, _ctx: &mut SystemContext<'_>, _dt: f32) {}
}

/// Removes itself on its first update.
#[derive(Default)]
struct Quitter;

impl System for Quitter {
    fn on_init(&mut self, ctx: &mut SystemContext<'_>) {
        let matcher = ctx.matcher().has_tag("exit").build().unwrap();
        let _ = ctx.filter(TupleKind::Reactive, &matcher);
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
        assert!(ctx.remove_system::<Quitter>());
    }
}

/// Test: a removed system's filters stop receiving events.
#[test]
fn test_removed_system_releases_its_filters() {
    let mut world = World::default();
    world.add_system::<Reaper>().unwrap();
    world.add_system::<Watcher>().unwrap();
    assert_eq!(world.filters().filter_count(), 2);

    let id = world.create_entity(false, None).unwrap();
    world.add_trait::<Health>(id).unwrap();
    let health = world
        .bits()
        .lookup(std::any::type_name::<Health>())
        .unwrap();
    assert_eq!(world.filters().quick_count(health.index()), 1);

    let watcher = world.system::<Watcher>().unwrap();
    let changed = watcher.changed.clone().unwrap();
    let shared = watcher.poisoned.clone().unwrap();

    assert!(world.remove_system::<Watcher>());
    assert_eq!(world.filters().filter_count(), 1);
    assert_eq!(world.filters().quick_count(health.index()), 0);

    for _ in 0..3 {
        world.change_trait::<Health, _>(id, |h| h.0 -= 1);
        world.update(0.016);
    }
    assert!(changed.is_empty());

    // Reaper still uses the job filter it shared with the watcher.
    world.add_trait::<Poison>(id).unwrap();
    assert!(shared.contains(id));
    world.update(0.016);
    assert!(!world.contains_entity(id));
}

/// Test: a system removing itself mid-frame also drops its filters.
#[test]
fn test_self_removing_system_releases_its_filters() {
    let mut world = World::default();
    world.add_system::<Quitter>().unwrap();
    assert_eq!(world.filters().filter_count(), 1);

    world.update(0.016);
    assert_eq!(world.system_count(), 0);
    assert_eq!(world.filters().filter_count(), 0);
}

/// Adds and removes traits at random every frame.
struct Churn {
    rng: StdRng,
    filter: Option<FilterRef>,
}

impl Default for Churn {
    fn default() -> Self {
        Self {
            rng: StdRng::seed_from_u64(0x7e55),
            filter: None,
        }
    }
}

impl System for Churn {
    fn on_init(&mut self, ctx: &mut SystemContext<'_>) {
        let matcher = ctx
            .matcher()
            .has_trait::<Health>()
            .except_trait::<Poison>()
            .build()
            .unwrap();
        self.filter = Some(ctx.filter(TupleKind::Job, &matcher));
    }

    fn on_update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
        let filter = self.filter.clone().unwrap();
        let before = filter.entities();
        let ids: Vec<EntityId> = ctx.entity_ids().collect();

        for id in ids {
            match self.rng.gen_range(0..4) {
                0 => {
                    ctx.add_trait::<Health>(id).unwrap();
                }
                1 => {
                    ctx.remove_trait::<Health>(id);
                }
                2 => {
                    ctx.add_trait::<Poison>(id).unwrap();
                }
                _ => {
                    ctx.remove_trait::<Poison>(id);
                }
            }
        }
        if self.rng.gen_bool(0.3) {
            ctx.create_entity(false, None).unwrap();
        }

        assert_eq!(filter.entities(), before);
    }
}

/// Test: randomized mutations keep the filter equal to the predicate.
#[test]
fn test_randomized_churn_keeps_filter_exact() {
    let mut world = World::default();
    for _ in 0..32 {
        world.create_entity(false, None).unwrap();
    }
    world.add_system::<Churn>().unwrap();

    for _ in 0..50 {
        world.update(0.016);

        let filter = world.system::<Churn>().unwrap().filter.clone().unwrap();
        for id in world.entity_ids() {
            let expected = world.has_trait::<Health>(id) && !world.has_trait::<Poison>(id);
            assert_eq!(filter.contains(id), expected);
        }
        let expected = world
            .entity_ids()
            .filter(|&id| world.has_trait::<Health>(id) && !world.has_trait::<Poison>(id))
            .count();
        assert_eq!(filter.len(), expected);
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

/// Test: decorators run on creation; duplicates are rejected.
#[test]
fn test_templates() {
    let mut world = World::default();
    world
        .try_set_template("zombie", |world: &mut World, id| {
            world.add_trait::<Health>(id)?.0 = 20;
            world.add_tag(id, "undead")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        world.try_set_template("zombie", |_: &mut World, _| Ok(())),
        Err(CoreError::DuplicateTemplate("zombie".into()))
    );

    let id = world.create_entity(true, Some("zombie")).unwrap();
    assert_eq!(world.get_trait::<Health>(id).map(|h| h.0), Some(20));
    assert!(world.has_tag(id, "undead"));
    assert_eq!(world.entity(id).unwrap().template(), Some("zombie"));
}

/// Test: a failing template leaves no entity behind.
#[test]
fn test_failed_template_rolls_back_entity() {
    let mut world = World::new(WorldConfig::with_mode(WorldMode::Server)).unwrap();
    world
        .try_set_template("cursed", |world: &mut World, id| {
            world.add_trait::<Health>(id)?.0 = 5;
            world.add_tag(id, "cursed")?;
            Err(CoreError::UnknownToken("blessing".into()))
        })
        .unwrap();
    let consumer = world.register_consumer();
    let matcher = world.matcher().has_trait::<Health>().build().unwrap();
    let filter = world.filter(consumer, TupleKind::Job, &matcher);

    assert_eq!(
        world.create_entity(true, Some("cursed")),
        Err(CoreError::UnknownToken("blessing".into()))
    );
    assert!(world.is_empty());
    assert!(filter.is_empty());
    assert_eq!(world.snapshot().count(), 0);
    assert_eq!(world.live_trait_count(), 0);
    assert_eq!(world.pooled_trait_count(), 1);
    assert_eq!(world.pooled_entity_count(), 1);

    let records = world.drain_outbox();
    assert!(matches!(
        records.last().map(|r| &r.mutation),
        Some(Mutation::Destroy { .. })
    ));

    world.update(0.016);
    assert!(world.is_empty());
}

/// Spawns from the `unstable` template every frame.
#[derive(Default)]
struct Summoner {
    attempts: u32,
}

impl Control for Summoner {
    fn on_update(&mut self, ctx: &mut ControlContext<'_>, _dt: f32) {
        self.attempts += 1;
        let _ = ctx.create_entity(false, Some("unstable"));
    }
}

/// Test: a rollback during the control pass does not skip later entities.
#[test]
fn test_failed_template_during_update() {
    let mut world = World::default();
    world
        .try_set_template("unstable", |world: &mut World, id| {
            world.add_control::<Ticker>(id)?;
            Err(CoreError::UnknownToken("unstable".into()))
        })
        .unwrap();

    // 31 released slots leave holes just short of a compaction.
    let doomed: Vec<EntityId> = (0..31)
        .map(|_| world.create_entity(false, None).unwrap())
        .collect();
    let summoner = world.create_entity(false, None).unwrap();
    let late: Vec<EntityId> = (0..2)
        .map(|_| {
            let id = world.create_entity(false, None).unwrap();
            world.add_control::<Ticker>(id).unwrap();
            id
        })
        .collect();
    for id in doomed {
        world.dispose_entity(id);
    }
    world.update(0.016);
    world.add_control::<Summoner>(summoner).unwrap();

    world.update(0.016);
    assert_eq!(world.len(), 3);
    assert_eq!(world.control::<Summoner>(summoner).unwrap().attempts, 1);
    for id in late {
        assert_eq!(world.control::<Ticker>(id).unwrap().ticks, 2);
    }
}

// ============================================================================
// DEFERRED ACTIONS
// ============================================================================

/// Test: actions from other threads run at end of frame, in order.
#[test]
fn test_deferred_actions_from_threads() {
    let shared = SharedWorld::new(World::default());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let shared = shared.clone();
            let order = Arc::clone(&order);
            thread::spawn(move || {
                shared.schedule_deferred(move |world| {
                    world.create_entity(false, None).unwrap();
                    order.lock().push(n);
                })
            })
        })
        .collect();
    for worker in workers {
        assert!(worker.join().unwrap());
    }

    assert_eq!(shared.with_world(|w| w.deferred_pending()), 4);
    shared.update(0.016);
    assert_eq!(shared.with_world(|w| w.len()), 4);
    assert_eq!(order.lock().len(), 4);
}

/// Test: an action scheduled while draining runs next frame.
#[test]
fn test_nested_deferred_runs_next_frame() {
    let mut world = World::default();
    world.schedule_deferred(|world| {
        world.schedule_deferred(|world| {
            world.create_entity(false, None).unwrap();
        });
    });

    world.update(0.016);
    assert_eq!(world.len(), 0);
    assert_eq!(world.deferred_pending(), 1);
    world.update(0.016);
    assert_eq!(world.len(), 1);
}

/// Test: the batch limit spreads actions over frames.
#[test]
fn test_deferred_batch_limit() {
    let config = WorldConfig {
        deferred_batch_limit: 2,
        ..WorldConfig::default()
    };
    let mut world = World::new(config).unwrap();
    for _ in 0..5 {
        world.schedule_deferred(|world| {
            world.create_entity(false, None).unwrap();
        });
    }

    world.update(0.016);
    assert_eq!(world.len(), 2);
    world.update(0.016);
    world.update(0.016);
    assert_eq!(world.len(), 5);
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Test: worlds are built from TOML configuration.
#[test]
fn test_world_from_toml() {
    let config = WorldConfig::from_toml_str(
        r#"
        mode = "server"
        entity_capacity = 64
        trait_pool_limit = 1
        "#,
    )
    .unwrap();
    let mut world = World::new(config).unwrap();
    assert_eq!(world.mode(), WorldMode::Server);

    let ids: Vec<EntityId> = (0..3)
        .map(|_| {
            let id = world.create_entity(false, None).unwrap();
            world.add_trait::<Health>(id).unwrap();
            id
        })
        .collect();
    assert!(ids.iter().all(|id| id.is_authoritative()));
    for id in ids {
        world.remove_trait::<Health>(id);
    }
    assert_eq!(world.pooled_trait_count(), 1);
}

/// Test: bad configuration is rejected.
#[test]
fn test_invalid_config() {
    let result = WorldConfig::from_toml_str("entity_capacity = \"lots\"");
    assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
}
