//! End-to-end tests of the application context: breaks, ticks, selections,
//! restarts and shutdown against an in-memory world.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regen_config::{Config, PresetConfig, WeightedMaterialConfig};
use regen_core::{
    Actor, ActorId, BlockAccess, BlockLocation, ConditionFailure, DataStore, Location,
    ManualClock, MaterialId, MemoryWorld, RegionError, RegionFile, RegionRecord,
    SelectionProblem,
};

use crate::context::{BreakOutcome, RegenContext};

const WAIT: Duration = Duration::from_secs(5);
const OP: ActorId = ActorId(1);

fn config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.presets.push(PresetConfig::default());
    config.presets.push(PresetConfig {
        name: "diamond".to_string(),
        target_material: "DIAMOND_ORE".to_string(),
        replace_with: "STONE".to_string(),
        regenerate_into: vec![WeightedMaterialConfig {
            material: "DIAMOND_ORE".to_string(),
            weight: 1,
        }],
        tools_required: "IRON_PICKAXE, DIAMOND_PICKAXE".to_string(),
        ..Default::default()
    });
    config
}

fn world() -> MemoryWorld {
    let mut host = MemoryWorld::with_worlds(["world"]);
    for x in 0..4 {
        host.place(stone_at(x), MaterialId::new("STONE"));
    }
    host.place(
        BlockLocation::new("world", 0, 10, 0),
        MaterialId::new("DIAMOND_ORE"),
    );
    host
}

fn stone_at(x: i32) -> BlockLocation {
    BlockLocation::new("world", x, 64, 0)
}

fn started(config: Config, host: MemoryWorld, clock: &ManualClock) -> RegenContext<MemoryWorld> {
    let mut context = RegenContext::new(config, host, Arc::new(clock.clone())).with_rng_seed(9);
    context.start().unwrap();
    assert!(context.await_startup(WAIT));
    context
}

fn point(at: &BlockLocation) -> Location {
    Location::new(at.world.clone(), at.x as f64 + 0.5, at.y as f64 + 0.5, at.z as f64 + 0.5)
}

#[test]
fn test_break_schedules_and_places_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);

    let outcome = context.on_block_break(&point(&stone_at(0)), &Actor::default());
    assert_eq!(
        outcome,
        BreakOutcome::Scheduled {
            preset: "stone".to_string(),
            region: None,
            remaining_ms: 3_000,
        }
    );
    assert_eq!(
        context.host().block_at(&stone_at(0)),
        Some(MaterialId::new("BEDROCK"))
    );

    let again = context.on_block_break(&point(&stone_at(0)), &Actor::default());
    assert_eq!(again, BreakOutcome::AlreadyRegenerating);
    assert!(again.cancels_break());
    assert_eq!(context.scheduler().len(), 1);
}

#[test]
fn test_tick_regenerates_block() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);
    context.on_block_break(&point(&stone_at(1)), &Actor::default());

    for _ in 0..3 {
        assert_eq!(context.on_tick(Duration::from_secs(1)).fired, 0);
    }
    assert_eq!(context.on_tick(Duration::from_secs(1)).fired, 1);
    assert_eq!(
        context.host().block_at(&stone_at(1)),
        Some(MaterialId::new("STONE"))
    );
    assert!(context.scheduler().is_empty());
}

#[test]
fn test_unknown_material_has_no_preset() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);

    let air = Location::new("world", 50.0, 50.0, 50.0);
    assert_eq!(
        context.on_block_break(&air, &Actor::default()),
        BreakOutcome::NoPreset
    );
    let unloaded = Location::new("nether", 0.0, 64.0, 0.0);
    assert_eq!(
        context.on_block_break(&unloaded, &Actor::default()),
        BreakOutcome::NoPreset
    );
}

#[test]
fn test_tool_requirement_denies_break() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);
    let ore = Location::new("world", 0.2, 10.2, 0.2);

    let bare = context.on_block_break(&ore, &Actor::default());
    assert_eq!(
        bare,
        BreakOutcome::Denied(ConditionFailure::ToolRequired(
            "iron pickaxe, diamond pickaxe".to_string()
        ))
    );
    assert!(bare.cancels_break());

    let miner = Actor {
        tool: Some(MaterialId::new("DIAMOND_PICKAXE")),
        ..Default::default()
    };
    assert!(matches!(
        context.on_block_break(&ore, &miner),
        BreakOutcome::Scheduled { preset, .. } if preset == "diamond"
    ));
}

#[test]
fn test_restricted_breaks_need_a_region() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut cfg = config(dir.path());
    cfg.regions.restrict_to_regions = true;
    let mut context = started(cfg, world(), &clock);

    assert_eq!(
        context.on_block_break(&point(&stone_at(2)), &Actor::default()),
        BreakOutcome::OutsideRegion
    );

    context.select_first(OP, Location::new("world", 0.0, 60.0, -5.0));
    context.select_second(OP, Location::new("world", 10.0, 70.0, 5.0));
    context.commit_selection(OP, "quarry").unwrap();

    assert_eq!(
        context.on_block_break(&point(&stone_at(2)), &Actor::default()),
        BreakOutcome::Scheduled {
            preset: "stone".to_string(),
            region: Some("quarry".to_string()),
            remaining_ms: 3_000,
        }
    );
}

#[test]
fn test_cross_world_selection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);

    context.select_first(OP, Location::new("world", 0.0, 0.0, 0.0));
    context.select_second(OP, Location::new("world_nether", 5.0, 5.0, 5.0));
    assert!(matches!(
        context.commit_selection(OP, "bad"),
        Err(RegionError::InvalidSelection(
            SelectionProblem::WorldMismatch { .. }
        ))
    ));
    assert!(context.regions().is_empty());
    assert_eq!(
        context.remove_region("bad"),
        Err(RegionError::UnknownRegion("bad".to_string()))
    );
}

#[test]
fn test_shutdown_persists_then_reverts_and_restart_restores() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(10_000);
    let mut context = started(config(dir.path()), world(), &clock);

    context.select_first(OP, Location::new("world", 0.0, 0.0, 0.0));
    context.select_second(OP, Location::new("world", 20.0, 100.0, 20.0));
    context.commit_selection(OP, "quarry").unwrap();

    context.on_block_break(&point(&stone_at(0)), &Actor::default());
    context.on_block_break(&point(&stone_at(1)), &Actor::default());
    context.on_tick(Duration::from_secs(1));
    clock.advance(1_000);

    let (report, host) = context.shutdown();
    assert_eq!(report.tasks_saved, Some(2));
    assert_eq!(report.regions_saved, Some(1));
    assert_eq!(report.reverted, 2);
    assert_eq!(report.failed_jobs, 0);
    assert_eq!(host.block_at(&stone_at(0)), Some(MaterialId::new("STONE")));
    assert_eq!(host.block_at(&stone_at(1)), Some(MaterialId::new("STONE")));

    // Restart over the same world a minute later.
    clock.advance(60_000);
    let context = started(config(dir.path()), host, &clock);
    assert_eq!(context.scheduler().len(), 2);
    let task = context.scheduler().peek(&stone_at(0)).unwrap();
    assert_eq!(task.remaining_ms(), 2_000);
    assert_eq!(task.region(), Some("quarry"));
    assert_eq!(
        context.host().block_at(&stone_at(0)),
        Some(MaterialId::new("BEDROCK"))
    );
    assert!(context.regions().get("quarry").is_some());
}

#[test]
fn test_shutdown_without_persistence_only_reverts() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut cfg = config(dir.path());
    cfg.scheduler.persist_on_shutdown = false;
    let mut context = started(cfg, world(), &clock);
    context.on_block_break(&point(&stone_at(3)), &Actor::default());

    let (report, host) = context.shutdown();
    assert_eq!(report.tasks_saved, None);
    assert_eq!(report.reverted, 1);
    assert_eq!(host.block_at(&stone_at(3)), Some(MaterialId::new("STONE")));

    let store = DataStore::new(dir.path().join("tasks.ron"), dir.path().join("regions.ron"));
    assert!(store.load_tasks().unwrap().records.is_empty());
}

#[test]
fn test_shutdown_without_persistence_clears_autosave() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut cfg = config(dir.path());
    cfg.scheduler.persist_on_shutdown = false;
    cfg.scheduler.autosave_interval_secs = 1;
    let mut context = started(cfg.clone(), world(), &clock);

    context.on_block_break(&point(&stone_at(3)), &Actor::default());
    context.on_tick(Duration::from_secs(1));
    let (report, host) = context.shutdown();
    assert_eq!(report.reverted, 1);
    assert_eq!(report.failed_jobs, 0);

    let context = started(cfg, host, &clock);
    assert!(context.scheduler().is_empty());
    assert_eq!(
        context.host().block_at(&stone_at(3)),
        Some(MaterialId::new("STONE"))
    );
}

#[test]
fn test_corrupt_region_record_does_not_lose_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let regions_path = dir.path().join("regions.ron");
    std::fs::write(
        &regions_path,
        r#"(regions: [
            (name: "quarry", min: "world,0,0,0", max: "world,20,100,20"),
            (name: "broken", min: 5, max: "world,1,1,1"),
        ])"#,
    )
    .unwrap();

    let clock = ManualClock::new(0);
    let context = started(config(dir.path()), world(), &clock);
    assert!(context.regions().get("quarry").is_some());
    assert_eq!(context.regions().len(), 1);

    let (report, _host) = context.shutdown();
    assert_eq!(report.regions_saved, Some(1));
    let store = DataStore::new(dir.path().join("tasks.ron"), &regions_path);
    assert_eq!(store.load_regions().unwrap().file.regions[0].name, "quarry");
}

#[test]
fn test_unreadable_files_are_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_path = dir.path().join("tasks.ron");
    let regions_path = dir.path().join("regions.ron");
    std::fs::write(&tasks_path, "(version: 1, tasks: [ oops").unwrap();
    std::fs::write(&regions_path, "(regions: [ oops").unwrap();

    let clock = ManualClock::new(0);
    let mut cfg = config(dir.path());
    cfg.scheduler.autosave_interval_secs = 1;
    let mut context = started(cfg, world(), &clock);

    context.select_first(OP, Location::new("world", 0.0, 0.0, 0.0));
    context.select_second(OP, Location::new("world", 5.0, 70.0, 5.0));
    context.commit_selection(OP, "quarry").unwrap();
    context.on_block_break(&point(&stone_at(0)), &Actor::default());
    assert_eq!(context.save_tasks(), None);
    context.on_tick(Duration::from_secs(1));

    let (report, host) = context.shutdown();
    assert_eq!(report.tasks_saved, None);
    assert_eq!(report.regions_saved, None);
    assert_eq!(report.reverted, 1);
    assert_eq!(host.block_at(&stone_at(0)), Some(MaterialId::new("STONE")));
    assert_eq!(
        std::fs::read_to_string(&tasks_path).unwrap(),
        "(version: 1, tasks: [ oops"
    );
    assert_eq!(
        std::fs::read_to_string(&regions_path).unwrap(),
        "(regions: [ oops"
    );
}

#[test]
fn test_pending_regions_resolve_on_reattempt_tick() {
    let dir = tempfile::tempdir().unwrap();
    let store = DataStore::new(dir.path().join("tasks.ron"), dir.path().join("regions.ron"));
    store
        .save_regions(&RegionFile {
            regions: vec![RegionRecord {
                name: "nether_mine".to_string(),
                min: "world_nether,0,0,0".to_string(),
                max: "world_nether,10,10,10".to_string(),
                reattempt: true,
            }],
        })
        .unwrap();

    let clock = ManualClock::new(0);
    let mut cfg = config(dir.path());
    cfg.regions.reattempt_interval_secs = 5;
    let mut context = started(cfg, world(), &clock);
    assert!(context.regions().exists("nether_mine"));
    assert!(context.regions().get("nether_mine").is_none());

    context.host_mut().load_world("world_nether");
    context.on_tick(Duration::from_secs(4));
    assert!(context.regions().get("nether_mine").is_none());
    context.on_tick(Duration::from_secs(1));
    assert!(context.regions().get("nether_mine").is_some());
    assert_eq!(context.regions().pending_count(), 0);
}

#[test]
fn test_reload_swaps_presets() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);

    let mut cfg = config(dir.path());
    cfg.presets.retain(|p| p.name != "stone");
    context.reload(cfg);

    assert_eq!(context.presets().len(), 1);
    assert_eq!(
        context.on_block_break(&point(&stone_at(0)), &Actor::default()),
        BreakOutcome::NoPreset
    );
}

#[test]
fn test_listener_cancel_keeps_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(0);
    let mut context = started(config(dir.path()), world(), &clock);
    context.add_listener(|event: &mut regen_core::RegenerationEvent<'_>| {
        event.set_cancelled(true);
    });

    context.on_block_break(&point(&stone_at(0)), &Actor::default());
    let report = context.on_tick(Duration::from_secs(4));
    assert_eq!(report.cancelled, 1);
    assert_eq!(
        context.host().block_at(&stone_at(0)),
        Some(MaterialId::new("BEDROCK"))
    );
}
