//! Recovery ladder and navigator behavior against the fake world.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{stone, FakeWorld};
use quarry::navigator::{NavMode, Navigator};
use quarry::timing::AdaptiveTiming;
use quarry::{
    BlockPos, EventBus, MinerError, QuarryEvent, RecoverySystem, SharedEventBus, StuckReason,
    Vec3,
};

fn recovery_under_test(
    world: &Arc<FakeWorld>,
) -> (Arc<RecoverySystem>, AdaptiveTiming, SharedEventBus) {
    let bus = EventBus::new().shared();
    let timing = AdaptiveTiming::new(Arc::clone(world) as _);
    let recovery = RecoverySystem::new(world.collaborators(), timing.clone(), Arc::clone(&bus));
    (recovery, timing, bus)
}

/// Put the agent inside a stone block at its feet.
fn bury(world: &FakeWorld, pos: BlockPos) {
    world.set_block(pos, stone());
    world.overlaps.lock().unwrap().push(pos);
}

#[tokio::test(start_paused = true)]
async fn test_triggers_inside_cooldown_collapse() {
    let world = FakeWorld::new();
    let (recovery, _timing, bus) = recovery_under_test(&world);
    let mut rx = bus.subscribe();
    bury(&world, BlockPos::new(0, 0, 0));

    recovery.trigger(StuckReason::Suffocation).await;
    recovery.trigger(StuckReason::Stall).await;

    assert_eq!(count_stuck(&mut rx), 1, "second trigger should be dropped");
}

#[tokio::test(start_paused = true)]
async fn test_failed_recovery_escalates_then_clear_deescalates() {
    let world = FakeWorld::new();
    let (recovery, _timing, bus) = recovery_under_test(&world);
    let mut rx = bus.subscribe();
    bury(&world, BlockPos::new(0, 0, 0));

    // Level 0 only clears ahead and jumps; the overlap survives.
    recovery.trigger(StuckReason::Suffocation).await;
    assert_eq!(recovery.level(), 1);

    // Level 1 clears the overlap; recheck passes and de-escalates.
    tokio::time::sleep(Duration::from_secs(5)).await;
    recovery.trigger(StuckReason::Suffocation).await;
    assert_eq!(recovery.level(), 0);
    assert!(world.dug(BlockPos::new(0, 0, 0)));

    let mut saw_unstuck = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, QuarryEvent::Unstuck { .. }) {
            saw_unstuck = true;
        }
    }
    assert!(saw_unstuck);
}

#[tokio::test(start_paused = true)]
async fn test_ladder_never_leaves_bounds_and_emergency_resets() {
    let world = FakeWorld::new();
    let (recovery, _timing, bus) = recovery_under_test(&world);
    let mut rx = bus.subscribe();
    bury(&world, BlockPos::new(0, 0, 0));
    // Digs complete but the world never actually clears.
    world.stubborn.store(true, Ordering::SeqCst);

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        recovery.trigger(StuckReason::Suffocation).await;
        assert!(recovery.level() <= 5);
    }

    while let Ok(event) = rx.try_recv() {
        if let QuarryEvent::Stuck { level, .. } = event {
            assert!(level <= 5);
        }
    }
    // The emergency level abandons the active goal at least once.
    assert!(*world.solver_cancels.lock().unwrap() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_suffocation_monitor_fires_on_persistent_overlap() {
    let world = FakeWorld::new();
    let (recovery, _timing, bus) = recovery_under_test(&world);
    let mut rx = bus.subscribe();
    bury(&world, BlockPos::new(0, 0, 0));

    recovery.enable();
    let stuck = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if let Ok(QuarryEvent::Stuck { reason, .. }) = rx.recv().await {
                return reason;
            }
        }
    })
    .await
    .expect("suffocation should trigger recovery");
    assert_eq!(stuck, StuckReason::Suffocation);
    recovery.disable();
}

#[tokio::test(start_paused = true)]
async fn test_checkpoints_recorded_while_clear() {
    let world = FakeWorld::new();
    let (recovery, _timing, _bus) = recovery_under_test(&world);
    *world.position.lock().unwrap() = Vec3::new(0.5, 64.0, 0.5);

    recovery.checkpoint_here();
    assert_eq!(recovery.last_checkpoint(), Some(Vec3::new(0.5, 64.0, 0.5)));

    // Buried agents never checkpoint.
    bury(&world, BlockPos::new(10, 64, 10));
    *world.position.lock().unwrap() = Vec3::new(10.5, 64.0, 10.5);
    recovery.checkpoint_here();
    assert_eq!(recovery.last_checkpoint(), Some(Vec3::new(0.5, 64.0, 0.5)));
}

#[tokio::test(start_paused = true)]
async fn test_navigator_times_out_and_cancels_solver() {
    let world = FakeWorld::new();
    let (recovery, timing, _bus) = recovery_under_test(&world);
    world.solver_hangs.store(true, Ordering::SeqCst);

    let navigator = Navigator::new(world.collaborators(), timing, Arc::clone(&recovery));
    let result = navigator
        .goto_near(Vec3::new(500.0, 64.0, 500.0), 2.0, NavMode::Mining)
        .await;

    assert!(matches!(result, Err(MinerError::PathTimeout { .. })));
    assert!(*world.solver_cancels.lock().unwrap() >= 1);
    // The drop guard released everything.
    assert!(world.controls.lock().unwrap().is_empty());
    assert!(!recovery.goal_active());
}

#[tokio::test(start_paused = true)]
async fn test_navigator_completes_and_releases_goal_flag() {
    let world = FakeWorld::new();
    let (recovery, timing, _bus) = recovery_under_test(&world);

    let navigator = Navigator::new(world.collaborators(), timing, Arc::clone(&recovery));
    navigator
        .goto_near(Vec3::new(12.0, 64.0, -7.0), 2.0, NavMode::Travel)
        .await
        .unwrap();

    assert_eq!(*world.position.lock().unwrap(), Vec3::new(12.0, 64.0, -7.0));
    assert!(!recovery.goal_active());
}

fn count_stuck(rx: &mut tokio::sync::broadcast::Receiver<QuarryEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, QuarryEvent::Stuck { .. }) {
            count += 1;
        }
    }
    count
}
