use std::sync::Arc;
use std::time::Duration;

use autosign::config::{LifecycleSection, SettingsSection};
use autosign::device::{Device, DeviceAction, MockDevice, Point, Rect};
use autosign::engine::{ExecutionContext, StopHandle};
use autosign::errors::StepError;
use autosign::exec::{LifecycleManager, StepInterpreter};
use autosign::locate::SelectorResolver;
use autosign::task::Task;
use autosign_test_utils::builders::{StepBuilder, TaskConfigBuilder, card, launch};
use autosign_test_utils::{RecordingSink, init_tracing};
use tokio::time::Instant;

const PKG: &str = "com.example.bbs";
const HOST: &str = "org.autojs.autojs6";

fn task_card() -> Rect {
    Rect::new(0, 500, 1080, 1500)
}

fn host_card() -> Rect {
    Rect::new(0, 1600, 1080, 2300)
}

fn manager(device: &MockDevice, settings: &LifecycleSection) -> LifecycleManager {
    let resolver = SelectorResolver::new(Arc::new(device.clone()), Duration::from_millis(200));
    LifecycleManager::new(
        Device::from_backend(Arc::new(device.clone())),
        resolver,
        settings,
    )
}

fn task() -> Task {
    let cfg = TaskConfigBuilder::new(1, "Forum", PKG)
        .label("Daily Bonus")
        .step(StepBuilder::new("back").build())
        .build();
    Task::from_config(&cfg, &SettingsSection::default())
}

fn context() -> (ExecutionContext, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    (ExecutionContext::new(StopHandle::new(), sink.clone()), sink)
}

/// Device in the task's app, with both recent-apps cards present and the
/// host card bringing the host app forward when tapped.
fn device_in_task_app() -> MockDevice {
    let device = MockDevice::new();
    device.set_foreground(Some(PKG));
    device.show(card("Daily Bonus, locked", task_card()));
    device.show(card("AutoJs6", host_card()));
    device.add_tap_target(host_card(), HOST);
    device
}

#[tokio::test(start_paused = true)]
async fn teardown_dismisses_card_and_returns_to_host() {
    init_tracing();
    let device = device_in_task_app();
    let lifecycle = manager(&device, &LifecycleSection::default());
    let (ctx, sink) = context();

    let started = Instant::now();
    let warnings = lifecycle.teardown(&task(), &ctx).await;

    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(
        device.actions(),
        vec![
            DeviceAction::OpenRecents,
            DeviceAction::Swipe {
                from: Point { x: 540, y: 1000 },
                to: Point { x: 540, y: 0 },
                duration_ms: 300,
            },
            DeviceAction::OpenRecents,
            DeviceAction::Tap { x: 540, y: 1950 },
        ]
    );
    assert_eq!(device.foreground().as_deref(), Some(HOST));
    // recents settle, swipe settle, recents settle
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
    assert!(sink.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_card_falls_back_to_home() {
    init_tracing();
    let device = MockDevice::new();
    device.set_foreground(Some(PKG));
    device.show(card("AutoJs6", host_card()));
    device.add_tap_target(host_card(), HOST);
    let lifecycle = manager(&device, &LifecycleSection::default());
    let (ctx, sink) = context();

    let warnings = lifecycle.teardown(&task(), &ctx).await;

    assert_eq!(
        warnings,
        vec![StepError::AppLifecycle(
            "no recent-apps card matching 'Daily Bonus'".to_string()
        )]
    );
    assert_eq!(
        device.actions(),
        vec![
            DeviceAction::OpenRecents,
            DeviceAction::Home,
            DeviceAction::OpenRecents,
            DeviceAction::Tap { x: 540, y: 1950 },
        ]
    );
    assert_eq!(device.foreground().as_deref(), Some(HOST));
    assert_eq!(sink.matching("[Forum] app lifecycle: no recent-apps card").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn card_with_empty_bounds_is_not_swiped() {
    let device = MockDevice::new();
    device.show(card("Daily Bonus", Rect::new(0, 0, 0, 0)));
    device.show(card("AutoJs6", host_card()));
    device.add_tap_target(host_card(), HOST);
    let lifecycle = manager(&device, &LifecycleSection::default());
    let (ctx, _sink) = context();

    let warnings = lifecycle.teardown(&task(), &ctx).await;

    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].to_string().contains("has empty bounds"));
    assert!(
        !device
            .actions()
            .iter()
            .any(|a| matches!(a, DeviceAction::Swipe { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn host_never_confirmed_is_a_warning() {
    init_tracing();
    let device = MockDevice::new();
    device.set_foreground(Some(PKG));
    device.show(card("Daily Bonus", task_card()));
    device.show(card("AutoJs6", host_card()));
    let lifecycle = manager(&device, &LifecycleSection::default());
    let stop = StopHandle::new();

    let started = Instant::now();
    let result = lifecycle.return_to_host(&stop).await;

    assert_eq!(
        result,
        Err(StepError::AppLifecycle(format!(
            "host app {HOST} not in foreground after 5 checks"
        )))
    );
    // recents settle + four waits between five checks
    assert_eq!(started.elapsed(), Duration::from_millis(1000 + 4 * 1500));
}

#[tokio::test(start_paused = true)]
async fn host_already_in_foreground_needs_nothing() {
    let device = MockDevice::new();
    device.set_foreground(Some(HOST));
    let lifecycle = manager(&device, &LifecycleSection::default());

    lifecycle.return_to_host(&StopHandle::new()).await.unwrap();

    assert!(device.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_host_card_is_reported() {
    let device = MockDevice::new();
    let settings = LifecycleSection {
        card_timeout_ms: 400,
        ..LifecycleSection::default()
    };
    let lifecycle = manager(&device, &settings);

    let result = lifecycle.return_to_host(&StopHandle::new()).await;

    assert_eq!(
        result,
        Err(StepError::AppLifecycle(
            "no recent-apps card for host 'AutoJs6'".to_string()
        ))
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_after_stop_still_cleans_up() {
    let device = device_in_task_app();
    let lifecycle = manager(&device, &LifecycleSection::default());
    let (ctx, sink) = context();
    ctx.stop_handle().stop();

    let warnings = lifecycle.teardown(&task(), &ctx).await;

    assert!(
        device
            .actions()
            .iter()
            .any(|a| matches!(a, DeviceAction::Swipe { .. }))
    );
    assert!(device.actions().contains(&DeviceAction::Tap { x: 540, y: 1950 }));
    assert_eq!(
        warnings,
        vec![StepError::AppLifecycle(
            "stop requested before host app was confirmed".to_string()
        )]
    );
    assert_eq!(sink.messages_at(tracing::Level::WARN).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_lifecycle_touches_nothing() {
    let device = device_in_task_app();
    let settings = LifecycleSection {
        enabled: false,
        ..LifecycleSection::default()
    };
    let lifecycle = manager(&device, &settings);
    let (ctx, _sink) = context();

    let warnings = lifecycle.teardown(&task(), &ctx).await;

    assert!(warnings.is_empty());
    assert!(device.actions().is_empty());
    assert_eq!(device.foreground().as_deref(), Some(PKG));
}

#[test]
fn auto_launch_skips_tasks_that_launch_themselves() {
    let device = MockDevice::new();
    let settings = SettingsSection::default();
    let lifecycle = manager(&device, &LifecycleSection::default());

    let plain = task();
    let self_launching = Task::from_config(
        &TaskConfigBuilder::new(2, "Shop", PKG)
            .step(launch(3000))
            .step(StepBuilder::new("back").build())
            .build(),
        &settings,
    );
    assert!(lifecycle.wants_launch(&plain));
    assert!(!lifecycle.wants_launch(&self_launching));

    let off = manager(
        &device,
        &LifecycleSection {
            auto_launch: false,
            ..LifecycleSection::default()
        },
    );
    assert!(!off.wants_launch(&plain));
}

#[tokio::test(start_paused = true)]
async fn launch_goes_through_the_interpreter() {
    let device = MockDevice::new();
    let settings = SettingsSection::default();
    let interpreter = StepInterpreter::new(Device::from_backend(Arc::new(device.clone())), &settings);
    let lifecycle = manager(&device, &LifecycleSection::default());
    let (ctx, _sink) = context();

    let started = Instant::now();
    lifecycle
        .launch(&task(), &interpreter, Duration::from_millis(2000), &ctx)
        .await
        .unwrap();

    assert_eq!(
        device.actions(),
        vec![
            DeviceAction::ForceStop(PKG.to_string()),
            DeviceAction::Launch(PKG.to_string()),
        ]
    );
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
}
