use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autosign::config::{ConfigFile, StepSpec};
use autosign::device::{Device, DeviceAction, MockDevice, Point, Rect, TextDetection};
use autosign::engine::{ColorHint, ExecutionContext, StopHandle};
use autosign::errors::StepError;
use autosign::exec::{StepInterpreter, render_screenshot_path, step_percent};
use autosign::task::Task;
use autosign_test_utils::builders::{
    ConfigFileBuilder, StepBuilder, TaskConfigBuilder, button, label, wait_click_text,
};
use autosign_test_utils::{RecordingSink, init_tracing};
use chrono::{Local, TimeZone};
use tokio::time::Instant;

const PKG: &str = "com.example.bbs";

struct Fixture {
    device: MockDevice,
    sink: Arc<RecordingSink>,
    interpreter: StepInterpreter,
    ctx: ExecutionContext,
    cfg: ConfigFile,
}

fn fixture(cfg: ConfigFile) -> Fixture {
    init_tracing();
    let device = MockDevice::new();
    let sink = Arc::new(RecordingSink::new());
    let interpreter =
        StepInterpreter::new(Device::from_backend(Arc::new(device.clone())), &cfg.settings);
    let ctx = ExecutionContext::new(StopHandle::new(), sink.clone());
    Fixture {
        device,
        sink,
        interpreter,
        ctx,
        cfg,
    }
}

fn default_fixture() -> Fixture {
    fixture(ConfigFileBuilder::new().step_delay_ms(0).build())
}

impl Fixture {
    fn task(&self, steps: Vec<StepSpec>) -> Task {
        let mut builder = TaskConfigBuilder::new(7, "Daily Bonus", PKG);
        for s in steps {
            builder = builder.step(s);
        }
        Task::from_config(&builder.build(), &self.cfg.settings)
    }
}

#[tokio::test(start_paused = true)]
async fn failing_step_aborts_the_rest_of_the_task() {
    let f = default_fixture();
    f.device.show(button("A", Rect::new(0, 0, 100, 100)));
    let task = f.task(vec![
        wait_click_text("A", 1000),
        wait_click_text("Missing", 1000),
        StepBuilder::new("back").build(),
    ]);

    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();

    assert_eq!(failure.step_index, 1);
    assert_eq!(failure.steps_executed, 2);
    assert_eq!(failure.description, "tap Missing");
    assert_eq!(
        failure.error,
        StepError::ElementNotFound {
            selector: r#"text("Missing")"#.to_string(),
            timeout_ms: 1000,
        }
    );
    let actions = f.device.actions();
    assert_eq!(actions.len(), 1);
    assert!(matches!(&actions[0], DeviceAction::ClickElement(el) if el.text == "A"));
    assert!(!actions.contains(&DeviceAction::Back));
    assert_eq!(f.sink.matching("failed").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn non_clickable_element_is_tapped_at_its_center() {
    let f = default_fixture();
    f.device.show(label("Sign In", Rect::new(100, 200, 300, 260)));
    let task = f.task(vec![wait_click_text("Sign In", 1000)]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(f.device.actions(), vec![DeviceAction::Tap { x: 200, y: 230 }]);
}

#[tokio::test(start_paused = true)]
async fn unknown_verb_fails_without_touching_the_device() {
    let f = default_fixture();
    let task = f.task(vec![StepBuilder::new("tap_twice").build()]);

    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();

    match failure.error {
        StepError::ActionDispatch(msg) => assert!(msg.contains("unknown action `tap_twice`")),
        other => panic!("expected ActionDispatch, got {other:?}"),
    }
    assert!(f.device.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_required_field_fails_at_dispatch() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("back").build(),
        StepBuilder::new("wait_click").describe("no selector").build(),
    ]);

    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();

    assert_eq!(failure.step_index, 1);
    match failure.error {
        StepError::ActionDispatch(msg) => assert!(msg.contains("requires `selector`"), "{msg}"),
        other => panic!("expected ActionDispatch, got {other:?}"),
    }
    assert_eq!(f.device.actions(), vec![DeviceAction::Back]);
}

#[tokio::test(start_paused = true)]
async fn malformed_selector_fails_at_dispatch() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("wait_exists")
            .selector("text(Sign In)")
            .build(),
    ]);

    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();
    assert!(matches!(failure.error, StepError::ActionDispatch(_)));
}

#[tokio::test(start_paused = true)]
async fn launch_force_stops_then_launches() {
    let f = default_fixture();
    let task = f.task(vec![StepBuilder::new("launch").timeout(3000).build()]);

    let started = Instant::now();
    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(
        f.device.actions(),
        vec![
            DeviceAction::ForceStop(PKG.to_string()),
            DeviceAction::Launch(PKG.to_string()),
        ]
    );
    assert_eq!(f.device.foreground().as_deref(), Some(PKG));
    // settle (1000) + launch timeout (3000)
    assert_eq!(started.elapsed(), Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn launch_continues_when_force_stop_fails() {
    let f = default_fixture();
    f.device.fail_force_stop(true);
    let task = f.task(vec![StepBuilder::new("launch").timeout(100).build()]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert!(f.device.actions().contains(&DeviceAction::Launch(PKG.to_string())));
    assert_eq!(f.sink.matching("force-stop").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn click_is_a_single_lookup_and_wait_click_polls() {
    let f = default_fixture();
    f.device.show_after(
        button("Later", Rect::new(0, 0, 100, 100)),
        Duration::from_millis(600),
    );

    let click = f.task(vec![
        StepBuilder::new("click")
            .selector(r#"text("Later")"#)
            .timeout(2000)
            .build(),
    ]);
    let started = Instant::now();
    let failure = f.interpreter.run_steps(&click, &f.ctx).await.unwrap_err();
    assert!(matches!(failure.error, StepError::ElementNotFound { .. }));
    assert_eq!(started.elapsed(), Duration::ZERO);

    let wait_click = f.task(vec![wait_click_text("Later", 2000)]);
    f.interpreter.run_steps(&wait_click, &f.ctx).await.unwrap();
    assert!(
        f.device
            .actions()
            .iter()
            .any(|a| matches!(a, DeviceAction::ClickElement(el) if el.text == "Later"))
    );
}

#[tokio::test(start_paused = true)]
async fn wait_exists_does_not_click() {
    let f = default_fixture();
    f.device.show(button("Success", Rect::new(0, 0, 100, 100)));
    let task = f.task(vec![
        StepBuilder::new("wait_exists")
            .selector(r#"text("Success")"#)
            .build(),
    ]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();
    assert!(f.device.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn click_image_taps_the_recognised_text() {
    let f = default_fixture();
    f.device.set_detections(vec![TextDetection {
        label: "立即签到".to_string(),
        confidence: 0.9,
        bounds: Rect::new(0, 1000, 200, 1100),
    }]);
    let task = f.task(vec![StepBuilder::new("click_image").text("签到").build()]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(f.device.actions(), vec![DeviceAction::Tap { x: 100, y: 1050 }]);
}

#[tokio::test(start_paused = true)]
async fn click_image_uses_the_step_retry_count() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("click_image")
            .text("签到")
            .retries(1)
            .build(),
    ]);

    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();

    assert!(matches!(
        failure.error,
        StepError::RecognitionNotFound { attempts: 2, .. }
    ));
    assert_eq!(f.device.detect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn recognition_fallback_policy_rescues_wait_click() {
    let f = fixture(
        ConfigFileBuilder::new()
            .step_delay_ms(0)
            .recognition_fallback(true)
            .build(),
    );
    f.device.set_detections(vec![TextDetection {
        label: "Sign In".to_string(),
        confidence: 0.95,
        bounds: Rect::new(500, 500, 600, 540),
    }]);
    let task = f.task(vec![wait_click_text("Sign In", 400)]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(f.device.actions(), vec![DeviceAction::Tap { x: 550, y: 520 }]);
}

#[tokio::test(start_paused = true)]
async fn without_fallback_policy_recognition_is_not_used() {
    let f = default_fixture();
    f.device.set_detections(vec![TextDetection {
        label: "Sign In".to_string(),
        confidence: 0.95,
        bounds: Rect::new(500, 500, 600, 540),
    }]);
    let task = f.task(vec![wait_click_text("Sign In", 400)]);

    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();

    assert!(matches!(failure.error, StepError::ElementNotFound { .. }));
    assert_eq!(f.device.detect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn swipe_waits_for_duration_plus_settle() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("swipe")
            .swipe([540, 1800], [540, 600])
            .duration(300)
            .build(),
    ]);

    let started = Instant::now();
    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(
        f.device.actions(),
        vec![DeviceAction::Swipe {
            from: Point { x: 540, y: 1800 },
            to: Point { x: 540, y: 600 },
            duration_ms: 300,
        }]
    );
    assert_eq!(started.elapsed(), Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn swipe_up_repeats_across_the_screen() {
    let f = default_fixture();
    f.device.set_screen_size(1080, 2400);
    let task = f.task(vec![StepBuilder::new("swipe_up").count(2).build()]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    let up = DeviceAction::Swipe {
        from: Point { x: 540, y: 1800 },
        to: Point { x: 540, y: 600 },
        duration_ms: 500,
    };
    assert_eq!(f.device.actions(), vec![up.clone(), up]);
}

#[tokio::test(start_paused = true)]
async fn swipe_down_goes_the_other_way() {
    let f = default_fixture();
    let task = f.task(vec![StepBuilder::new("swipe_down").build()]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(
        f.device.actions(),
        vec![DeviceAction::Swipe {
            from: Point { x: 540, y: 600 },
            to: Point { x: 540, y: 1800 },
            duration_ms: 500,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn back_and_home_settle_after_the_key() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("back").build(),
        StepBuilder::new("home").build(),
    ]);

    let started = Instant::now();
    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(f.device.actions(), vec![DeviceAction::Back, DeviceAction::Home]);
    assert_eq!(started.elapsed(), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn inter_step_delay_follows_every_step() {
    let f = fixture(ConfigFileBuilder::new().step_delay_ms(1500).build());
    let task = f.task(vec![
        StepBuilder::new("sleep").duration(100).build(),
        StepBuilder::new("sleep").duration(100).build(),
    ]);

    let started = Instant::now();
    let executed = f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(executed, 2);
    assert_eq!(started.elapsed(), Duration::from_millis(3200));
}

#[tokio::test(start_paused = true)]
async fn per_task_step_delay_overrides_the_default() {
    let f = fixture(ConfigFileBuilder::new().step_delay_ms(1500).build());
    let cfg = TaskConfigBuilder::new(1, "Quick", PKG)
        .step_delay_ms(10)
        .step(StepBuilder::new("sleep").duration(100).build())
        .build();
    let task = Task::from_config(&cfg, &f.cfg.settings);

    let started = Instant::now();
    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_millis(110));
}

#[tokio::test(start_paused = true)]
async fn sleep_is_a_stop_checkpoint() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("sleep").duration(10_000).build(),
        StepBuilder::new("back").build(),
    ]);

    let stop = f.ctx.stop_handle().clone();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.stop();
    });

    let started = Instant::now();
    let failure = f.interpreter.run_steps(&task, &f.ctx).await.unwrap_err();
    stopper.await.unwrap();

    assert_eq!(failure.error, StepError::StoppedByUser);
    assert_eq!(failure.step_index, 0);
    assert_eq!(started.elapsed(), Duration::from_millis(300));
    assert!(f.device.actions().is_empty());
    assert!(f.sink.matching("failed").is_empty());
}

#[tokio::test(start_paused = true)]
async fn input_sets_text_on_the_resolved_element() {
    let f = default_fixture();
    let mut field = label("", Rect::new(0, 0, 500, 80));
    field.id = "com.example:id/search".to_string();
    f.device.show(field.clone());
    let task = f.task(vec![
        StepBuilder::new("input")
            .selector(r#"id("search")"#)
            .text("hello")
            .build(),
    ]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(
        f.device.actions(),
        vec![DeviceAction::SetText {
            element: field,
            text: "hello".to_string(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn screenshot_renders_the_path_template() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("screenshot")
            .path("/sdcard/{task}_{id}.png")
            .build(),
    ]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    assert_eq!(
        f.device.actions(),
        vec![DeviceAction::Screenshot(PathBuf::from("/sdcard/Daily_Bonus_7.png"))]
    );
    assert_eq!(f.sink.matching("screenshot saved").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn click_loop_repeats_until_the_target_disappears() {
    let f = default_fixture();
    f.device
        .show_until_clicked(button("Browse", Rect::new(0, 0, 100, 100)), 3);
    let task = f.task(vec![
        StepBuilder::new("click_loop")
            .selector(r#"text("Browse")"#)
            .dwell(100)
            .build(),
    ]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    let actions = f.device.actions();
    let clicks = actions
        .iter()
        .filter(|a| matches!(a, DeviceAction::ClickElement(_)))
        .count();
    let backs = actions.iter().filter(|a| **a == DeviceAction::Back).count();
    assert_eq!(clicks, 3);
    assert_eq!(backs, 3);
    assert_eq!(f.sink.matching("finished after 3 clicks").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn progress_is_reported_before_each_step() {
    let f = default_fixture();
    let task = f.task(vec![
        StepBuilder::new("back").build(),
        StepBuilder::new("back").build(),
        StepBuilder::new("back").build(),
    ]);

    f.interpreter.run_steps(&task, &f.ctx).await.unwrap();

    let percents: Vec<u8> = f.sink.updates().iter().map(|u| u.percent).collect();
    assert_eq!(percents, vec![30, 50, 70]);
    assert!(f.sink.updates().iter().all(|u| u.color == ColorHint::Running));
    assert_eq!(f.sink.matching("executing step").len(), 3);
}

#[test]
fn step_percent_spans_thirty_to_ninety() {
    assert_eq!(step_percent(0, 1), 30);
    assert_eq!(step_percent(0, 4), 30);
    assert_eq!(step_percent(2, 4), 60);
    assert_eq!(step_percent(3, 4), 75);
    assert_eq!(step_percent(0, 0), 30);
}

#[test]
fn screenshot_template_placeholders() {
    let cfg = ConfigFileBuilder::new().build();
    let task = Task::from_config(
        &TaskConfigBuilder::new(3, "JD/Beans", "com.jd").build(),
        &cfg.settings,
    );
    let now = Local.with_ymd_and_hms(2026, 3, 1, 8, 5, 9).unwrap();

    let path = render_screenshot_path("/sdcard/{task}-{id}-{timestamp}.png", &task, now);

    assert_eq!(path, PathBuf::from("/sdcard/JD_Beans-3-20260301_080509.png"));
}
