//! End-to-end session behaviour with scripted input and screen.

use chrono::{DateTime, TimeZone, Utc};
use click_latency::core::Clock;
use click_latency::capture::{CaptureError, Frame, FrameSource, Region};
use click_latency::collector::{
    ClickEvent, ClickSource, CollectorError, InputEvent, InputSubscriber, Key, KeyEvent,
    MouseButton, Transition,
};
use click_latency::config::Config;
use click_latency::core::{
    DetectError, DetectorSettings, DiffEngine, ManualClock, Mode, Outcome, ReportSink,
    ResponseDetector, Session, SessionError, StopSignal,
};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WIDTH: u32 = 100;
const HEIGHT: u32 = 10;

type Hub = Arc<Mutex<Option<Arc<dyn InputSubscriber>>>>;

fn start() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

fn left_down(at: DateTime<Utc>) -> InputEvent {
    let mut click = ClickEvent::new(MouseButton::Left, Transition::Down, None);
    click.timestamp = at;
    InputEvent::Click(click)
}

fn escape(at: DateTime<Utc>) -> InputEvent {
    let mut key = KeyEvent::new(Key::Escape, true);
    key.timestamp = at;
    InputEvent::Key(key)
}

fn deliver(hub: &Hub, event: InputEvent) {
    let subscriber = hub.lock().unwrap().clone();
    if let Some(subscriber) = subscriber {
        subscriber.on_event(event);
    }
}

/// Click source that replays a fixed set of events on subscribe.
struct ScriptedClicks {
    hub: Hub,
    initial: Vec<InputEvent>,
    subscriptions: Arc<AtomicU32>,
    unsubscribed: Arc<AtomicBool>,
}

impl ScriptedClicks {
    fn new(hub: Hub, initial: Vec<InputEvent>) -> Self {
        Self {
            hub,
            initial,
            subscriptions: Arc::new(AtomicU32::new(0)),
            unsubscribed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ClickSource for ScriptedClicks {
    fn subscribe(&mut self, subscriber: Arc<dyn InputSubscriber>) -> Result<(), CollectorError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.hub.lock().unwrap() = Some(subscriber);
        for event in self.initial.drain(..) {
            deliver(&self.hub, event);
        }
        Ok(())
    }

    fn unsubscribe(&mut self) {
        *self.hub.lock().unwrap() = None;
        self.unsubscribed.store(true, Ordering::SeqCst);
    }
}

/// Input injected while a frame is being captured, stamped at capture time.
#[derive(Clone, Copy)]
enum Inject {
    Click,
    StopKey,
}

struct Step {
    result: Result<u32, CaptureError>,
    inject: Vec<Inject>,
}

fn ok(changed: u32) -> Step {
    Step {
        result: Ok(changed),
        inject: Vec::new(),
    }
}

fn fail() -> Step {
    Step {
        result: Err(CaptureError::Backend("display busy".into())),
        inject: Vec::new(),
    }
}

impl Step {
    fn then(mut self, inject: Inject) -> Self {
        self.inject.push(inject);
        self
    }
}

/// Screen whose frames have `changed` white pixels out of 1000; the last
/// frame repeats once the script runs out.
struct ScriptedScreen {
    clock: Arc<ManualClock>,
    hub: Hub,
    script: VecDeque<Step>,
    last: u32,
    stamps: Vec<DateTime<Utc>>,
    injected_clicks: Vec<DateTime<Utc>>,
}

impl ScriptedScreen {
    fn new(clock: Arc<ManualClock>, hub: Hub, script: Vec<Step>) -> Self {
        Self {
            clock,
            hub,
            script: script.into(),
            last: 0,
            stamps: Vec::new(),
            injected_clicks: Vec::new(),
        }
    }

    fn calls(&self) -> usize {
        self.stamps.len()
    }
}

impl FrameSource for ScriptedScreen {
    fn capture(&mut self, _region: &Region) -> Result<Frame, CaptureError> {
        let stamped = self.clock.now();
        self.stamps.push(stamped);
        self.clock.advance(Duration::from_millis(5));

        let step = self.script.pop_front().unwrap_or_else(|| ok(self.last));
        for inject in step.inject {
            match inject {
                Inject::Click => {
                    self.injected_clicks.push(stamped);
                    deliver(&self.hub, left_down(stamped));
                }
                Inject::StopKey => deliver(&self.hub, escape(stamped)),
            }
        }

        let changed = step.result?;
        self.last = changed;
        let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
            if y * WIDTH + x < changed {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        Ok(Frame::new(image, stamped))
    }
}

#[derive(Default)]
struct RecordingSink {
    outcomes: Vec<(Mode, Outcome)>,
    failures: Vec<(Mode, DateTime<Utc>)>,
}

impl ReportSink for RecordingSink {
    fn outcome(&mut self, mode: Mode, outcome: &Outcome) {
        self.outcomes.push((mode, *outcome));
    }

    fn cycle_failed(&mut self, mode: Mode, t1: DateTime<Utc>, error: &DetectError) {
        assert!(matches!(error, DetectError::Capture(_)));
        self.failures.push((mode, t1));
    }
}

fn detector() -> ResponseDetector {
    let config = Config {
        timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(100),
        capture_retry_delay: Duration::from_millis(1),
        ..Config::default()
    };
    ResponseDetector::new(
        DetectorSettings::from_config(&config).unwrap(),
        DiffEngine::default(),
    )
}

struct Harness {
    clock: Arc<ManualClock>,
    hub: Hub,
}

impl Harness {
    fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(start())),
            hub: Arc::new(Mutex::new(None)),
        }
    }

    fn screen(&self, script: Vec<Step>) -> ScriptedScreen {
        ScriptedScreen::new(self.clock.clone(), self.hub.clone(), script)
    }

    fn clicks(&self, initial: Vec<InputEvent>) -> ScriptedClicks {
        ScriptedClicks::new(self.hub.clone(), initial)
    }

    fn session<'a>(
        &self,
        mode: Mode,
        screen: &'a mut ScriptedScreen,
        clicks: ScriptedClicks,
    ) -> Session<&'a mut ScriptedScreen, ScriptedClicks, Arc<ManualClock>> {
        Session::new(
            mode,
            Region::new(0, 0, WIDTH, HEIGHT),
            detector(),
            screen,
            clicks,
            self.clock.clone(),
        )
    }
}

#[test]
fn test_once_measures_first_click_only() {
    let h = Harness::new();
    let mut screen = h.screen(vec![ok(0).then(Inject::Click), ok(0).then(Inject::Click), ok(60)]);
    let clicks = h.clicks(vec![left_down(start())]);
    let unsubscribed = clicks.unsubscribed.clone();
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Once, &mut screen, clicks)
        .run(&mut sink)
        .unwrap();

    assert_eq!(summary.outcomes.len(), 1);
    match summary.outcomes[0] {
        Outcome::Strong { t1, t2, ratio } => {
            assert_eq!(t1, start());
            assert_eq!(t2, screen.stamps[2]);
            assert!((ratio - 0.06).abs() < 1e-12);
        }
        other => panic!("expected a response, got {other:?}"),
    }
    assert_eq!(screen.calls(), 3);
    assert_eq!(sink.outcomes.len(), 1);
    assert_eq!(sink.outcomes[0].0, Mode::Once);
    assert!(unsubscribed.load(Ordering::SeqCst));
}

#[test]
fn test_once_reports_weak_fallback_at_largest_change() {
    let h = Harness::new();
    let mut screen = h.screen(vec![ok(0), ok(15), ok(30), ok(20)]);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Once, &mut screen, h.clicks(vec![left_down(start())]))
        .run(&mut sink)
        .unwrap();

    match summary.outcomes[0] {
        Outcome::WeakFallback {
            t_best, best_ratio, ..
        } => {
            assert_eq!(t_best, screen.stamps[2]);
            assert!((best_ratio - 0.03).abs() < 1e-12);
        }
        other => panic!("expected a weak fallback, got {other:?}"),
    }
}

#[test]
fn test_once_reports_no_change() {
    let h = Harness::new();
    let mut screen = h.screen(vec![ok(0), ok(5)]);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Once, &mut screen, h.clicks(vec![left_down(start())]))
        .run(&mut sink)
        .unwrap();

    assert_eq!(summary.outcomes, vec![Outcome::NoChange { t1: start() }]);
}

#[test]
fn test_once_capture_failure_is_fatal() {
    let h = Harness::new();
    let mut screen = h.screen(vec![Step {
        result: Err(CaptureError::OutOfBounds(Region::new(0, 0, WIDTH, HEIGHT))),
        inject: Vec::new(),
    }]);
    let clicks = h.clicks(vec![left_down(start())]);
    let unsubscribed = clicks.unsubscribed.clone();
    let mut sink = RecordingSink::default();

    let result = h.session(Mode::Once, &mut screen, clicks).run(&mut sink);

    assert!(matches!(
        result,
        Err(SessionError::Capture(CaptureError::OutOfBounds(_)))
    ));
    assert!(sink.outcomes.is_empty());
    assert!(unsubscribed.load(Ordering::SeqCst));
}

#[test]
fn test_once_returns_when_stopped_before_click() {
    let h = Harness::new();
    let mut screen = h.screen(vec![]);
    let stop = StopSignal::new();
    stop.trigger();
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Once, &mut screen, h.clicks(vec![]))
        .with_stop_signal(stop)
        .run(&mut sink)
        .unwrap();

    assert!(summary.outcomes.is_empty());
    assert_eq!(screen.calls(), 0);
}

#[test]
fn test_continuous_click_during_polling_starts_next_cycle() {
    let h = Harness::new();
    let mut screen = h.screen(vec![
        ok(0),
        ok(0).then(Inject::Click),
        ok(60),
        // Second cycle compares against the frame the first one ended on
        ok(60),
        ok(200).then(Inject::StopKey),
    ]);
    let clicks = h.clicks(vec![left_down(start())]);
    let subscriptions = clicks.subscriptions.clone();
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Continuous, &mut screen, clicks)
        .run(&mut sink)
        .unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.outcomes[0].t1(), start());
    assert_eq!(summary.outcomes[1].t1(), screen.injected_clicks[0]);
    assert!(summary.outcomes.iter().all(Outcome::is_strong));
    assert!((summary.outcomes[1].ratio().unwrap() - 0.14).abs() < 1e-12);
    assert_eq!(screen.calls(), 5);
    assert_eq!(summary.superseded_clicks, 0);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
    assert!(sink.outcomes.iter().all(|(mode, _)| *mode == Mode::Continuous));
}

#[test]
fn test_continuous_latest_pending_click_wins() {
    let h = Harness::new();
    let mut screen = h.screen(vec![
        ok(0),
        ok(0).then(Inject::Click),
        ok(60).then(Inject::Click),
        ok(60),
        ok(200).then(Inject::StopKey),
    ]);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(
            Mode::Continuous,
            &mut screen,
            h.clicks(vec![left_down(start())]),
        )
        .run(&mut sink)
        .unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.outcomes[1].t1(), screen.injected_clicks[1]);
    assert_eq!(summary.superseded_clicks, 1);
}

#[test]
fn test_continuous_fresh_baseline_after_weak_cycle() {
    let h = Harness::new();
    // First cycle samples every 105 ms and ends on its twelfth capture,
    // the first one stamped past the one second deadline
    let mut script = vec![ok(0)];
    script.extend((0..8).map(|_| ok(20)));
    script.push(ok(20));
    script.push(ok(20).then(Inject::Click));
    script.push(ok(20));
    // Fresh baseline for the second cycle
    script.push(ok(50));
    script.push(ok(120).then(Inject::StopKey));
    let mut screen = h.screen(script);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(
            Mode::Continuous,
            &mut screen,
            h.clicks(vec![left_down(start())]),
        )
        .run(&mut sink)
        .unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert!(matches!(summary.outcomes[0], Outcome::WeakFallback { .. }));
    assert_eq!(summary.outcomes[1].t1(), screen.injected_clicks[0]);
    assert!((summary.outcomes[1].ratio().unwrap() - 0.07).abs() < 1e-12);
    assert_eq!(screen.calls(), 14);
}

#[test]
fn test_continuous_survives_capture_failure() {
    let h = Harness::new();
    let mut screen = h.screen(vec![
        fail(),
        fail(),
        fail(),
        fail().then(Inject::Click),
        ok(0),
        ok(100).then(Inject::StopKey),
    ]);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(
            Mode::Continuous,
            &mut screen,
            h.clicks(vec![left_down(start())]),
        )
        .run(&mut sink)
        .unwrap();

    assert_eq!(summary.failed_cycles, 1);
    assert_eq!(sink.failures, vec![(Mode::Continuous, start())]);
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].t1(), screen.injected_clicks[0]);
    assert!(summary.outcomes[0].is_strong());
}

#[test]
fn test_continuous_stop_key_before_any_click() {
    let h = Harness::new();
    let mut screen = h.screen(vec![]);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Continuous, &mut screen, h.clicks(vec![escape(start())]))
        .run(&mut sink)
        .unwrap();

    assert!(summary.outcomes.is_empty());
    assert_eq!(screen.calls(), 0);
}

#[test]
fn test_continuous_honours_custom_stop_key() {
    let h = Harness::new();
    let mut screen = h.screen(vec![ok(0), ok(80)]);
    let mut enter = KeyEvent::new(Key::Enter, true);
    enter.timestamp = start();
    let clicks = h.clicks(vec![
        escape(start()),
        left_down(start()),
        InputEvent::Key(enter),
    ]);
    let mut sink = RecordingSink::default();

    let summary = h
        .session(Mode::Continuous, &mut screen, clicks)
        .with_stop_key(Key::Enter)
        .run(&mut sink)
        .unwrap();

    // Stop is checked before the pending click is taken
    assert!(summary.outcomes.is_empty());
    assert_eq!(screen.calls(), 0);
}
