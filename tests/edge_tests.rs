use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use rpi_lgpio::{
    Debouncer, Direction, Edge, Error, Gpio, Level, MockGpioBackend, Numbering, Pull, ShimConfig,
};

const SETTLE: Duration = Duration::from_millis(20);
const REPORT: Duration = Duration::from_millis(80);

fn sample_config() -> ShimConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    serde_json::from_str(
        r#"
        {
            "revision": "c03114",
            "sample_interval_us": 200,
            "broadcast_capacity": 16
        }
        "#,
    )
    .expect("valid sample config")
}

fn input_gpio(mode: Numbering, channel: u32) -> Gpio<MockGpioBackend> {
    let gpio =
        Gpio::new(&sample_config(), Arc::new(MockGpioBackend::default())).expect("mock board");
    gpio.setmode(mode).unwrap();
    gpio.setup(channel, Direction::Input, Pull::Off, None).unwrap();
    gpio
}

fn at(start: Instant, ms: u64) -> Instant {
    start + Duration::from_millis(ms)
}

/// Feeds one sample per millisecond and returns the times edges were reported.
fn run(debouncer: &mut Debouncer, levels: &[Level], start: Instant) -> Vec<(u64, Edge)> {
    levels
        .iter()
        .enumerate()
        .filter_map(|(ms, level)| {
            debouncer
                .sample(*level, at(start, ms as u64))
                .map(|edge| (ms as u64, edge))
        })
        .collect()
}

proptest! {
    #[test]
    fn pulses_narrower_than_window_report_nothing(
        window in 5u64..50,
        pulses in prop::collection::vec((1u64..50, 1u64..50), 1..20),
    ) {
        let mut levels = vec![Level::Low];
        for (high, low) in pulses {
            let high = high.min(window - 1);
            levels.extend(std::iter::repeat_n(Level::High, high as usize));
            levels.extend(std::iter::repeat_n(Level::Low, low as usize));
        }
        let mut debouncer = Debouncer::new(Edge::Both, Duration::from_millis(window));
        prop_assert!(run(&mut debouncer, &levels, Instant::now()).is_empty());
        prop_assert_eq!(debouncer.stable(), Some(Level::Low));
    }

    #[test]
    fn stable_transition_reported_once_after_window(
        window in 0u64..40,
        before in 1u64..30,
        after in 0u64..40,
    ) {
        let mut levels = vec![Level::Low; before as usize];
        levels.extend(std::iter::repeat_n(Level::High, (window + 1 + after) as usize));
        let mut debouncer = Debouncer::new(Edge::Rising, Duration::from_millis(window));
        let reports = run(&mut debouncer, &levels, Instant::now());
        prop_assert_eq!(reports, vec![(before + window, Edge::Rising)]);
        prop_assert_eq!(debouncer.stable(), Some(Level::High));
    }

    #[test]
    fn smaller_window_never_reports_later(
        narrow in 0u64..30,
        extra in 0u64..30,
        levels in prop::collection::vec(any::<bool>(), 1..200),
    ) {
        let levels: Vec<Level> = levels.into_iter().map(Level::from).collect();
        let start = Instant::now();
        let mut fast = Debouncer::new(Edge::Both, Duration::from_millis(narrow));
        let mut slow = Debouncer::new(Edge::Both, Duration::from_millis(narrow + extra));
        let fast_first = run(&mut fast, &levels, start).first().map(|(ms, _)| *ms);
        let slow_first = run(&mut slow, &levels, start).first().map(|(ms, _)| *ms);
        if let Some(slow_ms) = slow_first {
            prop_assert!(fast_first.is_some_and(|fast_ms| fast_ms <= slow_ms));
        }
    }
}

#[test]
fn unmatched_transitions_move_the_baseline_silently() {
    let start = Instant::now();
    let mut debouncer = Debouncer::new(Edge::Rising, Duration::ZERO);
    assert_eq!(debouncer.sample(Level::High, start), None);
    assert_eq!(debouncer.sample(Level::Low, at(start, 1)), None);
    assert_eq!(debouncer.stable(), Some(Level::Low));
    assert_eq!(
        debouncer.sample(Level::High, at(start, 2)),
        Some(Edge::Rising)
    );
}

#[test]
fn reverting_restarts_the_window() {
    let start = Instant::now();
    let window = Duration::from_millis(10);
    let mut debouncer = Debouncer::new(Edge::Falling, window);
    debouncer.sample(Level::High, start);
    assert_eq!(debouncer.sample(Level::Low, at(start, 1)), None);
    assert_eq!(debouncer.sample(Level::High, at(start, 8)), None);
    assert_eq!(debouncer.sample(Level::Low, at(start, 9)), None);
    assert_eq!(debouncer.sample(Level::Low, at(start, 15)), None);
    assert_eq!(
        debouncer.sample(Level::Low, at(start, 19)),
        Some(Edge::Falling)
    );
}

#[test]
fn event_detected_latches_until_read() {
    let gpio = input_gpio(Numbering::Bcm, 17);
    gpio.add_event_detect(17, Edge::Rising, None, None).unwrap();
    assert!(!gpio.event_detected(17).unwrap());
    thread::sleep(SETTLE);

    gpio.backend().chip().drive(17, Level::High);
    thread::sleep(REPORT);
    assert!(gpio.event_detected(17).unwrap());
    assert!(!gpio.event_detected(17).unwrap());

    gpio.backend().chip().drive(17, Level::Low);
    thread::sleep(REPORT);
    assert!(!gpio.event_detected(17).unwrap());
}

#[test]
fn callbacks_run_in_registration_order_with_board_channel() {
    let gpio = input_gpio(Numbering::Board, 11);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let first = calls.clone();
    gpio.add_event_detect(
        11,
        Edge::Both,
        Some(Arc::new(move |channel: u32| {
            first.lock().unwrap().push(format!("first:{channel}"))
        })),
        None,
    )
    .unwrap();
    let second = calls.clone();
    gpio.add_event_callback(11, move |channel| {
        second.lock().unwrap().push(format!("second:{channel}"))
    })
    .unwrap();
    thread::sleep(SETTLE);

    gpio.backend().chip().drive(17, Level::High);
    thread::sleep(REPORT);
    assert_eq!(*calls.lock().unwrap(), vec!["first:11", "second:11"]);
}

fn failing_callback(_channel: u32) {
    panic!("callback failure");
}

#[test]
fn panicking_callback_does_not_stop_the_rest() {
    let gpio = input_gpio(Numbering::Bcm, 27);
    let hits = Arc::new(Mutex::new(0));
    gpio.add_event_detect(
        27,
        Edge::Rising,
        Some(Arc::new(failing_callback)),
        None,
    )
    .unwrap();
    let counter = hits.clone();
    gpio.add_event_callback(27, move |_| *counter.lock().unwrap() += 1).unwrap();
    thread::sleep(SETTLE);

    gpio.backend().chip().drive(27, Level::High);
    thread::sleep(REPORT);
    gpio.backend().chip().drive(27, Level::Low);
    thread::sleep(REPORT);
    gpio.backend().chip().drive(27, Level::High);
    thread::sleep(REPORT);
    assert_eq!(*hits.lock().unwrap(), 2);
}

#[test]
fn bounces_inside_the_window_are_ignored() {
    let gpio = input_gpio(Numbering::Bcm, 22);
    gpio.add_event_detect(22, Edge::Both, None, Some(40)).unwrap();
    thread::sleep(SETTLE);

    let chip = gpio.backend().chip().clone();
    for _ in 0..5 {
        chip.drive(22, Level::High);
        thread::sleep(Duration::from_millis(3));
        chip.drive(22, Level::Low);
        thread::sleep(Duration::from_millis(3));
    }
    thread::sleep(REPORT);
    assert!(!gpio.event_detected(22).unwrap());

    chip.drive(22, Level::High);
    thread::sleep(Duration::from_millis(150));
    assert!(gpio.event_detected(22).unwrap());
}

#[test]
fn wait_for_edge_returns_channel() {
    let gpio = input_gpio(Numbering::Bcm, 5);
    let chip = gpio.backend().chip().clone();
    let driver = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        chip.drive(5, Level::High);
    });

    let seen = gpio
        .wait_for_edge(5, Edge::Rising, None, Some(2000))
        .unwrap();
    driver.join().unwrap();
    assert_eq!(seen, Some(5));
    // the temporary watch is gone
    gpio.add_event_detect(5, Edge::Falling, None, None).unwrap();
}

#[test]
fn wait_for_edge_times_out() {
    let gpio = input_gpio(Numbering::Bcm, 6);
    let started = Instant::now();
    let seen = gpio.wait_for_edge(6, Edge::Both, None, Some(60)).unwrap();
    assert_eq!(seen, None);
    assert!(started.elapsed() >= Duration::from_millis(60));
    gpio.add_event_detect(6, Edge::Both, None, None).unwrap();
}

#[test]
fn concurrent_waiters_are_all_released() {
    let gpio = Arc::new(input_gpio(Numbering::Bcm, 13));
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let gpio = gpio.clone();
            thread::spawn(move || gpio.wait_for_edge(13, Edge::Both, Some(5), Some(3000)))
        })
        .collect();
    thread::sleep(Duration::from_millis(60));

    gpio.backend().chip().drive(13, Level::High);
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().unwrap(), Some(13));
    }
}

#[test]
fn waiting_joins_a_matching_watch_and_keeps_it() {
    let gpio = input_gpio(Numbering::Bcm, 19);
    gpio.add_event_detect(19, Edge::Falling, None, Some(10)).unwrap();
    assert!(matches!(
        gpio.wait_for_edge(19, Edge::Rising, Some(10), Some(50)),
        Err(Error::ConflictingEdge)
    ));
    assert!(matches!(
        gpio.wait_for_edge(19, Edge::Falling, None, Some(50)),
        Err(Error::ConflictingEdge)
    ));
    assert_eq!(
        gpio.wait_for_edge(19, Edge::Falling, Some(10), Some(50)).unwrap(),
        None
    );
    assert!(matches!(
        gpio.add_event_detect(19, Edge::Falling, None, None),
        Err(Error::ConflictingEdge)
    ));
}

#[test]
fn waiting_on_a_watch_with_callbacks_conflicts() {
    let gpio = input_gpio(Numbering::Bcm, 17);
    gpio.add_event_detect(17, Edge::Rising, Some(Arc::new(|_: u32| {})), None).unwrap();
    assert!(matches!(
        gpio.wait_for_edge(17, Edge::Rising, None, Some(30)),
        Err(Error::ConflictingEdge)
    ));

    let gpio = input_gpio(Numbering::Bcm, 18);
    gpio.add_event_detect(18, Edge::Both, None, None).unwrap();
    gpio.add_event_callback(18, |_| {}).unwrap();
    assert!(matches!(
        gpio.wait_for_edge(18, Edge::Both, None, Some(30)),
        Err(Error::ConflictingEdge)
    ));
}

#[test]
fn edge_argument_checks() {
    let gpio = input_gpio(Numbering::Bcm, 20);
    assert!(matches!(
        gpio.add_event_detect(20, Edge::Rising, None, Some(0)),
        Err(Error::InvalidBouncetime)
    ));
    assert!(matches!(
        gpio.wait_for_edge(20, Edge::Rising, Some(0), None),
        Err(Error::InvalidBouncetime)
    ));
    assert!(matches!(
        gpio.wait_for_edge(20, Edge::Rising, None, Some(0)),
        Err(Error::InvalidTimeout)
    ));
    assert!(matches!(
        gpio.add_event_callback(20, |_| {}),
        Err(Error::NoEventDetect)
    ));

    gpio.setup(21, Direction::Output, Pull::Off, None).unwrap();
    assert!(matches!(
        gpio.add_event_detect(21, Edge::Rising, None, None),
        Err(Error::NotInput)
    ));
    assert!(matches!(
        gpio.add_event_detect(16, Edge::Rising, None, None),
        Err(Error::NotInput)
    ));
}

#[test]
fn duplicate_watch_is_rejected() {
    let gpio = input_gpio(Numbering::Bcm, 26);
    gpio.add_event_detect(26, Edge::Rising, None, None).unwrap();
    let err = gpio
        .add_event_detect(26, Edge::Rising, None, None)
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingEdge));

    gpio.remove_event_detect(26).unwrap();
    gpio.remove_event_detect(26).unwrap();
    gpio.add_event_detect(26, Edge::Falling, None, None).unwrap();
}

#[test]
fn reconfiguring_as_output_drops_the_watch() {
    let gpio = input_gpio(Numbering::Bcm, 12);
    gpio.add_event_detect(12, Edge::Both, None, None).unwrap();
    gpio.setup(12, Direction::Output, Pull::Off, None).unwrap();
    gpio.setup(12, Direction::Input, Pull::Off, None).unwrap();
    assert!(matches!(
        gpio.add_event_callback(12, |_| {}),
        Err(Error::NoEventDetect)
    ));
    assert!(!gpio.event_detected(12).unwrap());
}

#[test]
fn subscribers_see_reported_edges() {
    let gpio = input_gpio(Numbering::Bcm, 4);
    let mut events = gpio.subscribe_events();
    gpio.add_event_detect(4, Edge::Both, None, None).unwrap();
    thread::sleep(SETTLE);

    gpio.backend().chip().drive(4, Level::High);
    thread::sleep(REPORT);
    let event = events.try_recv().expect("rising edge event");
    assert_eq!(event.channel, 4);
    assert_eq!(event.edge, Edge::Rising);
    assert!(event.timestamp_ms > 0);
}

#[test]
fn cleanup_removes_watches() {
    let gpio = input_gpio(Numbering::Bcm, 9);
    let hits = Arc::new(Mutex::new(0));
    let counter = hits.clone();
    gpio.add_event_detect(
        9,
        Edge::Both,
        Some(Arc::new(move |_: u32| *counter.lock().unwrap() += 1)),
        None,
    )
    .unwrap();
    thread::sleep(SETTLE);
    gpio.cleanup(None).unwrap();

    gpio.backend().chip().drive(9, Level::High);
    thread::sleep(REPORT);
    assert_eq!(*hits.lock().unwrap(), 0);
}
