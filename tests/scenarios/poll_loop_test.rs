//! Polling ping-pong scenarios driven directly through `PollLoop`.

use crossbeam_utils::sync::WaitGroup;
use gpiobench_common::{Clock, PinMap, RealtimeConfig, ResultBoard, Scenario};
use gpiobench_gpio::sim::{PinEvent, SimBoard};
use gpiobench_gpio::{ApiAccess, PinAccess};
use gpiobench_runtime::{PollLoop, RunEpoch, Worker};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Run {
    board: SimBoard,
    pins: PinMap,
    access: Arc<dyn PinAccess>,
    results: Arc<ResultBoard>,
    epoch: Arc<RunEpoch>,
}

fn prepare() -> Run {
    let pins = PinMap::default();
    let board = SimBoard::loopback(&pins);
    let access: Arc<dyn PinAccess> = Arc::new(ApiAccess::new(Arc::new(board.clone())));
    for role in PinMap::READ_WRITE_ROLES {
        access.configure(pins.pin(role), role.mode()).unwrap();
    }
    Run {
        board,
        pins,
        access,
        results: Arc::new(ResultBoard::new()),
        epoch: Arc::new(RunEpoch::new()),
    }
}

fn launch(run: &Run, iterations: u64, yield_cpu: bool) -> (Worker, Worker) {
    let clock = run.board.host().clock;
    let poll = PollLoop::new(
        Arc::clone(&run.access),
        run.pins,
        iterations,
        yield_cpu,
        Arc::clone(&run.epoch),
        Arc::clone(&clock),
        Arc::clone(&run.results),
    );
    let (a, b) = poll.spawn(None, &RealtimeConfig::default()).unwrap();
    let ready = WaitGroup::new();
    a.start(ready.clone());
    b.start(ready.clone());
    ready.wait();

    run.epoch.mark(clock.now());
    run.access.clear(run.pins.out_a);
    (a, b)
}

fn join_both(a: Worker, b: Worker) {
    assert!(b.join());
    let deadline = Instant::now() + Duration::from_secs(10);
    while !a.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(a.join());
}

#[test]
fn test_out_a_rises_only_after_in_a_seen_low() {
    let run = prepare();
    run.board.start_trace();
    let (a, b) = launch(&run, 100, false);
    join_both(a, b);

    let trace = run.board.take_trace();
    let mut seen_low = false;
    let mut rises = 0;
    for event in trace {
        match event {
            PinEvent::ObservedLow(pin) if pin == run.pins.in_a => seen_low = true,
            PinEvent::Driven { pin, high: true } if pin == run.pins.out_a => {
                assert!(seen_low, "OutA raised without InA observed low");
                seen_low = false;
                rises += 1;
            }
            _ => {}
        }
    }
    assert!(rises >= 100);
}

#[test]
fn test_worker_b_stops_a_once() {
    let run = prepare();
    let (a, b) = launch(&run, 5, false);
    let stop_a = a.stop_handle();
    join_both(a, b);

    let report = run.results.find(Scenario::PollingReadWrite).unwrap();
    assert_eq!(report.iterations, 5);
    assert_eq!(stop_a.signal_count(), 1);
    assert_eq!(run.results.len(), 1);
}

#[test]
fn test_yielding_poll_completes() {
    let run = prepare();
    let (a, b) = launch(&run, 50, true);
    join_both(a, b);

    let report = run.results.find(Scenario::PollingReadWrite).unwrap();
    assert_eq!(report.iterations, 50);
    assert!(report.hz.is_some());
}
