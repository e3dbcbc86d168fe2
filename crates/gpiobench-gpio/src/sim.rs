//! Simulated GPIO board for running the benchmarks without hardware.
//!
//! Outputs can be wired to inputs so a write to an output is immediately
//! visible on the input it is connected to, and a falling input fires the
//! edge handler bound to it on a dispatcher thread, like the real loopback
//! harness. The board also plays the host: it maps a register file, hands out
//! pins and interrupt lines, counts every acquisition and release, and can be
//! told to refuse any of them.

use crate::api::{PinLine, PinPlatform};
use crate::host::GpioHost;
use crate::interrupt::{EdgeKind, InterruptBinding, InterruptController, IrqHandler};
use crate::registers::{RegisterBlock, RegisterMapper, GPCLR0, GPFSEL0, GPLEV0, GPSET0};
use gpiobench_common::{BenchError, BenchResult, Clock, PinId, PinMap, PinMode, Timestamp};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use tracing::{debug, trace, warn};

/// Number of lines on the simulated board.
pub const SIM_PIN_COUNT: u32 = 64;

/// Function-select words covering every line.
const FSEL_WORDS: usize = 7;

/// Something that happened on the board, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    /// A pin was driven to a level.
    Driven {
        /// Pin written.
        pin: PinId,
        /// New level.
        high: bool,
    },
    /// A pin was read through the pin API and found low.
    ObservedLow(PinId),
}

/// Clock that only moves when the board is written.
#[derive(Debug, Default)]
pub struct SimClock {
    ticks: AtomicU64,
    ticks_per_write: u64,
}

impl SimClock {
    /// Clock advancing `ticks_per_write` ticks on every pin write.
    #[must_use]
    pub fn new(ticks_per_write: u64) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            ticks_per_write,
        }
    }

    /// Move the clock forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    fn on_write(&self) {
        if self.ticks_per_write > 0 {
            self.advance(self.ticks_per_write);
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.ticks.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Default)]
struct Faults {
    claim: Option<PinId>,
    direction: Option<PinId>,
    bind: Option<PinId>,
    deny_mapping: bool,
}

/// Pending edges for one bound line.
#[derive(Debug)]
struct IrqLine {
    edge: EdgeKind,
    pending: Mutex<u64>,
    wake: Condvar,
    stop: AtomicBool,
}

impl IrqLine {
    fn raise(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.wake.notify_one();
    }

    fn shut(&self) {
        let _guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop.store(true, Ordering::Release);
        self.wake.notify_all();
    }

    /// Block until an edge is pending or the line is shut.
    fn next(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.stop.load(Ordering::Acquire) {
                return false;
            }
            if *pending > 0 {
                *pending -= 1;
                return true;
            }
            pending = self
                .wake
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Debug)]
struct Board {
    levels: Vec<AtomicBool>,
    fsel: [AtomicU32; FSEL_WORDS],
    wiring: Mutex<HashMap<PinId, PinId>>,
    directions: Mutex<HashMap<PinId, PinMode>>,
    claimed: Mutex<HashSet<PinId>>,
    irq_lines: Mutex<HashMap<PinId, Arc<IrqLine>>>,
    trace: Mutex<Option<Vec<PinEvent>>>,
    faults: Mutex<Faults>,
    clock: Arc<SimClock>,
    claims: AtomicUsize,
    releases: AtomicUsize,
    mappings: AtomicUsize,
    unmaps: AtomicUsize,
    binds: AtomicUsize,
    unbinds: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Board {
    fn level(&self, pin: PinId) -> bool {
        self.levels
            .get(pin.number() as usize)
            .is_some_and(|l| l.load(Ordering::SeqCst))
    }

    fn record(&self, event: PinEvent) {
        if let Some(trace) = lock(&self.trace).as_mut() {
            if trace.last() != Some(&event) {
                trace.push(event);
            }
        }
    }

    /// Drive `pin` and propagate the level across its wire.
    fn drive(&self, pin: PinId, high: bool) {
        let Some(cell) = self.levels.get(pin.number() as usize) else {
            return;
        };
        self.clock.on_write();
        cell.store(high, Ordering::SeqCst);
        self.record(PinEvent::Driven { pin, high });

        let wired = lock(&self.wiring).get(&pin).copied();
        if let Some(input) = wired {
            if let Some(cell) = self.levels.get(input.number() as usize) {
                let was = cell.swap(high, Ordering::SeqCst);
                if was != high {
                    self.edge(input, high);
                }
            }
        }
    }

    fn edge(&self, pin: PinId, level: bool) {
        let line = lock(&self.irq_lines).get(&pin).cloned();
        if let Some(line) = line {
            if line.edge.matches(level) {
                trace!(pin = pin.number(), level, "simulated edge");
                line.raise();
            }
        }
    }
}

/// A simulated board with loopback wiring and failure injection.
///
/// Cloning yields another handle to the same board.
#[derive(Debug, Clone)]
pub struct SimBoard {
    board: Arc<Board>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    /// Unwired board whose clock advances one tick per pin write.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ticks_per_write(1)
    }

    /// Unwired board whose clock advances `ticks` per pin write.
    #[must_use]
    pub fn with_ticks_per_write(ticks: u64) -> Self {
        Self {
            board: Arc::new(Board {
                levels: (0..SIM_PIN_COUNT).map(|_| AtomicBool::new(false)).collect(),
                fsel: Default::default(),
                wiring: Mutex::new(HashMap::new()),
                directions: Mutex::new(HashMap::new()),
                claimed: Mutex::new(HashSet::new()),
                irq_lines: Mutex::new(HashMap::new()),
                trace: Mutex::new(None),
                faults: Mutex::new(Faults::default()),
                clock: Arc::new(SimClock::new(ticks)),
                claims: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                mappings: AtomicUsize::new(0),
                unmaps: AtomicUsize::new(0),
                binds: AtomicUsize::new(0),
                unbinds: AtomicUsize::new(0),
            }),
        }
    }

    /// Board with both ping-pong pairs of `pins` wired output to input.
    #[must_use]
    pub fn loopback(pins: &PinMap) -> Self {
        let board = Self::new();
        board.wire(pins.out_a, pins.in_a);
        board.wire(pins.out_b, pins.in_b);
        board
    }

    /// Connect `output` to `input`.
    pub fn wire(&self, output: PinId, input: PinId) {
        lock(&self.board.wiring).insert(output, input);
    }

    /// Platform capabilities backed by this board and its clock.
    #[must_use]
    pub fn host(&self) -> GpioHost {
        let clock: Arc<dyn Clock> = self.board.clock.clone();
        self.host_with_clock(clock)
    }

    /// Platform capabilities backed by this board, timed by `clock`.
    #[must_use]
    pub fn host_with_clock(&self, clock: Arc<dyn Clock>) -> GpioHost {
        GpioHost {
            registers: Arc::new(self.clone()),
            pins: Arc::new(self.clone()),
            interrupts: Arc::new(self.clone()),
            clock,
        }
    }

    /// The board's clock.
    #[must_use]
    pub fn clock(&self) -> Arc<SimClock> {
        Arc::clone(&self.board.clock)
    }

    /// Current level of `pin`.
    #[must_use]
    pub fn level(&self, pin: PinId) -> bool {
        self.board.level(pin)
    }

    /// Drive `pin` from outside, as a test stimulus.
    pub fn drive(&self, pin: PinId, high: bool) {
        self.board.drive(pin, high);
    }

    /// Direction last set on a claimed pin.
    #[must_use]
    pub fn direction(&self, pin: PinId) -> Option<PinMode> {
        lock(&self.board.directions).get(&pin).copied()
    }

    /// Start recording pin events, discarding anything recorded before.
    pub fn start_trace(&self) {
        *lock(&self.board.trace) = Some(Vec::new());
    }

    /// Stop recording and return the events.
    #[must_use]
    pub fn take_trace(&self) -> Vec<PinEvent> {
        lock(&self.board.trace).take().unwrap_or_default()
    }

    /// Refuse the claim of `pin`.
    pub fn fail_claim_on(&self, pin: PinId) {
        lock(&self.board.faults).claim = Some(pin);
    }

    /// Refuse setting the direction of `pin`.
    pub fn fail_direction_on(&self, pin: PinId) {
        lock(&self.board.faults).direction = Some(pin);
    }

    /// Refuse binding an interrupt on `pin`.
    pub fn fail_bind_on(&self, pin: PinId) {
        lock(&self.board.faults).bind = Some(pin);
    }

    /// Refuse mapping the register block.
    pub fn deny_mapping(&self) {
        lock(&self.board.faults).deny_mapping = true;
    }

    /// Successful claims so far.
    #[must_use]
    pub fn claims(&self) -> usize {
        self.board.claims.load(Ordering::SeqCst)
    }

    /// Releases so far.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.board.releases.load(Ordering::SeqCst)
    }

    /// Pins claimed and not yet released.
    #[must_use]
    pub fn held_pins(&self) -> usize {
        lock(&self.board.claimed).len()
    }

    /// Successful register mappings so far.
    #[must_use]
    pub fn mappings(&self) -> usize {
        self.board.mappings.load(Ordering::SeqCst)
    }

    /// Register unmaps so far.
    #[must_use]
    pub fn unmaps(&self) -> usize {
        self.board.unmaps.load(Ordering::SeqCst)
    }

    /// Successful interrupt bindings so far.
    #[must_use]
    pub fn binds(&self) -> usize {
        self.board.binds.load(Ordering::SeqCst)
    }

    /// Interrupt unbinds so far.
    #[must_use]
    pub fn unbinds(&self) -> usize {
        self.board.unbinds.load(Ordering::SeqCst)
    }
}

impl PinPlatform for SimBoard {
    fn claim_pin(&self, pin: PinId) -> BenchResult<Arc<dyn PinLine>> {
        let fail = |reason: &str| BenchError::PinAcquisition {
            pin: pin.number(),
            reason: reason.into(),
        };
        if lock(&self.board.faults).claim == Some(pin) {
            return Err(fail("injected claim failure"));
        }
        if pin.number() >= SIM_PIN_COUNT {
            return Err(fail("no such line"));
        }
        if !lock(&self.board.claimed).insert(pin) {
            return Err(fail("busy"));
        }
        self.board.claims.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SimLine {
            board: Arc::clone(&self.board),
            pin,
        }))
    }

    fn release_pin(&self, pin: PinId) {
        if lock(&self.board.claimed).remove(&pin) {
            lock(&self.board.directions).remove(&pin);
            self.board.releases.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!(pin = pin.number(), "release of unclaimed simulated pin");
        }
    }

    fn set_direction(&self, pin: PinId, mode: PinMode) -> BenchResult<()> {
        if lock(&self.board.faults).direction == Some(pin) || !lock(&self.board.claimed).contains(&pin) {
            return Err(BenchError::PinConfiguration {
                pin: pin.number(),
                reason: "direction refused".into(),
            });
        }
        lock(&self.board.directions).insert(pin, mode);
        if mode == PinMode::Output {
            self.board.drive(pin, true);
        }
        Ok(())
    }
}

/// One claimed simulated pin.
#[derive(Debug)]
struct SimLine {
    board: Arc<Board>,
    pin: PinId,
}

impl PinLine for SimLine {
    fn get(&self) -> bool {
        let level = self.board.level(self.pin);
        if !level {
            self.board.record(PinEvent::ObservedLow(self.pin));
        }
        level
    }

    fn set(&self, high: bool) {
        self.board.drive(self.pin, high);
    }
}

/// Register file view of a [`SimBoard`].
#[derive(Debug)]
struct SimRegisters {
    board: Arc<Board>,
}

impl RegisterBlock for SimRegisters {
    fn read(&self, index: usize) -> u32 {
        match index {
            i if (GPFSEL0..GPFSEL0 + FSEL_WORDS).contains(&i) => {
                self.board.fsel[i - GPFSEL0].load(Ordering::SeqCst)
            }
            GPLEV0 | 14 => {
                let bank = (index - GPLEV0) as u32;
                (0..32).fold(0, |word, bit| {
                    if self.board.level(PinId(bank * 32 + bit)) {
                        word | 1 << bit
                    } else {
                        word
                    }
                })
            }
            _ => 0,
        }
    }

    fn write(&self, index: usize, value: u32) {
        let (bank, high) = match index {
            i if (GPFSEL0..GPFSEL0 + FSEL_WORDS).contains(&i) => {
                self.board.fsel[i - GPFSEL0].store(value, Ordering::SeqCst);
                return;
            }
            GPSET0 | 8 => ((index - GPSET0) as u32, true),
            GPCLR0 | 11 => ((index - GPCLR0) as u32, false),
            _ => return,
        };
        for bit in (0..32).filter(|b| value & (1 << b) != 0) {
            self.board.drive(PinId(bank * 32 + bit), high);
        }
    }
}

impl Drop for SimRegisters {
    fn drop(&mut self) {
        self.board.unmaps.fetch_add(1, Ordering::SeqCst);
        debug!("simulated register block unmapped");
    }
}

impl RegisterMapper for SimBoard {
    fn map_register_block(&self, base: u64, len: usize) -> BenchResult<Box<dyn RegisterBlock>> {
        if lock(&self.board.faults).deny_mapping {
            return Err(BenchError::ResourceMapping {
                base,
                len,
                reason: "permission denied".into(),
            });
        }
        self.board.mappings.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimRegisters {
            board: Arc::clone(&self.board),
        }))
    }
}

impl InterruptController for SimBoard {
    fn bind_interrupt(
        &self,
        pin: PinId,
        edge: EdgeKind,
        handler: IrqHandler,
    ) -> BenchResult<InterruptBinding> {
        let fail = |reason: String| BenchError::InterruptBinding {
            pin: pin.number(),
            reason,
        };
        if lock(&self.board.faults).bind == Some(pin) {
            return Err(fail("injected bind failure".into()));
        }

        let line = Arc::new(IrqLine {
            edge,
            pending: Mutex::new(0),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        {
            let mut lines = lock(&self.board.irq_lines);
            if lines.contains_key(&pin) {
                return Err(fail("already bound".into()));
            }
            lines.insert(pin, Arc::clone(&line));
        }

        let dispatcher = {
            let line = Arc::clone(&line);
            thread::Builder::new()
                .name(format!("sim-irq-{}", pin.number()))
                .spawn(move || {
                    while line.next() {
                        handler();
                    }
                })
        };
        let dispatcher = match dispatcher {
            Ok(handle) => handle,
            Err(e) => {
                lock(&self.board.irq_lines).remove(&pin);
                return Err(fail(format!("dispatcher thread: {e}")));
            }
        };
        self.board.binds.fetch_add(1, Ordering::SeqCst);

        let board = Arc::clone(&self.board);
        Ok(InterruptBinding::new(pin, move || {
            lock(&board.irq_lines).remove(&pin);
            line.shut();
            if dispatcher.join().is_err() {
                warn!(pin = pin.number(), "simulated dispatcher panicked");
            }
            board.unbinds.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
