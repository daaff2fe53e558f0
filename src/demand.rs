//! Demand accounting for subscriptions.
//!
//! Every subscription in this crate tracks its downstream demand with a
//! [`Demand`] accumulator and serializes its pump with a [`PumpGuard`]. Both
//! are deliberately tiny lock-free cells; they are also available to driver
//! implementations that need demand-correct publishers (the mock driver uses
//! them for exactly that).

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

/// Saturating 64-bit add. Overflow is detected with the classical sign test.
#[must_use]
pub fn add_no_overflow(x: i64, y: i64) -> i64 {
    let r = x.wrapping_add(y);
    if (x ^ r) & (y ^ r) < 0 { i64::MAX } else { r }
}

/// Cumulative downstream demand, saturating at `i64::MAX`.
///
/// `i64::MAX` means "unbounded" and is a fixed point in both directions:
/// further additions keep it, and per-item consumption skips the decrement.
#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicI64,
}

impl Demand {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requested: AtomicI64::new(0),
        }
    }

    /// Add `n` to the pending demand, saturating at `i64::MAX`.
    pub fn add(&self, n: i64) {
        let _ = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(add_no_overflow(cur, n))
            });
    }

    /// Consume one unit of demand.
    ///
    /// Returns true when demand was available. At `i64::MAX` the counter is
    /// left untouched (unbounded mode is sticky).
    pub fn consume_one(&self) -> bool {
        let prev = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |l| {
                Some(if l == i64::MAX { l } else { (l - 1).max(0) })
            })
            .unwrap_or_else(|prev| prev);
        prev > 0
    }

    /// The pending demand right now.
    #[must_use]
    pub fn current(&self) -> i64 {
        self.requested.load(Ordering::Acquire)
    }
}

const IDLE: u8 = 0b00;
const PUMPING: u8 = 0b01;
const AGAIN: u8 = 0b10;

/// Re-entrancy guard for a subscription pump.
///
/// A subscriber may call `request` synchronously from within `on_next` or
/// `on_subscribe`; without protection that recursion is unbounded. The guard
/// collapses nested (and concurrent) pump attempts into one iterative loop:
/// the owning pump re-runs its body for every attempt that arrived while it
/// was busy, and the nested callers return immediately.
#[derive(Debug, Default)]
pub struct PumpGuard {
    state: AtomicU8,
}

impl PumpGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// Run `body` as the pump, looping while other attempts arrive.
    ///
    /// When another pump already owns this guard the call only flags the
    /// owner to go around again and returns without running `body`.
    pub fn run(&self, mut body: impl FnMut()) {
        if !self.enter() {
            return;
        }
        loop {
            body();
            if !self.exit() {
                return;
            }
        }
    }

    fn enter(&self) -> bool {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & PUMPING == 0 {
                    Some(PUMPING)
                } else {
                    Some(PUMPING | AGAIN)
                }
            })
            .unwrap_or_else(|prev| prev);
        prev & PUMPING == 0
    }

    /// Returns true when the pump must go around again.
    fn exit(&self) -> bool {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & AGAIN != 0 { Some(PUMPING) } else { Some(IDLE) }
            })
            .unwrap_or_else(|prev| prev);
        prev & AGAIN != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn saturating_add_law() {
        assert_eq!(add_no_overflow(1, 2), 3);
        assert_eq!(add_no_overflow(i64::MAX, 1), i64::MAX);
        assert_eq!(add_no_overflow(i64::MAX - 1, 5), i64::MAX);
        assert_eq!(add_no_overflow(i64::MAX, i64::MAX), i64::MAX);
        assert_eq!(add_no_overflow(0, i64::MAX), i64::MAX);
    }

    #[test]
    fn demand_consumes_down_to_zero() {
        let d = Demand::new();
        d.add(2);
        assert!(d.consume_one());
        assert!(d.consume_one());
        assert!(!d.consume_one());
        assert_eq!(d.current(), 0);
    }

    #[test]
    fn unbounded_demand_is_sticky() {
        let d = Demand::new();
        d.add(i64::MAX);
        for _ in 0..1_000 {
            assert!(d.consume_one());
        }
        assert_eq!(d.current(), i64::MAX);

        // Saturation survives further additions too.
        d.add(17);
        assert_eq!(d.current(), i64::MAX);
    }

    #[test]
    fn nested_pump_attempts_collapse_into_one_loop() {
        let guard = PumpGuard::new();
        let depth = Cell::new(0u32);
        let max_depth = Cell::new(0u32);
        let runs = Cell::new(0u32);

        // The body re-enters the guard a few times, as a synchronous
        // downstream calling request from on_next would.
        fn body(guard: &PumpGuard, depth: &Cell<u32>, max_depth: &Cell<u32>, runs: &Cell<u32>) {
            depth.set(depth.get() + 1);
            max_depth.set(max_depth.get().max(depth.get()));
            if runs.get() < 5 {
                runs.set(runs.get() + 1);
                guard.run(|| body(guard, depth, max_depth, runs));
            }
            depth.set(depth.get() - 1);
        }

        guard.run(|| body(&guard, &depth, &max_depth, &runs));

        // One active pump at a time, however often it re-entered.
        assert_eq!(max_depth.get(), 1);
        assert!(runs.get() >= 5);
    }

    #[test]
    fn guard_goes_idle_after_the_loop() {
        let guard = PumpGuard::new();
        let count = Cell::new(0);
        guard.run(|| count.set(count.get() + 1));
        guard.run(|| count.set(count.get() + 1));
        assert_eq!(count.get(), 2);
    }
}
