//! Tick counting and the delay/wake machinery built on top of it.
//!
//! Wakeup comparisons use wrapping signed subtraction rather than a plain
//! `<` against the raw tick counter, so a task can be woken correctly even
//! after the `u32` tick counter wraps (REDESIGN FLAG: the original shim
//! compared tick counts directly and would misbehave for one tick near the
//! wraparound boundary).

use crate::task::{TaskStatus, TaskTable};

/// Advances the tick counter by one and returns it. Called from the SysTick
/// handler; kept separate from the scheduler decision so host tests can
/// drive it without any architecture glue.
pub fn tick(counter: u32) -> u32 {
    counter.wrapping_add(1)
}

/// True once `now` has reached or passed `wake_at`, computed so a wrap of
/// the tick counter doesn't produce a spurious miss or early wake as long as
/// the requested delay was representable in a `u32`.
pub fn tick_reached(now: u32, wake_at: u32) -> bool {
    (now.wrapping_sub(wake_at) as i32) >= 0
}

/// Moves every `Wait`-ing task whose deadline has arrived back to `Ready`.
/// Returns how many tasks were woken, for callers that want to log or count
/// spurious scheduler invocations.
pub fn wake_expired_waiters(table: &mut TaskTable, now: u32) -> usize {
    let mut woken = 0;
    for id in 1..table.len() as u16 {
        if let TaskStatus::Wait { wake_at_tick } = table.status(id) {
            if tick_reached(now, wake_at_tick) {
                table.set_status(id, TaskStatus::Ready);
                woken += 1;
            }
        }
    }
    woken
}

/// Computes the deadline tick for a delay requested `delay_ticks` from now.
/// Callers are expected to special-case `delay_ticks == 0` as a pure no-op
/// (see `crate::delay`) rather than relying on this to round up.
pub fn deadline(now: u32, delay_ticks: u32) -> u32 {
    now.wrapping_add(delay_ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskTable;

    unsafe extern "C" fn dummy() -> ! {
        loop {}
    }

    #[test]
    fn tick_reached_handles_wraparound() {
        let now = 2u32;
        let wake_at = u32::MAX - 1;
        assert!(!tick_reached(1, wake_at));
        assert!(tick_reached(now.wrapping_add(u32::MAX - wake_at), wake_at));
    }

    #[test]
    fn tick_reached_is_false_before_deadline_and_true_after() {
        assert!(!tick_reached(9, 10));
        assert!(tick_reached(10, 10));
        assert!(tick_reached(11, 10));
    }

    #[test]
    fn deadline_adds_the_requested_ticks() {
        assert_eq!(deadline(100, 0), 100);
        assert_eq!(deadline(100, 5), 105);
    }

    #[test]
    fn wake_expired_waiters_flips_only_due_tasks() {
        let mut t = TaskTable::new();
        t.install_idle(dummy, 0);
        let a = t.try_create(dummy, 0, 1, 0).unwrap();
        let b = t.try_create(dummy, 0, 1, 0).unwrap();
        t.set_status(a, TaskStatus::Wait { wake_at_tick: 50 });
        t.set_status(b, TaskStatus::Wait { wake_at_tick: 200 });

        let woken = wake_expired_waiters(&mut t, 50);
        assert_eq!(woken, 1);
        assert_eq!(t.status(a), TaskStatus::Ready);
        assert!(matches!(t.status(b), TaskStatus::Wait { .. }));
    }
}
