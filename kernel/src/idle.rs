//! The idle task and the CPU-idle percentage it reports.
//!
//! mariOS's header declared `marios_get_idle_percentage()` but the
//! retrieved sources never carried the function body, so the accounting
//! scheme here is reconstructed from the declaration's contract ("percentage
//! of ticks spent idle since the last query") rather than ported line for
//! line. It keeps a running count of ticks in which the idle task was the
//! active task and resets that count each time it is read, so repeated
//! queries report the idle fraction of the *interval between queries*
//! rather than a lifetime average that would flatten out over a long uptime.

/// Integer-percentage idle accounting. `sample()` is called once per tick
/// with whether the idle task was the one running; `percentage()` drains the
/// window and returns a 0-100 value, rounded to the nearest whole percent.
#[derive(Default)]
pub struct IdleStats {
    idle_ticks: u32,
    total_ticks: u32,
}

impl IdleStats {
    pub const fn new() -> Self {
        IdleStats {
            idle_ticks: 0,
            total_ticks: 0,
        }
    }

    pub fn sample(&mut self, was_idle: bool) {
        self.total_ticks = self.total_ticks.saturating_add(1);
        if was_idle {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
        }
    }

    /// Returns the idle percentage over the window since the last call and
    /// resets the window. Returns 0 if no ticks have elapsed yet, rather
    /// than dividing by zero.
    pub fn percentage(&mut self) -> u8 {
        if self.total_ticks == 0 {
            return 0;
        }
        let pct = (self.idle_ticks * 100 + self.total_ticks / 2) / self.total_ticks;
        self.idle_ticks = 0;
        self.total_ticks = 0;
        pct.min(100) as u8
    }
}

/// Body of the idle task: spins yielding the rest of the current tick. Real
/// hardware targets may substitute a `wfi` here; that's an architecture
/// concern, not a scheduler one, so it isn't baked in.
pub unsafe extern "C" fn idle_task_entry() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
