//! Host simulation of the architecture port, used so `lib.rs`'s glue code
//! can be exercised by `cargo test` on the development machine instead of
//! only on real hardware. Mirrors `cortex_m`'s contract without touching any
//! memory-mapped register.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::INITIAL_FRAME_WORDS;
use crate::error::KernelStartError;
use crate::task::TaskEntry;

use super::Arch;

/// Set by `request_context_switch`, cleared by test code that wants to
/// observe whether a switch was requested.
pub static SWITCH_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Stands in for the real systick reload register so tests can check what
/// rate `kernel_start` computed.
pub static LAST_CONFIGURED_TICKS_PER_MS: AtomicU32 = AtomicU32::new(0);

pub struct TestArch;

impl Arch for TestArch {
    fn init_task_stack(stack: &mut [u32], entry: TaskEntry, trap: TaskEntry) -> usize {
        let top = stack.len();
        let mut i = top;
        for _ in 0..INITIAL_FRAME_WORDS {
            i -= 1;
            stack[i] = 0;
        }
        // Record the entry and trap points at fixed offsets so a test
        // harness could, in principle, recover them; real hardware reads
        // them off the stack on exception return/return-from-entry, which
        // this crate never simulates.
        stack[top - INITIAL_FRAME_WORDS] = entry as usize as u32;
        stack[top - INITIAL_FRAME_WORDS + 1] = trap as usize as u32;
        &stack[i] as *const u32 as usize
    }

    fn configure_systick(period_ms: u32, core_clock_hz: u32) -> Result<u32, KernelStartError> {
        if period_ms == 0 || core_clock_hz < 1_000 {
            return Err(KernelStartError::TimerConfig);
        }
        let ticks_per_ms = core_clock_hz / 1_000;
        LAST_CONFIGURED_TICKS_PER_MS.store(ticks_per_ms, Ordering::SeqCst);
        Ok(ticks_per_ms)
    }

    fn set_exception_priorities() {}

    fn request_context_switch() {
        SWITCH_REQUESTED.store(true, Ordering::SeqCst);
    }

    fn load_first_task(_sp: usize) -> ! {
        panic!("TestArch::load_first_task is not meant to actually transfer control in host tests");
    }
}
