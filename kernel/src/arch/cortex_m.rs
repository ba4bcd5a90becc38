//! Cortex-M3/M4 port.
//!
//! The initial-frame layout and exception-priority setup are generalized
//! from the teacher's `os.rs`; the handler plumbing is unified compared to
//! both the teacher and mariOS's `port.c`. Rather than duplicating the
//! register-pop tail between `SVC_Handler` (first task) and `PendSV_Handler`
//! (every later switch), both exception entries in `context_switch.s` share
//! a single "pop r4-r11, set PSP, return" tail that loads from
//! `KERNEL_INCOMING_SP`; `SVC_Handler` just skips the save half that
//! `PendSV_Handler` does first. `load_first_task` reaches `SVC_Handler` the
//! same way mariOS's `startFirstTask` does: by executing `svc 0` from Thread
//! mode, since the shared tail's final `bx lr` only performs an exception
//! return when `lr` holds a genuine `EXC_RETURN` value set by hardware at
//! exception entry, and only real exception entry (not a plain function
//! call) sets that.

use core::ptr::{read_volatile, write_volatile};

use crate::config::INITIAL_FRAME_WORDS;
use crate::error::KernelStartError;
use crate::task::TaskEntry;

use super::Arch;

const SCB_ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const SCB_SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
const ICSR_PENDSVSET: u32 = 1 << 28;

const DUMMY_XPSR: u32 = 0x0100_0000;

unsafe extern "C" {
    fn PendSV_Handler();
    fn SVC_Handler();
}

/// Where `PendSV_Handler` writes the outgoing task's saved stack pointer.
/// Set by `crate::task_yield`/the scheduler glue to the address of the
/// outgoing `Tcb::sp` field before pending PendSV.
#[unsafe(no_mangle)]
pub static mut KERNEL_OUTGOING_SP_WRITEBACK: usize = 0;

/// The incoming task's stack pointer value, read directly by the shared
/// assembly tail. Set by Rust to the already-looked-up `Tcb::sp` value
/// before pending PendSV or issuing `svc 0` for the first task launch.
#[unsafe(no_mangle)]
pub static mut KERNEL_INCOMING_SP: usize = 0;

pub struct CortexM;

impl Arch for CortexM {
    fn init_task_stack(stack: &mut [u32], entry: TaskEntry, trap: TaskEntry) -> usize {
        let top = stack.len();
        let mut i = top;

        i -= 1;
        stack[i] = DUMMY_XPSR;
        i -= 1;
        stack[i] = entry as usize as u32;
        i -= 1;
        stack[i] = trap as usize as u32; // LR
        for _ in 0..5 {
            // R12, R3, R2, R1, R0
            i -= 1;
            stack[i] = 0;
        }
        for _ in 0..8 {
            // R11..R4
            i -= 1;
            stack[i] = 0;
        }
        debug_assert_eq!(top - i, INITIAL_FRAME_WORDS);

        &stack[i] as *const u32 as usize
    }

    fn configure_systick(period_ms: u32, core_clock_hz: u32) -> Result<u32, KernelStartError> {
        if period_ms == 0 {
            return Err(KernelStartError::TimerConfig);
        }
        let ticks_per_ms = core_clock_hz / 1_000;
        if ticks_per_ms == 0 {
            return Err(KernelStartError::TimerConfig);
        }
        let reload = ticks_per_ms
            .checked_mul(period_ms)
            .and_then(|t| t.checked_sub(1))
            .ok_or(KernelStartError::TimerConfig)?;
        if reload > 0x00FF_FFFF {
            return Err(KernelStartError::TimerConfig);
        }

        let syst = cortex_m::peripheral::SYST::PTR;
        unsafe {
            (*syst).csr.write(0);
            (*syst).rvr.write(reload);
            (*syst).cvr.write(0);
            (*syst).csr.write(0b111); // ENABLE | TICKINT | CLKSOURCE
        }
        Ok(ticks_per_ms)
    }

    fn set_exception_priorities() {
        unsafe {
            let mut v = read_volatile(SCB_SHPR3);
            v &= !((0xFFu32 << 16) | (0xFFu32 << 24));
            v |= (0xFFu32 << 16) | (0xF0u32 << 24); // PendSV lowest, SysTick one above
            write_volatile(SCB_SHPR3, v);
        }
    }

    fn request_context_switch() {
        unsafe {
            write_volatile(SCB_ICSR, ICSR_PENDSVSET);
        }
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn load_first_task(sp: usize) -> ! {
        unsafe {
            KERNEL_INCOMING_SP = sp;
            core::arch::asm!("svc 0", options(nomem, nostack, preserves_flags));
        }
        unreachable!("SVC_Handler never returns to its caller");
    }
}

#[cortex_m_rt::exception]
fn PendSV() {
    unsafe { PendSV_Handler() };
}

#[cortex_m_rt::exception]
fn SVCall() {
    unsafe { SVC_Handler() };
}
