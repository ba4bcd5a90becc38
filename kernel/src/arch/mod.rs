//! Architecture port: the handful of operations that touch real CPU state
//! (initial stack frames, exception priorities, the tick timer, and the
//! actual register swap). Everything else in this crate is portable.
//!
//! Two implementations exist: [`cortex_m`] for the real target and
//! [`test_arch`] for host unit tests, selected at compile time so the same
//! `kernel_*` glue in `lib.rs` works on both without `cfg` sprinkled through
//! the scheduling logic itself. On target, `cortex_m::KERNEL_OUTGOING_SP_WRITEBACK`
//! / `KERNEL_INCOMING_SP` are the two pointer-sized slots the shared
//! assembly tail in `context_switch.s` reads and writes.

use crate::task::TaskEntry;

#[cfg(not(test))]
pub mod cortex_m;
#[cfg(test)]
pub mod test_arch;

#[cfg(not(test))]
pub use self::cortex_m::CortexM as Port;
#[cfg(test)]
pub use self::test_arch::TestArch as Port;

/// Everything the scheduler needs from the underlying CPU.
pub trait Arch {
    /// Writes the initial exception frame for a not-yet-run task at the top
    /// of `stack`, returning the stack pointer the context switch should
    /// install. `stack` is the full region the task owns; this writes only
    /// the last [`crate::config::INITIAL_FRAME_WORDS`] words of it. The
    /// stacked link register is seeded with `trap`'s address: if `entry`
    /// ever returns, the exception-return machinery "returns" into `trap`
    /// rather than into whatever garbage address happened to precede the
    /// task on the call stack.
    fn init_task_stack(stack: &mut [u32], entry: TaskEntry, trap: TaskEntry) -> usize;

    /// Configures the tick timer to fire every `period_ms` milliseconds
    /// assuming a `core_clock_hz` core clock. Returns the achieved ticks per
    /// millisecond, which may differ from the nominal rate if the timer's
    /// reload register can't represent it exactly.
    fn configure_systick(period_ms: u32, core_clock_hz: u32) -> Result<u32, crate::error::KernelStartError>;

    /// Sets PendSV to the lowest exception priority and SysTick one step
    /// above it, so a tick never preempts an in-progress context switch.
    fn set_exception_priorities();

    /// Requests an asynchronous context switch (pends PendSV). Safe to call
    /// from task or interrupt context.
    fn request_context_switch();

    /// Transfers control to the first task, given the stack pointer
    /// `init_task_stack` produced for it. Does not return: this replaces the
    /// boot stack with the first task's and never comes back up the call
    /// stack that invoked it.
    fn load_first_task(sp: usize) -> !;
}
