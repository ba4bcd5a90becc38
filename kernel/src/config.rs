//! Compile-time configuration constants.
//!
//! Generalizes the teacher's `os_config.rs` (which hard-coded `MAX_TASK`,
//! stack sizes and SRAM addresses for one STM32F407 image) into constants a
//! target image tunes without touching scheduler code.

/// Maximum number of tasks, including the idle task at index 0. Matches
/// mariOS's `MARIOS_CONFIG_MAX_TASKS`. Must stay `<= 16` so a `u16` bitmap
/// can track per-task queue waiters (see `queue::WaiterSet`).
pub const MAX_TASKS: usize = 10;

/// Minimum stack a user task may request, in 32-bit words. Matches mariOS's
/// `MARIOS_MINIMUM_TASK_STACK_SIZE`.
pub const MIN_TASK_STACK_WORDS: usize = 40;

/// Minimum stack reserved for the idle task. mariOS gives idle a few extra
/// words over the general minimum.
pub const IDLE_TASK_STACK_WORDS: usize = MIN_TASK_STACK_WORDS + 4;

/// Highest task priority accepted by `task_create`. Matches mariOS's
/// `MARIOS_MAXIMUM_PRIORITY`. Priority 0 is reserved for the idle task.
pub const MAX_PRIORITY: u8 = 100;

/// Words of stack consumed by the initial exception frame seeded by
/// `task_create`: 8 callee-saved registers (r4-r11) plus the 8 registers
/// popped automatically on exception return (r0-r3, r12, lr, pc, xpsr).
pub const INITIAL_FRAME_WORDS: usize = 16;

/// Fallback milliseconds-to-ticks divisor used only before `kernel_start`
/// has recorded the real configured tick rate. mariOS's CMSIS shim uses a
/// divisor like this unconditionally, which the design notes flag as a bug
/// once the timer is reconfigured; `rtos_kernel` only falls back to it for
/// period conversions requested before `kernel_start` runs.
pub const DEFAULT_TICKS_PER_MS: u32 = 1;
