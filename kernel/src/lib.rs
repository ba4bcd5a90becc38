//! Preemptive scheduler, context-switch port and blocking queues for a
//! single Cortex-M3/M4 core.
//!
//! The crate is split the way the algorithms want to be tested: [`task`]
//! and [`sched`] are pure data structures and functions over them, [`queue`]
//! is a pure state machine behind a `critical_section`-guarded cell, and
//! this module is the thin global singleton that wires them to the
//! [`arch`] port and to the exception vector table. `#![no_std]` is lifted
//! under `cfg(test)` so the pure modules' unit tests can run on the host;
//! [`arch::test_arch`] stands in for real hardware there.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod error;
pub mod idle;
pub mod queue;
pub mod sched;
pub mod task;
pub mod timing;

use core::cell::RefCell;

use critical_section::Mutex;

use arch::{Arch, Port};
use config::{DEFAULT_TICKS_PER_MS, IDLE_TASK_STACK_WORDS, MIN_TASK_STACK_WORDS};
use error::KernelStartError;
use idle::IdleStats;
use sched::scheduler_step;
use task::{TaskCreateError, TaskEntry, TaskId, TaskTable, IDLE_TASK_ID};

pub use queue::{Queue, QueueMode, QueueStatus};
pub use sched::SchedulerPolicy;
pub use task::TaskStatus;

struct Kernel {
    tasks: TaskTable,
    policy: SchedulerPolicy,
    ticks: u32,
    ticks_per_ms: u32,
    idle: IdleStats,
    started: bool,
}

impl Kernel {
    const fn new() -> Self {
        Kernel {
            tasks: TaskTable::new(),
            policy: SchedulerPolicy::Priority,
            ticks: 0,
            ticks_per_ms: DEFAULT_TICKS_PER_MS,
            idle: IdleStats::new(),
            started: false,
        }
    }
}

static KERNEL: Mutex<RefCell<Kernel>> = Mutex::new(RefCell::new(Kernel::new()));

/// Stack reserved for the idle task, seeded by [`kernel_init`]. `static mut`
/// because the context-switch assembly walks live stack memory by address;
/// no other code touches it once the kernel has started.
static mut IDLE_STACK: [u32; IDLE_TASK_STACK_WORDS] = [0; IDLE_TASK_STACK_WORDS];

/// Installs the idle task and selects the scheduling policy. Must be called
/// exactly once, before any [`task_create`].
pub fn kernel_init(policy: SchedulerPolicy) {
    critical_section::with(|cs| {
        let mut k = KERNEL.borrow(cs).borrow_mut();
        let sp = unsafe {
            #[allow(static_mut_refs)]
            Port::init_task_stack(&mut IDLE_STACK, idle::idle_task_entry, task_completion)
        };
        k.tasks.install_idle(idle::idle_task_entry, sp);
        k.policy = policy;
    });
}

/// Registers a new task. `stack` must be at least [`config::MIN_TASK_STACK_WORDS`]
/// words; `period_ms` of 0 means aperiodic. Returns the task's ID, used by
/// [`get_task_status`]/[`set_task_status`] and to tell tasks apart in logs.
pub fn task_create(
    entry: TaskEntry,
    stack: &mut [u32],
    priority: u8,
    period_ms: u32,
) -> Result<TaskId, TaskCreateError> {
    if stack.len() < MIN_TASK_STACK_WORDS {
        return Err(TaskCreateError::StackTooSmall);
    }
    let sp = Port::init_task_stack(stack, entry, task_completion);
    critical_section::with(|cs| {
        KERNEL
            .borrow(cs)
            .borrow_mut()
            .tasks
            .try_create(entry, sp, priority, period_ms)
    })
}

/// Configures the tick timer and transfers control to the first task.
/// Never returns.
pub fn kernel_start(tick_period_ms: u32, core_clock_hz: u32) -> ! {
    let ticks_per_ms = Port::configure_systick(tick_period_ms, core_clock_hz)
        .unwrap_or_else(|e| handle_start_error(e));
    Port::set_exception_priorities();

    let sp = critical_section::with(|cs| {
        let mut k = KERNEL.borrow(cs).borrow_mut();
        if k.started {
            handle_start_error(KernelStartError::AlreadyStarted);
        }
        if k.tasks.len() <= 1 {
            handle_start_error(KernelStartError::NoTasks);
        }
        k.ticks_per_ms = ticks_per_ms;
        k.started = true;
        let policy = k.policy;
        let ticks = k.ticks;
        let ticks_per_ms = k.ticks_per_ms;
        let decision = scheduler_step(&mut k.tasks, policy, ticks, ticks_per_ms);
        k.tasks.get(decision.incoming).sp
    });

    Port::load_first_task(sp)
}

fn handle_start_error(_e: KernelStartError) -> ! {
    panic!("kernel_start failed")
}

/// Advances the tick counter, wakes due `Wait`-ing tasks, and requests a
/// context switch if the scheduler picked someone new. Called from the
/// SysTick exception.
pub fn kernel_systick_tick() {
    let switch = critical_section::with(|cs| {
        let mut k = KERNEL.borrow(cs).borrow_mut();
        k.ticks = timing::tick(k.ticks);
        let now = k.ticks;
        timing::wake_expired_waiters(&mut k.tasks, now);

        let was_idle = k.tasks.current() == IDLE_TASK_ID;
        k.idle.sample(was_idle);

        let policy = k.policy;
        let ticks_per_ms = k.ticks_per_ms;
        let decision = scheduler_step(&mut k.tasks, policy, now, ticks_per_ms);
        if decision.changed {
            let outgoing_addr = core::ptr::addr_of_mut!(k.tasks.get_mut(decision.outgoing).sp) as usize;
            let incoming_sp = k.tasks.get(decision.incoming).sp;
            Some((outgoing_addr, incoming_sp))
        } else {
            None
        }
    });

    if let Some((outgoing_addr, incoming_sp)) = switch {
        request_switch(outgoing_addr, incoming_sp);
    }
}

/// Voluntarily gives up the remainder of the current tick. Used by
/// [`queue::Queue`] while a task is suspended waiting for room or data.
pub fn task_yield() {
    let switch = critical_section::with(|cs| {
        let mut k = KERNEL.borrow(cs).borrow_mut();
        let now = k.ticks;
        let policy = k.policy;
        let ticks_per_ms = k.ticks_per_ms;
        let decision = scheduler_step(&mut k.tasks, policy, now, ticks_per_ms);
        if decision.changed {
            let outgoing_addr = core::ptr::addr_of_mut!(k.tasks.get_mut(decision.outgoing).sp) as usize;
            let incoming_sp = k.tasks.get(decision.incoming).sp;
            Some((outgoing_addr, incoming_sp))
        } else {
            None
        }
    });

    if let Some((outgoing_addr, incoming_sp)) = switch {
        request_switch(outgoing_addr, incoming_sp);
    }
}

#[cfg(not(test))]
fn request_switch(outgoing_addr: usize, incoming_sp: usize) {
    unsafe {
        arch::cortex_m::KERNEL_OUTGOING_SP_WRITEBACK = outgoing_addr;
        arch::cortex_m::KERNEL_INCOMING_SP = incoming_sp;
    }
    Port::request_context_switch();
}

#[cfg(test)]
fn request_switch(_outgoing_addr: usize, _incoming_sp: usize) {
    Port::request_context_switch();
}

/// Suspends the current task for `ticks` ticks. `delay(0)` is a true no-op:
/// it returns immediately without yielding, rather than suspending for one
/// tick.
pub fn delay(ticks: u32) {
    if ticks == 0 {
        return;
    }
    critical_section::with(|cs| {
        let mut k = KERNEL.borrow(cs).borrow_mut();
        let id = k.tasks.current();
        let wake_at = timing::deadline(k.ticks, ticks);
        k.tasks.set_status(id, TaskStatus::Wait { wake_at_tick: wake_at });
    });
    task_yield();
}

/// Suspends the current task for at least `ms` milliseconds, converted to
/// ticks at the kernel's configured rate.
pub fn delay_ms(ms: u32) {
    let ticks = critical_section::with(|cs| {
        let k = KERNEL.borrow(cs).borrow();
        sched::period_ticks(ms, k.ticks_per_ms)
    });
    delay(ticks);
}

pub fn current_task_id() -> TaskId {
    critical_section::with(|cs| KERNEL.borrow(cs).borrow().tasks.current())
}

pub fn get_task_status(id: TaskId) -> TaskStatus {
    critical_section::with(|cs| KERNEL.borrow(cs).borrow().tasks.status(id))
}

pub fn set_task_status(id: TaskId, status: TaskStatus) {
    critical_section::with(|cs| KERNEL.borrow(cs).borrow_mut().tasks.set_status(id, status));
}

/// The currently running task's configured period, in ticks (0 if
/// aperiodic).
pub fn get_current_task_period() -> u32 {
    critical_section::with(|cs| {
        let k = KERNEL.borrow(cs).borrow();
        let id = k.tasks.current();
        sched::period_ticks(k.tasks.get(id).period_ms(), k.ticks_per_ms)
    })
}

/// Percentage of ticks spent idle since the last call to this function.
pub fn get_idle_percentage() -> u8 {
    critical_section::with(|cs| KERNEL.borrow(cs).borrow_mut().idle.percentage())
}

/// Trap for a task entry point returning instead of looping forever.
/// mariOS treats this as a fatal error; so do we, since a returned task has
/// nowhere defined to go (its stack frame no longer models a suspended
/// call). Shares [`task::TaskEntry`]'s ABI so its address can be seeded
/// directly into a fresh task's stacked link register by
/// [`arch::Arch::init_task_stack`].
pub unsafe extern "C" fn task_completion() -> ! {
    panic!("task entry point returned");
}

#[cfg(not(test))]
#[cortex_m_rt::exception]
fn SysTick() {
    kernel_systick_tick();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    unsafe extern "C" fn dummy() -> ! {
        loop {}
    }

    /// `KERNEL` is one process-wide singleton; `cargo test` runs test
    /// functions on separate threads by default, so every test that touches
    /// it takes this lock first and starts from a clean slate via
    /// `reset_kernel`.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    fn reset_kernel() {
        critical_section::with(|cs| *KERNEL.borrow(cs).borrow_mut() = Kernel::new());
    }

    #[test]
    fn task_create_rejects_undersized_stack() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        kernel_init(SchedulerPolicy::RoundRobin);
        let mut stack = [0u32; 4];
        assert_eq!(
            task_create(dummy, &mut stack, 1, 0),
            Err(TaskCreateError::StackTooSmall)
        );
    }

    #[test]
    fn idle_percentage_starts_at_zero_with_no_ticks() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        assert_eq!(
            critical_section::with(|cs| KERNEL.borrow(cs).borrow_mut().idle.percentage()),
            0
        );
    }

    #[test]
    fn single_task_delay_suspends_and_resumes_after_exact_ticks() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        kernel_init(SchedulerPolicy::RoundRobin);
        let mut stack = [0u32; MIN_TASK_STACK_WORDS];
        let id = task_create(dummy, &mut stack, 1, 0).unwrap();
        critical_section::with(|cs| {
            let mut k = KERNEL.borrow(cs).borrow_mut();
            k.tasks.set_current(id);
            k.tasks.set_status(id, TaskStatus::Active);
        });

        delay(5);
        assert!(matches!(get_task_status(id), TaskStatus::Wait { .. }));
        assert_eq!(current_task_id(), task::IDLE_TASK_ID);

        for _ in 0..4 {
            kernel_systick_tick();
            assert_eq!(current_task_id(), task::IDLE_TASK_ID);
        }
        kernel_systick_tick();
        assert_eq!(current_task_id(), id);
        assert_eq!(get_task_status(id), TaskStatus::Active);
    }

    #[test]
    fn delay_zero_is_a_true_no_op() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        kernel_init(SchedulerPolicy::RoundRobin);
        let mut stack = [0u32; MIN_TASK_STACK_WORDS];
        let id = task_create(dummy, &mut stack, 1, 0).unwrap();
        critical_section::with(|cs| {
            let mut k = KERNEL.borrow(cs).borrow_mut();
            k.tasks.set_current(id);
            k.tasks.set_status(id, TaskStatus::Active);
        });

        delay(0);
        assert_eq!(get_task_status(id), TaskStatus::Active);
        assert_eq!(current_task_id(), id);
    }

    #[test]
    fn round_robin_cycles_fairly_across_ticks() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        kernel_init(SchedulerPolicy::RoundRobin);
        let mut s1 = [0u32; MIN_TASK_STACK_WORDS];
        let mut s2 = [0u32; MIN_TASK_STACK_WORDS];
        let mut s3 = [0u32; MIN_TASK_STACK_WORDS];
        let a = task_create(dummy, &mut s1, 1, 0).unwrap();
        let b = task_create(dummy, &mut s2, 1, 0).unwrap();
        let c = task_create(dummy, &mut s3, 1, 0).unwrap();
        set_task_status(a, TaskStatus::Ready);
        set_task_status(b, TaskStatus::Ready);
        set_task_status(c, TaskStatus::Ready);
        critical_section::with(|cs| {
            let mut k = KERNEL.borrow(cs).borrow_mut();
            k.tasks.set_current(a);
            k.tasks.set_status(a, TaskStatus::Active);
        });

        kernel_systick_tick();
        assert_eq!(current_task_id(), b);
        kernel_systick_tick();
        assert_eq!(current_task_id(), c);
        kernel_systick_tick();
        assert_eq!(current_task_id(), a);
    }

    #[test]
    fn priority_task_preempts_back_after_its_mid_run_delay_expires() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        kernel_init(SchedulerPolicy::Priority);
        let mut hs = [0u32; MIN_TASK_STACK_WORDS];
        let mut ls = [0u32; MIN_TASK_STACK_WORDS];
        let high = task_create(dummy, &mut hs, 90, 0).unwrap();
        let low = task_create(dummy, &mut ls, 10, 0).unwrap();
        set_task_status(high, TaskStatus::Ready);
        set_task_status(low, TaskStatus::Ready);
        critical_section::with(|cs| {
            let mut k = KERNEL.borrow(cs).borrow_mut();
            k.tasks.set_current(high);
            k.tasks.set_status(high, TaskStatus::Active);
        });

        delay_ms(50);
        assert_eq!(current_task_id(), low);

        for _ in 0..49 {
            kernel_systick_tick();
            assert_eq!(current_task_id(), low);
        }
        kernel_systick_tick();
        assert_eq!(current_task_id(), high);
    }

    #[test]
    fn nonblocking_queue_probe_does_not_wake_a_task_that_never_blocked() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_kernel();
        kernel_init(SchedulerPolicy::RoundRobin);
        let mut s1 = [0u32; MIN_TASK_STACK_WORDS];
        let mut s2 = [0u32; MIN_TASK_STACK_WORDS];
        let producer = task_create(dummy, &mut s1, 1, 0).unwrap();
        let consumer = task_create(dummy, &mut s2, 1, 0).unwrap();

        static MAILBOX: Queue<1> = Queue::new();

        critical_section::with(|cs| KERNEL.borrow(cs).borrow_mut().tasks.set_current(producer));
        assert_eq!(MAILBOX.enqueue(&[9], QueueMode::NonBlocking), QueueStatus::Success);
        // Queue is now full; a second non-blocking attempt must report Full
        // without suspending or registering the producer as a waiter.
        assert_eq!(MAILBOX.enqueue(&[10], QueueMode::NonBlocking), QueueStatus::Full);
        assert_eq!(get_task_status(producer), TaskStatus::Ready);

        critical_section::with(|cs| KERNEL.borrow(cs).borrow_mut().tasks.set_current(consumer));
        let mut out = [0u8; 1];
        assert_eq!(
            MAILBOX.dequeue(&mut out, QueueMode::NonBlocking),
            QueueStatus::Success
        );
        assert_eq!(out[0], 9);
        // Draining the queue must not spuriously wake the producer: it
        // never actually suspended, so its status is untouched.
        assert_eq!(get_task_status(producer), TaskStatus::Ready);
    }
}
