//! Scheduling policies.
//!
//! Both policies are pure functions over a [`TaskTable`] so they can be
//! exercised directly in host tests without any architecture glue.

use crate::task::{TaskId, TaskStatus, TaskTable, IDLE_TASK_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPolicy {
    RoundRobin,
    /// Highest-priority-ready-task-wins, with a period guard that keeps the
    /// currently running task active until its period elapses.
    Priority,
}

/// Converts a task's period (stored in milliseconds) to ticks using the
/// kernel's configured tick rate. A period of 0 stays aperiodic.
pub fn period_ticks(period_ms: u32, ticks_per_ms: u32) -> u32 {
    period_ms.saturating_mul(ticks_per_ms.max(1))
}

/// Picks the next task to run without mutating anything. `current` is the
/// task occupying the Active slot right now (it is treated as Ready for the
/// purposes of selection, matching `scheduler_step`'s contract of flipping
/// Active -> Ready before calling this).
pub fn scheduler_pick(
    table: &TaskTable,
    policy: SchedulerPolicy,
    current: TaskId,
    ticks_now: u32,
    ticks_per_ms: u32,
) -> TaskId {
    match policy {
        SchedulerPolicy::RoundRobin => round_robin_pick(table, current),
        SchedulerPolicy::Priority => priority_pick(table, current, ticks_now, ticks_per_ms),
    }
}

fn round_robin_pick(table: &TaskTable, current: TaskId) -> TaskId {
    let n = table.len() as TaskId;
    if n <= 1 {
        return IDLE_TASK_ID;
    }
    let mut i = current + 1;
    for _ in 0..(n - 1) {
        if i >= n {
            i = 1; // skip idle
        }
        if table.status(i).is_ready() {
            return i;
        }
        i += 1;
    }
    IDLE_TASK_ID
}

fn priority_pick(table: &TaskTable, current: TaskId, ticks_now: u32, ticks_per_ms: u32) -> TaskId {
    let mut best_priority: i32 = -1;
    let mut best: TaskId = IDLE_TASK_ID;
    let mut best_count = 0usize;
    let mut current_is_best = false;

    for (id, tcb) in table.iter_non_idle() {
        if !tcb.status().is_ready() {
            continue;
        }
        let p = tcb.priority() as i32;
        if p > best_priority {
            best_priority = p;
            best = id;
            best_count = 1;
            current_is_best = id == current;
        } else if p == best_priority {
            best_count += 1;
            if id == current {
                current_is_best = true;
            }
        }
    }

    if best_priority < 0 {
        return IDLE_TASK_ID;
    }

    if current != IDLE_TASK_ID && current_is_best {
        let tcb = table.get(current);
        let period = period_ticks(tcb.period_ms(), ticks_per_ms);
        let within_period = period == 0
            || (ticks_now.wrapping_sub(tcb.last_activation_tick) as i32) < period as i32;
        if within_period {
            return current;
        }
        // Current exceeded its period. If it was the sole task at this
        // priority, fall back to idle rather than immediately re-picking it.
        if best_count == 1 {
            return IDLE_TASK_ID;
        }
        // Otherwise prefer any other task tied at this priority.
        for (id, tcb) in table.iter_non_idle() {
            if id != current && tcb.status().is_ready() && tcb.priority() as i32 == best_priority {
                return id;
            }
        }
        return IDLE_TASK_ID;
    }

    best
}

pub struct SwitchDecision {
    pub outgoing: TaskId,
    pub incoming: TaskId,
    pub changed: bool,
}

/// Transitions the outgoing task Active -> Ready (unless it's already
/// Wait/Suspend), runs the policy, and marks the incoming task Active. This
/// is the only place that mutates task status for a scheduling decision.
pub fn scheduler_step(
    table: &mut TaskTable,
    policy: SchedulerPolicy,
    ticks_now: u32,
    ticks_per_ms: u32,
) -> SwitchDecision {
    let outgoing = table.current();
    if table.status(outgoing) == TaskStatus::Active {
        table.set_status(outgoing, TaskStatus::Ready);
    }

    let incoming = scheduler_pick(table, policy, outgoing, ticks_now, ticks_per_ms);

    if incoming != outgoing {
        table.get_mut(incoming).last_activation_tick = ticks_now;
    }
    table.set_status(incoming, TaskStatus::Active);
    table.get_mut(incoming).last_active_tick = ticks_now;
    table.set_current(incoming);

    SwitchDecision {
        outgoing,
        incoming,
        changed: incoming != outgoing,
    }
}
