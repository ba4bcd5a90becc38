//! Bounded byte-ring queue with blocking and non-blocking semantics.
//!
//! The byte-shuffling state machine (`QueueInner`) is a pure, side-effect
//! free structure so its locking, wraparound and waiter-bitmap bookkeeping
//! can be unit tested directly. [`Queue`] wraps it behind a
//! `critical_section::Mutex` and supplies the blocking loop that talks to
//! the global scheduler (`crate::current_task_id`, `crate::set_task_status`,
//! `crate::task_yield`), mirroring mariOS's `enqueue`/`dequeue`.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::MAX_TASKS;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Blocking,
    NonBlocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Success,
    Busy,
    Full,
    Empty,
}

/// Per-direction waiter set, a `u16` bitmap indexed by task ID (`MAX_TASKS`
/// is required to stay `<= 16`; see `config::MAX_TASKS`).
#[derive(Default, Clone, Copy)]
struct WaiterSet(u16);

impl WaiterSet {
    fn insert(&mut self, id: TaskId) {
        self.0 |= 1 << id;
    }

    fn contains(&self, id: TaskId) -> bool {
        self.0 & (1 << id) != 0
    }

    /// Clears and returns every set task ID, lowest first. Iteration order
    /// is an implementation detail, not a fairness guarantee (spec §9).
    fn drain(&mut self) -> impl Iterator<Item = TaskId> {
        let mut bits = self.0;
        self.0 = 0;
        core::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let id = bits.trailing_zeros() as TaskId;
            bits &= bits - 1;
            Some(id)
        })
    }
}

pub(crate) enum AttemptOutcome {
    Success,
    Locked,
    NotEnoughRoom,
}

/// The byte-shuffling core, generic over backing capacity via a const
/// generic so no heap allocation is required (spec's no-`alloc` ambient
/// constraint).
pub(crate) struct QueueInner<const N: usize> {
    storage: [u8; N],
    head: usize,
    tail: usize,
    free: usize,
    write_locked: bool,
    read_locked: bool,
    waiters_to_send: WaiterSet,
    waiters_to_receive: WaiterSet,
}

impl<const N: usize> QueueInner<N> {
    const fn new() -> Self {
        QueueInner {
            storage: [0; N],
            head: 0,
            tail: 0,
            free: N,
            write_locked: false,
            read_locked: false,
            waiters_to_send: WaiterSet(0),
            waiters_to_receive: WaiterSet(0),
        }
    }

    fn used(&self) -> usize {
        N - self.free
    }

    /// One iteration of the enqueue state machine (spec §4.4). Returns
    /// `Locked`/`NotEnoughRoom` instead of looping or yielding itself; the
    /// caller (`Queue::enqueue`) owns the critical section and the retry
    /// loop so this stays pure and host-testable. Does not itself register a
    /// waiter: only a caller that actually commits to blocking does that
    /// (mirrors mariOS's `enqueue`, which only touches
    /// `tasks_waiting_to_send` inside the blocking branch).
    fn try_enqueue(&mut self, data: &[u8]) -> AttemptOutcome {
        if self.write_locked {
            return AttemptOutcome::Locked;
        }
        self.write_locked = true;
        if data.len() > self.free {
            AttemptOutcome::NotEnoughRoom
        } else {
            self.copy_in(data);
            self.free -= data.len();
            self.write_locked = false;
            AttemptOutcome::Success
        }
    }

    fn copy_in(&mut self, data: &[u8]) {
        let tail_room = N - self.head;
        if data.len() <= tail_room {
            self.storage[self.head..self.head + data.len()].copy_from_slice(data);
        } else {
            self.storage[self.head..N].copy_from_slice(&data[..tail_room]);
            self.storage[..data.len() - tail_room].copy_from_slice(&data[tail_room..]);
        }
        self.head = (self.head + data.len()) % N;
    }

    fn try_dequeue(&mut self, out: &mut [u8]) -> AttemptOutcome {
        if self.read_locked {
            return AttemptOutcome::Locked;
        }
        self.read_locked = true;
        if out.len() > self.used() {
            AttemptOutcome::NotEnoughRoom
        } else {
            self.copy_out(out);
            self.free += out.len();
            self.read_locked = false;
            AttemptOutcome::Success
        }
    }

    fn copy_out(&mut self, out: &mut [u8]) {
        let tail_room = N - self.tail;
        if out.len() <= tail_room {
            out.copy_from_slice(&self.storage[self.tail..self.tail + out.len()]);
        } else {
            out[..tail_room].copy_from_slice(&self.storage[self.tail..N]);
            let out_len = out.len();
            out[tail_room..].copy_from_slice(&self.storage[..out_len - tail_room]);
        }
        self.tail = (self.tail + out.len()) % N;
    }

    /// Unlocks writing and wakes any readers waiting on data; called right
    /// after `try_enqueue` succeeds.
    fn finish_enqueue(&mut self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiters_to_receive.drain()
    }

    fn finish_dequeue(&mut self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiters_to_send.drain()
    }

    fn unlock_write(&mut self) {
        self.write_locked = false;
    }

    fn unlock_read(&mut self) {
        self.read_locked = false;
    }

    /// Records that `task_id` is about to suspend waiting for room. Called
    /// only from the blocking path, right before the caller yields.
    fn mark_waiting_to_send(&mut self, task_id: TaskId) {
        self.waiters_to_send.insert(task_id);
    }

    /// Records that `task_id` is about to suspend waiting for data. Called
    /// only from the blocking path, right before the caller yields.
    fn mark_waiting_to_receive(&mut self, task_id: TaskId) {
        self.waiters_to_receive.insert(task_id);
    }

    fn reset(&mut self) -> bool {
        if self.write_locked || self.read_locked {
            return false;
        }
        self.storage = [0; N];
        self.head = 0;
        self.tail = 0;
        self.free = N;
        self.waiters_to_send = WaiterSet(0);
        self.waiters_to_receive = WaiterSet(0);
        true
    }
}

/// A bounded byte queue of fixed capacity `N`, safe to declare as a
/// `'static` with interior mutability guarded by a critical section.
pub struct Queue<const N: usize> {
    inner: Mutex<RefCell<QueueInner<N>>>,
}

impl<const N: usize> Queue<N> {
    pub const fn new() -> Self {
        Queue {
            inner: Mutex::new(RefCell::new(QueueInner::new())),
        }
    }

    /// Attempts to enqueue `data`. Blocking callers only ever observe
    /// `Success`; `Busy`/`Full` are only reachable in non-blocking mode.
    pub fn enqueue(&self, data: &[u8], mode: QueueMode) -> QueueStatus {
        loop {
            let outcome = critical_section::with(|cs| {
                let mut q = self.inner.borrow(cs).borrow_mut();
                let task_id = crate::current_task_id();
                let outcome = q.try_enqueue(data);
                match outcome {
                    AttemptOutcome::Success => {
                        let woken: heapless_bits::Bits = q.finish_enqueue().collect();
                        drop(q);
                        for id in woken.iter() {
                            crate::set_task_status(id, crate::TaskStatus::Ready);
                        }
                    }
                    AttemptOutcome::NotEnoughRoom => {
                        q.unlock_write();
                        if mode == QueueMode::Blocking {
                            q.mark_waiting_to_send(task_id);
                            crate::set_task_status(task_id, crate::TaskStatus::Suspend);
                            crate::task_yield();
                        }
                    }
                    AttemptOutcome::Locked => {
                        if mode == QueueMode::Blocking {
                            crate::task_yield();
                        }
                    }
                }
                outcome
            });

            match (outcome, mode) {
                (AttemptOutcome::Success, _) => return QueueStatus::Success,
                (AttemptOutcome::NotEnoughRoom, QueueMode::NonBlocking) => return QueueStatus::Full,
                (AttemptOutcome::Locked, QueueMode::NonBlocking) => return QueueStatus::Busy,
                (_, QueueMode::Blocking) => continue,
            }
        }
    }

    pub fn dequeue(&self, out: &mut [u8], mode: QueueMode) -> QueueStatus {
        loop {
            let outcome = critical_section::with(|cs| {
                let mut q = self.inner.borrow(cs).borrow_mut();
                let task_id = crate::current_task_id();
                let outcome = q.try_dequeue(out);
                match outcome {
                    AttemptOutcome::Success => {
                        let woken: heapless_bits::Bits = q.finish_dequeue().collect();
                        drop(q);
                        for id in woken.iter() {
                            crate::set_task_status(id, crate::TaskStatus::Ready);
                        }
                    }
                    AttemptOutcome::NotEnoughRoom => {
                        q.unlock_read();
                        if mode == QueueMode::Blocking {
                            q.mark_waiting_to_receive(task_id);
                            crate::set_task_status(task_id, crate::TaskStatus::Suspend);
                            crate::task_yield();
                        }
                    }
                    AttemptOutcome::Locked => {
                        if mode == QueueMode::Blocking {
                            crate::task_yield();
                        }
                    }
                }
                outcome
            });

            match (outcome, mode) {
                (AttemptOutcome::Success, _) => return QueueStatus::Success,
                (AttemptOutcome::NotEnoughRoom, QueueMode::NonBlocking) => return QueueStatus::Empty,
                (AttemptOutcome::Locked, QueueMode::NonBlocking) => return QueueStatus::Busy,
                (_, QueueMode::Blocking) => continue,
            }
        }
    }

    /// Restores the queue to its freshly-created state. A no-op (returning
    /// `false`) if either lock is held, per spec §4.4 — unlike mariOS's
    /// `reset_queue`, the caller can tell the two cases apart.
    pub fn reset(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().reset())
    }
}

impl<const N: usize> Default for Queue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A tiny fixed-capacity collection of woken task IDs, sized to `MAX_TASKS`
/// so waking waiters never allocates. Named as its own module purely to
/// keep `FromIterator` glue out of the main queue logic above.
mod heapless_bits {
    use crate::config::MAX_TASKS;
    use crate::task::TaskId;

    #[derive(Default)]
    pub(super) struct Bits {
        ids: [TaskId; MAX_TASKS],
        len: usize,
    }

    impl Bits {
        pub(super) fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
            self.ids[..self.len].iter().copied()
        }
    }

    impl FromIterator<TaskId> for Bits {
        fn from_iter<T: IntoIterator<Item = TaskId>>(iter: T) -> Self {
            let mut bits = Bits::default();
            for id in iter {
                if bits.len < MAX_TASKS {
                    bits.ids[bits.len] = id;
                    bits.len += 1;
                }
            }
            bits
        }
    }
}
