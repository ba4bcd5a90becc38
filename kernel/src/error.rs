//! Error types that don't belong to a single module.

/// Failure starting the kernel. Distinct from [`crate::task::TaskCreateError`]
/// since it can only happen once, at `kernel_start`, and is always fatal to
/// the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStartError {
    /// The architecture port rejected the requested tick rate (too fast for
    /// the timer's prescaler range, or zero).
    TimerConfig,
    /// `kernel_start` was called before any user task was created.
    NoTasks,
    /// `kernel_start` was called more than once.
    AlreadyStarted,
}
