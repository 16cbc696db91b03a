/// Errors reported by the [Executor](crate::task::Executor).
///
/// Futures themselves never fail with this type; their failure channel is the
/// rejection value `E`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The run queue drained while the awaited task was still parked. Nothing
    /// left on this thread can wake it.
    #[error("executor stalled with {waiting} task(s) still waiting")]
    Stalled { waiting: usize },
}
