/// Outcome of a suspension point that can be interrupted by a thread's cancellation token.
pub(crate) enum WaitOutcome<T> {
    Ready(T),
    Cancelled,
}
