use std::fmt::Display;

/// Unwraps `result`, or ends the process with a diagnostic naming `context`.
///
/// The engine's add/remove contract has no recoverable failure mode; anything that goes wrong
/// below it is an invariant violation in the caller or the IR producer.
#[track_caller]
pub fn cant_fail<T, E: Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => fatal(context, err),
    }
}

#[track_caller]
pub fn fatal(context: &str, err: impl Display) -> ! {
    tracing::error!(%err, "{}", context);
    panic!("{}: {}", context, err);
}
