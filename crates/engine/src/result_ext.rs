//! Result extension trait for logging errors with context.
//!
//! Used where an error ends a background task and has no caller to
//! propagate to, such as spawned orchestration and startup recovery.

use std::fmt::Display;

/// Extension trait for logging errors with context.
pub trait ResultExt<T, E> {
    /// Log the error at `error` level with context and caller location,
    /// returning the `Result` unchanged.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use txflow_engine::result_ext::ResultExt;
    ///
    /// let result: Result<i32, &str> = Err("claim lost");
    /// let _ = result.log("driving run r-42");
    /// ```
    fn log<S: Display>(self, context: S) -> Result<T, E>;

    /// Same as [`ResultExt::log`] at `warn` level, for failures that are
    /// part of normal operation (a run finishing FAILED, a lost claim race).
    fn log_warn<S: Display>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: Display>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller = std::panic::Location::caller();
            tracing::error!(
                target: "txflow_engine",
                error = %e,
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context,
                "Operation failed"
            );
        }
        self
    }

    #[track_caller]
    fn log_warn<S: Display>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller = std::panic::Location::caller();
            tracing::warn!(
                target: "txflow_engine",
                error = %e,
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context,
                "Operation did not succeed"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ext_ok() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(result.log("test context").unwrap(), 42);
    }

    #[test]
    fn test_result_ext_err_passthrough() {
        let result: Result<i32, &str> = Err("test error");
        assert_eq!(result.log_warn("test context").unwrap_err(), "test error");
    }
}
