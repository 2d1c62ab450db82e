//! Internal helper macros.

/// Returns early with `$error` unless `$predicate` holds.
///
/// Like `assert!`, but for validation that fails with an error instead of a panic:
///
/// ```ignore
/// ensure!(value.len() < limits.max_header_value_length, StatusCode::PAYLOAD_TOO_LARGE);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
