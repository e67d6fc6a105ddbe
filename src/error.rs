//! Error types.
//!
//! Two kinds of failure exist in this crate:
//!
//! - **Contract violations** (requesting zero demand, completing a buffer
//!   twice, a [`Sink`](crate::sink::Sink) without the transform it needs) are
//!   programming errors. They are logged and then halt via
//!   [`contract_violation`].
//! - **Runtime failures** travel through the stream as a terminal
//!   [`Completion::Failure`](crate::completion::Completion::Failure). The
//!   crate's own runtime failures are expressed as [`ReactiveError`].

use std::any::{type_name, Any};

/// Failures produced while adapting values for a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
  /// A value could not be cast to the type a collaborator expected.
  #[error("error casting value to `{target}`")]
  Cast {
    /// Name of the type the value was expected to be
    target: &'static str,
  },

  /// An operation was attempted on an object that cannot support it.
  #[error("invalid operation attempted on `{object}`")]
  InvalidOperation {
    /// Description of the object
    object: String,
  },
}

/// Crate-wide result alias.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Downcasts a type-erased value, turning a mismatch into a
/// [`ReactiveError::Cast`] so it can be delivered as an ordinary failure.
pub fn cast_or_fail<T: Any>(object: Box<dyn Any + Send>) -> Result<T> {
  object
    .downcast::<T>()
    .map(|boxed| *boxed)
    .map_err(|_| ReactiveError::Cast { target: type_name::<T>() })
}

/// Logs and halts. Used for API misuse that leaves an object in an
/// inconsistent state.
#[track_caller]
#[cold]
pub(crate) fn contract_violation(message: &str) -> ! {
  tracing::error!(violation = message, "reactive contract violation");
  panic!("{message}");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cast_to_matching_type() {
    let value: Box<dyn Any + Send> = Box::new(42_u32);
    assert_eq!(cast_or_fail::<u32>(value), Ok(42));
  }

  #[test]
  fn cast_mismatch_is_a_failure() {
    let value: Box<dyn Any + Send> = Box::new("text");
    let err = cast_or_fail::<u32>(value).unwrap_err();
    assert_eq!(err, ReactiveError::Cast { target: "u32" });
    assert_eq!(err.to_string(), "error casting value to `u32`");
  }

  #[test]
  #[should_panic(expected = "broken promise")]
  fn contract_violation_panics() { contract_violation("broken promise"); }
}
