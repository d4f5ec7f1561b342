use std::fmt;

/// Everything that can go wrong building or querying a DFA.
///
/// Validation errors never mutate the store; oracle and store failures abort
/// the current atomic call but leave the builder usable.
#[derive(Debug)]
pub enum Error {
	Validation(ValidationError),
	/// An oracle (`nullable`/`matches`/`accepts`) raised while the store was
	/// mid-query. The payload is whatever the oracle panicked/returned with,
	/// flattened to a message; the triggering call is rolled back.
	Oracle(String),
	Store(rusqlite::Error),
	VersionMismatch { expected: &'static str, got: String },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ValidationError {
	/// An ID (vertex, input symbol) was negative.
	NegativeId(i64),
	/// An edge referenced itself as `(src, dst)` with `src` or `dst` negative.
	MalformedEdge(i64, i64),
	/// `limit` or another numeric argument was out of its documented range.
	OutOfRange { what: &'static str, value: i64 },
	/// A `state_id` was passed to an operation that doesn't recognize it.
	UnknownStateId(i64),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Validation(e) => write!(f, "validation error: {e}"),
			Self::Oracle(msg) => write!(f, "oracle failure: {msg}"),
			Self::Store(e) => write!(f, "store failure: {e}"),
			Self::VersionMismatch { expected, got } => {
				write!(f, "snapshot version mismatch: expected {expected:?}, got {got:?}")
			}
		}
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NegativeId(id) => write!(f, "negative id {id}"),
			Self::MalformedEdge(src, dst) => write!(f, "malformed edge ({src}, {dst})"),
			Self::OutOfRange { what, value } => write!(f, "{what} out of range: {value}"),
			Self::UnknownStateId(id) => write!(f, "unknown state id {id}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Store(e) => Some(e),
			_ => None,
		}
	}
}

impl std::error::Error for ValidationError {}

impl From<rusqlite::Error> for Error {
	fn from(e: rusqlite::Error) -> Self {
		Self::Store(e)
	}
}

impl From<ValidationError> for Error {
	fn from(e: ValidationError) -> Self {
		Self::Validation(e)
	}
}

pub(crate) fn check_id(id: i64) -> Result<i64, ValidationError> {
	if id < 0 {
		Err(ValidationError::NegativeId(id))
	} else {
		Ok(id)
	}
}

/// Run a host oracle, turning a panic into [`Error::Oracle`] instead of
/// unwinding through the store's C FFI boundary (SQLite is not unwind-safe).
/// Used for `nullable`, `matches`, and `accepts_oracle` alike.
pub(crate) fn invoke_oracle<T, F: FnOnce() -> T>(f: F) -> Result<T, Error> {
	std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(|payload| {
		let message = payload
			.downcast_ref::<&str>()
			.map(|s| s.to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "oracle panicked with a non-string payload".to_owned());
		Error::Oracle(message)
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn check_id_rejects_negative() {
		assert_eq!(check_id(-1), Err(ValidationError::NegativeId(-1)));
		assert_eq!(check_id(0), Ok(0));
	}

	#[test]
	fn display_is_human_readable() {
		let e = Error::Validation(ValidationError::NegativeId(-3));
		assert_eq!(e.to_string(), "validation error: negative id -3");
	}
}
