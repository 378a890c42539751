#![forbid(unsafe_code)]

//! Unexpected-failure values.
//!
//! A [`Defect`] records why a computation died outside its typed error
//! channel: a panic in user code, a service lookup that cannot be satisfied,
//! an internal invariant violation. Defects travel inside a cause tree and
//! are only observable through cause-level recovery; the typed error
//! combinators never see them.

use std::any::Any;
use std::fmt;

/// An unexpected failure carried by a cause tree.
///
/// The payload is reduced to a message at capture time so defects stay
/// cheap to clone and safe to move across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    message: String,
}

impl Defect {
    /// Create a defect from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create a defect from a panic payload.
    ///
    /// Extracts the conventional `String`/`&str` payloads produced by
    /// `panic!`; anything else becomes an opaque marker.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self { message }
    }

    /// Create a defect from any `Debug` value.
    ///
    /// Used when a typed error is promoted out of the error channel and the
    /// only portable representation is its debug rendering.
    pub fn from_debug<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Self {
            message: format!("{value:?}"),
        }
    }

    /// The defect message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Defect {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips() {
        let d = Defect::new("boom");
        assert_eq!(d.message(), "boom");
        assert_eq!(format!("{d}"), "boom");
    }

    #[test]
    fn from_panic_str_payload() {
        let payload: Box<dyn Any + Send> = Box::new("sliced");
        assert_eq!(Defect::from_panic(payload).message(), "sliced");
    }

    #[test]
    fn from_panic_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(Defect::from_panic(payload).message(), "owned");
    }

    #[test]
    fn from_panic_opaque_payload() {
        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(
            Defect::from_panic(payload).message(),
            "panic with non-string payload"
        );
    }

    #[test]
    fn from_debug_uses_debug_rendering() {
        let d = Defect::from_debug(&("x", 1));
        assert_eq!(d.message(), "(\"x\", 1)");
    }
}
