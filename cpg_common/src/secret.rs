//! Redaction wrapper for API keys and signing secrets.
//!
//! Configuration structs derive `Debug` and get logged at startup. Wrapping sensitive fields
//! in [`Secret`] guarantees the key material never rides along.

use std::fmt;

/// A value that must never appear in logs or error output. It is only readable through
/// [`Secret::reveal`], which keeps every access greppable.
#[derive(Clone, Default)]
pub struct Secret<T: Clone + Default>(T);

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }
}

impl<T: Clone + Default> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl<T: Clone + Default> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}
