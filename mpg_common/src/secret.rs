use std::fmt;

/// Wrapper for credential-bearing configuration values, such as a database URL with an embedded password.
///
/// `Debug` output is redacted, and there is deliberately no `Display` impl, so the value cannot reach a log
/// line through a `{}` placeholder. Access goes through [`Secret::reveal`], which keeps call sites easy to
/// audit with a grep.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrows the wrapped value.
    pub fn reveal(&self) -> &T {
        &self.inner
    }

    /// Unwraps the value, giving up the redaction.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> From<T> for Secret<T> {
    fn from(inner: T) -> Self {
        Self::new(inner)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let secret = Secret::new("sqlite://user:hunter2@db".to_string());
        assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
        assert_eq!(secret.reveal(), "sqlite://user:hunter2@db");
        assert_eq!(secret.into_inner(), "sqlite://user:hunter2@db");
    }
}
