//! Error types for probes and the retrying prober
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a single probe attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError<E> {
    /// Expected, retryable condition (e.g. a projection that is not visible yet).
    Transient(E),
    /// Retrying cannot help; propagated by the prober immediately and unchanged.
    Fatal(E),
}

impl<E> ProbeError<E> {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(e) | Self::Fatal(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ProbeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "transient: {}", e),
            Self::Fatal(e) => write!(f, "fatal: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ProbeError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transient(e) | Self::Fatal(e) => Some(e),
        }
    }
}

/// Outcome of a wait that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// The probe reported a fatal failure; the payload is the probe's own error.
    #[error(transparent)]
    Fatal(E),
    /// Every applicable budget ran out while the probe kept failing transiently.
    #[error("timed out waiting for {what} after {attempts} attempts ({elapsed:?}); last error: {last}")]
    Exhausted {
        /// What was being waited for.
        what: String,
        attempts: usize,
        elapsed: Duration,
        /// The most recent transient failure.
        #[source]
        last: E,
    },
}

impl<E> WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// Check if the wait ran out of budget
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Check if the probe failed fatally
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Get the fatal error if this is a Fatal variant
    pub fn into_fatal(self) -> Option<E> {
        match self {
            Self::Fatal(e) => Some(e),
            _ => None,
        }
    }

    /// The last transient failure recorded before exhaustion.
    pub fn last_failure(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Access exhaustion info as (attempts, elapsed).
    pub fn exhausted_info(&self) -> Option<(usize, Duration)> {
        match self {
            Self::Exhausted { attempts, elapsed, .. } => Some((*attempts, *elapsed)),
            _ => None,
        }
    }

    /// Convert the probe error type, e.g. into a caller's wider error enum.
    pub fn map_err<F, G>(self, mut f: G) -> WaitError<F>
    where
        F: std::error::Error + 'static,
        G: FnMut(E) -> F,
    {
        match self {
            Self::Fatal(e) => WaitError::Fatal(f(e)),
            Self::Exhausted { what, attempts, elapsed, last } => {
                WaitError::Exhausted { what, attempts, elapsed, last: f(last) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("{0}")]
    struct DummyError(&'static str);

    #[test]
    fn exhausted_display_names_target_and_last_error() {
        let err = WaitError::Exhausted {
            what: "stock after order".to_string(),
            attempts: 7,
            elapsed: Duration::from_millis(1500),
            last: DummyError("expected 8, got 10"),
        };
        let msg = err.to_string();
        assert!(msg.contains("stock after order"));
        assert!(msg.contains("7 attempts"));
        assert!(msg.contains("1.5s"));
        assert!(msg.contains("expected 8, got 10"));
    }

    #[test]
    fn fatal_is_transparent() {
        let err = WaitError::Fatal(DummyError("malformed payload"));
        assert_eq!(err.to_string(), "malformed payload");
        assert!(err.is_fatal());
        assert!(!err.is_exhausted());
        assert_eq!(err.into_fatal(), Some(DummyError("malformed payload")));
    }

    #[test]
    fn exhausted_source_is_last_failure() {
        let err = WaitError::Exhausted {
            what: "x".into(),
            attempts: 2,
            elapsed: Duration::ZERO,
            last: DummyError("not yet"),
        };
        assert_eq!(err.source().map(|s| s.to_string()), Some("not yet".to_string()));
        assert_eq!(err.last_failure(), Some(&DummyError("not yet")));
        assert_eq!(err.exhausted_info(), Some((2, Duration::ZERO)));
        assert!(err.into_fatal().is_none());
    }

    #[test]
    fn map_err_preserves_metadata() {
        let err = WaitError::Exhausted {
            what: "x".into(),
            attempts: 3,
            elapsed: Duration::from_secs(1),
            last: DummyError("a"),
        };
        let mapped: WaitError<std::io::Error> = err.map_err(|e| std::io::Error::other(e.0));
        assert_eq!(mapped.exhausted_info(), Some((3, Duration::from_secs(1))));
        assert_eq!(mapped.last_failure().map(|e| e.to_string()), Some("a".to_string()));
    }

    #[test]
    fn probe_error_accessors() {
        let t = ProbeError::Transient(DummyError("lag"));
        assert!(t.is_transient());
        assert_eq!(t.to_string(), "transient: lag");
        let f = ProbeError::Fatal(DummyError("bad"));
        assert!(!f.is_transient());
        assert_eq!(f.clone().into_inner(), DummyError("bad"));
        assert!(f.source().is_some());
    }
}
