//! Deadlines bounding how long `Bus::close` waits for drains.

use crate::Error;
use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// A point in time, a cancellation signal, or both.
///
/// Passed to [`Bus::close`](crate::Bus::close). When the deadline passes or
/// the token is cancelled, `close` stops waiting and returns
/// [`Error::DeadlineExceeded`] or [`Error::Cancelled`]; drains that are still
/// running carry on in the background.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    token: Option<CancellationToken>,
}

impl Deadline {
    /// A deadline that never fires
    pub fn never() -> Self {
        Self::default()
    }

    /// Fire `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// Fire at `instant`
    pub fn at(instant: Instant) -> Self {
        Self {
            at: Some(instant),
            token: None,
        }
    }

    /// Fire when `token` is cancelled
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            at: None,
            token: Some(token),
        }
    }

    /// A deadline that has already been cancelled
    pub fn cancelled() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self::with_token(token)
    }

    /// Also fire when `token` is cancelled
    pub fn or_cancelled_by(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// The instant this deadline fires at, if any
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// The error this deadline reports if it has already fired.
    ///
    /// Cancellation takes precedence over expiry.
    pub fn check(&self) -> Option<Error> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(Error::Cancelled);
        }
        match self.at {
            Some(at) if at <= Instant::now() => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until the deadline fires and return the matching error
    pub async fn expired(&self) -> Error {
        let timer = async {
            match self.at {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Error::Cancelled,
            _ = timer => Error::DeadlineExceeded,
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Deadline::after(timeout)
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Deadline::at(instant)
    }
}

impl From<CancellationToken> for Deadline {
    fn from(token: CancellationToken) -> Self {
        Deadline::with_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_is_not_expired() {
        assert!(Deadline::never().check().is_none());
        assert!(Deadline::never().instant().is_none());
    }

    #[test]
    fn test_cancelled_reports_cancelled() {
        assert_eq!(Deadline::cancelled().check(), Some(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_past_instant_reports_exceeded() {
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert_eq!(deadline.check(), Some(Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_expiry() {
        let token = CancellationToken::new();
        token.cancel();
        let deadline =
            Deadline::at(Instant::now() - Duration::from_millis(1)).or_cancelled_by(token);
        assert_eq!(deadline.check(), Some(Error::Cancelled));
        assert_eq!(deadline.expired().await, Error::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_waits_for_instant() {
        let deadline = Deadline::from(Duration::from_secs(30));
        assert!(deadline.check().is_none());
        assert_eq!(deadline.expired().await, Error::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_expired_on_later_cancel() {
        let token = CancellationToken::new();
        let deadline = Deadline::from(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        assert_eq!(deadline.expired().await, Error::Cancelled);
        canceller.await.unwrap();
    }
}
