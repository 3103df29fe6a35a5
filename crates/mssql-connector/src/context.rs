//! Per-operation context: cancellation and an optional deadline.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectorError, ConnectorResult};

/// Context threaded through every reconciliation call.
///
/// Cloning shares the cancellation token.
#[derive(Debug, Clone)]
pub struct OperationContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationContext {
    /// Context with a fresh token and no deadline.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context cancelled through an externally owned token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Child context: cancelled with the parent, can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context and its children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The earlier of the context deadline and `now + limit`.
    pub fn deadline_within(&self, limit: Duration) -> Instant {
        let limited = Instant::now() + limit;
        match self.deadline {
            Some(deadline) if deadline < limited => deadline,
            _ => limited,
        }
    }

    /// Fail fast when the context is already cancelled.
    pub fn check(&self) -> ConnectorResult<()> {
        if self.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = OperationContext::new();
        let child = parent.child();
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(ConnectorError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = OperationContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_within_prefers_earlier() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(5));
        let deadline = ctx.deadline_within(Duration::from_secs(30));
        assert_eq!(deadline, ctx.deadline().unwrap());

        let ctx = OperationContext::new().with_timeout(Duration::from_secs(60));
        let deadline = ctx.deadline_within(Duration::from_secs(30));
        assert!(deadline < ctx.deadline().unwrap());
    }
}
