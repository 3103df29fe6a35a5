//! Connect loop.
//!
//! Attempts a connection on a fixed poll interval until it succeeds, a
//! terminal error is classified, the connect timeout (or the context
//! deadline) elapses, or the context is cancelled.

use std::future::Future;

use tracing::{debug, warn};

use mssql_connector::classify::ErrorClassifier;
use mssql_connector::config::ConnectionSettings;
use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};

/// Run `attempt` until it yields a connection.
///
/// Non-terminal errors are logged and retried. The loop observes
/// cancellation both while an attempt is in flight and while waiting for the
/// next one.
pub async fn connect_with_retry<T, F, Fut>(
    ctx: &OperationContext,
    settings: &ConnectionSettings,
    classifier: &dyn ErrorClassifier,
    mut attempt: F,
) -> ConnectorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConnectorResult<T>>,
{
    let deadline = ctx.deadline_within(settings.connect_timeout());
    let timed_out = |last_error: Option<String>| ConnectorError::ConnectionTimeout {
        timeout_secs: settings.connect_timeout_secs,
        last_error,
    };

    let mut attempts: u32 = 0;
    let mut last_error: Option<String> = None;

    loop {
        ctx.check()?;
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            () = ctx.cancellation_token().cancelled() => return Err(ConnectorError::Cancelled),
            () = tokio::time::sleep_until(deadline) => return Err(timed_out(last_error)),
            outcome = attempt() => outcome,
        };

        match outcome {
            Ok(connection) => {
                debug!(attempts, "Connected");
                return Ok(connection);
            }
            Err(err) if classifier.is_terminal_connect_error(&err) => {
                warn!(attempts, error = %err, "Connection failed with terminal error");
                return Err(err);
            }
            Err(err) => {
                warn!(attempts, error = %err, "Connection attempt failed, retrying");
                last_error = Some(err.to_string());
            }
        }

        tokio::select! {
            biased;
            () = ctx.cancellation_token().cancelled() => return Err(ConnectorError::Cancelled),
            () = tokio::time::sleep_until(deadline) => return Err(timed_out(last_error)),
            () = tokio::time::sleep(settings.poll_interval()) => {}
        }
    }
}
