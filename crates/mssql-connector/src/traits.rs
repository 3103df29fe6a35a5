//! Statement executor traits.
//!
//! An executor opens a connection for every call and closes it on every exit
//! path. Object connectors only see these traits, which keeps them testable
//! against a scripted executor.

use async_trait::async_trait;

use crate::config::ServerEndpoint;
use crate::context::OperationContext;
use crate::error::ConnectorResult;
use crate::row::SqlRow;
use crate::statement::Statement;

/// Runs statements against one server endpoint.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a statement that returns no rows.
    async fn exec(&self, ctx: &OperationContext, stmt: &Statement) -> ConnectorResult<()>;

    /// Execute a query and collect its first result set.
    async fn query(&self, ctx: &OperationContext, stmt: &Statement) -> ConnectorResult<Vec<SqlRow>>;
}

/// Row-mapping helpers on top of [`Executor`].
#[async_trait]
pub trait ExecutorExt: Executor {
    /// Map every row through `handler`.
    async fn query_rows<T, F>(
        &self,
        ctx: &OperationContext,
        stmt: &Statement,
        mut handler: F,
    ) -> ConnectorResult<Vec<T>>
    where
        T: Send,
        F: FnMut(&SqlRow) -> ConnectorResult<T> + Send,
    {
        let rows = self.query(ctx, stmt).await?;
        rows.iter().map(|row| handler(row)).collect()
    }

    /// Map the first row through `handler`.
    ///
    /// Zero rows is `Ok(None)`, the "object absent" outcome.
    async fn query_row<T, F>(
        &self,
        ctx: &OperationContext,
        stmt: &Statement,
        mut handler: F,
    ) -> ConnectorResult<Option<T>>
    where
        T: Send,
        F: FnMut(&SqlRow) -> ConnectorResult<T> + Send,
    {
        let rows = self.query(ctx, stmt).await?;
        rows.first().map(|row| handler(row)).transpose()
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

/// Creates an executor for a server endpoint.
///
/// Executors are created per reconciliation call and never pooled.
pub trait ExecutorFactory: Send + Sync {
    fn executor(&self, endpoint: &ServerEndpoint) -> ConnectorResult<Box<dyn Executor>>;
}
