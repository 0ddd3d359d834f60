//! Typed execution API.
//!
//! Every entry point follows the same path: wrap the command or query in a
//! [`Request`] with a fresh correlation ID, register it in the pending table,
//! queue it on the dispatcher, then wait on the completion handle and turn
//! the [`Outcome`] into a typed value or an error.
//!
//! The blocking variants share the register/enqueue step and then park the
//! calling thread until the handle resolves. Outside any runtime that is a
//! plain blocking receive. On a multi-thread runtime (a `spawn_blocking`
//! thread, a `block_in_place` section, or a worker) the wait goes through
//! `block_in_place`, so the reader task keeps running on the other workers.
//! A current-thread runtime has no other worker to run the reader, so
//! blocking there is refused.

use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};

use super::pending::{CompletionHandle, PendingRequests};
use super::Connection;
use crate::protocol::{Command, CorrelationId, Message, Outcome, Query, Request, Response};
use crate::{log_debug, Result, RpcError};

/// Withdraws a table entry if the caller stops waiting before it resolves.
struct PendingGuard<'a> {
    id: CorrelationId,
    pending: &'a PendingRequests,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.remove(&self.id) {
            log_debug!(
                "request abandoned before its response arrived (correlation_id: {})",
                self.id
            );
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Command,
    Query,
}

impl Kind {
    fn matches(self, response: &Response) -> bool {
        matches!(
            (self, response),
            (Kind::Command, Response::Command(_)) | (Kind::Query, Response::Query(_))
        )
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Command => "command",
            Kind::Query => "query",
        }
    }
}

impl Connection {
    // ---

    /// Execute a command and wait for the server to acknowledge it.
    ///
    /// Any success value the server returns is discarded.
    ///
    /// # Errors
    ///
    /// - `RpcError::Fault` - the server reported a fault executing the command
    /// - `RpcError::ConnectionClosed` - the connection ended before the response
    /// - `RpcError::Serialization` / `RpcError::Codec` - the command could not be encoded
    pub async fn execute_command<C: Command>(&self, cmd: &C) -> Result<()> {
        // ---
        let response = self.call(Request::command(cmd)?).await?;
        outcome_value(response, Kind::Command).map(|_| ())
    }

    /// Execute a command that returns a value.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use serde::Serialize;
    /// # use sm_rpc::Command;
    /// #[derive(Serialize)]
    /// struct Withdraw { account: u32, amount: i64 }
    ///
    /// impl Command for Withdraw {
    ///     const NAME: &'static str = "bank.withdraw";
    /// }
    ///
    /// # async fn example() -> sm_rpc::Result<()> {
    /// let conn = sm_rpc::connect("localhost", 3001).await?;
    /// let balance: i64 = conn
    ///     .execute_command_with_result(&Withdraw { account: 7, amount: 25 })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_command_with_result<C, R>(&self, cmd: &C) -> Result<R>
    where
        C: Command,
        R: DeserializeOwned,
    {
        // ---
        let response = self.call(Request::command(cmd)?).await?;
        typed(response, Kind::Command)
    }

    /// Execute a query and return its typed result.
    pub async fn execute_query<Q, R>(&self, query: &Q) -> Result<R>
    where
        Q: Query,
        R: DeserializeOwned,
    {
        // ---
        let response = self.call(Request::query(query)?).await?;
        typed(response, Kind::Query)
    }

    /// Blocking form of [`execute_command`](Self::execute_command).
    ///
    /// Works from plain threads and from any thread of a multi-thread
    /// runtime, including `spawn_blocking` closures. From a current-thread
    /// runtime it returns `RpcError::BlockingInAsyncContext`.
    pub fn execute_command_blocking<C: Command>(&self, cmd: &C) -> Result<()> {
        // ---
        let response = self.call_blocking(Request::command(cmd)?)?;
        outcome_value(response, Kind::Command).map(|_| ())
    }

    /// Blocking form of [`execute_command_with_result`](Self::execute_command_with_result).
    pub fn execute_command_with_result_blocking<C, R>(&self, cmd: &C) -> Result<R>
    where
        C: Command,
        R: DeserializeOwned,
    {
        // ---
        let response = self.call_blocking(Request::command(cmd)?)?;
        typed(response, Kind::Command)
    }

    /// Blocking form of [`execute_query`](Self::execute_query).
    pub fn execute_query_blocking<Q, R>(&self, query: &Q) -> Result<R>
    where
        Q: Query,
        R: DeserializeOwned,
    {
        // ---
        let response = self.call_blocking(Request::query(query)?)?;
        typed(response, Kind::Query)
    }

    /// Register `request` and queue it for the writer.
    ///
    /// On any error the guard drops and the table entry goes with it.
    fn submit(&self, request: Request) -> Result<(CompletionHandle, PendingGuard<'_>)> {
        // ---
        let id = request.id();
        let pending = &*self.inner.pending;

        let rx = pending.register(id)?;
        let guard = PendingGuard { id, pending };

        log_debug!(
            "sending {} '{}' (correlation_id: {id})",
            request.kind(),
            request.name()
        );

        self.inner
            .dispatcher
            .enqueue(&Message::Request(request))
            .map_err(|err| match err {
                RpcError::ConnectionClosed(reason) => {
                    RpcError::ConnectionClosed(pending.close_reason().unwrap_or(reason))
                }
                other => other,
            })?;

        Ok((rx, guard))
    }

    async fn call(&self, request: Request) -> Result<Response> {
        // ---
        let (rx, _guard) = self.submit(request)?;
        rx.await.map_err(|_| self.handle_dropped())?
    }

    fn call_blocking(&self, request: Request) -> Result<Response> {
        // ---
        let runtime = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                return Err(RpcError::BlockingInAsyncContext);
            }
            Ok(handle) => Some(handle),
            Err(_) => None,
        };

        let (rx, _guard) = self.submit(request)?;
        let received = match runtime {
            Some(handle) => tokio::task::block_in_place(|| handle.block_on(rx)),
            None => rx.blocking_recv(),
        };
        received.map_err(|_| self.handle_dropped())?
    }

    /// The table only drops a sender without resolving it when the
    /// connection is torn down, so report it as a closed connection.
    fn handle_dropped(&self) -> RpcError {
        RpcError::ConnectionClosed(
            self.close_reason()
                .unwrap_or_else(|| "completion handle dropped".to_string()),
        )
    }
}

/// Check the response kind and unwrap the outcome's success value.
fn outcome_value(response: Response, expected: Kind) -> Result<serde_json::Value> {
    // ---
    if !expected.matches(&response) {
        return Err(RpcError::InvalidResponse(format!(
            "expected a {} response, got a {} response (correlation_id: {})",
            expected.name(),
            response.kind(),
            response.response_to()
        )));
    }

    match response.into_outcome() {
        Outcome::Success(value) => Ok(value),
        Outcome::Fault(fault) => Err(RpcError::Fault(fault)),
    }
}

fn typed<R: DeserializeOwned>(response: Response, expected: Kind) -> Result<R> {
    let value = outcome_value(response, expected)?;
    Ok(serde_json::from_value(value)?)
}
