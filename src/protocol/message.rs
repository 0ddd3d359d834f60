//! Closed message hierarchy exchanged with the server.
//!
//! Every frame on the wire carries exactly one [`Message`]. Requests flow
//! client → server, responses server → client. The set of kinds is fixed,
//! so the inbound reader dispatches with an exhaustive `match`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::CorrelationId;

/// A command sent to the server. Commands may mutate server state.
///
/// ```
/// use serde::Serialize;
/// use sm_rpc::Command;
///
/// #[derive(Serialize)]
/// struct Deposit { account: u32, amount: i64 }
///
/// impl Command for Deposit {
///     const NAME: &'static str = "bank.deposit";
/// }
/// ```
pub trait Command: Serialize {
    /// Name the server uses to pick the command handler.
    const NAME: &'static str;
}

/// A read-only query sent to the server.
pub trait Query: Serialize {
    /// Name the server uses to pick the query handler.
    const NAME: &'static str;
}

/// Root of everything exchanged on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    Request(Request),
    Response(Response),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Command(CommandRequest),
    Query(QueryRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Command(CommandResponse),
    Query(QueryResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub id: CorrelationId,
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub id: CorrelationId,
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response_to: CorrelationId,
    pub result: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response_to: CorrelationId,
    pub result: Outcome,
}

/// Result of executing a request on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Fault(Fault),
}

/// Application-level failure reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Server-side classification, e.g. the exception type name.
    pub kind: String,
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Request {
    /// Build a command request with a fresh correlation ID.
    pub fn command<C: Command>(cmd: &C) -> serde_json::Result<Self> {
        // ---
        Ok(Request::Command(CommandRequest {
            id: CorrelationId::generate(),
            name: C::NAME.to_string(),
            payload: serde_json::to_value(cmd)?,
        }))
    }

    /// Build a query request with a fresh correlation ID.
    pub fn query<Q: Query>(query: &Q) -> serde_json::Result<Self> {
        // ---
        Ok(Request::Query(QueryRequest {
            id: CorrelationId::generate(),
            name: Q::NAME.to_string(),
            payload: serde_json::to_value(query)?,
        }))
    }

    pub fn id(&self) -> CorrelationId {
        match self {
            Request::Command(req) => req.id,
            Request::Query(req) => req.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Request::Command(req) => &req.name,
            Request::Query(req) => &req.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Command(_) => "command",
            Request::Query(_) => "query",
        }
    }

    /// Answer this request with the matching response kind.
    pub fn respond(&self, result: Outcome) -> Response {
        // ---
        match self {
            Request::Command(req) => Response::Command(CommandResponse {
                response_to: req.id,
                result,
            }),
            Request::Query(req) => Response::Query(QueryResponse {
                response_to: req.id,
                result,
            }),
        }
    }
}

impl Response {
    pub fn response_to(&self) -> CorrelationId {
        match self {
            Response::Command(resp) => resp.response_to,
            Response::Query(resp) => resp.response_to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Response::Command(_) => "command",
            Response::Query(_) => "query",
        }
    }

    pub fn into_outcome(self) -> Outcome {
        match self {
            Response::Command(resp) => resp.result,
            Response::Query(resp) => resp.result,
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Message::Request(req)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Message::Response(resp)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Increment {
        by: i64,
    }

    impl Command for Increment {
        const NAME: &'static str = "counter.increment";
    }

    #[derive(Serialize)]
    struct Current;

    impl Query for Current {
        const NAME: &'static str = "counter.current";
    }

    #[test]
    fn test_command_request_carries_name_and_payload() {
        // ---
        let req = Request::command(&Increment { by: 3 }).unwrap();

        assert_eq!(req.name(), "counter.increment");
        match &req {
            Request::Command(cmd) => assert_eq!(cmd.payload, json!({ "by": 3 })),
            other => panic!("expected command request, got {other:?}"),
        }
    }

    #[test]
    fn test_each_request_gets_fresh_id() {
        // ---
        let a = Request::query(&Current).unwrap();
        let b = Request::query(&Current).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_respond_matches_request_kind_and_id() {
        // ---
        let query = Request::query(&Current).unwrap();
        let resp = query.respond(Outcome::Success(json!(42)));

        assert_eq!(query.kind(), "query");
        assert_eq!(resp.kind(), "query");
        assert_eq!(resp.response_to(), query.id());

        let command = Request::command(&Increment { by: 1 }).unwrap();
        let resp = command.respond(Outcome::Success(Value::Null));

        assert_eq!(command.kind(), "command");
        assert_eq!(resp.kind(), "command");
        assert_eq!(resp.response_to(), command.id());
    }

    #[test]
    fn test_fault_display() {
        // ---
        let fault = Fault {
            kind: "CommandAborted".into(),
            message: "insufficient funds".into(),
        };
        assert_eq!(fault.to_string(), "CommandAborted: insufficient funds");
    }
}
