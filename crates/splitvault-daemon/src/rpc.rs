//! Newline-delimited JSON-RPC 2.0 over a Unix domain socket.
//!
//! Every line a client writes is one request and gets exactly one response
//! line back. After `subscribe_events` the connection stops taking requests
//! and carries `event` notifications until the client hangs up.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use splitvault_ledger::{ErrorKind, LedgerError};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::EventFilter;
use crate::DaemonState;

const JSONRPC_VERSION: &str = "2.0";

/// Incoming call.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Reply to one [`RpcRequest`]; exactly one of `result` / `error` is set.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Error object carried in a failed [`RpcResponse`].
///
/// `message` is the stable error name (`INSUFFICIENT_FUNDS`, `NOT_FOUND`,
/// ...); `data` carries the details a client may act on.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn reply(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
            error,
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Unknown method, or a dev method while dev commands are off.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, "METHOD_NOT_FOUND", Some(json!({"method": method})))
    }

    pub fn invalid_params(detail: &str) -> Self {
        Self::new(-32602, "INVALID_PARAMS", Some(json!({"detail": detail})))
    }

    /// Storage or other daemon-side failure; `detail` is free text.
    pub fn internal_error(detail: &str) -> Self {
        Self::new(-32603, "INTERNAL_ERROR", Some(json!({"detail": detail})))
    }

    /// Map a ledger failure to its stable RPC code.
    pub fn from_ledger(err: &LedgerError) -> Self {
        let kind = err.kind();
        let detail = json!({"detail": err.to_string()});
        let data = match err {
            LedgerError::InsufficientFunds {
                available,
                required,
            } => json!({"required": required, "available": available}),
            LedgerError::ExternalRail(code)
            | LedgerError::ExternalSchedule(code)
            | LedgerError::ExternalAllowance(code) => {
                json!({"response_code": code.0, "detail": err.to_string()})
            }
            _ => detail,
        };
        let code = match kind {
            ErrorKind::Validation => -32602,
            ErrorKind::InsufficientFunds => -32040,
            ErrorKind::Overflow => -32041,
            ErrorKind::NotFound => -32044,
            ErrorKind::Conflict => -32045,
            ErrorKind::ExternalRail => -32050,
            ErrorKind::ExternalSchedule => -32051,
            ErrorKind::ExternalAllowance => -32052,
            ErrorKind::Authorization => -32060,
            ErrorKind::ReservationState => -32070,
            ErrorKind::InternalConsistency => -32603,
        };
        Self::new(code, kind.as_str(), Some(data))
    }
}

impl From<LedgerError> for RpcError {
    fn from(err: LedgerError) -> Self {
        RpcError::from_ledger(&err)
    }
}

/// Accept loop for the daemon socket.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Bind the socket (replacing a stale one) and serve until the task is
    /// dropped.
    pub async fn run(&self) -> anyhow::Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = %self.socket_path.display(), "Ledger RPC listening");

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to accept RPC connection");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(state, stream).await {
                    warn!(error = %e, "RPC connection closed with error");
                }
            });
        }
    }
}

async fn write_frame<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

async fn serve_connection(state: Arc<DaemonState>, stream: UnixStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                let response = RpcResponse::reply(Value::Null, Err(RpcError::parse_error()));
                write_frame(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method != "subscribe_events" {
            let response = dispatch_request(&state, request).await;
            write_frame(&mut writer, &response).await?;
            continue;
        }

        match serde_json::from_value::<EventFilter>(request.params) {
            Ok(filter) => {
                let ack = RpcResponse::reply(request.id, Ok(json!({"subscribed": true})));
                write_frame(&mut writer, &ack).await?;
                return stream_events(&state, filter, &mut writer).await;
            }
            Err(e) => {
                let response =
                    RpcResponse::reply(request.id, Err(RpcError::invalid_params(&e.to_string())));
                write_frame(&mut writer, &response).await?;
            }
        }
    }

    Ok(())
}

/// Forward matching events as `event` notifications until the client goes away.
async fn stream_events<W>(
    state: &DaemonState,
    filter: EventFilter,
    writer: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut rx = state.event_bus.subscribe();
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagging");
                continue;
            }
            Err(RecvError::Closed) => return Ok(()),
        };
        if filter.matches(&event) {
            let notification = json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": "event",
                "params": event,
            });
            write_frame(writer, &notification).await?;
        }
    }
}

/// Route one request to its command handler.
pub async fn dispatch_request(state: &DaemonState, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        jsonrpc,
        id,
        method,
        params,
    } = request;
    if jsonrpc != JSONRPC_VERSION {
        return RpcResponse::reply(id, Err(RpcError::invalid_request()));
    }
    let outcome = route(state, &method, &params).await;
    if let Err(err) = &outcome {
        debug!(%method, code = err.code, reason = %err.message, "RPC call failed");
    }
    RpcResponse::reply(id, outcome)
}

async fn route(state: &DaemonState, method: &str, params: &Value) -> Result<Value, RpcError> {
    if method.starts_with("dev_") && !state.config.advanced.dev_commands {
        return Err(RpcError::method_not_found(method));
    }

    match method {
        // Splits
        "create_split" => commands::splits::create_split(state, params).await,
        "configure_hbar_allowance" => {
            commands::splits::configure_hbar_allowance(state, params).await
        }
        "record_agreement" => commands::splits::record_agreement(state, params).await,
        "deposit_token" => commands::splits::deposit_token(state, params).await,
        "deposit_native" => commands::splits::deposit_native(state, params).await,

        // Distribution
        "distribute" => commands::distribution::distribute(state, params).await,
        "distribute_from_hbar_allowance" => {
            commands::distribution::distribute_from_hbar_allowance(state, params).await
        }
        "schedule_distribute" => commands::distribution::schedule_distribute(state, params).await,
        "finalize_scheduled_distribution" => {
            commands::distribution::finalize_scheduled_distribution(state, params).await
        }
        "release_scheduled_distribution" => {
            commands::distribution::release_scheduled_distribution(state, params).await
        }

        // Queries
        "balance_of" => commands::queries::balance_of(state, params).await,
        "reserved_of" => commands::queries::reserved_of(state, params).await,
        "available_balance" => commands::queries::available_balance(state, params).await,
        "get_split" => commands::queries::get_split(state, params).await,
        "get_reservation" => commands::queries::get_reservation(state, params).await,
        "get_agreement" => commands::queries::get_agreement(state, params).await,
        "list_reservations" => commands::queries::list_reservations(state, params).await,
        "recent_events" => commands::queries::recent_events(state, params).await,

        // Dev-only commands
        "dev_set_schedule_status" => commands::dev::dev_set_schedule_status(state, params).await,
        "dev_set_allowance" => commands::dev::dev_set_allowance(state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    }
}
