//! # Request Protocol
//!
//! Newline-delimited JSON envelopes in, one response line per request out.
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stdin                                                                  │
//! │  {"requestId":"r1","caller":{"userId":"u1","role":"customer"},          │
//! │   "command":"create_order","payload":{...}}                             │
//! │  {"requestId":"r2","caller":{...},"command":"loyalty_profile"}          │
//! │        │                                                                │
//! │        ▼  one task per line (JoinSet)                                   │
//! │  parse_line ─► Router::handle ─► dispatch ─► commands::*                │
//! │        │                                                                │
//! │        ▼  completion order, not arrival order                           │
//! │  stdout                                                                 │
//! │  {"requestId":"r2","ok":true,"data":{...}}                              │
//! │  {"requestId":"r1","ok":false,"error":{"code":"RULE_VIOLATION",...}}    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The caller block is trusted as given; session verification happens in
//! front of this process.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info};

use crate::commands::{loyalty, order, voucher};
use crate::error::{ApiError, ErrorCode};
use crate::notify::NotificationHandle;
use crate::state::{ConfigState, DbState};
use kopi_core::CallerContext;

// =============================================================================
// Envelopes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(default)]
    pub request_id: String,
    pub caller: CallerContext,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ResponseEnvelope {
    pub fn success(request_id: String, data: Value) -> Self {
        ResponseEnvelope {
            request_id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(request_id: String, error: ApiError) -> Self {
        ResponseEnvelope {
            request_id,
            ok: false,
            data: None,
            error: Some(error),
        }
    }

    /// Single-line JSON. Never fails; an unencodable response becomes an
    /// INTERNAL error line for the same request id.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!(request_id = %self.request_id, error = %e, "Failed to encode response");
            format!(
                r#"{{"requestId":{},"ok":false,"error":{{"code":"INTERNAL","message":"Failed to encode response"}}}}"#,
                Value::String(self.request_id.clone())
            )
        })
    }
}

// =============================================================================
// Router
// =============================================================================

/// Maps command names to command functions.
#[derive(Debug, Clone)]
pub struct Router {
    db: DbState,
    config: ConfigState,
    notify: NotificationHandle,
}

impl Router {
    pub fn new(db: DbState, config: ConfigState, notify: NotificationHandle) -> Self {
        Router { db, config, notify }
    }

    /// Handles one raw input line.
    pub async fn handle_line(&self, line: &str) -> ResponseEnvelope {
        match parse_line(line) {
            Ok(envelope) => self.handle(envelope).await,
            Err(rejected) => rejected,
        }
    }

    pub async fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope {
            request_id,
            caller,
            command,
            payload,
        } = envelope;

        match self.dispatch(&caller, &command, payload).await {
            Ok(data) => {
                debug!(request_id = %request_id, command = %command, "Request succeeded");
                ResponseEnvelope::success(request_id, data)
            }
            Err(e) => {
                debug!(
                    request_id = %request_id,
                    command = %command,
                    code = ?e.code,
                    reason = e.reason().unwrap_or(""),
                    "Request failed"
                );
                ResponseEnvelope::failure(request_id, e)
            }
        }
    }

    async fn dispatch(&self, caller: &CallerContext, command: &str, payload: Value) -> Result<Value, ApiError> {
        let (db, config, notify) = (&self.db, &self.config, &self.notify);

        match command {
            // Orders
            "create_order" => {
                to_data(order::create_order(db, config, notify, caller, parse(payload)?).await)
            }
            "update_order_status" => {
                to_data(order::update_order_status(db, notify, caller, parse(payload)?).await)
            }
            "update_payment_status" => {
                to_data(order::update_payment_status(db, caller, parse(payload)?).await)
            }
            "get_order" => to_data(order::get_order(db, caller, parse(payload)?).await),

            // Vouchers
            "check_voucher" => to_data(voucher::check_voucher(db, caller, parse(payload)?).await),
            "list_my_vouchers" => to_data(voucher::list_my_vouchers(db, caller).await),

            // Loyalty
            "loyalty_profile" => to_data(loyalty::loyalty_profile(db, caller).await),
            "points_history" => to_data(loyalty::points_history(db, caller, parse(payload)?).await),
            "redeem_reward" => to_data(loyalty::redeem_reward(db, caller, parse(payload)?).await),
            "list_notifications" => {
                to_data(loyalty::list_notifications(db, caller, parse(payload)?).await)
            }

            "health" => Ok(serde_json::json!({ "healthy": db.inner().health_check().await })),

            other => Err(ApiError::bad_request(format!("Unknown command: {}", other))
                .with_reason("unknown_command")),
        }
    }
}

/// Deserializes a command payload. A missing payload reads as `{}`.
fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, ApiError> {
    let payload = if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload
    };

    serde_json::from_value(payload).map_err(|e| {
        ApiError::new(ErrorCode::ValidationError, format!("Invalid payload: {}", e))
            .with_reason("invalid_payload")
    })
}

/// Parses one input line into an envelope, or the response rejecting it.
pub fn parse_line(line: &str) -> Result<RequestEnvelope, ResponseEnvelope> {
    let raw: Value = serde_json::from_str(line).map_err(|e| {
        debug!(error = %e, "Malformed request line");
        ResponseEnvelope::failure(
            String::new(),
            ApiError::bad_request("Request is not valid JSON").with_reason("invalid_envelope"),
        )
    })?;

    let request_id = raw
        .get("requestId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    serde_json::from_value(raw).map_err(|e| {
        ResponseEnvelope::failure(
            request_id,
            ApiError::bad_request(format!("Invalid request envelope: {}", e)).with_reason("invalid_envelope"),
        )
    })
}

fn to_data<T: Serialize>(result: Result<T, ApiError>) -> Result<Value, ApiError> {
    let value = result?;
    serde_json::to_value(value).map_err(|e| {
        error!(error = %e, "Failed to serialize command result");
        ApiError::internal("Failed to serialize result")
    })
}

// =============================================================================
// Serve Loop
// =============================================================================

/// Request tasks keyed back to their request ids.
///
/// A task that panics still gets an answer under its own request id.
struct InFlight {
    tasks: JoinSet<ResponseEnvelope>,
    request_ids: HashMap<task::Id, String>,
}

impl InFlight {
    fn new() -> Self {
        InFlight {
            tasks: JoinSet::new(),
            request_ids: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn spawn<F>(&mut self, request_id: String, request: F)
    where
        F: Future<Output = ResponseEnvelope> + Send + 'static,
    {
        let handle = self.tasks.spawn(request);
        self.request_ids.insert(handle.id(), request_id);
    }

    /// Next finished response, or `None` when nothing is in flight.
    async fn next(&mut self) -> Option<ResponseEnvelope> {
        let joined = self.tasks.join_next_with_id().await?;
        Some(match joined {
            Ok((id, response)) => {
                self.request_ids.remove(&id);
                response
            }
            Err(e) => {
                let request_id = self.request_ids.remove(&e.id()).unwrap_or_default();
                error!(request_id = %request_id, error = %e, "Request task failed");
                ResponseEnvelope::failure(request_id, ApiError::internal("Request failed unexpectedly"))
            }
        })
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &ResponseEnvelope) -> io::Result<()> {
    writer.write_all(response.to_line().as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Reads request lines until EOF, answering each as its task completes.
///
/// Requests run concurrently. After EOF the loop waits for in-flight
/// requests before returning.
pub async fn serve<R, W>(router: Arc<Router>, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut in_flight = InFlight::new();
    let mut reading = true;

    info!("Accepting requests");

    loop {
        tokio::select! {
            line = lines.next_line(), if reading => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&line) {
                        Ok(envelope) => {
                            let router = Arc::clone(&router);
                            in_flight.spawn(envelope.request_id.clone(), async move { router.handle(envelope).await });
                        }
                        Err(rejected) => write_response(&mut writer, &rejected).await?,
                    }
                }
                None => {
                    debug!(pending = in_flight.len(), "Input closed");
                    reading = false;
                }
            },

            Some(response) = in_flight.next() => write_response(&mut writer, &response).await?,

            else => break,
        }
    }

    info!("Request stream finished");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
