use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub const JSONRPC_VERSION: &str = "2.0";
pub const SEND_MESSAGE: &str = "message/send";
pub const GET_TASK: &str = "tasks/get";
pub const CANCEL_TASK: &str = "tasks/cancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool { matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled) }

    fn rank(self) -> u8 {
        match self {
            TaskState::Submitted => 0,
            TaskState::Working => 1,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled => 2,
        }
    }

    /// Whether a task observed in `self` may next be observed in `next`.
    /// Repeating a state is allowed; nothing leaves a terminal state.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        match self.is_terminal() {
            true => next == self,
            false => next.rank() >= self.rank(),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    File { file: Value },
    Data { data: Value },
}

fn message_kind() -> String { "message".to_string() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default = "message_kind")]
    pub kind: String,
}

impl Message {
    /// A single-part user message with a fresh message id.
    pub fn user(text: &str, task_id: Option<&str>, context_id: Option<&str>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.to_string() }],
            message_id: Uuid::new_v4().simple().to_string(),
            task_id: task_id.map(str::to_string),
            context_id: context_id.map(str::to_string),
            kind: message_kind(),
        }
    }

    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Remote view of a task as returned by `message/send`, `tasks/get` and `tasks/cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Uuid::new_v4().to_string(),
            method,
            params,
        }
    }

    pub fn send_message(message: &Message) -> Self { Self::new(SEND_MESSAGE, serde_json::json!({ "message": message })) }

    pub fn get_task(task_id: &str) -> Self { Self::new(GET_TASK, serde_json::json!({ "id": task_id })) }

    pub fn cancel_task(task_id: &str) -> Self { Self::new(CANCEL_TASK, serde_json::json!({ "id": task_id })) }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    jsonrpc: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Decode a JSON-RPC response body whose result must be a task.
/// Anything other than a success envelope carrying a task is a protocol error
/// with the raw body attached.
pub fn decode_task(body: &str) -> Result<TaskSnapshot> {
    let envelope: RpcResponse =
        serde_json::from_str(body).map_err(|err| Error::protocol_with_body(format!("malformed response: {err}"), body))?;

    if envelope.jsonrpc != JSONRPC_VERSION {
        return Err(Error::protocol_with_body(format!("unsupported jsonrpc version '{}'", envelope.jsonrpc), body));
    }

    if let Some(error) = envelope.error {
        return Err(Error::protocol_with_body(format!("agent returned error {}: {}", error.code, error.message), body));
    }

    let result = envelope.result.ok_or_else(|| Error::protocol_with_body("response has no result", body))?;
    serde_json::from_value(result).map_err(|err| Error::protocol_with_body(format!("result is not a task: {err}"), body))
}
