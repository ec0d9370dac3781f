//! Worker task wire format
//!
//! Requests and replies are single-line JSON documents:
//!
//! ```text
//! {"id":1,"functionName":"transpile","args":["let a = 1;"]}
//! {"id":1,"ok":true,"value":"var a = 1;"}
//! {"id":2,"ok":false,"error":{"message":"boom","stack":"..."}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    /// Registered function name
    pub function_name: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Failure reported by a worker function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Error message
    pub message: String,
    /// Stack or backtrace, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDescriptor {
    /// Descriptor with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of one task.
pub type TaskResponse = Result<Value, ErrorDescriptor>;

/// Task message tagged with the id used to correlate the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation id
    pub id: u64,
    /// The task
    #[serde(flatten)]
    pub task: TaskMessage,
}

/// Reply line written by a worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    /// Correlation id of the request
    pub id: u64,
    /// Whether the function returned normally
    pub ok: bool,
    /// Return value when `ok`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Failure when not `ok`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl WorkerReply {
    /// Build the reply for a finished task.
    pub fn new(id: u64, response: TaskResponse) -> Self {
        match response {
            Ok(value) => Self {
                id,
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                id,
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }

    /// Convert back into a task outcome.
    pub fn into_response(self) -> TaskResponse {
        if self.ok {
            Ok(self.value.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| ErrorDescriptor::new("worker reported failure without an error")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = WorkerRequest {
            id: 7,
            task: TaskMessage {
                function_name: "optimizeCss".to_string(),
                args: vec![json!("a{}"), json!({"minify": true})],
            },
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"id": 7, "functionName": "optimizeCss", "args": ["a{}", {"minify": true}]})
        );
        let decoded: WorkerRequest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_reply_shapes() {
        let ok = serde_json::to_value(WorkerReply::new(1, Ok(json!(42)))).unwrap();
        assert_eq!(ok, json!({"id": 1, "ok": true, "value": 42}));

        let err = WorkerReply::new(2, Err(ErrorDescriptor::new("bad").with_stack("at x")));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"id": 2, "ok": false, "error": {"message": "bad", "stack": "at x"}})
        );
        assert_eq!(err.into_response().unwrap_err().message, "bad");
    }

    #[test]
    fn test_null_value_and_missing_error() {
        let reply: WorkerReply = serde_json::from_str(r#"{"id":3,"ok":true,"value":null}"#).unwrap();
        assert_eq!(reply.into_response().unwrap(), Value::Null);

        let reply: WorkerReply = serde_json::from_str(r#"{"id":4,"ok":false}"#).unwrap();
        assert!(reply.into_response().is_err());
    }
}
