// SPDX-License-Identifier: MIT

//! Type-tagged JSON encoding for values stored inside checkpoints.
//!
//! Encoded values look like `{"__type__": "<tag>", "value": {...}}`. The
//! handoff user-input request drops its conversation on the way in: the
//! coordinator already checkpoints the conversation, so the field decodes as
//! an empty list and the gateway treats that as a post-restore resume.

use crate::adk::error::CheckpointError;
use crate::baton::handoff::types::HandoffUserInputRequest;
use crate::baton::workflow::message::{BatchItem, Envelope, WorkflowMessage};
use crate::baton::workflow::request::{PendingRequest, RequestPayload};
use serde_json::{json, Value};

const TYPE_KEY: &str = "__type__";
const VALUE_KEY: &str = "value";

/// A value with a stable checkpoint representation
pub trait CheckpointValue: Sized {
    const TYPE_TAG: &'static str;

    fn to_checkpoint(&self) -> Result<Value, CheckpointError>;

    fn from_checkpoint(value: Value) -> Result<Self, CheckpointError>;
}

pub fn encode_checkpoint_value<T: CheckpointValue>(value: &T) -> Result<Value, CheckpointError> {
    Ok(json!({
        TYPE_KEY: T::TYPE_TAG,
        VALUE_KEY: value.to_checkpoint()?,
    }))
}

pub fn decode_checkpoint_value<T: CheckpointValue>(value: &Value) -> Result<T, CheckpointError> {
    let tag = value
        .get(TYPE_KEY)
        .and_then(|t| t.as_str())
        .ok_or_else(|| CheckpointError::Decode("missing type tag".into()))?;
    if tag != T::TYPE_TAG {
        return Err(CheckpointError::Decode(format!(
            "expected '{}', found '{}'",
            T::TYPE_TAG,
            tag
        )));
    }
    let inner = value
        .get(VALUE_KEY)
        .cloned()
        .ok_or_else(|| CheckpointError::Decode("missing value".into()))?;
    T::from_checkpoint(inner)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, CheckpointError> {
    serde_json::to_value(value).map_err(|e| CheckpointError::Decode(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, CheckpointError> {
    serde_json::from_value(value).map_err(|e| CheckpointError::Decode(e.to_string()))
}

fn strip_conversation(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove("conversation");
    }
    value
}

fn without_conversation(request: &HandoffUserInputRequest) -> HandoffUserInputRequest {
    HandoffUserInputRequest {
        conversation: Vec::new(),
        ..request.clone()
    }
}

fn strip_payload(payload: &RequestPayload) -> RequestPayload {
    match payload {
        RequestPayload::HandoffUserInput(request) => {
            RequestPayload::HandoffUserInput(without_conversation(request))
        }
        other => other.clone(),
    }
}

fn strip_message(message: &WorkflowMessage) -> WorkflowMessage {
    match message {
        WorkflowMessage::UserInputRequest(request) => {
            WorkflowMessage::UserInputRequest(without_conversation(request))
        }
        WorkflowMessage::Response(response) => {
            let mut response = response.clone();
            response.request = strip_payload(&response.request);
            WorkflowMessage::Response(response)
        }
        WorkflowMessage::Batch(items) => WorkflowMessage::Batch(
            items
                .iter()
                .map(|item| BatchItem {
                    source_id: item.source_id.clone(),
                    data: strip_message(&item.data),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Copy of a queued envelope as it is written into a snapshot.
///
/// In-flight user-input requests lose their conversation the same way
/// pending requests do.
pub fn checkpoint_envelope(envelope: &Envelope) -> Envelope {
    Envelope {
        data: strip_message(&envelope.data),
        ..envelope.clone()
    }
}

impl CheckpointValue for HandoffUserInputRequest {
    const TYPE_TAG: &'static str = "handoff_user_input_request";

    fn to_checkpoint(&self) -> Result<Value, CheckpointError> {
        Ok(strip_conversation(to_json(self)?))
    }

    fn from_checkpoint(value: Value) -> Result<Self, CheckpointError> {
        from_json(strip_conversation(value))
    }
}

impl CheckpointValue for RequestPayload {
    const TYPE_TAG: &'static str = "request_payload";

    fn to_checkpoint(&self) -> Result<Value, CheckpointError> {
        let value = to_json(self)?;
        Ok(match self {
            RequestPayload::HandoffUserInput(_) => strip_conversation(value),
            _ => value,
        })
    }

    fn from_checkpoint(value: Value) -> Result<Self, CheckpointError> {
        from_json(value)
    }
}

impl CheckpointValue for PendingRequest {
    const TYPE_TAG: &'static str = "pending_request";

    fn to_checkpoint(&self) -> Result<Value, CheckpointError> {
        Ok(json!({
            "request_id": self.request_id,
            "source_executor_id": self.source_executor_id,
            "request": self.request.to_checkpoint()?,
        }))
    }

    fn from_checkpoint(value: Value) -> Result<Self, CheckpointError> {
        let field = |name: &str| {
            value
                .get(name)
                .cloned()
                .ok_or_else(|| CheckpointError::Decode(format!("missing field '{}'", name)))
        };
        let as_string = |v: Value, name: &str| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| CheckpointError::Decode(format!("'{}' is not a string", name)))
        };
        Ok(Self {
            request_id: as_string(field("request_id")?, "request_id")?,
            source_executor_id: as_string(field("source_executor_id")?, "source_executor_id")?,
            request: RequestPayload::from_checkpoint(field("request")?)?,
        })
    }
}
