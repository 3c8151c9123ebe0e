use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{App, RemoteError};

/// Correlates a reply with the invoke that produced it. `origin` is picked at
/// random per bus so peers sharing one control process never collide.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId {
    pub origin: u32,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Resolved { value: Value },
    Rejected { error: RemoteError },
}

impl From<Result<Value, RemoteError>> for Outcome {
    fn from(result: Result<Value, RemoteError>) -> Self {
        match result {
            Ok(value) => Outcome::Resolved { value },
            Err(error) => Outcome::Rejected { error },
        }
    }
}

/// Unit of exchange between two buses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Frame {
    Send {
        channel: String,
        payload: Value,
    },
    Invoke {
        id: CallId,
        channel: String,
        payload: Value,
    },
    Reply {
        id: CallId,
        outcome: Outcome,
    },
}

impl Frame {
    pub fn encode(&self) -> Result<String, App> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, App> {
        Ok(serde_json::from_str(raw)?)
    }
}
