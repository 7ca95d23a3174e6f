//! JSON transcoder.

use serde_json::Value;

use super::Transcoder;
use crate::error::Result;

/// Transcoder that writes payloads as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTranscoder;

impl Transcoder for JsonTranscoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
