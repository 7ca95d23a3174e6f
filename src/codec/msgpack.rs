//! MsgPack transcoder using `rmp-serde`.
//!
//! Always encodes with `to_vec_named` so maps keep their field names; leaders
//! written against a JavaScript msgpack implementation expect the map form.

use serde_json::Value;

use super::Transcoder;
use crate::error::Result;

/// MessagePack transcoder for structured payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackTranscoder;

impl MsgPackTranscoder {
    /// Encode any serializable value to MsgPack bytes.
    #[inline]
    pub fn encode_value<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to any deserializable value.
    #[inline]
    pub fn decode_value<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Transcoder for MsgPackTranscoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Self::encode_value(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Self::decode_value(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Address {
        host: String,
        port: u16,
    }

    #[test]
    fn test_value_roundtrip() {
        let value = json!({"list": [1, "two", null, true], "nested": {"x": 1.5}});
        let bytes = MsgPackTranscoder.encode(&value).unwrap();
        assert_eq!(MsgPackTranscoder.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_structs_encode_as_maps() {
        let addr = Address {
            host: "h".to_string(),
            port: 1,
        };
        let bytes = MsgPackTranscoder::encode_value(&addr).unwrap();

        // 0x82 = fixmap with 2 entries; positional encoding would be 0x92
        assert_eq!(bytes[0], 0x82);

        let as_value = MsgPackTranscoder.decode(&bytes).unwrap();
        assert_eq!(as_value, json!({"host": "h", "port": 1}));
    }

    #[test]
    fn test_null_is_msgpack_nil() {
        assert_eq!(MsgPackTranscoder.encode(&Value::Null).unwrap(), vec![0xc0]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        assert!(MsgPackTranscoder.decode(&[0xc1]).is_err());
    }
}
