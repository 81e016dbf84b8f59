//! JSON-RPC Envelope Codec
//!
//! Request and response objects as they travel in STOMP frame bodies:
//!
//! ```text
//! request:  {"method": "Host.getCapabilities", "params": [], "id": "<hex>", "jsonrpc": "2.0"}
//! response: {"id": "<hex>", "result": {...} | null, "error": {"Code": 100, "Message": "..."} | null}
//! ```
//!
//! The request id is handed back to the caller so the reply can be checked
//! against it.

use crate::ids::IdGenerator;
use crate::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of the `jsonrpc` member
pub const JSONRPC_VERSION: &str = "2.0";

/// Request object borrowed from the caller's arguments
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P: Serialize + ?Sized> {
    pub method: &'a str,
    pub params: &'a P,
    pub id: &'a str,
    pub jsonrpc: &'static str,
}

/// Response object as decoded from the wire
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub result: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// Error member of a response.
///
/// VDSM capitalises the keys; the lowercase JSON-RPC spellings are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcErrorObject {
    #[serde(rename = "Code", alias = "code", default)]
    pub code: i64,
    #[serde(rename = "Message", alias = "message", default)]
    pub message: String,
}

impl RpcErrorObject {
    /// `{}` carries no error information and is treated like `null`
    pub fn is_empty(&self) -> bool {
        self.code == 0 && self.message.is_empty()
    }
}

/// Serialized request plus the id it was tagged with
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub id: String,
    pub body: Vec<u8>,
}

/// Build a request for `method` with a fresh id from `ids`
pub fn encode_request<P>(method: &str, params: &P, ids: &dyn IdGenerator) -> ClientResult<EncodedRequest>
where
    P: Serialize + ?Sized,
{
    let id = ids.next_id();
    let request = JsonRpcRequest {
        method,
        params,
        id: &id,
        jsonrpc: JSONRPC_VERSION,
    };
    let body = serde_json::to_vec(&request)
        .map_err(|e| ClientError::decode_with_source(format!("Failed to serialize request for {}", method), e))?;

    Ok(EncodedRequest { id, body })
}

/// Decode a response body into its result map.
///
/// A response id different from `expected_id` is rejected before anything
/// else is looked at. A non-empty error wins over any result. A missing or
/// null result decodes to an empty map.
pub fn decode_response(body: &[u8], expected_id: Option<&str>) -> ClientResult<Map<String, Value>> {
    let response: JsonRpcResponse = serde_json::from_slice(body)
        .map_err(|e| ClientError::decode_with_source("Malformed JSON-RPC response", e))?;

    if let (Some(expected), Some(received)) = (expected_id, response.id.as_deref()) {
        if expected != received {
            return Err(ClientError::correlation_mismatch(expected, received));
        }
    }

    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return Err(ClientError::rpc(error.code, error.message));
    }

    Ok(response.result.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let ids = SequentialIdGenerator::new("req-");
        let request = encode_request("Host.getCapabilities", &Vec::<String>::new(), &ids).unwrap();

        assert_eq!(request.id, "req-00000001");
        let wire: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(
            wire,
            json!({"method": "Host.getCapabilities", "params": [], "id": "req-00000001", "jsonrpc": "2.0"})
        );
        // Member order matches the daemon's own client
        let text = String::from_utf8(request.body).unwrap();
        assert!(text.starts_with(r#"{"method":"Host.getCapabilities","params":[],"id":"#));
    }

    #[test]
    fn test_each_request_gets_fresh_id() {
        let ids = SequentialIdGenerator::new("");
        let first = encode_request("Host.ping", &json!({}), &ids).unwrap();
        let second = encode_request("Host.ping", &json!({}), &ids).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_decode_success() {
        let body = br#"{"id":"abc","result":{"foo":"bar"},"error":null}"#;
        let result = decode_response(body, Some("abc")).unwrap();
        assert_eq!(result.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn test_error_wins_over_result() {
        let body = br#"{"id":"abc","result":{"foo":"bar"},"error":{"Code":100,"Message":"General Exception"}}"#;
        match decode_response(body, Some("abc")) {
            Err(ClientError::Rpc { code, message }) => {
                assert_eq!(code, 100);
                assert_eq!(message, "General Exception");
            }
            other => panic!("Expected Rpc error, got {:?}", other),
        }
    }

    #[test]
    fn test_lowercase_error_keys() {
        let body = br#"{"id":"abc","error":{"code":-32601,"message":"Method not found"}}"#;
        let err = decode_response(body, Some("abc")).unwrap_err();
        assert!(matches!(err, ClientError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn test_empty_error_object_is_ignored() {
        let body = br#"{"id":"abc","result":{"ok":true},"error":{}}"#;
        let result = decode_response(body, Some("abc")).unwrap();
        assert_eq!(result.get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_null_result_is_empty_map() {
        let body = br#"{"id":"abc","result":null,"error":null}"#;
        assert!(decode_response(body, Some("abc")).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_id_is_rejected() {
        let body = br#"{"id":"other","result":{"foo":"bar"},"error":null}"#;
        match decode_response(body, Some("abc")) {
            Err(ClientError::CorrelationMismatch { expected, received }) => {
                assert_eq!(expected, "abc");
                assert_eq!(received, "other");
            }
            other => panic!("Expected CorrelationMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_id_is_accepted() {
        let body = br#"{"result":{"foo":"bar"}}"#;
        assert!(decode_response(body, Some("abc")).is_ok());
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = decode_response(b"{\"id\": ", Some("abc")).unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));

        let err = decode_response(br#"{"id":"abc","result":[1,2,3]}"#, Some("abc")).unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ._-]{0,16}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_echoed_response_recovers_result(
            method in "[A-Z][a-zA-Z]{0,10}\\.[a-z][a-zA-Z]{0,12}",
            params in prop::collection::vec(json_leaf(), 0..4),
            result in prop::collection::btree_map("[a-z]{1,8}", json_leaf(), 0..6),
        ) {
            let ids = SequentialIdGenerator::new("p-");
            let request = encode_request(&method, &params, &ids).unwrap();

            let wire: Value = serde_json::from_slice(&request.body).unwrap();
            prop_assert_eq!(&wire["method"], &json!(method));
            prop_assert_eq!(&wire["params"], &json!(params));

            let result: Map<String, Value> = result.into_iter().collect();
            let reply = serde_json::to_vec(&json!({"id": wire["id"], "result": result, "error": null})).unwrap();
            let decoded = decode_response(&reply, Some(&request.id)).unwrap();
            prop_assert_eq!(decoded, result);
        }
    }
}
