//! Wire protocol carried inside STOMP frame bodies

pub mod envelope;

pub use envelope::{
    decode_response, encode_request, EncodedRequest, JsonRpcRequest, JsonRpcResponse, RpcErrorObject,
    JSONRPC_VERSION,
};
