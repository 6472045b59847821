//! The `RpcTransport` trait: the seam between the pipeline and the ledger node.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{next_request_id, JsonRpcRequest, JsonRpcResponse};

/// Request/response JSON-RPC transport.
///
/// Implementations must be `Send + Sync` and are shared as
/// `Arc<dyn RpcTransport>` between resolver workers.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the raw response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;

    /// Call `method` and return its `result`, mapping error objects to
    /// [`TransportError::Rpc`].
    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::with_params(next_request_id(), method, params);
        let resp = self.send(req).await?;
        resp.into_result().map_err(TransportError::Rpc)
    }
}
