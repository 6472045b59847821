//! `SolanaLogListener`: `logsSubscribe` over the shared WebSocket client.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use mintfeed_core::error::StreamError;
use mintfeed_core::types::LogNotification;
use mintfeed_rpc::WsRpcClient;

use crate::listener::{LogListener, LogStream};

pub struct SolanaLogListener {
    client: Arc<WsRpcClient>,
    program: String,
    commitment: String,
}

impl SolanaLogListener {
    pub fn new(
        client: Arc<WsRpcClient>,
        program: impl Into<String>,
        commitment: impl Into<String>,
    ) -> Self {
        Self {
            client,
            program: program.into(),
            commitment: commitment.into(),
        }
    }
}

#[async_trait]
impl LogListener for SolanaLogListener {
    fn program(&self) -> &str {
        &self.program
    }

    async fn subscribe(&self) -> Result<LogStream, StreamError> {
        let (id, rx) = self
            .client
            .logs_subscribe(&self.program, &self.commitment)
            .await
            .map_err(|e| StreamError::SubscriptionFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(program = %self.program, subscription = %id, commitment = %self.commitment, "watching program logs");

        let program = self.program.clone();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        })
        .filter_map(move |value| {
            let parsed = parse_logs_notification(&program, &value);
            if parsed.is_none() {
                tracing::debug!(program = %program, "unrecognised logs notification");
            }
            futures::future::ready(parsed.map(Ok::<_, StreamError>))
        });

        Ok(Box::pin(stream))
    }
}

/// Parse the `params.result` of a `logsNotification`.
pub fn parse_logs_notification(program: &str, result: &Value) -> Option<LogNotification> {
    let value = result.get("value")?;
    let signature = value.get("signature")?.as_str()?.to_string();
    let logs = value
        .get("logs")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let failed = value.get("err").is_some_and(|e| !e.is_null());

    Some(LogNotification {
        program: program.to_string(),
        signature,
        logs,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_signature_and_lines() {
        let n = parse_logs_notification(
            "Prog",
            &json!({
                "context": { "slot": 5 },
                "value": {
                    "signature": "SIG1",
                    "err": null,
                    "logs": ["Program Prog invoke [1]", "Program log: Instruction: InitializeMint"]
                }
            }),
        )
        .unwrap();
        assert_eq!(n.program, "Prog");
        assert_eq!(n.signature, "SIG1");
        assert_eq!(n.logs.len(), 2);
        assert!(!n.failed);
    }

    #[test]
    fn non_null_err_marks_failure() {
        let n = parse_logs_notification(
            "Prog",
            &json!({ "value": { "signature": "S", "err": { "InstructionError": [0, "Custom"] }, "logs": [] } }),
        )
        .unwrap();
        assert!(n.failed);
    }

    #[test]
    fn missing_signature_is_rejected() {
        assert!(parse_logs_notification("Prog", &json!({ "value": { "logs": [] } })).is_none());
    }
}
