//! Transaction Resolver: signature → [`ResolvedTransaction`].
//!
//! A log notification arrives before every node behind the endpoint has
//! indexed the transaction, so a `null` answer is expected and retried on a
//! fixed delay. Transport and RPC errors spend the same attempt budget.

use std::sync::Arc;

use serde_json::{json, Value};

use mintfeed_core::error::ResolveError;
use mintfeed_core::policy::RetryPolicy;
use mintfeed_core::transport::RpcTransport;
use mintfeed_core::types::{ResolvedTransaction, TokenBalance};

pub const DEFAULT_COMMITMENT: &str = "confirmed";

pub struct TransactionResolver {
    transport: Arc<dyn RpcTransport>,
    policy: RetryPolicy,
    commitment: String,
}

impl TransactionResolver {
    pub fn new(transport: Arc<dyn RpcTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            commitment: DEFAULT_COMMITMENT.to_string(),
        }
    }

    /// `getTransaction` rejects `processed`; it is raised to `confirmed`.
    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        let commitment = commitment.into();
        self.commitment = if commitment == "processed" {
            DEFAULT_COMMITMENT.to_string()
        } else {
            commitment
        };
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn commitment(&self) -> &str {
        &self.commitment
    }

    /// Fetch `signature`, retrying until the policy's attempt budget is spent.
    ///
    /// Long-running: the worst case is `max_attempts - 1` delays plus one
    /// request timeout per attempt. Never call it while holding a lock.
    pub async fn resolve(&self, signature: &str) -> Result<ResolvedTransaction, ResolveError> {
        let max_attempts = self.policy.max_attempts();
        let params = json!([
            signature,
            {
                "commitment": self.commitment,
                "encoding": "json",
                "maxSupportedTransactionVersion": 0
            }
        ]);

        for attempt in 1..=max_attempts {
            match self.transport.call("getTransaction", params.clone()).await {
                Ok(Value::Null) => {
                    tracing::debug!(signature, attempt, "transaction not yet available");
                }
                Ok(value) => {
                    tracing::debug!(signature, attempt, "transaction resolved");
                    return parse_transaction(signature, &value);
                }
                Err(e) => {
                    tracing::warn!(signature, attempt, error = %e, "getTransaction failed");
                }
            }

            if let Some(delay) = self.policy.delay_after(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(signature, attempts = max_attempts, "transaction not found after retries");
        Err(ResolveError::NotFound {
            signature: signature.to_string(),
            attempts: max_attempts,
        })
    }
}

/// Map a `getTransaction` result (`json` encoding) onto [`ResolvedTransaction`].
pub fn parse_transaction(signature: &str, value: &Value) -> Result<ResolvedTransaction, ResolveError> {
    let malformed = |reason: &str| ResolveError::Malformed {
        signature: signature.to_string(),
        reason: reason.to_string(),
    };

    if !value.is_object() {
        return Err(malformed("result is not an object"));
    }
    let message = value
        .get("transaction")
        .and_then(|t| t.get("message"))
        .ok_or_else(|| malformed("missing transaction.message"))?;

    let static_account_keys = message
        .get("accountKeys")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(account_key).collect())
        .unwrap_or_default();

    let post_balances = value
        .get("meta")
        .and_then(|m| m.get("postTokenBalances"))
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(token_balance).collect());

    Ok(ResolvedTransaction {
        signature: signature.to_string(),
        post_balances,
        static_account_keys,
    })
}

/// Account keys come as plain strings, or as `{pubkey, signer, writable}`
/// objects under `jsonParsed`.
fn account_key(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value.get("pubkey").and_then(Value::as_str))
        .map(str::to_string)
}

fn token_balance(row: &Value) -> Option<TokenBalance> {
    let account_index = u32::try_from(row.get("accountIndex")?.as_u64()?).ok()?;
    let mint = row.get("mint")?.as_str()?.to_string();
    let owner = row.get("owner").and_then(Value::as_str).map(str::to_string);
    let ui = row.get("uiTokenAmount");
    let amount = ui
        .and_then(|u| u.get("uiAmountString"))
        .and_then(Value::as_str)
        .or_else(|| ui.and_then(|u| u.get("amount")).and_then(Value::as_str))
        .map(str::to_string);
    Some(TokenBalance {
        account_index,
        mint,
        owner,
        amount,
    })
}
