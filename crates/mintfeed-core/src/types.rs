//! Records that flow through the pipeline, leaf to root:
//! `LogNotification` → `ResolvedTransaction` → `ExtractedRecord` → `EnrichedEvent`.

use serde::{Deserialize, Serialize};

/// One push from a program log subscription. Consumed by the filter, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNotification {
    /// Program address the subscription was opened for.
    pub program: String,
    pub signature: String,
    /// Raw log lines in emission order.
    pub logs: Vec<String>,
    /// The transaction failed on-chain (`err` was non-null).
    pub failed: bool,
}

/// One row of a transaction's post-execution token balance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    pub owner: Option<String>,
    /// Human-readable amount (`uiAmountString`), falling back to the raw amount.
    pub amount: Option<String>,
}

/// A confirmed transaction reduced to the tables the extractor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransaction {
    pub signature: String,
    /// `None` when the node returned no balance table at all.
    pub post_balances: Option<Vec<TokenBalance>>,
    pub static_account_keys: Vec<String>,
}

impl ResolvedTransaction {
    /// Look up the balance row recorded for `account_index`.
    pub fn balance_at(&self, account_index: u32) -> Option<&TokenBalance> {
        self.post_balances
            .as_deref()?
            .iter()
            .find(|b| b.account_index == account_index)
    }
}

/// Flat record pulled from fixed account positions of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedRecord {
    pub mint: String,
    pub owner: Option<String>,
    pub token_amount: Option<String>,
    pub liquidity_token_mint: Option<String>,
    pub pool_address: Option<String>,
    pub liquidity_size: Option<String>,
}

/// Off-chain descriptor document for a mint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub description: String,
}

impl Descriptor {
    /// A descriptor is usable when it names or describes the token.
    pub fn has_payload(&self) -> bool {
        !self.name.trim().is_empty() || !self.description.trim().is_empty()
    }
}

/// Links recovered from a descriptor's free-text description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SocialLinks {
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
}

/// The unit of broadcast and of replay. Serialized verbatim to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub image: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_token_mint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_size: Option<String>,
}

impl EnrichedEvent {
    pub fn new(record: ExtractedRecord, descriptor: Descriptor, links: SocialLinks) -> Self {
        Self {
            mint: record.mint,
            name: descriptor.name,
            symbol: descriptor.symbol,
            image: descriptor.image,
            description: descriptor.description,
            twitter_link: links.twitter,
            telegram_link: links.telegram,
            website_link: links.website,
            liquidity_token_mint: record.liquidity_token_mint,
            pool_address: record.pool_address,
            liquidity_size: record.liquidity_size,
        }
    }

    /// Serialize to the flat JSON document sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
