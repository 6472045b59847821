//! Positional field extraction from a resolved transaction.
//!
//! Pool-creation transactions of the AMM follow a fixed account template, so
//! the interesting balances sit at known indices of `postTokenBalances` and
//! the pool account at a known index of the static account keys.

use serde::{Deserialize, Serialize};

use crate::types::{ExtractedRecord, ResolvedTransaction};

/// Account-index positions of a transaction template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLayout {
    /// Balance row holding the new token's mint. Required.
    pub mint_index: u32,
    /// Balance row holding the liquidity token mint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_mint_index: Option<u32>,
    /// Balance row whose amount is the pool's initial liquidity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_size_index: Option<u32>,
    /// Position of the pool account in the static account keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_key_index: Option<usize>,
}

impl AccountLayout {
    /// Only the mint position; no auxiliary fields.
    pub fn mint_only(mint_index: u32) -> Self {
        Self {
            mint_index,
            liquidity_mint_index: None,
            liquidity_size_index: None,
            pool_key_index: None,
        }
    }

    /// AMM v4 `initialize2`: mint at 9, LP mint at 10, LP size at 6, pool id at key 2.
    pub fn amm_v4_initialize() -> Self {
        Self {
            mint_index: 9,
            liquidity_mint_index: Some(10),
            liquidity_size_index: Some(6),
            pool_key_index: Some(2),
        }
    }
}

impl Default for AccountLayout {
    fn default() -> Self {
        Self::amm_v4_initialize()
    }
}

/// Pull an [`ExtractedRecord`] out of `tx`.
///
/// Returns `None` when the balance table is absent or has no row at
/// `layout.mint_index`. Auxiliary fields are best-effort.
pub fn extract(tx: &ResolvedTransaction, layout: &AccountLayout) -> Option<ExtractedRecord> {
    if tx.post_balances.is_none() {
        tracing::warn!(signature = %tx.signature, "post token balances not available");
        return None;
    }

    let Some(primary) = tx.balance_at(layout.mint_index) else {
        tracing::warn!(
            signature = %tx.signature,
            account_index = layout.mint_index,
            "no balance entry at mint index"
        );
        return None;
    };

    let liquidity_token_mint = layout
        .liquidity_mint_index
        .and_then(|i| tx.balance_at(i))
        .map(|b| b.mint.clone());
    let liquidity_size = layout
        .liquidity_size_index
        .and_then(|i| tx.balance_at(i))
        .and_then(|b| b.amount.clone());
    let pool_address = layout
        .pool_key_index
        .and_then(|i| tx.static_account_keys.get(i))
        .cloned();

    Some(ExtractedRecord {
        mint: primary.mint.clone(),
        owner: primary.owner.clone(),
        token_amount: primary.amount.clone(),
        liquidity_token_mint,
        pool_address,
        liquidity_size,
    })
}
