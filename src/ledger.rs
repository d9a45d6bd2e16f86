//! Premium purchase bookkeeping.
//!
//! Prices are integer cents and the commission rate is in basis points, so a
//! sale always splits exactly: `price = platform + seller`.

use crate::errors::AppError;
use crate::models::{Meme, PlatformSettings, Transaction, TransactionStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Upper bound for the platform's cut: 50 %.
pub const MAX_COMMISSION_BPS: u32 = 5_000;
const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSplit {
    pub price_cents: u64,
    pub platform_cents: u64,
    pub seller_cents: u64,
}

/// Splits a sale price into the platform commission (rounded half up) and the seller's share.
pub fn split_price(price_cents: u64, commission_bps: u32) -> PriceSplit {
    let bps = commission_bps.min(MAX_COMMISSION_BPS) as u128;
    let platform = (price_cents as u128 * bps + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR;
    // bps <= 10_000 so platform <= price and fits in u64.
    let platform_cents = platform as u64;
    PriceSplit {
        price_cents,
        platform_cents,
        seller_cents: price_cents - platform_cents,
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PurchaseRejection {
    #[error("Meme is not offered as premium")]
    NotPremium,
    #[error("Premium meme has no price set")]
    MissingPrice,
    #[error("You cannot buy your own meme")]
    OwnMeme,
    #[error("Meme is not available to the community")]
    NotVisible,
}

impl From<PurchaseRejection> for AppError {
    fn from(rejection: PurchaseRejection) -> Self {
        match rejection {
            PurchaseRejection::NotVisible => AppError::Forbidden(rejection.to_string()),
            other => AppError::InvalidInput(other.to_string()),
        }
    }
}

/// Checks whether `buyer_id` may buy `meme` and returns the price to charge.
/// The "already purchased" rule is enforced by the conditional insert of the
/// resulting transaction.
pub fn check_purchase(buyer_id: Uuid, meme: &Meme, community_visible: bool) -> Result<u64, PurchaseRejection> {
    if !community_visible {
        return Err(PurchaseRejection::NotVisible);
    }
    if !meme.is_premium {
        return Err(PurchaseRejection::NotPremium);
    }
    if meme.creator_id == buyer_id {
        return Err(PurchaseRejection::OwnMeme);
    }
    meme.price_cents
        .filter(|price| *price > 0)
        .ok_or(PurchaseRejection::MissingPrice)
}

/// Builds the immutable ledger row for a sale at the current commission rate.
pub fn record_sale(
    buyer_id: Uuid,
    meme: &Meme,
    price_cents: u64,
    settings: &PlatformSettings,
    at: DateTime<Utc>,
) -> Transaction {
    let split = split_price(price_cents, settings.commission_bps);
    Transaction {
        reference: Uuid::new_v4(),
        buyer_id,
        seller_id: meme.creator_id,
        meme_id: meme.meme_id,
        price_cents: split.price_cents,
        commission_bps: settings.commission_bps,
        platform_earnings_cents: split.platform_cents,
        seller_earnings_cents: split.seller_cents,
        status: TransactionStatus::Completed,
        created_at: at,
    }
}

/// Validates a premium price against the platform bounds.
pub fn validate_price(price_cents: u64, settings: &PlatformSettings) -> Result<(), AppError> {
    if price_cents < settings.min_price_cents || price_cents > settings.max_price_cents {
        return Err(AppError::InvalidInput(format!(
            "price_cents must be between {} and {}",
            settings.min_price_cents, settings.max_price_cents
        )));
    }
    Ok(())
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct EarningsSummary {
    pub sales_count: usize,
    pub gross_cents: u64,
    pub seller_earnings_cents: u64,
    pub platform_fees_cents: u64,
}

impl EarningsSummary {
    pub fn from_sales<'a>(sales: impl IntoIterator<Item = &'a Transaction>) -> Self {
        sales.into_iter().fold(EarningsSummary::default(), |mut acc, tx| {
            acc.sales_count += 1;
            acc.gross_cents += tx.price_cents;
            acc.seller_earnings_cents += tx.seller_earnings_cents;
            acc.platform_fees_cents += tx.platform_earnings_cents;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemeSource, ModerationStatus};

    fn premium_meme(creator_id: Uuid, price: Option<u64>) -> Meme {
        let now = Utc::now();
        Meme {
            meme_id: Uuid::new_v4(),
            creator_id,
            title: "stonks".into(),
            description: String::new(),
            tags: vec![],
            image_key: "k.png".into(),
            content_type: "image/png".into(),
            source: MemeSource::Upload,
            template_id: None,
            is_public: true,
            is_premium: true,
            price_cents: price,
            moderation: ModerationStatus::Active,
            moderation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ten_percent_commission_on_round_price() {
        let split = split_price(1_000, 1_000);
        assert_eq!(split.platform_cents, 100);
        assert_eq!(split.seller_cents, 900);
    }

    #[test]
    fn commission_rounds_half_up() {
        // 2.5 % of 999 cents is 24.975 cents
        assert_eq!(split_price(999, 250).platform_cents, 25);
        // 10 % of 5 cents is exactly half a cent
        assert_eq!(split_price(5, 1_000).platform_cents, 1);
        assert_eq!(split_price(4, 1_000).platform_cents, 0);
    }

    #[test]
    fn split_always_sums_to_price() {
        for price in [1u64, 7, 99, 101, 1_234, 99_999, u64::MAX / 2] {
            for bps in [0u32, 1, 333, 1_000, 2_500, 5_000] {
                let split = split_price(price, bps);
                assert_eq!(split.platform_cents + split.seller_cents, price, "price {price} bps {bps}");
            }
        }
    }

    #[test]
    fn commission_rate_is_capped() {
        assert_eq!(split_price(1_000, 9_000).platform_cents, 500);
    }

    #[test]
    fn purchase_guards() {
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let meme = premium_meme(seller, Some(500));

        assert_eq!(check_purchase(buyer, &meme, true), Ok(500));
        assert_eq!(check_purchase(seller, &meme, true), Err(PurchaseRejection::OwnMeme));
        assert_eq!(check_purchase(buyer, &meme, false), Err(PurchaseRejection::NotVisible));

        let mut free = meme.clone();
        free.is_premium = false;
        assert_eq!(check_purchase(buyer, &free, true), Err(PurchaseRejection::NotPremium));

        let unpriced = premium_meme(seller, None);
        assert_eq!(check_purchase(buyer, &unpriced, true), Err(PurchaseRejection::MissingPrice));
    }

    #[test]
    fn sale_records_rate_in_force() {
        let meme = premium_meme(Uuid::new_v4(), Some(2_000));
        let settings = PlatformSettings::defaults(1_500);
        let tx = record_sale(Uuid::new_v4(), &meme, 2_000, &settings, Utc::now());
        assert_eq!(tx.commission_bps, 1_500);
        assert_eq!(tx.platform_earnings_cents, 300);
        assert_eq!(tx.seller_earnings_cents, 1_700);
        assert_eq!(tx.seller_id, meme.creator_id);
    }

    #[test]
    fn earnings_summary_adds_up_sales() {
        let meme = premium_meme(Uuid::new_v4(), Some(1_000));
        let settings = PlatformSettings::defaults(1_000);
        let sales = vec![
            record_sale(Uuid::new_v4(), &meme, 1_000, &settings, Utc::now()),
            record_sale(Uuid::new_v4(), &meme, 1_000, &settings, Utc::now()),
        ];
        let summary = EarningsSummary::from_sales(&sales);
        assert_eq!(summary.sales_count, 2);
        assert_eq!(summary.gross_cents, 2_000);
        assert_eq!(summary.seller_earnings_cents, 1_800);
        assert_eq!(summary.platform_fees_cents, 200);
    }
}
