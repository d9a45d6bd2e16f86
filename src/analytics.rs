//! Aggregations over likes, reviews and transactions.

use crate::ledger::EarningsSummary;
use crate::models::{Like, Meme, Review, TargetKind, Transaction};
use crate::visibility::OwnerIndex;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Engagement {
    pub like_count: usize,
    pub review_count: usize,
    pub average_rating: Option<f64>,
}

/// Like and review counts per target of one kind.
#[derive(Debug, Default)]
pub struct EngagementIndex {
    likes: HashMap<Uuid, usize>,
    ratings: HashMap<Uuid, (usize, u64)>,
}

impl EngagementIndex {
    pub fn build(kind: TargetKind, likes: &[Like], reviews: &[Review]) -> Self {
        let mut index = EngagementIndex::default();
        for like in likes.iter().filter(|l| l.kind == kind) {
            *index.likes.entry(like.target_id).or_default() += 1;
        }
        for review in reviews.iter().filter(|r| r.kind == kind) {
            let entry = index.ratings.entry(review.target_id).or_default();
            entry.0 += 1;
            entry.1 += u64::from(review.rating);
        }
        index
    }

    /// Review count and exact rating sum for a target.
    pub fn rating_totals(&self, target_id: &Uuid) -> (usize, u64) {
        self.ratings.get(target_id).copied().unwrap_or((0, 0))
    }

    pub fn for_target(&self, target_id: &Uuid) -> Engagement {
        let like_count = self.likes.get(target_id).copied().unwrap_or(0);
        let (review_count, rating_sum) = self.rating_totals(target_id);
        Engagement {
            like_count,
            review_count,
            average_rating: average(rating_sum, review_count),
        }
    }
}

pub fn average(sum: u64, count: usize) -> Option<f64> {
    if count == 0 {
        return None;
    }
    let avg = sum as f64 / count as f64;
    Some((avg * 100.0).round() / 100.0)
}

/// Ranks visible memes by likes received since `since`; ties go to the newer meme.
pub fn trending(memes: Vec<Meme>, likes: &[Like], since: DateTime<Utc>, limit: usize) -> Vec<(Meme, usize)> {
    let mut recent: HashMap<Uuid, usize> = HashMap::new();
    for like in likes
        .iter()
        .filter(|l| l.kind == TargetKind::Meme && l.created_at >= since)
    {
        *recent.entry(like.target_id).or_default() += 1;
    }

    let mut ranked: Vec<(Meme, usize)> = memes
        .into_iter()
        .filter_map(|meme| {
            let count = recent.get(&meme.meme_id).copied().unwrap_or(0);
            (count > 0).then_some((meme, count))
        })
        .collect();
    ranked.sort_by(|(a, a_likes), (b, b_likes)| {
        b_likes.cmp(a_likes).then_with(|| b.created_at.cmp(&a.created_at))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Serialize, Debug, Clone)]
pub struct TopMeme {
    pub meme_id: Uuid,
    pub title: String,
    pub like_count: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct CreatorStats {
    pub meme_count: usize,
    pub public_meme_count: usize,
    pub likes_received: usize,
    pub reviews_received: usize,
    pub average_rating: Option<f64>,
    pub sales_count: usize,
    pub earnings_cents: u64,
    pub top_memes: Vec<TopMeme>,
}

pub fn creator_stats(own_memes: &[Meme], engagement: &EngagementIndex, sales: &[Transaction]) -> CreatorStats {
    let mut likes_received = 0;
    let mut reviews_received = 0;
    let mut rating_sum = 0u64;
    let mut top: Vec<TopMeme> = Vec::with_capacity(own_memes.len());

    for meme in own_memes {
        let e = engagement.for_target(&meme.meme_id);
        likes_received += e.like_count;
        reviews_received += e.review_count;
        rating_sum += engagement.rating_totals(&meme.meme_id).1;
        top.push(TopMeme {
            meme_id: meme.meme_id,
            title: meme.title.clone(),
            like_count: e.like_count,
        });
    }
    top.sort_by(|a, b| b.like_count.cmp(&a.like_count));
    top.truncate(5);

    let earnings = EarningsSummary::from_sales(sales);
    CreatorStats {
        meme_count: own_memes.len(),
        public_meme_count: own_memes.iter().filter(|m| m.is_public).count(),
        likes_received,
        reviews_received,
        average_rating: average(rating_sum, reviews_received),
        sales_count: earnings.sales_count,
        earnings_cents: earnings.seller_earnings_cents,
        top_memes: top,
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PlatformOverview {
    pub users: usize,
    pub public_users: usize,
    pub memes: usize,
    pub visible_memes: usize,
    pub premium_memes: usize,
    pub likes: usize,
    pub reviews: usize,
    pub transactions: usize,
    pub gross_cents: u64,
    pub platform_earnings_cents: u64,
    pub seller_earnings_cents: u64,
}

pub fn platform_overview(
    owners: &OwnerIndex,
    memes: &[Meme],
    like_count: usize,
    review_count: usize,
    transactions: &[Transaction],
) -> PlatformOverview {
    let earnings = EarningsSummary::from_sales(transactions);
    PlatformOverview {
        users: owners.users().count(),
        public_users: owners.users().filter(|u| u.is_public).count(),
        memes: memes.len(),
        visible_memes: memes.iter().filter(|m| owners.is_visible(m)).count(),
        premium_memes: memes.iter().filter(|m| m.is_premium).count(),
        likes: like_count,
        reviews: review_count,
        transactions: earnings.sales_count,
        gross_cents: earnings.gross_cents,
        platform_earnings_cents: earnings.platform_fees_cents,
        seller_earnings_cents: earnings.seller_earnings_cents,
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub transactions: usize,
    pub gross_cents: u64,
    pub platform_cents: u64,
}

/// One bucket per UTC day for the `days` days ending at `today`, oldest first.
pub fn daily_revenue(transactions: &[Transaction], today: NaiveDate, days: u32) -> Vec<DailyRevenue> {
    let days = days.max(1);
    let first = today - Duration::days(i64::from(days) - 1);
    let mut buckets: BTreeMap<NaiveDate, DailyRevenue> = (0..days)
        .map(|offset| {
            let date = first + Duration::days(i64::from(offset));
            (date, DailyRevenue { date, transactions: 0, gross_cents: 0, platform_cents: 0 })
        })
        .collect();

    for tx in transactions {
        if let Some(bucket) = buckets.get_mut(&tx.created_at.date_naive()) {
            bucket.transactions += 1;
            bucket.gross_cents += tx.price_cents;
            bucket.platform_cents += tx.platform_earnings_cents;
        }
    }
    buckets.into_values().collect()
}
