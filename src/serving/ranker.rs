// src/serving/ranker.rs

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::ad::{Advertisement, Placement, RuntimeStatus, Tier};
use crate::model::context::{targeting_matches, TargetingContext};

/// 层级 → 优先级查表（Gold > Silver > Bronze，未知层级为 0）
static TIER_PRIORITY: Lazy<HashMap<Tier, u8>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(Tier::Gold, 3);
    m.insert(Tier::Silver, 2);
    m.insert(Tier::Bronze, 1);
    m
});

pub fn tier_priority(tier: Tier) -> u8 {
    TIER_PRIORITY.get(&tier).copied().unwrap_or(0)
}

/// 同一广告位内竞争广告的全序比较
/// 主键：层级优先级降序；次键：end_date 越早越靠前
/// （临近到期的广告优先曝光，尽量在下线前耗完剩余排期）。
/// end_date 缺失或无法解析的排在可解析的之后。
/// 与 Vec::sort_by（稳定排序）配合使用，键完全相等时保持输入顺序。
pub fn compare_ads(a: &Advertisement, b: &Advertisement) -> Ordering {
    tier_priority(b.tier)
        .cmp(&tier_priority(a.tier))
        .then_with(|| match (a.parsed_end_date(), b.parsed_end_date()) {
            (Some(ea), Some(eb)) => ea.cmp(&eb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// 广告位查询：过滤（槽位 → 运行时 Active → 定向命中）再排序
/// 纯读操作，不做任何 I/O，也不改动集合本身，可以在每次渲染时调用。
pub fn rank_for_placement(
    ads: &[Advertisement],
    placement: Placement,
    ctx: &TargetingContext,
    now: DateTime<Utc>,
) -> Vec<Advertisement> {
    let mut candidates: Vec<Advertisement> = ads
        .iter()
        .filter(|ad| ad.placement == placement)
        .filter(|ad| ad.runtime_status(now) == RuntimeStatus::Active)
        .filter(|ad| targeting_matches(ad, ctx))
        .cloned()
        .collect();
    candidates.sort_by(compare_ads);
    candidates
}

/// 单个最优广告：排序结果的第一条，没有候选时为 None
pub fn primary_for_placement(
    ads: &[Advertisement],
    placement: Placement,
    ctx: &TargetingContext,
    now: DateTime<Utc>,
) -> Option<Advertisement> {
    rank_for_placement(ads, placement, ctx, now).into_iter().next()
}
