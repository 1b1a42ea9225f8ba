// src/analytics/aggregator.rs

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::ad::{Advertisement, MediaType, RuntimeStatus};

/// 单条广告的效果数据行
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdPerformanceRow {
    pub id: String,
    pub sponsor_name: String,
    pub title: String,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
}

/// 时间序列中的一天
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub impressions: f64,
}

/// 统计快照：每次读取现算，不缓存
/// 总量口径覆盖整个集合（Paused / Expired 的历史计数仍计入生命周期总量），
/// 只有 active_count 按运行时状态过滤。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnalyticsSnapshot {
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub overall_ctr: f64,
    pub active_count: usize,
    pub per_ad: Vec<AdPerformanceRow>,
    pub media_distribution: HashMap<MediaType, u64>,
    /// 尾部窗口的按天曝光序列。广告自带按天历史时读历史
    /// （窗口比历史长时循环取值），否则把生命周期总量均摊到窗口上 ——
    /// 后者是展示用的估算值，不是逐日实测数据。
    pub time_series: Vec<DailyPoint>,
    /// 时间序列中存在均摊估算时为 true，供消费方明示口径
    pub time_series_estimated: bool,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// 对当前广告集合做一次完整的统计聚合（纯函数）
pub fn compute_analytics(
    ads: &[Advertisement],
    now: DateTime<Utc>,
    window_days: usize,
) -> AnalyticsSnapshot {
    let total_impressions: u64 = ads.iter().map(|a| a.impressions).sum();
    let total_clicks: u64 = ads.iter().map(|a| a.clicks).sum();
    let overall_ctr = if total_impressions == 0 {
        0.0
    } else {
        round2(total_clicks as f64 / total_impressions as f64 * 100.0)
    };

    let active_count = ads
        .iter()
        .filter(|a| a.runtime_status(now) == RuntimeStatus::Active)
        .count();

    let per_ad = ads
        .iter()
        .map(|a| AdPerformanceRow {
            id: a.id.clone(),
            sponsor_name: a.sponsor_name.clone(),
            title: a.title.clone(),
            impressions: a.impressions,
            clicks: a.clicks,
            ctr: a.ctr(),
        })
        .collect();

    let mut media_distribution: HashMap<MediaType, u64> = HashMap::new();
    for ad in ads {
        *media_distribution.entry(ad.media_type).or_insert(0) += ad.impressions;
    }

    let mut time_series = Vec::with_capacity(window_days);
    let mut time_series_estimated = false;
    for i in 0..window_days {
        let date = (now - Duration::days((window_days - 1 - i) as i64)).date_naive();
        let mut impressions = 0.0;
        for ad in ads {
            if ad.daily_impressions.is_empty() {
                if ad.impressions > 0 {
                    time_series_estimated = true;
                }
                impressions += ad.impressions as f64 / window_days as f64;
            } else {
                impressions += ad.daily_impressions[i % ad.daily_impressions.len()] as f64;
            }
        }
        time_series.push(DailyPoint { date, impressions });
    }

    AnalyticsSnapshot {
        total_impressions,
        total_clicks,
        overall_ctr,
        active_count,
        per_ad,
        media_distribution,
        time_series,
        time_series_estimated,
    }
}
