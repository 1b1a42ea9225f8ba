// src/logging/serve_log.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::ad::{Advertisement, Placement, Tier};
use crate::model::context::TargetingContext;

/// **广告位裁决日志**
/// 每次 placement 查询产生一条，记录候选规模与最终胜出广告
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServeLog {
    pub timestamp: String,           // 记录时间
    pub log_type: String,            // 日志类型，固定 "ad_serve_decision"
    pub request_id: String,          // 请求唯一标识
    pub placement: Placement,        // 查询的广告位
    pub context: TargetingContext,   // 请求方的定向上下文
    pub candidates: usize,           // 过滤排序后的候选数
    pub status: String,              // "filled" or "no_fill"
    pub winning_ad: Option<String>,  // 胜出广告 id
    pub winning_tier: Option<Tier>,  // 胜出广告层级
    pub elapsed_ms: u128,            // 查询耗时
}

impl ServeLog {
    pub fn new(request_id: &str, placement: Placement, context: &TargetingContext) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: "ad_serve_decision".to_string(),
            request_id: request_id.to_string(),
            placement,
            context: context.clone(),
            candidates: 0,
            status: "no_fill".to_string(),
            winning_ad: None,
            winning_tier: None,
            elapsed_ms: 0,
        }
    }

    /// **记录裁决结果**
    pub fn settle(&mut self, ranked: &[Advertisement], elapsed_ms: u128) {
        self.candidates = ranked.len();
        self.elapsed_ms = elapsed_ms;
        if let Some(winner) = ranked.first() {
            self.status = "filled".to_string();
            self.winning_ad = Some(winner.id.clone());
            self.winning_tier = Some(winner.tier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ad::{MediaType, StoredStatus};

    #[test]
    fn settle_marks_filled_with_winner() {
        let ad = Advertisement {
            id: "w-1".to_string(),
            sponsor_name: "Acme".to_string(),
            title: "".to_string(),
            description: "".to_string(),
            image_url: None,
            video_url: None,
            media_type: MediaType::None,
            cta_url: None,
            cta_label: None,
            start_date: None,
            end_date: None,
            status: StoredStatus::Active,
            placement: Placement::Popup,
            tier: Tier::Gold,
            target_roles: vec![],
            target_categories: vec![],
            target_batches: vec![],
            impressions: 0,
            clicks: 0,
            daily_impressions: vec![],
            org_id: None,
            pending_sync: false,
        };
        let mut log = ServeLog::new("req-1", Placement::Popup, &TargetingContext::default());
        log.settle(&[ad], 2);
        assert_eq!(log.status, "filled");
        assert_eq!(log.winning_ad.as_deref(), Some("w-1"));
        assert_eq!(log.winning_tier, Some(Tier::Gold));
        assert_eq!(log.candidates, 1);
    }

    #[test]
    fn settle_empty_is_no_fill() {
        let mut log = ServeLog::new("req-2", Placement::Popup, &TargetingContext::default());
        log.settle(&[], 1);
        assert_eq!(log.status, "no_fill");
        assert!(log.winning_ad.is_none());
    }
}
