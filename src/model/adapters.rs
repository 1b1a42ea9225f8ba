// src/model/adapters.rs

use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

use crate::model::ad::{
    parse_ad_date, Advertisement, MediaType, Placement, StoredStatus, Tier,
};

/// 广告管理服务的线上数据形态（wire shape）
/// 历史遗留：曝光/点击计数存在两套字段名（impressions/view_count、
/// clicks/click_count），归一化时统一成规范字段，引擎内部不再做兜底判断。
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AdRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub sponsor_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub cta_url: Option<String>,
    pub cta_label: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// 服务端枚举值，如 "ACTIVE" / "PAUSED" / "DELETED"
    #[serde(default)]
    pub status: String,
    /// 服务端枚举值，如 "DASHBOARD" / "SIDEBAR" / "COURSE_PLAYER" / "COURSE_LISTING" / "POPUP"
    #[serde(default)]
    pub placement: String,
    /// 服务端枚举值，如 "GOLD" / "SILVER" / "BRONZE"
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub target_categories: Vec<String>,
    #[serde(default)]
    pub target_batches: Vec<String>,
    pub impressions: Option<u64>,
    pub view_count: Option<u64>,
    pub clicks: Option<u64>,
    pub click_count: Option<u64>,
    #[serde(default)]
    pub daily_impressions: Vec<u64>,
    pub org_id: Option<String>,
}

fn placement_from_wire(raw: &str) -> Placement {
    match raw {
        "DASHBOARD" => Placement::DashboardBanner,
        "SIDEBAR" => Placement::DashboardSidebar,
        "COURSE_PLAYER" => Placement::CoursePlayerSidebar,
        "COURSE_LISTING" => Placement::CourseListingTile,
        "POPUP" => Placement::Popup,
        _ => Placement::Unknown,
    }
}

fn placement_to_wire(placement: Placement) -> &'static str {
    match placement {
        Placement::DashboardBanner => "DASHBOARD",
        Placement::DashboardSidebar => "SIDEBAR",
        Placement::CoursePlayerSidebar => "COURSE_PLAYER",
        Placement::CourseListingTile => "COURSE_LISTING",
        Placement::Popup => "POPUP",
        Placement::Unknown => "UNKNOWN",
    }
}

fn status_from_wire(raw: &str) -> StoredStatus {
    match raw {
        "PAUSED" => StoredStatus::Paused,
        "DELETED" => StoredStatus::Deleted,
        // 未知状态值按 Active 处理，保持界面可渲染
        _ => StoredStatus::Active,
    }
}

fn status_to_wire(status: StoredStatus) -> &'static str {
    match status {
        StoredStatus::Active => "ACTIVE",
        StoredStatus::Paused => "PAUSED",
        StoredStatus::Deleted => "DELETED",
    }
}

fn tier_from_wire(raw: &str) -> Tier {
    match raw {
        "GOLD" => Tier::Gold,
        "SILVER" => Tier::Silver,
        "BRONZE" => Tier::Bronze,
        _ => Tier::Unknown,
    }
}

fn tier_to_wire(tier: Tier) -> &'static str {
    match tier {
        Tier::Gold => "GOLD",
        Tier::Silver => "SILVER",
        Tier::Bronze => "BRONZE",
        Tier::Unknown => "UNKNOWN",
    }
}

/// 入口归一化：wire shape → 引擎规范形态，整个系统唯一的一处字段映射
/// - media_type 根据素材字段派生，video 优先
/// - 计数字段做一次兜底（view_count / click_count），之后不再重复判断
/// - 未知 placement 归一化为 Unknown（永远不会命中查询）
/// - start > end 的倒挂区间不拒绝，仅告警（运行时状态判定顺序保证结果确定）
pub fn normalize_ad(record: AdRecord) -> Advertisement {
    let media_type = if record.video_url.is_some() {
        MediaType::Video
    } else if record.image_url.is_some() {
        MediaType::Image
    } else {
        MediaType::None
    };

    let placement = placement_from_wire(&record.placement);
    if placement == Placement::Unknown {
        warn!(ad_id = %record.id, raw = %record.placement, "unknown placement value, ad will never be selectable");
    }

    if let (Some(start), Some(end)) =
        (parse_ad_date(&record.start_date), parse_ad_date(&record.end_date))
    {
        if start > end {
            warn!(ad_id = %record.id, "inverted flight window (start_date > end_date)");
        }
    }

    Advertisement {
        id: record.id,
        sponsor_name: record.sponsor_name,
        title: record.title,
        description: record.description,
        image_url: record.image_url,
        video_url: record.video_url,
        media_type,
        cta_url: record.cta_url,
        cta_label: record.cta_label,
        start_date: record.start_date,
        end_date: record.end_date,
        status: status_from_wire(&record.status),
        placement,
        tier: tier_from_wire(&record.tier),
        target_roles: record.target_roles,
        target_categories: record.target_categories,
        target_batches: record.target_batches,
        impressions: record.impressions.or(record.view_count).unwrap_or(0),
        clicks: record.clicks.or(record.click_count).unwrap_or(0),
        daily_impressions: record.daily_impressions,
        org_id: record.org_id,
        pending_sync: false,
    }
}

/// 出口映射：引擎规范形态 → wire shape（create / update 时使用）
pub fn to_wire_record(ad: &Advertisement) -> AdRecord {
    AdRecord {
        id: ad.id.clone(),
        sponsor_name: ad.sponsor_name.clone(),
        title: ad.title.clone(),
        description: ad.description.clone(),
        image_url: ad.image_url.clone(),
        video_url: ad.video_url.clone(),
        cta_url: ad.cta_url.clone(),
        cta_label: ad.cta_label.clone(),
        start_date: ad.start_date.clone(),
        end_date: ad.end_date.clone(),
        status: status_to_wire(ad.status).to_string(),
        placement: placement_to_wire(ad.placement).to_string(),
        tier: tier_to_wire(ad.tier).to_string(),
        target_roles: ad.target_roles.clone(),
        target_categories: ad.target_categories.clone(),
        target_batches: ad.target_batches.clone(),
        impressions: Some(ad.impressions),
        view_count: None,
        clicks: Some(ad.clicks),
        click_count: None,
        daily_impressions: ad.daily_impressions.clone(),
        org_id: ad.org_id.clone(),
    }
}

/// 本地持久化缓存的抽象：一个 key 存整份广告集合的 JSON 序列化
/// 读写失败都不致命 —— 读失败视为无缓存，写失败仅记日志
pub trait CacheAdapter: Send + Sync {
    fn read_ads(&self) -> Option<Vec<Advertisement>>;
    fn write_ads(&self, ads: &[Advertisement]);
}

/// 文件缓存实现（单个 JSON 文件）
pub struct FileCacheAdapter {
    pub path: String,
}

impl FileCacheAdapter {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl CacheAdapter for FileCacheAdapter {
    fn read_ads(&self) -> Option<Vec<Advertisement>> {
        let content = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_ads(&self, ads: &[Advertisement]) {
        match serde_json::to_string(ads) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!("failed to write ad cache {}: {}", self.path, e);
                }
            }
            Err(e) => warn!("failed to serialize ad cache: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(placement: &str, tier: &str, status: &str) -> AdRecord {
        AdRecord {
            id: "r-1".to_string(),
            sponsor_name: "Acme".to_string(),
            placement: placement.to_string(),
            tier: tier.to_string(),
            status: status.to_string(),
            ..AdRecord::default()
        }
    }

    #[test]
    fn maps_wire_enums() {
        let ad = normalize_ad(record("COURSE_PLAYER", "SILVER", "PAUSED"));
        assert_eq!(ad.placement, Placement::CoursePlayerSidebar);
        assert_eq!(ad.tier, Tier::Silver);
        assert_eq!(ad.status, StoredStatus::Paused);
    }

    #[test]
    fn unknown_wire_values_degrade() {
        let ad = normalize_ad(record("HOMEPAGE_HERO", "PLATINUM", "ARCHIVED"));
        assert_eq!(ad.placement, Placement::Unknown);
        assert_eq!(ad.tier, Tier::Unknown);
        // 未知存储状态按 Active 处理
        assert_eq!(ad.status, StoredStatus::Active);
    }

    #[test]
    fn counter_fallback_field_names() {
        let mut r = record("POPUP", "GOLD", "ACTIVE");
        r.view_count = Some(42);
        r.click_count = Some(7);
        let ad = normalize_ad(r.clone());
        assert_eq!(ad.impressions, 42);
        assert_eq!(ad.clicks, 7);

        // 规范字段存在时优先于遗留字段
        r.impressions = Some(100);
        let ad = normalize_ad(r);
        assert_eq!(ad.impressions, 100);
    }

    #[test]
    fn video_takes_precedence_over_image() {
        let mut r = record("POPUP", "GOLD", "ACTIVE");
        r.image_url = Some("https://cdn.example.com/a.png".to_string());
        r.video_url = Some("https://cdn.example.com/a.mp4".to_string());
        assert_eq!(normalize_ad(r).media_type, MediaType::Video);
    }

    #[test]
    fn wire_round_trip_preserves_enums() {
        let ad = normalize_ad(record("COURSE_LISTING", "BRONZE", "ACTIVE"));
        let back = normalize_ad(to_wire_record(&ad));
        assert_eq!(back.placement, ad.placement);
        assert_eq!(back.tier, ad.tier);
        assert_eq!(back.status, ad.status);
    }

    #[test]
    fn file_cache_read_failure_is_none() {
        let cache = FileCacheAdapter::new("/nonexistent/dir/ads.json");
        assert!(cache.read_ads().is_none());
    }

    #[test]
    fn file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ads.json");
        let cache = FileCacheAdapter::new(path.to_str().unwrap());
        let ads = vec![normalize_ad(record("DASHBOARD", "GOLD", "ACTIVE"))];
        cache.write_ads(&ads);
        let read = cache.read_ads().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, "r-1");
    }
}
