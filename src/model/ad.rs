// src/model/ad.rs

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 广告位枚举
/// 每条广告只属于一个广告位；Unknown 表示服务端下发了无法识别的槽位值，
/// 这类广告永远不会命中任何查询（直到配置被修正）。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    DashboardBanner,
    DashboardSidebar,
    CoursePlayerSidebar,
    CourseListingTile,
    Popup,
    Unknown,
}

impl Placement {
    /// URL 路径中的槽位名（与 serde 的 snake_case 保持一致）
    pub fn from_slug(slug: &str) -> Option<Placement> {
        match slug {
            "dashboard_banner" => Some(Placement::DashboardBanner),
            "dashboard_sidebar" => Some(Placement::DashboardSidebar),
            "course_player_sidebar" => Some(Placement::CoursePlayerSidebar),
            "course_listing_tile" => Some(Placement::CourseListingTile),
            "popup" => Some(Placement::Popup),
            _ => None,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Unknown
    }
}

/// 赞助层级，仅用于排序优先级（Gold > Silver > Bronze）
/// 未知层级按最低优先级处理（priority = 0）
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Gold,
    Silver,
    Bronze,
    Unknown,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Unknown
    }
}

/// 存储状态：由广告主/管理后台显式设置，与投放日期无关
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoredStatus {
    Active,
    Paused,
    Deleted,
}

/// 运行时状态：查询时根据存储状态 + 当前时间派生，不落库
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Active,
    Paused,
    Deleted,
    Scheduled,
    Expired,
}

/// 素材类型，归一化时根据 video_url / image_url 派生（video 优先）
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Image,
    None,
}

/// 赞助商广告（引擎内部规范形态）
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Advertisement {
    pub id: String,
    pub sponsor_name: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub media_type: MediaType,
    pub cta_url: Option<String>,
    pub cta_label: Option<String>,
    /// 投放起止日期，保留原始字符串，解析推迟到查询时刻
    /// （无法解析的日期视为"无此约束"，见 runtime_status）
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: StoredStatus,
    pub placement: Placement,
    pub tier: Tier,
    /// 定向维度：空列表 = 对所有人投放
    pub target_roles: Vec<String>,
    pub target_categories: Vec<String>,
    pub target_batches: Vec<String>,
    pub impressions: u64,
    pub clicks: u64,
    /// 可选的按天曝光历史，仅供统计时间序列使用
    #[serde(default)]
    pub daily_impressions: Vec<u64>,
    pub org_id: Option<String>,
    /// 本地乐观更新尚未得到服务端确认时为 true（不参与序列化）
    #[serde(skip)]
    pub pending_sync: bool,
}

/// 解析投放日期：先按 "YYYY-MM-DD" 解析（取当天零点 UTC），
/// 再退回 RFC3339；两者都失败则视为日期缺失。
pub fn parse_ad_date(raw: &Option<String>) -> Option<DateTime<Utc>> {
    let s = raw.as_deref()?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Utc.from_local_datetime(&d.and_hms_opt(0, 0, 0)?).single();
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Advertisement {
    /// 派生运行时状态
    /// 判定顺序：Deleted → Paused → Scheduled（start 严格在 now 之后）
    /// → Expired（end 严格在 now 之前）→ Active。
    /// 无法解析的日期不触发 Scheduled/Expired，静默退化为 Active。
    pub fn runtime_status(&self, now: DateTime<Utc>) -> RuntimeStatus {
        match self.status {
            StoredStatus::Deleted => return RuntimeStatus::Deleted,
            StoredStatus::Paused => return RuntimeStatus::Paused,
            StoredStatus::Active => {}
        }
        if let Some(start) = parse_ad_date(&self.start_date) {
            if start > now {
                return RuntimeStatus::Scheduled;
            }
        }
        if let Some(end) = parse_ad_date(&self.end_date) {
            if end < now {
                return RuntimeStatus::Expired;
            }
        }
        RuntimeStatus::Active
    }

    pub fn parsed_end_date(&self) -> Option<DateTime<Utc>> {
        parse_ad_date(&self.end_date)
    }

    /// 点击率（百分比，保留两位小数），始终现算、从不落库
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            return 0.0;
        }
        let raw = self.clicks as f64 / self.impressions as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }
}

/// 局部更新补丁：仅 Some 的字段会被合并进目标广告
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AdPatch {
    pub sponsor_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<Option<String>>,
    pub video_url: Option<Option<String>>,
    pub cta_url: Option<Option<String>>,
    pub cta_label: Option<Option<String>>,
    pub start_date: Option<Option<String>>,
    pub end_date: Option<Option<String>>,
    pub status: Option<StoredStatus>,
    pub placement: Option<Placement>,
    pub tier: Option<Tier>,
    pub target_roles: Option<Vec<String>>,
    pub target_categories: Option<Vec<String>>,
    pub target_batches: Option<Vec<String>>,
}

impl AdPatch {
    /// 将补丁合并到广告上，同时保持 media_type 与素材字段一致
    pub fn apply(&self, ad: &mut Advertisement) {
        if let Some(v) = &self.sponsor_name {
            ad.sponsor_name = v.clone();
        }
        if let Some(v) = &self.title {
            ad.title = v.clone();
        }
        if let Some(v) = &self.description {
            ad.description = v.clone();
        }
        if let Some(v) = &self.image_url {
            ad.image_url = v.clone();
        }
        if let Some(v) = &self.video_url {
            ad.video_url = v.clone();
        }
        if let Some(v) = &self.cta_url {
            ad.cta_url = v.clone();
        }
        if let Some(v) = &self.cta_label {
            ad.cta_label = v.clone();
        }
        if let Some(v) = &self.start_date {
            ad.start_date = v.clone();
        }
        if let Some(v) = &self.end_date {
            ad.end_date = v.clone();
        }
        if let Some(v) = self.status {
            ad.status = v;
        }
        if let Some(v) = self.placement {
            ad.placement = v;
        }
        if let Some(v) = self.tier {
            ad.tier = v;
        }
        if let Some(v) = &self.target_roles {
            ad.target_roles = v.clone();
        }
        if let Some(v) = &self.target_categories {
            ad.target_categories = v.clone();
        }
        if let Some(v) = &self.target_batches {
            ad.target_batches = v.clone();
        }
        // 素材字段变动后重新派生 media_type（video 优先）
        ad.media_type = if ad.video_url.is_some() {
            MediaType::Video
        } else if ad.image_url.is_some() {
            MediaType::Image
        } else {
            MediaType::None
        };
    }
}
