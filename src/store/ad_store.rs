// src/store/ad_store.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::ad::{
    AdPatch, Advertisement, MediaType, Placement, RuntimeStatus, StoredStatus, Tier,
};
use crate::model::adapters::{normalize_ad, to_wire_record, CacheAdapter};
use crate::model::context::TargetingContext;
use crate::serving::ads_client::AdManagementApi;
use crate::serving::ranker::{primary_for_placement, rank_for_placement};

/// 本地新建广告的载荷（计数器一律从零开始，id 缺省时生成 UUID）
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewAdPayload {
    pub id: Option<String>,
    pub sponsor_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub cta_url: Option<String>,
    pub cta_label: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub placement: Placement,
    pub tier: Tier,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub target_categories: Vec<String>,
    #[serde(default)]
    pub target_batches: Vec<String>,
    pub org_id: Option<String>,
}

type Listener = Box<dyn Fn(&[Advertisement]) + Send + Sync>;

/// 广告集合生命周期管理器
/// 进程内唯一的权威广告集合：启动时从本地缓存热加载，随后由 refresh()
/// 从广告管理服务整体替换；所有变更都会回写缓存并通知订阅者。
/// 集合没有容量上限，也没有淘汰策略，广告只在显式删除时移出。
pub struct AdStore<C: AdManagementApi, K: CacheAdapter> {
    ads: RwLock<Vec<Advertisement>>,
    /// refresh 互斥标记：同一时刻最多一个在途刷新
    syncing: AtomicBool,
    /// 是否已经成功从服务端加载过（决定失败时的缓存回退策略）
    server_loaded: AtomicBool,
    client: C,
    cache: K,
    listeners: Mutex<Vec<Listener>>,
}

impl<C: AdManagementApi, K: CacheAdapter> AdStore<C, K> {
    /// 创建 store 并尝试从本地缓存热加载（缓存缺失/损坏时从空集合开始）
    pub fn new(client: C, cache: K) -> Self {
        let warm = cache.read_ads().unwrap_or_default();
        if !warm.is_empty() {
            info!("hydrated {} ads from local cache", warm.len());
        }
        Self {
            ads: RwLock::new(warm),
            syncing: AtomicBool::new(false),
            server_loaded: AtomicBool::new(false),
            client,
            cache,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// 订阅集合变更（观察者回调，在每次集合变化后调用）
    pub fn subscribe(&self, listener: Listener) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify(&self, snapshot: &[Advertisement]) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener(snapshot);
        }
    }

    /// 当前集合的完整拷贝（纯读）
    pub fn snapshot(&self) -> Vec<Advertisement> {
        self.ads.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.ads.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.read().unwrap().is_empty()
    }

    /// 广告位查询：过滤 + 排序后的全部候选（同步纯读，无 I/O）
    pub fn active_ads_by_placement(
        &self,
        placement: Placement,
        ctx: &TargetingContext,
    ) -> Vec<Advertisement> {
        rank_for_placement(&self.ads.read().unwrap(), placement, ctx, Utc::now())
    }

    /// 广告位查询：单个最优广告
    pub fn primary_ad_for_placement(
        &self,
        placement: Placement,
        ctx: &TargetingContext,
    ) -> Option<Advertisement> {
        primary_for_placement(&self.ads.read().unwrap(), placement, ctx, Utc::now())
    }

    /// 从广告管理服务全量刷新集合
    /// - 已有刷新在途时，本次调用直接返回 Ok（不排队、不报错、不发请求）
    /// - 成功：整体替换（不合并）、回写缓存、标记 server_loaded、通知订阅者
    /// - 失败：从未成功加载过 → 回退到本地缓存副本；加载过 → 保留现有集合；
    ///   两种情况错误都抛给调用方
    pub async fn refresh(&self) -> EngineResult<()> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let result = self.client.list().await;
        let outcome = match result {
            Ok(records) => {
                let normalized: Vec<Advertisement> =
                    records.into_iter().map(normalize_ad).collect();
                info!("refreshed ad collection: {} ads", normalized.len());
                {
                    let mut ads = self.ads.write().unwrap();
                    *ads = normalized;
                    self.cache.write_ads(&ads);
                }
                self.server_loaded.store(true, Ordering::SeqCst);
                self.notify(&self.snapshot());
                Ok(())
            }
            Err(e) => {
                if !self.server_loaded.load(Ordering::SeqCst) {
                    // 首次加载失败：尽力回退到最近一次落盘的缓存副本
                    if let Some(cached) = self.cache.read_ads() {
                        warn!("refresh failed, serving {} cached ads: {}", cached.len(), e);
                        *self.ads.write().unwrap() = cached;
                        self.notify(&self.snapshot());
                    } else {
                        warn!("refresh failed and no cache available: {}", e);
                    }
                } else {
                    // 曾经加载成功：保留当前集合，绝不破坏性覆盖
                    warn!("refresh failed, keeping stale collection: {}", e);
                }
                Err(e)
            }
        };

        self.syncing.store(false, Ordering::SeqCst);
        outcome
    }

    /// 本地新建广告：同步插入集合头部，不调用外部服务
    pub fn add_ad(&self, payload: NewAdPayload) -> Advertisement {
        let media_type = if payload.video_url.is_some() {
            MediaType::Video
        } else if payload.image_url.is_some() {
            MediaType::Image
        } else {
            MediaType::None
        };
        let ad = Advertisement {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            sponsor_name: payload.sponsor_name,
            title: payload.title,
            description: payload.description,
            image_url: payload.image_url,
            video_url: payload.video_url,
            media_type,
            cta_url: payload.cta_url,
            cta_label: payload.cta_label,
            start_date: payload.start_date,
            end_date: payload.end_date,
            status: StoredStatus::Active,
            placement: payload.placement,
            tier: payload.tier,
            target_roles: payload.target_roles,
            target_categories: payload.target_categories,
            target_batches: payload.target_batches,
            impressions: 0,
            clicks: 0,
            daily_impressions: vec![],
            org_id: payload.org_id,
            pending_sync: false,
        };
        {
            let mut ads = self.ads.write().unwrap();
            ads.insert(0, ad.clone());
            self.cache.write_ads(&ads);
        }
        self.notify(&self.snapshot());
        ad
    }

    /// 两段式更新：
    /// 第一段（同步，任何 await 之前）：乐观合并补丁、打上 pending_sync 标记，
    /// 调用方在 update_ad 返回前就能观察到合并后的值；
    /// 第二段（异步）：推送到服务端，成功则清除标记并触发全量 refresh 对账，
    /// 失败则整体回滚到合并前的记录并把错误抛给调用方。
    pub async fn update_ad(&self, id: &str, patch: AdPatch) -> EngineResult<()> {
        let (previous, merged) = {
            let mut ads = self.ads.write().unwrap();
            let Some(ad) = ads.iter_mut().find(|a| a.id == id) else {
                return Err(EngineError::AdNotFound(id.to_string()));
            };
            let previous = ad.clone();
            patch.apply(ad);
            ad.pending_sync = true;
            let merged = ad.clone();
            self.cache.write_ads(&ads);
            (previous, merged)
        };
        self.notify(&self.snapshot());

        match self.client.update(id, &to_wire_record(&merged)).await {
            Ok(()) => {
                {
                    let mut ads = self.ads.write().unwrap();
                    if let Some(ad) = ads.iter_mut().find(|a| a.id == id) {
                        ad.pending_sync = false;
                    }
                }
                // 对账刷新失败不影响本次更新的结果（保留陈旧集合的既有策略）
                if let Err(e) = self.refresh().await {
                    warn!("post-update refresh failed: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                {
                    let mut ads = self.ads.write().unwrap();
                    if let Some(ad) = ads.iter_mut().find(|a| a.id == id) {
                        *ad = previous;
                    }
                    self.cache.write_ads(&ads);
                }
                self.notify(&self.snapshot());
                Err(e)
            }
        }
    }

    /// 保守删除：先删服务端，成功后才移出本地集合（绝不乐观删除）
    pub async fn delete_ad(&self, id: &str) -> EngineResult<()> {
        self.client.delete(id).await?;
        {
            let mut ads = self.ads.write().unwrap();
            ads.retain(|a| a.id != id);
            self.cache.write_ads(&ads);
        }
        self.notify(&self.snapshot());
        Ok(())
    }

    /// 在 Active / Paused 之间翻转存储状态
    /// 运行时状态已经 Expired 的广告不可翻转（投放窗口已关闭），
    /// Deleted 同样不受影响；返回翻转后的存储状态，no-op 时返回 None。
    pub fn toggle_ad_status(&self, id: &str) -> Option<StoredStatus> {
        let now = Utc::now();
        let toggled = {
            let mut ads = self.ads.write().unwrap();
            let ad = ads.iter_mut().find(|a| a.id == id)?;
            if ad.runtime_status(now) == RuntimeStatus::Expired {
                return None;
            }
            let next = match ad.status {
                StoredStatus::Active => StoredStatus::Paused,
                StoredStatus::Paused => StoredStatus::Active,
                StoredStatus::Deleted => return None,
            };
            ad.status = next;
            self.cache.write_ads(&ads);
            next
        };
        self.notify(&self.snapshot());
        Some(toggled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adapters::AdRecord;
    use chrono::Duration;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// 可编程的假广告管理服务
    struct MockApi {
        records: Mutex<Vec<AdRecord>>,
        list_calls: AtomicUsize,
        fail_list: AtomicBool,
        fail_update: AtomicBool,
        fail_delete: AtomicBool,
        /// 置位后 list() 会阻塞，直到测试通过 release 放行
        gated: AtomicBool,
        started: Notify,
        release: Notify,
    }

    impl MockApi {
        fn with_records(records: Vec<AdRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                list_calls: AtomicUsize::new(0),
                fail_list: AtomicBool::new(false),
                fail_update: AtomicBool::new(false),
                fail_delete: AtomicBool::new(false),
                gated: AtomicBool::new(false),
                started: Notify::new(),
                release: Notify::new(),
            }
        }

        fn fail() -> EngineError {
            // 用一个确定性的解码错误模拟上游失败
            EngineError::Decode(serde_json::from_str::<Vec<AdRecord>>("not json").unwrap_err())
        }
    }

    impl AdManagementApi for &MockApi {
        async fn list(&self) -> EngineResult<Vec<AdRecord>> {
            if self.gated.load(Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(MockApi::fail());
            }
            Ok(self.records.lock().unwrap().clone())
        }

        async fn update(&self, _id: &str, _record: &AdRecord) -> EngineResult<()> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(MockApi::fail());
            }
            Ok(())
        }

        async fn delete(&self, id: &str) -> EngineResult<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(MockApi::fail());
            }
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
    }

    /// 内存缓存假实现
    #[derive(Default)]
    struct MemCache {
        inner: Mutex<Option<Vec<Advertisement>>>,
        writes: AtomicUsize,
    }

    impl CacheAdapter for &MemCache {
        fn read_ads(&self) -> Option<Vec<Advertisement>> {
            self.inner.lock().unwrap().clone()
        }

        fn write_ads(&self, ads: &[Advertisement]) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.inner.lock().unwrap() = Some(ads.to_vec());
        }
    }

    fn wire_ad(id: &str) -> AdRecord {
        AdRecord {
            id: id.to_string(),
            sponsor_name: "Acme".to_string(),
            title: "title".to_string(),
            status: "ACTIVE".to_string(),
            placement: "DASHBOARD".to_string(),
            tier: "GOLD".to_string(),
            impressions: Some(10),
            clicks: Some(1),
            ..AdRecord::default()
        }
    }

    fn payload(sponsor: &str) -> NewAdPayload {
        NewAdPayload {
            sponsor_name: sponsor.to_string(),
            title: "t".to_string(),
            placement: Placement::Popup,
            tier: Tier::Bronze,
            ..NewAdPayload::default()
        }
    }

    #[tokio::test]
    async fn refresh_replaces_collection_and_persists() {
        let api = MockApi::with_records(vec![wire_ad("s-1"), wire_ad("s-2")]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        store.add_ad(payload("local"));

        store.refresh().await.unwrap();
        // 整体替换，本地新增的广告被服务端结果覆盖
        let ids: Vec<String> = store.snapshot().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["s-1", "s-2"]);
        assert!(cache.inner.lock().unwrap().as_ref().unwrap().len() == 2);
    }

    #[tokio::test]
    async fn concurrent_refresh_is_single_fetch() {
        // 'static 生命周期供 tokio::spawn 使用（测试进程内有意泄漏）
        let api_ref: &'static MockApi = Box::leak(Box::new(MockApi::with_records(vec![wire_ad("s-1")])));
        api_ref.gated.store(true, Ordering::SeqCst);
        let cache: &'static MemCache = Box::leak(Box::new(MemCache::default()));
        let store: Arc<AdStore<&'static MockApi, &'static MemCache>> =
            Arc::new(AdStore::new(api_ref, cache));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh().await })
        };
        // 等到第一个 refresh 确实进入网络调用
        api_ref.started.notified().await;

        // 在途期间的第二次调用：no-op、立即 Ok、不触发第二次 fetch
        store.refresh().await.unwrap();
        assert_eq!(api_ref.list_calls.load(Ordering::SeqCst), 0);

        api_ref.release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(api_ref.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn first_refresh_failure_falls_back_to_cache() {
        let api = MockApi::with_records(vec![]);
        api.fail_list.store(true, Ordering::SeqCst);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);

        // 缓存副本在 store 启动之后才出现（例如同机的另一次会话落盘）
        let seeded = vec![normalize_ad(wire_ad("cached-1"))];
        (&cache).write_ads(&seeded);

        let err = store.refresh().await;
        assert!(err.is_err());
        // 回退到缓存副本，但错误仍然抛出
        assert_eq!(store.snapshot()[0].id, "cached-1");
    }

    #[tokio::test]
    async fn refresh_failure_after_load_retains_stale() {
        let api = MockApi::with_records(vec![wire_ad("s-1")]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        store.refresh().await.unwrap();

        api.fail_list.store(true, Ordering::SeqCst);
        api.records.lock().unwrap().clear();
        assert!(store.refresh().await.is_err());
        // 瞬时失败不做破坏性覆盖
        assert_eq!(store.snapshot()[0].id, "s-1");
    }

    #[tokio::test]
    async fn add_ad_prepends_with_zero_counters() {
        let api = MockApi::with_records(vec![]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);

        store.add_ad(payload("first"));
        let ad = store.add_ad(payload("second"));
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].sponsor_name, "second");
        assert_eq!(snapshot[0].impressions, 0);
        assert_eq!(snapshot[0].clicks, 0);
        assert!(!ad.id.is_empty());
        // 本地新建不访问服务端
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_ad_merges_optimistically_then_reconciles() {
        let api = MockApi::with_records(vec![wire_ad("s-1")]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        store.refresh().await.unwrap();

        let patch = AdPatch {
            title: Some("updated title".to_string()),
            tier: Some(Tier::Silver),
            ..AdPatch::default()
        };
        store.update_ad("s-1", patch).await.unwrap();
        // 服务端确认后 pending 标记被清除，且触发了对账 refresh
        let ad = store.snapshot().into_iter().find(|a| a.id == "s-1").unwrap();
        assert!(!ad.pending_sync);
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_ad_rolls_back_on_confirmation_failure() {
        let api = MockApi::with_records(vec![wire_ad("s-1")]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        store.refresh().await.unwrap();
        api.fail_update.store(true, Ordering::SeqCst);

        let patch = AdPatch {
            title: Some("doomed".to_string()),
            ..AdPatch::default()
        };
        assert!(store.update_ad("s-1", patch).await.is_err());
        let ad = store.snapshot().into_iter().find(|a| a.id == "s-1").unwrap();
        // 回滚到合并前的记录
        assert_eq!(ad.title, "title");
        assert!(!ad.pending_sync);
    }

    #[tokio::test]
    async fn update_unknown_id_is_error_without_upstream_call() {
        let api = MockApi::with_records(vec![]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        let result = store.update_ad("ghost", AdPatch::default()).await;
        assert!(matches!(result, Err(EngineError::AdNotFound(_))));
    }

    #[tokio::test]
    async fn delete_is_conservative() {
        let api = MockApi::with_records(vec![wire_ad("s-1")]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        store.refresh().await.unwrap();

        api.fail_delete.store(true, Ordering::SeqCst);
        assert!(store.delete_ad("s-1").await.is_err());
        // 服务端失败时本地不动
        assert_eq!(store.len(), 1);

        api.fail_delete.store(false, Ordering::SeqCst);
        store.delete_ad("s-1").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn toggle_flips_active_and_paused() {
        let api = MockApi::with_records(vec![]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        let ad = store.add_ad(payload("x"));

        assert_eq!(store.toggle_ad_status(&ad.id), Some(StoredStatus::Paused));
        assert_eq!(store.toggle_ad_status(&ad.id), Some(StoredStatus::Active));
        assert_eq!(store.toggle_ad_status("ghost"), None);
    }

    #[tokio::test]
    async fn toggle_is_noop_for_expired_flight() {
        let api = MockApi::with_records(vec![]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        let mut p = payload("x");
        p.end_date =
            Some((Utc::now() - Duration::days(5)).format("%Y-%m-%d").to_string());
        let ad = store.add_ad(p);

        // 投放窗口已关闭的广告不可翻转
        assert_eq!(store.toggle_ad_status(&ad.id), None);
        assert_eq!(
            store.snapshot()[0].status,
            StoredStatus::Active
        );
    }

    #[tokio::test]
    async fn listeners_observe_mutations() {
        let api = MockApi::with_records(vec![]);
        let cache = MemCache::default();
        let store = AdStore::new(&api, &cache);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        store.subscribe(Box::new(move |ads| {
            seen_clone.store(ads.len(), Ordering::SeqCst);
        }));

        store.add_ad(payload("a"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        store.add_ad(payload("b"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn warm_start_hydrates_from_cache() {
        let cache = MemCache::default();
        (&cache).write_ads(&[normalize_ad(wire_ad("warm-1"))]);
        let api = MockApi::with_records(vec![]);
        let store = AdStore::new(&api, &cache);
        assert_eq!(store.snapshot()[0].id, "warm-1");
    }
}
