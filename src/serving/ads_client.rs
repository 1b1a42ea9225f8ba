// src/serving/ads_client.rs

use reqwest::Client;
use std::future::Future;
use tracing::debug;

use crate::error::EngineResult;
use crate::model::adapters::AdRecord;

/// 广告管理服务的访问接口
/// 抽成 trait 是为了让 AdStore 在测试里可以注入假实现
/// （创建广告走管理后台直连，引擎这侧只消费 list / update / delete）。
pub trait AdManagementApi: Send + Sync {
    fn list(&self) -> impl Future<Output = EngineResult<Vec<AdRecord>>> + Send;
    fn update(&self, id: &str, record: &AdRecord) -> impl Future<Output = EngineResult<()>> + Send;
    fn delete(&self, id: &str) -> impl Future<Output = EngineResult<()>> + Send;
}

/// reqwest 实现，指向真实（或 mock）的广告管理服务
pub struct AdsServiceClient {
    client: Client,
    base_url: String,
}

impl AdsServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl AdManagementApi for AdsServiceClient {
    async fn list(&self) -> EngineResult<Vec<AdRecord>> {
        let url = format!("{}/ads", self.base_url);
        debug!("fetching ad list from {}", url);
        let records = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<AdRecord>>()
            .await?;
        Ok(records)
    }

    async fn update(&self, id: &str, record: &AdRecord) -> EngineResult<()> {
        let url = format!("{}/ads/{}", self.base_url, id);
        self.client
            .put(&url)
            .header("Content-Type", "application/json")
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> EngineResult<()> {
        let url = format!("{}/ads/{}", self.base_url, id);
        self.client.delete(&url).send().await?.error_for_status()?;
        Ok(())
    }
}
