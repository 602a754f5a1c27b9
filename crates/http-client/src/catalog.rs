//! Catalog adapter — `GET {catalog_base}/{item_id}` with `X-API-Key`.

use async_trait::async_trait;
use model::CatalogItem;
use reqwest::StatusCode;
use service::{CatalogService, ServiceError};
use uuid::Uuid;

use crate::HttpClient;

pub struct CatalogHttpAdapter {
    client: HttpClient,
    base_url: String,
    access_token: String,
}

impl CatalogHttpAdapter {
    pub fn new(client: HttpClient, base_url: String, access_token: String) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }
}

#[async_trait]
impl CatalogService for CatalogHttpAdapter {
    async fn get_item_stock(&self, item_id: Uuid) -> Result<Option<CatalogItem>, ServiceError> {
        let url = format!("{}/{item_id}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url, &[("X-API-Key", self.access_token.as_str())])
            .await
            .map_err(|e| ServiceError::Catalog(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let item = response
            .json::<CatalogItem>()
            .await
            .map_err(|e| ServiceError::Catalog(e.to_string()))?;
        Ok(Some(item))
    }
}
