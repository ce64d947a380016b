// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use assetgrid_app::{
    ApiError, AssetApi, AssetId, AssetRecord, AssetStatus, NewAsset, StatusState, parse_iso_date,
};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Blocking client for the item REST API.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let base_url = Url::parse(trimmed)
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                base_url.scheme()
            );
        }
        if base_url.cannot_be_a_base() {
            bail!("api.base_url {trimmed:?} cannot carry a path");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `<base>/api/items/<segments..>`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "items"])
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .send()
            .map_err(|error| connection_error(&self.base_url, &error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl AssetApi for Client {
    fn list_items(&self) -> Result<Vec<AssetRecord>, ApiError> {
        let url = self.endpoint(&[])?;
        debug!(%url, "listing items");
        let response = self.send(self.http.get(url))?;
        let items: Vec<ItemDto> = response
            .json()
            .map_err(|error| ApiError::Decode(format!("item list: {error}")))?;
        items.into_iter().map(ItemDto::into_record).collect()
    }

    fn patch_item(&self, id: &AssetId, patch: &Value) -> Result<(), ApiError> {
        let url = self.endpoint(&[id.as_str()])?;
        debug!(%url, body = %patch, "patching item");
        self.send(self.http.patch(url).json(patch))?;
        Ok(())
    }

    fn delete_items(&self, ids: &[AssetId]) -> Result<(), ApiError> {
        let url = self.endpoint(&["batch"])?;
        debug!(%url, count = ids.len(), "deleting items");
        self.send(self.http.delete(url).json(&json!({ "ids": ids })))?;
        Ok(())
    }

    fn create_item(&self, item: &NewAsset) -> Result<AssetRecord, ApiError> {
        let url = self.endpoint(&[])?;
        debug!(%url, id = %item.id, "creating item");
        let response = self.send(self.http.post(url).json(&NewItemDto::from(item)))?;
        let created: ItemDto = response
            .json()
            .map_err(|error| ApiError::Decode(format!("created item: {error}")))?;
        created.into_record()
    }
}

fn connection_error(base_url: &Url, error: &reqwest::Error) -> ApiError {
    let reason = if error.is_timeout() {
        "timed out".to_owned()
    } else {
        error.to_string()
    };
    ApiError::Transport(format!(
        "cannot reach {base_url} -- check api.base_url and that the server is running ({reason})"
    ))
}

/// One item as the server sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[serde(rename = "type", default)]
    pub asset_type: String,
    #[serde(default)]
    pub vehicle: String,
    pub status_state: String,
    #[serde(default)]
    pub status_level: Option<u8>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub sub_rows: Vec<ItemDto>,
}

impl ItemDto {
    pub fn into_record(self) -> Result<AssetRecord, ApiError> {
        let end_date = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                // Full timestamps carry the calendar day in their first ten bytes.
                let day = raw.get(..10).unwrap_or(raw);
                Some(parse_iso_date(day).map_err(|_| {
                    ApiError::Decode(format!("item {}: invalid endDate {raw:?}", self.id))
                })?)
            }
        };
        let sub_rows = self
            .sub_rows
            .into_iter()
            .map(ItemDto::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AssetRecord {
            id: AssetId::new(self.id),
            serial: self.serial,
            category: self.category,
            brand: self.brand,
            asset_type: self.asset_type,
            vehicle: self.vehicle,
            status: AssetStatus::new(StatusState::parse(&self.status_state), self.status_level),
            end_date,
            sub_rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItemDto<'a> {
    pub id: &'a str,
    pub serial: &'a str,
    pub category: &'a str,
    pub brand: &'a str,
    #[serde(rename = "type")]
    pub asset_type: &'a str,
    pub vehicle: &'a str,
    pub status_state: &'a str,
    pub status_level: Option<u8>,
}

impl<'a> From<&'a NewAsset> for NewItemDto<'a> {
    fn from(item: &'a NewAsset) -> Self {
        Self {
            id: item.id.as_str(),
            serial: &item.serial,
            category: &item.category,
            brand: &item.brand,
            asset_type: &item.asset_type,
            vehicle: &item.vehicle,
            status_state: item.status.state.as_str(),
            status_level: item.status.level,
        }
    }
}
