//! Avatar Directory Reader.
//!
//! Reads the remote avatar list, keeps only `ACTIVE` entries, and deduplicates
//! them by id in first-seen order. Results are cached for a bounded time so UI
//! refreshes do not hit the remote list endpoint every time.

use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    interpreter::{self, AvatarListDiagnostic},
    response::ApiResponse,
    transport::{ApiRequest, Transport, endpoints},
};

const CACHE_KEY: &str = "avatars";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarStatus {
    Active,
    Other(String),
}

impl AvatarStatus {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("ACTIVE") => AvatarStatus::Active,
            Some(other) => AvatarStatus::Other(other.to_string()),
            None => AvatarStatus::Other(String::new()),
        }
    }
}

/// One remote avatar, normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvatarDescriptor {
    pub id: String,
    /// Display name; the id when the remote entry has none.
    pub label: String,
    pub default_voice_id: Option<String>,
    pub preview_url: Option<String>,
    pub is_public: bool,
    pub status: AvatarStatus,
}

impl AvatarDescriptor {
    /// Reads one raw list entry. Entries without an id are unusable and yield `None`.
    pub fn from_raw(item: &Value) -> Option<Self> {
        let id = id_of(item)?.to_string();
        Some(Self {
            label: label_of(item).unwrap_or(&id).to_string(),
            default_voice_id: default_voice_of(item).map(str::to_string),
            preview_url: item
                .get("normal_preview")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            is_public: item.get("is_public").and_then(Value::as_bool).unwrap_or(false),
            status: AvatarStatus::parse(item.get("status").and_then(Value::as_str)),
            id,
        })
    }

    /// Only `ACTIVE` avatars may back a streaming session.
    pub fn is_eligible(&self) -> bool {
        self.status == AvatarStatus::Active
    }
}

/// The list entries of an avatar-list response. Accepts `data: [...]` and
/// `data: {avatars: [...]}`.
pub(crate) fn raw_items(response: &ApiResponse) -> &[Value] {
    response
        .data
        .as_array()
        .or_else(|| response.data.get("avatars").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn id_of(item: &Value) -> Option<&str> {
    item.get("avatar_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn label_of(item: &Value) -> Option<&str> {
    item.get("pose_name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn default_voice_of(item: &Value) -> Option<&str> {
    let voice = item.get("default_voice")?;
    voice
        .as_str()
        .or_else(|| voice.get("voice_id").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Filters raw entries to eligible avatars, unique by id, first-seen order kept.
pub fn normalize(items: &[Value]) -> Vec<AvatarDescriptor> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(AvatarDescriptor::from_raw)
        .filter(AvatarDescriptor::is_eligible)
        .filter(|a| seen.insert(a.id.clone()))
        .collect()
}

pub struct AvatarDirectory {
    transport: Arc<dyn Transport>,
    cache: Option<Cache<&'static str, Arc<Vec<AvatarDescriptor>>>>,
}

impl AvatarDirectory {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Creates a directory reader. A zero `ttl` disables caching.
    pub fn new(transport: Arc<dyn Transport>, ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(ttl)
                .build()
        });
        Self { transport, cache }
    }

    /// Returns the eligible avatars, or `EmptyDirectory` when none remain.
    pub async fn list_avatars(&self) -> Result<Vec<AvatarDescriptor>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&CACHE_KEY).await {
                debug!(count = cached.len(), "Serving avatar list from cache");
                return Ok(cached.as_ref().clone());
            }
        }

        let response = self.fetch().await?;
        interpreter::interpret("List streaming avatars", &response);
        if !response.is_success() {
            return Err(Error::Remote(response.failure()));
        }

        let avatars = normalize(raw_items(&response));
        info!(count = avatars.len(), "Avatar directory loaded");
        if avatars.is_empty() {
            return Err(Error::EmptyDirectory);
        }
        if let Some(cache) = &self.cache {
            cache.insert(CACHE_KEY, Arc::new(avatars.clone())).await;
        }
        Ok(avatars)
    }

    /// Looks up one eligible avatar by id.
    pub async fn find(&self, avatar_id: &str) -> Result<Option<AvatarDescriptor>> {
        match self.list_avatars().await {
            Ok(avatars) => Ok(avatars.into_iter().find(|a| a.id == avatar_id)),
            Err(Error::EmptyDirectory) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetches the raw list, bypassing the cache, and summarizes its shape.
    pub async fn diagnose(&self) -> Result<AvatarListDiagnostic> {
        let response = self.fetch().await?;
        Ok(interpreter::interpret_avatar_list(&response))
    }

    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    async fn fetch(&self) -> Result<ApiResponse> {
        self.transport
            .execute(ApiRequest::get(endpoints::LIST_AVATARS))
            .await
    }
}
