//! Fetching and holding flag definitions.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use split_wrapper_core::Attributes;

use crate::error::{Error, Result};

/// Response body of the definitions endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitChanges {
    pub splits: Vec<SplitDefinition>,
    /// Change number of this snapshot.
    #[serde(default)]
    pub till: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitDefinition {
    pub name: String,
    pub default_treatment: String,
    #[serde(default)]
    pub killed: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Serve `treatment` when the attribute's value is one of `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    #[serde(rename = "in")]
    pub values: Vec<String>,
    pub treatment: String,
}

impl Condition {
    fn matches(&self, attributes: Option<&Attributes>) -> bool {
        attributes
            .and_then(|attrs| attrs.get(&self.attribute))
            .map(|value| {
                let value = value.to_string();
                self.values.iter().any(|v| *v == value)
            })
            .unwrap_or(false)
    }
}

impl SplitDefinition {
    /// First matching condition wins; killed flags always serve the default.
    pub fn treatment(&self, attributes: Option<&Attributes>) -> &str {
        if self.killed {
            return &self.default_treatment;
        }
        self.conditions
            .iter()
            .find(|c| c.matches(attributes))
            .map(|c| c.treatment.as_str())
            .unwrap_or(&self.default_treatment)
    }
}

/// An indexed snapshot of all flag definitions.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    splits: HashMap<String, SplitDefinition>,
    change_number: i64,
}

impl Definitions {
    pub fn from_changes(changes: SplitChanges) -> Self {
        Self {
            splits: changes
                .splits
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
            change_number: changes.till,
        }
    }

    /// `None` if the service does not define `flag`.
    pub fn treatment(&self, flag: &str, attributes: Option<&Attributes>) -> Option<&str> {
        self.splits.get(flag).map(|s| s.treatment(attributes))
    }

    pub fn change_number(&self) -> i64 {
        self.change_number
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

/// Retrieves definitions from the flag service.
pub struct DefinitionsFetcher {
    client: ClientWithMiddleware,
    url: String,
    etag: RwLock<Option<String>>,
}

impl DefinitionsFetcher {
    pub fn new(client: ClientWithMiddleware, sdk_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/splitChanges", sdk_url.trim_end_matches('/')),
            etag: RwLock::new(None),
        }
    }

    /// Fetch the latest definitions.
    ///
    /// Returns `None` if they have not changed (304 Not Modified).
    pub async fn fetch(&self) -> Result<Option<Definitions>> {
        let mut request = self.client.get(&self.url);

        {
            let etag = self.etag.read().await;
            if let Some(ref etag_value) = *etag {
                request = request.header(IF_NONE_MATCH, etag_value);
            }
        }

        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Error::DefinitionsFetch(format!(
                "service returned status {}",
                response.status()
            )));
        }

        if let Some(etag_value) = response.headers().get(ETAG) {
            if let Ok(etag_str) = etag_value.to_str() {
                let mut etag = self.etag.write().await;
                *etag = Some(etag_str.to_string());
            }
        }

        let bytes = response.bytes().await?;
        let changes: SplitChanges = serde_json::from_slice(&bytes)
            .map_err(|e| Error::DefinitionsParse(e.to_string()))?;

        Ok(Some(Definitions::from_changes(changes)))
    }
}

/// Definitions shared between the evaluating caller and the refresh task.
pub struct SharedDefinitions {
    state: ArcSwapOption<Definitions>,
}

impl SharedDefinitions {
    pub fn new() -> Self {
        Self {
            state: ArcSwapOption::empty(),
        }
    }

    /// Replace the current definitions. Returns `true` on the first load.
    pub fn update(&self, definitions: Definitions) -> bool {
        self.state.swap(Some(Arc::new(definitions))).is_none()
    }

    pub fn get(&self) -> Option<Arc<Definitions>> {
        self.state.load_full()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.load().is_some()
    }
}

impl Default for SharedDefinitions {
    fn default() -> Self {
        Self::new()
    }
}
