use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{HostError, PopupError};

/// Where the Obsidian Local REST API listens unless the user configured otherwise.
pub const DEFAULT_ENDPOINT: &str = "https://127.0.0.1:27124";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// `fetch` rejects a request body for these verbs.
    pub fn allows_body(self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported HTTP method {s:?}"))
    }
}

// Stored presets use lowercase verbs; hand-written ones often don't.
impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => raw.parse().map_err(serde::de::Error::custom),
            None => Ok(HttpMethod::default()),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputPreset {
    pub name: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub url_template: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: BTreeMap<String, String>,
    pub content_template: String,
}

impl OutputPreset {
    fn daily_note() -> Self {
        Self {
            name: "Append to current daily note".to_string(),
            method: HttpMethod::Post,
            url_template: "/periodic/daily/".to_string(),
            headers: BTreeMap::new(),
            content_template: "## {{page.title}}\nURL: {{page.url}}\n> {{page.selectedText}}\n"
                .to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionSettings {
    pub api_key: String,
    pub endpoint: String,
    pub presets: Vec<OutputPreset>,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            presets: vec![OutputPreset::daily_note()],
        }
    }
}

impl ExtensionSettings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn preset(&self, index: usize) -> Result<&OutputPreset, PopupError> {
        if self.presets.is_empty() {
            return Err(PopupError::NoPresets);
        }
        self.presets.get(index).ok_or(PopupError::PresetOutOfRange {
            index,
            len: self.presets.len(),
        })
    }
}

/// Extension-scoped persistent storage holding the settings record.
#[async_trait(?Send)]
pub trait SettingsStore {
    async fn read_settings(&self) -> Result<Value, HostError>;
}

pub async fn load_settings<S: SettingsStore + ?Sized>(
    store: &S,
) -> Result<ExtensionSettings, PopupError> {
    let raw = store
        .read_settings()
        .await
        .map_err(|e| PopupError::Settings(e.to_string()))?;
    // An untouched storage area comes back as `{}` (or nothing at all).
    let raw = if raw.is_null() { Value::Object(Default::default()) } else { raw };
    let settings: ExtensionSettings =
        serde_json::from_value(raw).map_err(|e| PopupError::Settings(e.to_string()))?;
    log::debug!(
        "loaded settings: {} preset(s), api key {}",
        settings.presets.len(),
        if settings.has_api_key() { "set" } else { "missing" }
    );
    Ok(settings)
}
