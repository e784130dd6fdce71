use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{HostError, PopupError};

/// The parts of `chrome.tabs.Tab` the popup cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TabInfo {
    pub id: Option<i32>,
    pub url: Option<String>,
    pub title: Option<String>,
}

#[async_trait(?Send)]
pub trait TabQuery {
    /// Foreground tab of the current window, if there is one.
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError>;
}

#[async_trait(?Send)]
pub trait ScriptInjector {
    /// Current text selection of the page loaded in `tab_id`.
    async fn selected_text(&self, tab_id: i32) -> Result<Option<String>, HostError>;
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub selected_text: String,
}

impl PageContext {
    /// Template scope: `{ "page": { "url", "title", "selectedText" } }`.
    pub fn scope(&self) -> Value {
        json!({ "page": self })
    }
}

pub async fn collect_context<T, I>(tabs: &T, injector: &I) -> Result<PageContext, PopupError>
where
    T: TabQuery + ?Sized,
    I: ScriptInjector + ?Sized,
{
    let tab = tabs
        .active_tab()
        .await
        .map_err(PopupError::TabQuery)?
        .ok_or(PopupError::NoActiveTab)?;
    let tab_id = tab.id.ok_or(PopupError::NoActiveTab)?;

    // Pages like the web store refuse injection; the selection is optional.
    let selected_text = match injector.selected_text(tab_id).await {
        Ok(text) => text.unwrap_or_default(),
        Err(e) => {
            log::warn!("could not read selection from tab {tab_id}: {e}");
            String::new()
        }
    };

    Ok(PageContext {
        url: tab.url.unwrap_or_default(),
        title: tab.title.unwrap_or_default(),
        selected_text,
    })
}
