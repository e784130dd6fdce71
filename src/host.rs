//! Bindings to the extension APIs the popup runs against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::context::{ScriptInjector, TabInfo, TabQuery};
use crate::error::HostError;
use crate::settings::SettingsStore;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    async fn tabs_query(query: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "scripting"], js_name = executeScript)]
    async fn execute_script(injection: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = get)]
    async fn storage_sync_get(keys: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = openOptionsPage)]
    async fn runtime_open_options_page() -> Result<JsValue, JsValue>;
}

// Serialized by the browser and run inside the page, so it has to be plain JS.
#[wasm_bindgen(inline_js = "export function read_selection() { \
    return () => { const s = window.getSelection(); return s ? s.toString() : null; }; }")]
extern "C" {
    fn read_selection() -> js_sys::Function;
}

impl From<JsValue> for HostError {
    fn from(value: JsValue) -> Self {
        if let Some(err) = value.dyn_ref::<js_sys::Error>() {
            return HostError(String::from(err.message()));
        }
        HostError(value.as_string().unwrap_or_else(|| format!("{value:?}")))
    }
}

impl From<serde_wasm_bindgen::Error> for HostError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        HostError(err.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveTabQuery {
    active: bool,
    current_window: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InjectionTarget {
    tab_id: i32,
}

#[derive(Deserialize)]
struct RawTab {
    id: Option<i32>,
    url: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct InjectionResult {
    #[serde(default)]
    result: Option<String>,
}

/// The running extension: `chrome.*` APIs plus the popup window itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChromeHost;

impl ChromeHost {
    pub async fn open_options_page(&self) -> Result<(), HostError> {
        runtime_open_options_page().await?;
        Ok(())
    }

    pub fn close_popup(&self) -> Result<(), HostError> {
        let window = web_sys::window().ok_or_else(|| HostError::new("no window"))?;
        window.close()?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl TabQuery for ChromeHost {
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
        let query = serde_wasm_bindgen::to_value(&ActiveTabQuery {
            active: true,
            current_window: true,
        })?;
        let tabs: Vec<RawTab> = serde_wasm_bindgen::from_value(tabs_query(query).await?)?;
        Ok(tabs.into_iter().next().map(|tab| TabInfo {
            id: tab.id,
            url: tab.url,
            title: tab.title,
        }))
    }
}

#[async_trait(?Send)]
impl ScriptInjector for ChromeHost {
    async fn selected_text(&self, tab_id: i32) -> Result<Option<String>, HostError> {
        let injection = js_sys::Object::new();
        js_sys::Reflect::set(
            &injection,
            &JsValue::from_str("target"),
            &serde_wasm_bindgen::to_value(&InjectionTarget { tab_id })?,
        )?;
        js_sys::Reflect::set(&injection, &JsValue::from_str("func"), &read_selection())?;

        let results: Vec<InjectionResult> =
            serde_wasm_bindgen::from_value(execute_script(injection.into()).await?)?;
        Ok(results.into_iter().next().and_then(|r| r.result))
    }
}

#[async_trait(?Send)]
impl SettingsStore for ChromeHost {
    async fn read_settings(&self) -> Result<Value, HostError> {
        let raw = storage_sync_get(JsValue::NULL).await?;
        Ok(serde_wasm_bindgen::from_value(raw)?)
    }
}
