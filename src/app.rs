use leptos::task::spawn_local;

use leptos::ev;
use leptos::prelude::*;

use crate::dispatch::ReqwestSender;
use crate::host::ChromeHost;
use crate::popup_core::{open_session, AlertStatus, Phase, PopupState, ReadyKind, Severity, CLOSE_DELAY};
use crate::settings::HttpMethod;

const FIELD_STYLE: &str = "padding: 0.4rem; border-radius: 4px; border: 1px solid var(--border-color); background: var(--bg-secondary); color: var(--text-primary); width: 100%; box-sizing: border-box;";
const BUTTON_STYLE: &str = "padding: 0.45rem 0.9rem; border: none; border-radius: 4px; background: var(--accent-color); color: white; font-weight: 600; cursor: pointer;";

#[component]
pub fn App() -> impl IntoView {
    let state = RwSignal::new(PopupState::default());
    let host = ChromeHost;

    Effect::new(move |_| {
        spawn_local(async move {
            match open_session(&host, &host, &host).await {
                Ok(session) => state.update(|s| s.load(session)),
                Err(e) => state.update(|s| s.fail(e)),
            }
        });
    });

    let no_api_key = Memo::new(move |_| {
        state.with(|s| s.phase() == Phase::Ready(ReadyKind::NoApiKey))
    });
    let can_edit = Memo::new(move |_| state.with(PopupState::shows_editor));
    let preset_names = Memo::new(move |_| {
        state.with(|s| s.presets().iter().map(|p| p.name.clone()).collect::<Vec<_>>())
    });

    let open_settings = move |_: ev::MouseEvent| {
        spawn_local(async move {
            if let Err(e) = host.open_options_page().await {
                log::error!("could not open the options page: {e}");
            }
        });
    };

    let send_to_obsidian = move |_: ev::MouseEvent| {
        let Some(pending) = state.try_update(PopupState::begin_send).flatten() else {
            return;
        };
        spawn_local(async move {
            let result = pending.dispatch(&ReqwestSender::default()).await;
            let close = state.try_update(|s| s.finish_send(result)).unwrap_or(false);
            if close {
                set_timeout(
                    move || {
                        if let Err(e) = host.close_popup() {
                            log::error!("could not close the popup: {e}");
                        }
                    },
                    CLOSE_DELAY,
                );
            }
        });
    };

    view! {
        <main class="popup" style="display: flex; flex-direction: column; gap: 0.75rem; width: 420px; padding: 1rem; font-family: sans-serif; --accent-color: #7c3aed; --border-color: #d4d4d8; --bg-primary: #ffffff; --bg-secondary: #f4f5f7; --text-primary: #1a1a1a; background: var(--bg-primary); color: var(--text-primary);">
            <Show when=move || no_api_key.get()>
                <div style="display: flex; flex-direction: column; gap: 0.5rem;">
                    <AlertBanner status=AlertStatus::error("No API Key is set in your settings.") />
                    <button style=BUTTON_STYLE on:click=open_settings>"Go to settings"</button>
                </div>
            </Show>
            <Show when=move || can_edit.get()>
                <div class="option" style="display: flex; gap: 0.5rem; align-items: center;">
                    <select
                        style=FIELD_STYLE
                        title="Preset"
                        on:change=move |ev| {
                            if let Ok(index) = event_target_value(&ev).parse::<usize>() {
                                state.update(|s| s.select_preset(index));
                            }
                        }
                    >
                        {move || preset_names.get().into_iter().enumerate().map(|(idx, name)| {
                            view! {
                                <option
                                    value=idx.to_string()
                                    selected=move || state.with(|s| s.selected() == idx)
                                >
                                    {name}
                                </option>
                            }
                        }).collect_view()}
                    </select>
                    <button
                        style=BUTTON_STYLE
                        prop:disabled=move || state.with(|s| s.is_sending())
                        on:click=send_to_obsidian
                    >
                        {move || if state.with(|s| s.is_sending()) { "Sending..." } else { "Send to Obsidian" }}
                    </button>
                </div>
                <details style="border: 1px solid var(--border-color); border-radius: 4px; padding: 0.5rem;">
                    <summary style="cursor: pointer; font-weight: 600;">"Entry Details"</summary>
                    <RequestParameters state=state />
                </details>
            </Show>
            {move || state.with(|s| s.status().cloned()).map(|status| view! { <AlertBanner status=status /> })}
        </main>
    }
}

/// Hand-editing of the rendered request before it is sent.
#[component]
fn RequestParameters(state: RwSignal<PopupState>) -> impl IntoView {
    let header_names = Memo::new(move |_| {
        state.with(|s| s.request().headers.keys().cloned().collect::<Vec<_>>())
    });
    let (new_header_name, set_new_header_name) = signal(String::new());
    let (new_header_value, set_new_header_value) = signal(String::new());

    let add_header = move |_: ev::MouseEvent| {
        let name = new_header_name.get_untracked();
        if name.trim().is_empty() {
            return;
        }
        state.update(|s| s.set_header(&name, new_header_value.get_untracked()));
        set_new_header_name.set(String::new());
        set_new_header_value.set(String::new());
    };

    view! {
        <div style="display: flex; flex-direction: column; gap: 0.6rem; margin-top: 0.6rem;">
            <label style="font-weight: 600; font-size: 0.85em;">"Method"</label>
            <select
                style=FIELD_STYLE
                prop:value=move || state.with(|s| s.request().method.to_string())
                on:change=move |ev| {
                    if let Ok(method) = event_target_value(&ev).parse::<HttpMethod>() {
                        state.update(|s| s.set_method(method));
                    }
                }
            >
                {HttpMethod::ALL.into_iter().map(|method| view! {
                    <option
                        value=method.as_str()
                        selected=move || state.with(|s| s.request().method == method)
                    >
                        {method.as_str()}
                    </option>
                }).collect_view()}
            </select>

            <label style="font-weight: 600; font-size: 0.85em;">"URL"</label>
            <input
                style=FIELD_STYLE
                type="text"
                prop:value=move || state.with(|s| s.request().url.clone())
                on:input=move |ev| state.update(|s| s.set_url(event_target_value(&ev)))
            />

            <label style="font-weight: 600; font-size: 0.85em;">"Headers"</label>
            <For
                each=move || header_names.get()
                key=|name| name.clone()
                children=move |name: String| {
                    let value_name = name.clone();
                    let input_name = name.clone();
                    let remove_name = name.clone();
                    view! {
                        <div style="display: flex; gap: 0.4rem; align-items: center;">
                            <span style="min-width: 7rem; font-family: monospace; font-size: 0.85em;">{name}</span>
                            <input
                                style=FIELD_STYLE
                                type="text"
                                prop:value=move || state.with(|s| s.request().headers.get(&value_name).cloned().unwrap_or_default())
                                on:input=move |ev| state.update(|s| s.set_header(&input_name, event_target_value(&ev)))
                            />
                            <button
                                style="background: transparent; border: none; cursor: pointer; color: var(--text-primary);"
                                title="Remove header"
                                on:click=move |_| state.update(|s| s.remove_header(&remove_name))
                            >
                                "×"
                            </button>
                        </div>
                    }
                }
            />
            <div style="display: flex; gap: 0.4rem; align-items: center;">
                <input
                    style=FIELD_STYLE
                    type="text"
                    placeholder="Header"
                    prop:value=move || new_header_name.get()
                    on:input=move |ev| set_new_header_name.set(event_target_value(&ev))
                />
                <input
                    style=FIELD_STYLE
                    type="text"
                    placeholder="Value"
                    prop:value=move || new_header_value.get()
                    on:input=move |ev| set_new_header_value.set(event_target_value(&ev))
                />
                <button style=BUTTON_STYLE on:click=add_header>"Add"</button>
            </div>

            <label style="font-weight: 600; font-size: 0.85em;">"Content"</label>
            <textarea
                style=format!("{FIELD_STYLE} min-height: 10rem; font-family: monospace; resize: vertical;")
                prop:value=move || state.with(|s| s.request().body.clone())
                on:input=move |ev| state.update(|s| s.set_content(event_target_value(&ev)))
                spellcheck="false"
            ></textarea>
        </div>
    }
}

#[component]
fn AlertBanner(status: AlertStatus) -> impl IntoView {
    let (border, background) = match status.severity {
        Severity::Success => ("#16a34a", "#f0fdf4"),
        Severity::Error => ("#dc2626", "#fef2f2"),
    };
    view! {
        <div
            role="alert"
            style=format!("border-left: 4px solid {border}; background: {background}; padding: 0.6rem 0.8rem; border-radius: 4px;")
        >
            <div style="font-weight: 600; margin-bottom: 0.2rem;">{status.title}</div>
            <div style="font-size: 0.9em; white-space: pre-wrap;">{status.message}</div>
        </div>
    }
}
