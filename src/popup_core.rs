use std::time::Duration;

use crate::context::{collect_context, PageContext, ScriptInjector, TabQuery};
use crate::dispatch::{self, HttpSend, RenderedRequest, SendOutcome};
use crate::error::PopupError;
use crate::settings::{load_settings, ExtensionSettings, HttpMethod, OutputPreset, SettingsStore};

/// How long the success message stays up before the popup closes itself.
pub const CLOSE_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertStatus {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl AlertStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            title: "All done!".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            title: "Error".to_string(),
            message: message.into(),
        }
    }
}

impl From<&PopupError> for AlertStatus {
    fn from(err: &PopupError) -> Self {
        match err {
            PopupError::TabQuery(_) | PopupError::NoActiveTab => {
                AlertStatus::error("Could not get current tab!")
            }
            PopupError::Settings(_) => AlertStatus::error("Could not get settings!"),
            PopupError::NoPresets => AlertStatus::error(
                "No output presets are configured. Add one in the extension settings.",
            ),
            PopupError::PresetOutOfRange { .. } => {
                AlertStatus::error("Could not find the selected preset!")
            }
            PopupError::Template(e) => AlertStatus::error(format!("Could not render preset: {e}")),
            PopupError::InvalidUrl { .. } | PopupError::Transport(_) => {
                AlertStatus::error(format!("Could not send content to Obsidian: {err}"))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyKind {
    NoApiKey,
    HasPresets,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Loading,
    /// Loading or rendering hit an error; only re-selecting a preset can recover.
    Failed,
    Ready(ReadyKind),
    Sending,
    Sent(Severity),
}

/// Everything gathered once per popup open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub settings: ExtensionSettings,
    pub context: PageContext,
}

pub async fn open_session<T, S, I>(tabs: &T, store: &S, injector: &I) -> Result<Session, PopupError>
where
    T: TabQuery + ?Sized,
    S: SettingsStore + ?Sized,
    I: ScriptInjector + ?Sized,
{
    let settings = load_settings(store).await?;
    let context = collect_context(tabs, injector).await?;
    Ok(Session { settings, context })
}

/// A request handed off to the network, detached from the UI state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSend {
    pub api_key: String,
    pub endpoint: String,
    pub request: RenderedRequest,
}

impl PendingSend {
    pub async fn dispatch<H: HttpSend + ?Sized>(&self, http: &H) -> Result<SendOutcome, PopupError> {
        dispatch::send(http, &self.api_key, &self.endpoint, &self.request).await
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopupState {
    phase: Phase,
    session: Option<Session>,
    selected: usize,
    request: RenderedRequest,
    status: Option<AlertStatus>,
}

impl PopupState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> Option<&AlertStatus> {
        self.status.as_ref()
    }

    pub fn request(&self) -> &RenderedRequest {
        &self.request
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn presets(&self) -> &[OutputPreset] {
        self.session
            .as_ref()
            .map(|s| s.settings.presets.as_slice())
            .unwrap_or_default()
    }

    /// A session is loaded and carries an API key.
    pub fn has_api_key(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.settings.has_api_key())
    }

    /// Whether the preset picker and request editor are shown: a key and at
    /// least one preset.
    pub fn shows_editor(&self) -> bool {
        self.has_api_key() && !self.presets().is_empty()
    }

    pub fn is_sending(&self) -> bool {
        self.phase == Phase::Sending
    }

    pub fn load(&mut self, session: Session) {
        let has_key = session.settings.has_api_key();
        self.session = Some(session);
        self.selected = 0;
        if !has_key {
            log::info!("no API key configured");
            self.phase = Phase::Ready(ReadyKind::NoApiKey);
            return;
        }
        self.derive_request();
    }

    pub fn fail(&mut self, err: PopupError) {
        log::error!("{err}");
        self.status = Some(AlertStatus::from(&err));
        self.phase = Phase::Failed;
    }

    /// Switches preset and re-renders from the stored page context, dropping hand edits.
    pub fn select_preset(&mut self, index: usize) {
        let selectable = matches!(
            self.phase,
            Phase::Failed | Phase::Ready(ReadyKind::HasPresets) | Phase::Sent(Severity::Error)
        );
        if !selectable || !self.has_api_key() {
            return;
        }
        self.selected = index;
        self.derive_request();
    }

    fn derive_request(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let rendered = session
            .settings
            .preset(self.selected)
            .and_then(|preset| {
                RenderedRequest::from_preset(preset, &session.context).map_err(PopupError::from)
            });
        match rendered {
            Ok(request) => {
                self.request = request;
                self.status = None;
                self.phase = Phase::Ready(ReadyKind::HasPresets);
            }
            Err(e) => {
                self.request = RenderedRequest::default();
                self.fail(e);
            }
        }
    }

    fn editable(&self) -> bool {
        matches!(
            self.phase,
            Phase::Ready(ReadyKind::HasPresets) | Phase::Sent(Severity::Error)
        )
    }

    pub fn set_method(&mut self, method: HttpMethod) {
        if self.editable() {
            self.request.method = method;
        }
    }

    pub fn set_url(&mut self, url: String) {
        if self.editable() {
            self.request.url = url;
        }
    }

    pub fn set_header(&mut self, name: &str, value: String) {
        let name = name.trim();
        if self.editable() && !name.is_empty() {
            self.request.headers.insert(name.to_string(), value);
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        if self.editable() {
            self.request.headers.remove(name);
        }
    }

    pub fn set_content(&mut self, body: String) {
        if self.editable() {
            self.request.body = body;
        }
    }

    /// Moves to `Sending` and returns what to send, or `None` when sending isn't allowed.
    pub fn begin_send(&mut self) -> Option<PendingSend> {
        if !self.editable() {
            return None;
        }
        let settings = &self.session.as_ref()?.settings;
        if !settings.has_api_key() {
            return None;
        }
        let pending = PendingSend {
            api_key: settings.api_key.clone(),
            endpoint: settings.endpoint.clone(),
            request: self.request.clone(),
        };
        self.phase = Phase::Sending;
        self.status = None;
        Some(pending)
    }

    /// Records the outcome of a send. Returns `true` when the popup should close.
    pub fn finish_send(&mut self, result: Result<SendOutcome, PopupError>) -> bool {
        if self.phase != Phase::Sending {
            return false;
        }
        match result {
            Ok(SendOutcome::Delivered { status }) => {
                log::info!("delivered with status {status}");
                self.status = Some(AlertStatus::success(
                    "Your content was sent to Obsidian successfully.",
                ));
                self.phase = Phase::Sent(Severity::Success);
                true
            }
            Ok(SendOutcome::Rejected {
                status,
                error_code,
                message,
            }) => {
                log::warn!("rejected with status {status}: {message}");
                let code = match error_code {
                    Some(code) => format!("Code {code}"),
                    None => format!("HTTP {status}"),
                };
                self.status = Some(AlertStatus::error(format!(
                    "Could not send content to Obsidian: ({code}) {message}"
                )));
                self.phase = Phase::Sent(Severity::Error);
                false
            }
            Err(e) => {
                log::error!("{e}");
                self.status = Some(AlertStatus::from(&e));
                self.phase = Phase::Sent(Severity::Error);
                false
            }
        }
    }
}
