use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use url::Url;

use crate::context::PageContext;
use crate::error::{HostError, PopupError};
use crate::settings::{HttpMethod, OutputPreset};
use crate::template::{Template, TemplateError};

/// A preset rendered against a page. Every field stays editable until sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RenderedRequest {
    pub fn from_preset(preset: &OutputPreset, context: &PageContext) -> Result<Self, TemplateError> {
        let scope = context.scope();
        let headers: BTreeMap<String, String> = preset
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), Template::compile(value)?.render(&scope))))
            .collect::<Result<_, TemplateError>>()?;

        Ok(Self {
            method: preset.method,
            url: Template::compile(&preset.url_template)?.render(&scope),
            headers,
            body: Template::compile(&preset.content_template)?.render(&scope),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutboundRequest {
    pub fn build(
        api_key: &str,
        endpoint: &str,
        rendered: &RenderedRequest,
    ) -> Result<Self, PopupError> {
        let url = resolve_url(endpoint, &rendered.url)?;

        let mut headers: Vec<(String, String)> = rendered
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
            .map(|(name, value)| (name.clone(), header_safe(value).into_owned()))
            .collect();
        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), "text/markdown".to_string()));
        }
        headers.push(("Authorization".to_string(), format!("Bearer {api_key}")));

        let body = rendered
            .method
            .allows_body()
            .then(|| rendered.body.clone());

        Ok(Self {
            method: rendered.method,
            url,
            headers,
            body,
        })
    }
}

/// `fetch` only takes visible-ASCII header values; anything else is
/// percent-encoded.
fn header_safe(value: &str) -> Cow<'_, str> {
    if value
        .bytes()
        .all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
    {
        Cow::Borrowed(value)
    } else {
        urlencoding::encode(value)
    }
}

/// Absolute targets are used as-is; anything else is appended to the
/// endpoint, keeping whatever path prefix the endpoint carries.
fn resolve_url(endpoint: &str, target: &str) -> Result<String, PopupError> {
    let target = target.trim();
    if let Ok(absolute) = Url::parse(target) {
        return Ok(absolute.into());
    }

    let base = Url::parse(endpoint).map_err(|e| PopupError::InvalidUrl {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        target.trim_start_matches('/')
    );
    Url::parse(&joined)
        .map(String::from)
        .map_err(|e| PopupError::InvalidUrl {
            url: joined,
            reason: e.to_string(),
        })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait(?Send)]
pub trait HttpSend {
    async fn send(&self, request: &OutboundRequest) -> Result<HttpResponse, HostError>;
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Sends requests through `reqwest`, which uses `fetch` on wasm32.
#[derive(Clone, Debug, Default)]
pub struct ReqwestSender {
    client: reqwest::Client,
}

#[async_trait(?Send)]
impl HttpSend for ReqwestSender {
    async fn send(&self, request: &OutboundRequest) -> Result<HttpResponse, HostError> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HostError::new(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| HostError::new(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Error payload returned by the Obsidian REST API.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: Value,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered {
        status: u16,
    },
    Rejected {
        status: u16,
        error_code: Option<String>,
        message: String,
    },
}

pub fn classify(response: &HttpResponse) -> SendOutcome {
    let status = response.status;
    if status < 300 {
        return SendOutcome::Delivered { status };
    }

    match serde_json::from_str::<ErrorBody>(&response.body) {
        Ok(body) => SendOutcome::Rejected {
            status,
            error_code: Some(match body.error_code {
                Value::String(code) => code,
                other => other.to_string(),
            }),
            message: body.message,
        },
        Err(_) => {
            let raw = response.body.trim();
            SendOutcome::Rejected {
                status,
                error_code: None,
                message: if raw.is_empty() {
                    format!("HTTP {status}")
                } else {
                    raw.to_string()
                },
            }
        }
    }
}

pub async fn send<H: HttpSend + ?Sized>(
    http: &H,
    api_key: &str,
    endpoint: &str,
    rendered: &RenderedRequest,
) -> Result<SendOutcome, PopupError> {
    let request = OutboundRequest::build(api_key, endpoint, rendered)?;
    log::info!("sending {} {}", request.method, request.url);
    let response = http.send(&request).await.map_err(PopupError::Transport)?;
    let outcome = classify(&response);
    log::debug!("obsidian answered {}: {outcome:?}", response.status);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::RefCell;

    struct RecordingHttp {
        response: Result<HttpResponse, HostError>,
        sent: RefCell<Vec<OutboundRequest>>,
    }

    impl RecordingHttp {
        fn answering(status: u16, body: &str) -> Self {
            Self {
                response: Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    #[async_trait(?Send)]
    impl HttpSend for RecordingHttp {
        async fn send(&self, request: &OutboundRequest) -> Result<HttpResponse, HostError> {
            self.sent.borrow_mut().push(request.clone());
            self.response.clone()
        }
    }

    fn context() -> PageContext {
        PageContext {
            url: "https://example.com/post".to_string(),
            title: "Hello World".to_string(),
            selected_text: "a quote".to_string(),
        }
    }

    fn rendered(method: HttpMethod, url: &str) -> RenderedRequest {
        RenderedRequest {
            method,
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: "content".to_string(),
        }
    }

    #[test]
    fn renders_url_headers_and_body() {
        let preset = OutputPreset {
            name: "Clip".to_string(),
            method: HttpMethod::Patch,
            url_template: "https://x/{{page.title}}".to_string(),
            headers: BTreeMap::from([
                ("Heading".to_string(), "{{page.title}}".to_string()),
                ("X-Source".to_string(), "{{page.url}}".to_string()),
            ]),
            content_template: "> {{page.selectedText}}".to_string(),
        };

        let request = RenderedRequest::from_preset(&preset, &context()).unwrap();
        assert_eq!(request.method, HttpMethod::Patch);
        assert_eq!(request.url, "https://x/Hello World");
        assert_eq!(request.headers["Heading"], "Hello World");
        assert_eq!(request.headers["X-Source"], "https://example.com/post");
        assert_eq!(request.body, "> a quote");
    }

    #[test]
    fn broken_header_template_fails_rendering() {
        let preset = OutputPreset {
            name: "Broken".to_string(),
            method: HttpMethod::Post,
            url_template: "/".to_string(),
            headers: BTreeMap::from([("Heading".to_string(), "{{page.title".to_string())]),
            content_template: String::new(),
        };
        assert!(matches!(
            RenderedRequest::from_preset(&preset, &context()),
            Err(TemplateError::Unclosed { .. })
        ));
    }

    #[test]
    fn relative_urls_join_the_endpoint() {
        let request = OutboundRequest::build(
            "key",
            "https://127.0.0.1:27124",
            &rendered(HttpMethod::Post, "/periodic/daily/"),
        )
        .unwrap();
        assert_eq!(request.url, "https://127.0.0.1:27124/periodic/daily/");
    }

    #[test]
    fn absolute_urls_ignore_the_endpoint() {
        let request = OutboundRequest::build(
            "key",
            "https://127.0.0.1:27124",
            &rendered(HttpMethod::Put, "http://localhost:27123/vault/Hello World.md"),
        )
        .unwrap();
        assert_eq!(request.url, "http://localhost:27123/vault/Hello%20World.md");
    }

    #[test]
    fn endpoint_path_prefix_is_kept() {
        for endpoint in ["https://host/obsidian", "https://host/obsidian/"] {
            let request = OutboundRequest::build(
                "key",
                endpoint,
                &rendered(HttpMethod::Put, "/vault/x.md"),
            )
            .unwrap();
            assert_eq!(request.url, "https://host/obsidian/vault/x.md");
        }
    }

    #[test]
    fn invalid_endpoint_is_reported() {
        assert!(matches!(
            OutboundRequest::build("key", "not a url", &rendered(HttpMethod::Post, "/x")),
            Err(PopupError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn attaches_bearer_key_and_default_content_type() {
        let mut request = rendered(HttpMethod::Post, "/vault/note.md");
        request
            .headers
            .insert("authorization".to_string(), "Bearer stale".to_string());
        request
            .headers
            .insert("Heading".to_string(), "Clips".to_string());

        let outbound = OutboundRequest::build("secret", "https://127.0.0.1:27124", &request).unwrap();
        assert_eq!(
            outbound.headers,
            vec![
                ("Heading".to_string(), "Clips".to_string()),
                ("Content-Type".to_string(), "text/markdown".to_string()),
                ("Authorization".to_string(), "Bearer secret".to_string()),
            ]
        );
        assert_eq!(outbound.body.as_deref(), Some("content"));
    }

    #[test]
    fn keeps_user_content_type_and_drops_get_body() {
        let mut request = rendered(HttpMethod::Get, "/active/");
        request
            .headers
            .insert("content-type".to_string(), "application/json".to_string());

        let outbound = OutboundRequest::build("k", "https://127.0.0.1:27124", &request).unwrap();
        assert_eq!(outbound.headers.len(), 2);
        assert_eq!(outbound.headers[0].1, "application/json");
        assert_eq!(outbound.body, None);
    }

    #[test]
    fn head_drops_the_body() {
        let outbound = OutboundRequest::build(
            "k",
            "https://127.0.0.1:27124",
            &rendered(HttpMethod::Head, "/vault/note.md"),
        )
        .unwrap();
        assert_eq!(outbound.body, None);
        assert_eq!(reqwest::Method::from(outbound.method), reqwest::Method::HEAD);
    }

    #[test]
    fn non_ascii_header_values_are_percent_encoded() {
        let preset = OutputPreset {
            name: "Heading".to_string(),
            method: HttpMethod::Patch,
            url_template: "/active/".to_string(),
            headers: BTreeMap::from([
                ("Heading".to_string(), "{{page.title}}".to_string()),
                ("X-Source".to_string(), "{{page.url}}".to_string()),
            ]),
            content_template: String::new(),
        };
        let page = PageContext {
            title: "Café – Menü".to_string(),
            ..context()
        };

        let rendered = RenderedRequest::from_preset(&preset, &page).unwrap();
        let outbound = OutboundRequest::build("k", "https://127.0.0.1:27124", &rendered).unwrap();
        assert_eq!(
            outbound.headers[0],
            (
                "Heading".to_string(),
                "Caf%C3%A9%20%E2%80%93%20Men%C3%BC".to_string()
            )
        );
        assert_eq!(
            outbound.headers[1],
            ("X-Source".to_string(), "https://example.com/post".to_string())
        );
        // The editable copy keeps the readable text.
        assert_eq!(rendered.headers["Heading"], "Café – Menü");
    }

    #[test]
    fn status_below_300_is_delivered() {
        for status in [200, 204, 299] {
            let response = HttpResponse { status, body: String::new() };
            assert_eq!(classify(&response), SendOutcome::Delivered { status });
        }
    }

    #[test]
    fn status_300_is_rejected_with_parsed_body() {
        let response = HttpResponse {
            status: 300,
            body: r#"{"errorCode": 40149, "message": "File does not exist"}"#.to_string(),
        };
        assert_eq!(
            classify(&response),
            SendOutcome::Rejected {
                status: 300,
                error_code: Some("40149".to_string()),
                message: "File does not exist".to_string(),
            }
        );
    }

    #[test]
    fn unexpected_error_body_is_passed_through() {
        let response = HttpResponse {
            status: 502,
            body: "Bad Gateway\n".to_string(),
        };
        assert_eq!(
            classify(&response),
            SendOutcome::Rejected {
                status: 502,
                error_code: None,
                message: "Bad Gateway".to_string(),
            }
        );

        let empty = HttpResponse { status: 401, body: String::new() };
        assert!(matches!(
            classify(&empty),
            SendOutcome::Rejected { message, .. } if message == "HTTP 401"
        ));
    }

    #[test]
    fn send_builds_and_classifies() {
        let http = RecordingHttp::answering(204, "");
        let outcome = block_on(send(
            &http,
            "secret",
            "https://127.0.0.1:27124",
            &rendered(HttpMethod::Post, "/periodic/daily/"),
        ))
        .unwrap();

        assert_eq!(outcome, SendOutcome::Delivered { status: 204 });
        let sent = http.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://127.0.0.1:27124/periodic/daily/");
    }

    #[test]
    fn transport_failure_is_reported() {
        let http = RecordingHttp {
            response: Err(HostError::new("Failed to fetch")),
            sent: RefCell::new(Vec::new()),
        };
        let result = block_on(send(
            &http,
            "k",
            "https://127.0.0.1:27124",
            &rendered(HttpMethod::Post, "/"),
        ));
        assert_eq!(
            result,
            Err(PopupError::Transport(HostError::new("Failed to fetch")))
        );
    }
}
