//! `{{ path }}` interpolation compatible with micromustache's `render`.
//!
//! Tags are resolved against a JSON scope with dotted or bracketed paths
//! (`page.title`, `items[0]`, `page["title"]`). A path that does not resolve
//! renders as the empty string.

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("missing }}}} for the tag opened at byte {position}")]
    Unclosed { position: usize },
    #[error("empty tag at byte {position}")]
    EmptyPath { position: usize },
    #[error("invalid variable path {0:?}")]
    InvalidPath(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(String),
    Tag(Vec<Segment>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    tokens: Vec<Token>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        static RE_TAG: OnceLock<Regex> = OnceLock::new();
        let re_tag = RE_TAG.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());

        let mut tokens = Vec::new();
        let mut cursor = 0usize;
        for cap in re_tag.captures_iter(source) {
            let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            push_literal(&mut tokens, source, cursor, whole.start())?;

            let path = inner.as_str().trim();
            if path.is_empty() {
                return Err(TemplateError::EmptyPath {
                    position: whole.start(),
                });
            }
            tokens.push(Token::Tag(parse_path(path)?));
            cursor = whole.end();
        }
        push_literal(&mut tokens, source, cursor, source.len())?;

        Ok(Self { tokens })
    }

    pub fn render(&self, scope: &Value) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Tag(segments) => {
                    if let Some(value) = lookup(scope, segments) {
                        out.push_str(&stringify(value));
                    }
                }
            }
        }
        out
    }
}

fn push_literal(
    tokens: &mut Vec<Token>,
    source: &str,
    start: usize,
    end: usize,
) -> Result<(), TemplateError> {
    let text = &source[start..end];
    if let Some(offset) = text.find("{{") {
        return Err(TemplateError::Unclosed {
            position: start + offset,
        });
    }
    if !text.is_empty() {
        tokens.push(Token::Literal(text.to_string()));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PathState {
    Start,
    AfterDot,
    AfterSegment,
}

fn parse_path(path: &str) -> Result<Vec<Segment>, TemplateError> {
    let invalid = || TemplateError::InvalidPath(path.to_string());

    let mut segments = Vec::new();
    let mut state = PathState::Start;
    let mut rest = path;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            if state == PathState::AfterDot {
                return Err(invalid());
            }
            let close = after.find(']').ok_or_else(invalid)?;
            segments.push(bracket_segment(after[..close].trim()).ok_or_else(invalid)?);
            rest = &after[close + 1..];
            state = PathState::AfterSegment;
        } else if let Some(after) = rest.strip_prefix('.') {
            if state != PathState::AfterSegment {
                return Err(invalid());
            }
            rest = after;
            state = PathState::AfterDot;
        } else {
            if state == PathState::AfterSegment {
                return Err(invalid());
            }
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let key = &rest[..end];
            if key
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ']' | '{' | '}'))
            {
                return Err(invalid());
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &rest[end..];
            state = PathState::AfterSegment;
        }
    }

    if state != PathState::AfterSegment {
        return Err(invalid());
    }
    Ok(segments)
}

fn bracket_segment(inner: &str) -> Option<Segment> {
    for quote in ['"', '\''] {
        if let Some(key) = inner
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Some(Segment::Key(key.to_string()));
        }
    }
    inner.parse::<usize>().ok().map(Segment::Index)
}

fn lookup<'a>(scope: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(scope, |value, segment| match (segment, value) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Key(key), Value::Array(items)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        })
}

fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(text) => Cow::Borrowed(text),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Cow::Owned(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, scope: &Value) -> Result<String, TemplateError> {
        Ok(Template::compile(source)?.render(scope))
    }

    fn page_scope() -> Value {
        json!({
            "page": {
                "url": "https://example.com/a?b=c",
                "title": "Hello World",
                "selectedText": "",
            }
        })
    }

    #[test]
    fn substitutes_nested_path() {
        let scope = json!({ "page": { "title": "Hello World" } });
        assert_eq!(
            render("https://x/{{page.title}}", &scope).unwrap(),
            "https://x/Hello World"
        );
    }

    #[test]
    fn trims_whitespace_inside_tags() {
        assert_eq!(
            render("[{{ page.title }}]({{\tpage.url\n}})", &page_scope()).unwrap(),
            "[Hello World](https://example.com/a?b=c)"
        );
    }

    #[test]
    fn absent_paths_render_empty() {
        let out = render("a{{page.missing}}b{{nothing.at.all}}c", &page_scope()).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn descending_through_a_string_renders_empty() {
        assert_eq!(render("{{page.title.length}}", &page_scope()).unwrap(), "");
    }

    #[test]
    fn supports_bracket_segments() {
        let scope = json!({
            "items": ["zero", "one"],
            "page": { "title": "T" },
            "map": { "3": "three" },
        });
        assert_eq!(
            render("{{items[1]}} {{page[\"title\"]}} {{page['title']}} {{map[3]}} {{items.0}}", &scope)
                .unwrap(),
            "one T T three zero"
        );
    }

    #[test]
    fn stringifies_non_string_values() {
        let scope = json!({ "n": 42, "f": 1.5, "b": true, "z": null, "o": { "k": [1, 2] } });
        assert_eq!(
            render("{{n}}|{{f}}|{{b}}|{{z}}|{{o}}", &scope).unwrap(),
            "42|1.5|true||{\"k\":[1,2]}"
        );
    }

    #[test]
    fn keeps_multiline_literals() {
        let source = "## {{page.title}}\nURL: {{page.url}}\n> {{page.selectedText}}";
        assert_eq!(
            render(source, &page_scope()).unwrap(),
            "## Hello World\nURL: https://example.com/a?b=c\n> "
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let template = Template::compile("{{page.title}}-{{page.url}}-{{page.none}}").unwrap();
        let scope = page_scope();
        assert_eq!(template.render(&scope), template.render(&scope));
    }

    #[test]
    fn rejects_unclosed_tag() {
        assert_eq!(
            Template::compile("ok {{page.title}} then {{page.url"),
            Err(TemplateError::Unclosed { position: 23 })
        );
    }

    #[test]
    fn rejects_empty_tag() {
        assert_eq!(
            Template::compile("x{{  }}"),
            Err(TemplateError::EmptyPath { position: 1 })
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        for source in ["{{a..b}}", "{{.a}}", "{{a.}}", "{{a b}}", "{{a[0}}", "{{a.[0]}}", "{{a[x]}}"] {
            assert!(
                matches!(Template::compile(source), Err(TemplateError::InvalidPath(_))),
                "{source} should be rejected"
            );
        }
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("no tags } here {", &page_scope()).unwrap(), "no tags } here {");
        assert_eq!(render("", &page_scope()).unwrap(), "");
    }
}
