// SPDX-License-Identifier: MPL-2.0
//! Adaptive Card rendering of a bug report for chat clients.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use super::{Fields, ReportPayload};
use crate::config::defaults::{
    ADAPTIVE_CARD_SCHEMA, ADAPTIVE_CARD_VERSION, NO_SCREENSHOT_TEXT, NO_STACK_TRACE_TEXT,
    NO_USER_INFO_TEXT, TEAMS_CHAT_BASE_URL,
};
use crate::diagnostics::{format_entry, Severity, INTERNAL_TARGET};

const CONTAINER_ID_PREFIX: &str = "StackTraceContainer";

/// Characters escaped in chat link query components: everything except
/// ASCII alphanumerics and `-_.!~*'()`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Root of the card document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCard {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    pub body: Vec<CardElement>,
    pub actions: Vec<CardAction>,
    msteams: MsTeams,
}

impl ChatCard {
    fn new(body: Vec<CardElement>, actions: Vec<CardAction>) -> Self {
        Self {
            kind: "AdaptiveCard",
            schema: ADAPTIVE_CARD_SCHEMA,
            version: ADAPTIVE_CARD_VERSION,
            body,
            actions,
            msteams: MsTeams { width: "Full" },
        }
    }

    /// JSON with 2-space indentation.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Ids of the log containers, in body order.
    #[must_use]
    pub fn container_ids(&self) -> Vec<&str> {
        self.body
            .iter()
            .filter_map(|element| match element {
                CardElement::Container(container) => Some(container.id.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct MsTeams {
    width: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CardElement {
    TextBlock(TextBlock),
    ActionSet { actions: Vec<CardAction> },
    Container(Container),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CardAction {
    #[serde(rename = "Action.OpenUrl")]
    OpenUrl { title: String, url: String },
    #[serde(rename = "Action.ToggleVisibility")]
    ToggleVisibility {
        title: String,
        #[serde(rename = "targetElements")]
        target_elements: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<&'static str>,
    pub wrap: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spacing: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_alignment: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
}

impl TextBlock {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            wrap: true,
            ..Self::default()
        }
    }

    fn title(text: impl Into<String>) -> Self {
        Self {
            weight: Some("Bolder"),
            size: Some("Large"),
            ..Self::plain(text)
        }
    }

    fn monospace(text: impl Into<String>) -> Self {
        Self {
            font_type: Some("Monospace"),
            spacing: Some("None"),
            horizontal_alignment: Some("Left"),
            color: Some("light"),
            ..Self::plain(text)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStyle {
    Attention,
    Warning,
    Accent,
    Emphasis,
}

impl From<Severity> for ContainerStyle {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Attention,
            Severity::Warn => Self::Warning,
            Severity::Info => Self::Accent,
            Severity::Log => Self::Emphasis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    pub id: String,
    pub style: ContainerStyle,
    pub bleed: bool,
    pub items: Vec<TextBlock>,
}

/// Builds [`ChatCard`]s from report payloads.
#[derive(Debug, Clone, Default)]
pub struct ChatCardComposer {
    chat_message: Option<String>,
}

impl ChatCardComposer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text prefilled in the chat opened from the card.
    #[must_use]
    pub fn chat_message(mut self, message: impl Into<String>) -> Self {
        self.chat_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn compose(&self, payload: &ReportPayload, screenshot_url: Option<&str>) -> ChatCard {
        let mut body = vec![CardElement::TextBlock(TextBlock::title(payload.message()))];

        body.push(match screenshot_url.filter(|url| !url.is_empty()) {
            Some(url) => open_url("🖼️ View screenshot", url),
            None => CardElement::TextBlock(TextBlock::plain(NO_SCREENSHOT_TEXT)),
        });

        body.push(match payload.reporter() {
            Some(reporter) => match reporter_email(reporter) {
                Some(email) => {
                    let name = reporter_name(reporter).unwrap_or(email);
                    open_url(&format!("💬 Chat with {name}"), &self.chat_url(email))
                }
                None => CardElement::TextBlock(TextBlock::plain(format!(
                    "User Info:\n{}",
                    reporter.title_lines()
                ))),
            },
            None => CardElement::TextBlock(TextBlock::plain(NO_USER_INFO_TEXT)),
        });

        let entries = payload.log_entries();
        let mut actions = Vec::new();
        if entries.is_empty() {
            body.push(CardElement::TextBlock(TextBlock::plain(NO_STACK_TRACE_TEXT)));
        } else {
            let containers: Vec<Container> = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    let text = format_entry(entry);
                    Container {
                        id: format!("{CONTAINER_ID_PREFIX}{i}"),
                        style: entry.severity().into(),
                        bleed: true,
                        items: vec![TextBlock::monospace(if text.is_empty() {
                            " ".to_string()
                        } else {
                            text
                        })],
                    }
                })
                .collect();

            actions.push(CardAction::ToggleVisibility {
                title: "📜 Toggle Stack Trace".to_string(),
                target_elements: containers.iter().map(|c| c.id.clone()).collect(),
            });
            body.extend(containers.into_iter().map(CardElement::Container));
        }

        tracing::debug!(target: INTERNAL_TARGET, blocks = body.len(), "composed chat card");
        ChatCard::new(body, actions)
    }

    fn chat_url(&self, email: &str) -> String {
        let mut url = format!(
            "{TEAMS_CHAT_BASE_URL}?users={}",
            utf8_percent_encode(email, QUERY_COMPONENT)
        );
        if let Some(message) = self.chat_message.as_deref().filter(|m| !m.is_empty()) {
            url.push_str("&message=");
            url.extend(utf8_percent_encode(message, QUERY_COMPONENT));
        }
        url
    }
}

fn open_url(title: &str, url: &str) -> CardElement {
    CardElement::ActionSet {
        actions: vec![CardAction::OpenUrl {
            title: title.to_string(),
            url: url.to_string(),
        }],
    }
}

fn normalized(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

fn text_field<'a>(fields: &'a Fields, names: &[&str]) -> Option<&'a str> {
    fields.iter().find_map(|(key, value)| {
        let text = value.as_text().filter(|text| !text.trim().is_empty())?;
        names.contains(&normalized(key).as_str()).then_some(text)
    })
}

fn reporter_email(fields: &Fields) -> Option<&str> {
    text_field(fields, &["email", "emailaddress"])
}

fn reporter_name(fields: &Fields) -> Option<&str> {
    text_field(fields, &["fullname"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::LogEntry;
    use serde_json::{json, Value};

    fn render(card: &ChatCard) -> Value {
        serde_json::from_str(&card.to_pretty_json().unwrap()).unwrap()
    }

    fn logs(count: usize) -> Vec<LogEntry> {
        (0..count)
            .map(|i| LogEntry::new(Severity::Warn, vec![format!("event {i}").into()]))
            .collect()
    }

    #[test]
    fn empty_report_uses_placeholders_and_no_actions() {
        let card = ChatCardComposer::new().compose(&ReportPayload::new("It broke"), None);
        let json = render(&card);

        assert_eq!(json["type"], "AdaptiveCard");
        assert_eq!(json["$schema"], "http://adaptivecards.io/schemas/adaptive-card.json");
        assert_eq!(json["version"], "1.4");
        assert_eq!(json["msteams"], json!({ "width": "Full" }));
        assert_eq!(
            json["body"][0],
            json!({ "type": "TextBlock", "text": "It broke", "weight": "Bolder", "size": "Large", "wrap": true })
        );
        assert_eq!(json["body"][1]["text"], "No screenshot provided.");
        assert_eq!(json["body"][2]["text"], "No user info provided.");
        assert_eq!(json["body"][3]["text"], "No stack trace provided.");
        assert_eq!(json["actions"], json!([]));
    }

    #[test]
    fn screenshot_url_becomes_open_url_action() {
        let card = ChatCardComposer::new()
            .compose(&ReportPayload::new("x"), Some("https://cdn.example.com/shot.png"));
        let json = render(&card);

        assert_eq!(
            json["body"][1],
            json!({
                "type": "ActionSet",
                "actions": [{
                    "type": "Action.OpenUrl",
                    "title": "🖼️ View screenshot",
                    "url": "https://cdn.example.com/shot.png"
                }]
            })
        );
    }

    #[test]
    fn reporter_email_links_to_chat() {
        let payload = ReportPayload::new("x").reporter_info(
            Fields::new()
                .with("fullName", "Jane Doe")
                .with("email", "jane.doe@example.com"),
        );
        let card = ChatCardComposer::new()
            .chat_message("About your report")
            .compose(&payload, None);
        let json = render(&card);

        let action = &json["body"][2]["actions"][0];
        assert_eq!(action["title"], "💬 Chat with Jane Doe");
        assert_eq!(
            action["url"],
            "https://teams.microsoft.com/l/chat/0/0?users=jane.doe%40example.com&message=About%20your%20report"
        );
    }

    #[test]
    fn chat_link_escapes_like_uri_components() {
        let payload = ReportPayload::new("x")
            .reporter_info(Fields::new().with("email", "jane doe+x@example.com"));
        let card = ChatCardComposer::new()
            .chat_message("Hi! (re: crash) 50% done & \"stuck\" ~ü")
            .compose(&payload, None);
        let json = render(&card);

        assert_eq!(
            json["body"][2]["actions"][0]["url"],
            "https://teams.microsoft.com/l/chat/0/0?users=jane%20doe%2Bx%40example.com\
             &message=Hi!%20(re%3A%20crash)%2050%25%20done%20%26%20%22stuck%22%20~%C3%BC"
        );
    }

    #[test]
    fn email_key_variants_are_recognized() {
        let payload =
            ReportPayload::new("x").reporter_info(Fields::new().with("Email_Address", "a@b.io"));
        let card = ChatCardComposer::new().compose(&payload, None);
        let json = render(&card);

        assert_eq!(json["body"][2]["actions"][0]["title"], "💬 Chat with a@b.io");
    }

    #[test]
    fn reporter_without_email_is_rendered_as_text() {
        let payload = ReportPayload::new("x").reporter_info(Fields::new().with("team_name", "Ops"));
        let card = ChatCardComposer::new().compose(&payload, None);
        let json = render(&card);

        assert_eq!(json["body"][2]["text"], "User Info:\nTeam Name: Ops");
    }

    #[test]
    fn log_entries_become_styled_containers_with_toggle() {
        let mut entries = logs(2);
        entries.push(LogEntry::new(Severity::Error, vec!["fatal".into()]));
        let card = ChatCardComposer::new().compose(&ReportPayload::new("x").logs(entries), None);
        let json = render(&card);

        assert_eq!(
            card.container_ids(),
            vec!["StackTraceContainer0", "StackTraceContainer1", "StackTraceContainer2"]
        );
        assert_eq!(json["body"][3]["style"], "warning");
        assert_eq!(json["body"][5]["style"], "attention");
        assert_eq!(json["body"][3]["bleed"], true);

        let block = &json["body"][3]["items"][0];
        assert_eq!(block["fontType"], "Monospace");
        assert_eq!(block["spacing"], "None");
        assert_eq!(block["horizontalAlignment"], "Left");
        assert_eq!(block["color"], "light");
        assert!(block["text"].as_str().unwrap().ends_with("🟨 WARN event 0"));

        assert_eq!(
            json["actions"],
            json!([{
                "type": "Action.ToggleVisibility",
                "title": "📜 Toggle Stack Trace",
                "targetElements": ["StackTraceContainer0", "StackTraceContainer1", "StackTraceContainer2"]
            }])
        );
    }

    #[test]
    fn k_logs_produce_k_containers() {
        for k in [1, 5, 100] {
            let card = ChatCardComposer::new().compose(&ReportPayload::new("x").logs(logs(k)), None);
            assert_eq!(card.container_ids().len(), k);
            match &card.actions[..] {
                [CardAction::ToggleVisibility { target_elements, .. }] => {
                    assert_eq!(target_elements.len(), k)
                }
                other => panic!("expected one toggle action, got {other:?}"),
            }
        }
    }

    #[test]
    fn pretty_json_uses_two_space_indent() {
        let card = ChatCardComposer::new().compose(&ReportPayload::new("x"), None);
        let rendered = card.to_pretty_json().unwrap();
        assert!(rendered.starts_with("{\n  \"type\": \"AdaptiveCard\",\n  \"$schema\""));
    }
}
