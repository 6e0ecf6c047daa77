use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use inbox_domain::EmailDocument;
use inbox_error::InboxError;
use mailparse::{DispositionType, MailAddr, MailHeader, MailHeaderMap, ParsedMail, SingleInfo};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Option<Vec<String>>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub history_id: Option<String>,
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub payload: Option<GmailPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GmailPayload {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<GmailHeader>>,
    #[serde(default)]
    pub body: Option<GmailBody>,
    #[serde(default)]
    pub parts: Option<Vec<GmailPayload>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GmailHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GmailBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Bodies {
    pub text: Option<String>,
    pub html: Option<String>,
}

impl Bodies {
    fn is_complete(&self) -> bool {
        self.text.is_some() && self.html.is_some()
    }

    fn offer(&mut self, mime: &str, body: Option<String>) {
        let body = body
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        match mime {
            "text/plain" if self.text.is_none() => self.text = body,
            "text/html" if self.html.is_none() => self.html = body,
            _ => {}
        }
    }
}

/// Accepts base64url with or without padding.
pub(crate) fn decode_base64url(data: &str) -> Result<Vec<u8>, InboxError> {
    let cleaned: String = data
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect();
    URL_SAFE_NO_PAD
        .decode(cleaned.as_bytes())
        .map_err(|e| InboxError::parse(format!("base64url: {e}")))
}

/// Parses a `format=raw` message.
pub(crate) fn from_raw(msg: &GmailMessage, raw: &str) -> Result<EmailDocument, InboxError> {
    let bytes = decode_base64url(raw)?;
    let parsed =
        mailparse::parse_mail(&bytes).map_err(|e| InboxError::parse(format!("mailparse: {e}")))?;

    let headers = parsed.get_headers();
    let recipients = headers
        .get_first_header("To")
        .map(addresses_from_header)
        .unwrap_or_default();
    let date_header = headers.get_first_value("Date");

    let mut bodies = Bodies::default();
    walk_parsed(&parsed, &mut bodies);

    Ok(build_document(
        msg,
        headers.get_first_value("From").unwrap_or_default(),
        recipients,
        headers.get_first_value("Subject").unwrap_or_default(),
        date_header.as_deref(),
        bodies,
    ))
}

/// Parses a `format=full` message. Never fails; missing parts stay empty.
pub(crate) fn from_full(msg: &GmailMessage) -> EmailDocument {
    let mut bodies = Bodies::default();
    let mut headers: &[GmailHeader] = &[];
    if let Some(payload) = &msg.payload {
        walk_payload(payload, &mut bodies);
        headers = payload.headers.as_deref().unwrap_or(&[]);
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let recipients = header("To")
        .map(|v| parse_recipients(&v))
        .unwrap_or_default();
    let date = header("Date");

    build_document(
        msg,
        header("From").unwrap_or_default(),
        recipients,
        header("Subject").unwrap_or_default(),
        date.as_deref(),
        bodies,
    )
}

fn build_document(
    msg: &GmailMessage,
    sender: String,
    recipients: Vec<String>,
    subject: String,
    date_header: Option<&str>,
    bodies: Bodies,
) -> EmailDocument {
    EmailDocument {
        id: msg.id.clone(),
        thread_id: msg.thread_id.clone().unwrap_or_default(),
        history_id: msg.history_id.clone(),
        sender,
        recipients,
        subject,
        timestamp: message_timestamp(msg.internal_date.as_deref(), date_header),
        body_text: bodies.text,
        body_html: bodies.html,
        labels: msg.label_ids.clone().unwrap_or_default(),
        snippet: msg.snippet.clone().filter(|s| !s.is_empty()),
    }
}

/// Depth-first; the first `text/plain` and first `text/html` leaf win.
pub(crate) fn walk_parsed(part: &ParsedMail<'_>, bodies: &mut Bodies) {
    if bodies.is_complete() {
        return;
    }
    if part.subparts.is_empty() {
        if part.get_content_disposition().disposition == DispositionType::Attachment {
            return;
        }
        let mime = part.ctype.mimetype.to_ascii_lowercase();
        if mime == "text/plain" || mime == "text/html" {
            bodies.offer(&mime, part.get_body().ok());
        }
        return;
    }
    for sub in &part.subparts {
        walk_parsed(sub, bodies);
    }
}

/// Same tie-break as [`walk_parsed`], over the structured payload tree.
pub(crate) fn walk_payload(part: &GmailPayload, bodies: &mut Bodies) {
    if bodies.is_complete() {
        return;
    }
    let is_attachment = part.filename.as_deref().is_some_and(|f| !f.is_empty())
        || part
            .body
            .as_ref()
            .is_some_and(|b| b.attachment_id.is_some());
    if !is_attachment {
        if let Some(mime) = part.mime_type.as_deref().map(str::to_ascii_lowercase) {
            if mime == "text/plain" || mime == "text/html" {
                let decoded = part
                    .body
                    .as_ref()
                    .and_then(|b| b.data.as_deref())
                    .and_then(|d| decode_base64url(d).ok())
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
                bodies.offer(&mime, decoded);
            }
        }
    }
    for sub in part.parts.as_deref().unwrap_or(&[]) {
        walk_payload(sub, bodies);
    }
}

fn message_timestamp(internal_date: Option<&str>, date_header: Option<&str>) -> Option<DateTime<Utc>> {
    internal_date
        .and_then(|ms| ms.trim().parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .or_else(|| {
            date_header
                .and_then(|d| mailparse::dateparse(d).ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
        })
}

pub(crate) fn parse_recipients(value: &str) -> Vec<String> {
    let fake = format!("To: {value}");
    match mailparse::parse_header(fake.as_bytes()) {
        Ok((hdr, _)) => addresses_from_header(&hdr),
        Err(_) => split_addresses(value),
    }
}

fn addresses_from_header(hdr: &MailHeader<'_>) -> Vec<String> {
    match mailparse::addrparse_header(hdr) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![format_single(info)],
                MailAddr::Group(group) => group.addrs.iter().map(format_single).collect(),
            })
            .collect(),
        Err(_) => split_addresses(&hdr.get_value()),
    }
}

fn format_single(info: &SingleInfo) -> String {
    match info.display_name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} <{}>", info.addr),
        None => info.addr.clone(),
    }
}

fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE;
    use serde_json::json;

    use super::*;

    fn encode(raw: &str) -> String {
        URL_SAFE.encode(raw.as_bytes())
    }

    fn stub(raw: Option<String>) -> GmailMessage {
        GmailMessage {
            id: "18c0".to_string(),
            thread_id: Some("18bf".to_string()),
            label_ids: Some(vec!["INBOX".to_string(), "UNREAD".to_string()]),
            snippet: Some("Hi team".to_string()),
            history_id: Some("9001".to_string()),
            internal_date: Some("1709285400000".to_string()),
            raw,
            payload: None,
        }
    }

    const MULTIPART: &str = "From: Alice <alice@example.com>\r\n\
To: Bob <bob@example.com>, carol@example.com\r\n\
Subject: =?UTF-8?B?UXVhcnRlcmx5IHJldmlldw==?=\r\n\
Date: Fri, 01 Mar 2024 09:30:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
First plain body\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>First html body</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Second plain body\r\n\
--outer\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
\r\n\
attachment text\r\n\
--outer--\r\n";

    #[test]
    fn raw_message_takes_first_parts_depth_first() {
        let doc = from_raw(&stub(None), &encode(MULTIPART)).unwrap();

        assert_eq!(doc.id, "18c0");
        assert_eq!(doc.thread_id, "18bf");
        assert_eq!(doc.sender, "Alice <alice@example.com>");
        assert_eq!(
            doc.recipients,
            vec!["Bob <bob@example.com>".to_string(), "carol@example.com".to_string()]
        );
        assert_eq!(doc.subject, "Quarterly review");
        assert_eq!(doc.body_text.as_deref(), Some("First plain body"));
        assert_eq!(doc.body_html.as_deref(), Some("<p>First html body</p>"));
        assert_eq!(doc.labels, vec!["INBOX", "UNREAD"]);
        assert_eq!(doc.history_id.as_deref(), Some("9001"));
        assert_eq!(
            doc.timestamp.map(|t| t.timestamp_millis()),
            Some(1_709_285_400_000)
        );
    }

    #[test]
    fn attachment_only_text_is_ignored() {
        let raw = "From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"a.txt\"\r\n\
\r\n\
not a body\r\n\
--b--\r\n";
        let doc = from_raw(&stub(None), &encode(raw)).unwrap();
        assert!(doc.body_text.is_none());
        assert!(doc.body_html.is_none());
    }

    #[test]
    fn single_part_html_message() {
        let raw = "From: a@example.com\r\nSubject: hi\r\nContent-Type: text/html\r\n\r\n<b>hello</b>\r\n";
        let doc = from_raw(&stub(None), &encode(raw)).unwrap();
        assert!(doc.body_text.is_none());
        assert_eq!(doc.body_html.as_deref(), Some("<b>hello</b>"));
    }

    #[test]
    fn date_header_used_without_internal_date() {
        let mut msg = stub(None);
        msg.internal_date = None;
        let doc = from_raw(&msg, &encode(MULTIPART)).unwrap();
        assert_eq!(doc.timestamp.map(|t| t.timestamp()), Some(1_709_285_400));
    }

    #[test]
    fn invalid_base64_is_parse_error() {
        let err = from_raw(&stub(None), "!!!not base64!!!").unwrap_err();
        assert!(matches!(err, InboxError::Parse(_)));
    }

    #[test]
    fn decode_accepts_padded_and_unpadded() {
        assert_eq!(decode_base64url("aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64url("aGk").unwrap(), b"hi");
        assert_eq!(decode_base64url("-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn full_payload_walks_nested_parts() {
        let msg: GmailMessage = serde_json::from_value(json!({
            "id": "m2",
            "threadId": "t2",
            "labelIds": ["INBOX"],
            "snippet": "",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "from", "value": "Dana <dana@example.com>"},
                    {"name": "To", "value": "me@example.com"},
                    {"name": "Subject", "value": "Invoice"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": URL_SAFE.encode("Pay by Friday")}},
                            {"mimeType": "text/html", "body": {"data": URL_SAFE.encode("<p>Pay by Friday</p>")}}
                        ]
                    },
                    {"mimeType": "text/plain", "filename": "invoice.txt", "body": {"attachmentId": "att1"}},
                    {"mimeType": "text/plain", "body": {"data": URL_SAFE.encode("later part")}}
                ]
            }
        }))
        .unwrap();

        let doc = from_full(&msg);

        assert_eq!(doc.sender, "Dana <dana@example.com>");
        assert_eq!(doc.recipients, vec!["me@example.com"]);
        assert_eq!(doc.subject, "Invoice");
        assert_eq!(doc.body_text.as_deref(), Some("Pay by Friday"));
        assert_eq!(doc.body_html.as_deref(), Some("<p>Pay by Friday</p>"));
        assert!(doc.snippet.is_none());
        assert!(doc.timestamp.is_none());
    }

    #[test]
    fn full_payload_without_parts_is_best_effort() {
        let msg: GmailMessage = serde_json::from_value(json!({"id": "m3"})).unwrap();
        let doc = from_full(&msg);
        assert_eq!(doc.id, "m3");
        assert!(doc.thread_id.is_empty());
        assert!(doc.sender.is_empty());
        assert!(doc.body_text.is_none());
    }

    #[test]
    fn recipients_keep_display_names() {
        assert_eq!(
            parse_recipients("x@example.com, \"Y Z\" <y@example.com>"),
            vec!["x@example.com", "Y Z <y@example.com>"]
        );
    }
}
