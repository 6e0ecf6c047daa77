use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use inbox_domain::{
    AccessTokenSource, EmailDocument, MailPort, MailProfile, MessageRef, OutgoingEmail,
    SentMessage,
};
use inbox_error::InboxError;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::http::{read_json, transport_error};
use crate::mime::{from_full, from_raw, GmailMessage};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const SERVICE: &str = "gmail";
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email_address: String,
    #[serde(default)]
    messages_total: u64,
    #[serde(default)]
    threads_total: u64,
    #[serde(default)]
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<ListedMessage>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
}

/// Gmail REST client. Each call asks the token source for a fresh bearer token.
pub struct GmailApiAdapter {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GmailApiAdapter {
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self::with_base_url(tokens, GMAIL_API_BASE)
    }

    pub fn with_base_url(tokens: Arc<dyn AccessTokenSource>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.base_url)
    }

    async fn get_message(&self, id: &str, format: &str) -> Result<GmailMessage, InboxError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(token)
            .query(&[("format", format)])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        read_json(resp, SERVICE).await
    }

    fn build_raw(from: &str, email: &OutgoingEmail) -> Result<String, InboxError> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e| InboxError::internal(format!("invalid from '{from}': {e}")))?;

        let mut builder = lettre::Message::builder()
            .from(from_mailbox)
            .subject(email.subject.as_str());

        let mut recipients = 0;
        for addr in email.to.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            let mbox: Mailbox = addr
                .parse()
                .map_err(|e| InboxError::invalid_input(format!("invalid to '{addr}': {e}")))?;
            builder = builder.to(mbox);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(InboxError::invalid_input("'to' cannot be empty"));
        }

        let message = if email.html {
            builder.multipart(MultiPart::alternative().singlepart(SinglePart::html(email.body.clone())))
        } else {
            builder.singlepart(SinglePart::plain(email.body.clone()))
        }
        .map_err(|e| InboxError::internal(format!("email build: {e}")))?;

        Ok(URL_SAFE.encode(message.formatted()))
    }
}

#[async_trait]
impl MailPort for GmailApiAdapter {
    async fn profile(&self) -> Result<MailProfile, InboxError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .get(self.url("profile"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let p: ProfileResponse = read_json(resp, SERVICE).await?;
        Ok(MailProfile {
            email_address: p.email_address,
            messages_total: p.messages_total,
            threads_total: p.threads_total,
            history_id: p.history_id,
        })
    }

    async fn list(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRef>, InboxError> {
        let token = self.tokens.access_token().await?;
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        while refs.len() < limit {
            let page_size = (limit - refs.len()).min(MAX_PAGE_SIZE);
            let mut params = vec![("maxResults", page_size.to_string())];
            if let Some(q) = query {
                params.push(("q", q.to_string()));
            }
            if let Some(t) = &page_token {
                params.push(("pageToken", t.clone()));
            }

            let resp = self
                .http
                .get(self.url("messages"))
                .bearer_auth(&token)
                .query(&params)
                .send()
                .await
                .map_err(|e| transport_error(SERVICE, e))?;
            let page: ListResponse = read_json(resp, SERVICE).await?;
            debug!(count = page.messages.len(), "gmail list page");

            refs.extend(page.messages.into_iter().map(|m| MessageRef {
                id: m.id,
                thread_id: m.thread_id,
            }));

            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        refs.truncate(limit);
        Ok(refs)
    }

    async fn fetch_details(&self, id: &str) -> Result<EmailDocument, InboxError> {
        let raw_msg = self.get_message(id, "raw").await?;
        if let Some(raw) = raw_msg.raw.as_deref() {
            match from_raw(&raw_msg, raw) {
                Ok(doc) => return Ok(doc),
                Err(e) => warn!(id, %e, "raw parse failed, falling back to full format"),
            }
        } else {
            debug!(id, "no raw payload, falling back to full format");
        }

        let full = self.get_message(id, "full").await?;
        Ok(from_full(&full))
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<SentMessage, InboxError> {
        let from = self.profile().await?.email_address;
        let raw = Self::build_raw(&from, email)?;

        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .post(self.url("messages/send"))
            .bearer_auth(token)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let sent: SendResponse = read_json(resp, SERVICE).await?;

        info!(id = %sent.id, recipients = email.to.len(), "sent email");
        Ok(SentMessage {
            id: sent.id,
            thread_id: sent.thread_id,
        })
    }
}
