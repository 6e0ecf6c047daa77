use std::sync::Arc;

use inbox_domain::{EmailDocument, MailPort, MailProfile, MessageRef, OutgoingEmail, SentMessage};
use inbox_error::InboxError;
use tracing::{debug, info, warn};

pub struct MailService {
    port: Arc<dyn MailPort>,
}

impl MailService {
    pub fn new(port: Arc<dyn MailPort>) -> Self {
        Self { port }
    }

    pub async fn profile(&self) -> Result<MailProfile, InboxError> {
        let profile = self.port.profile().await?;
        info!(email = %profile.email_address, total = profile.messages_total, "fetched profile");
        Ok(profile)
    }

    pub async fn list(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRef>, InboxError> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let limit = clamp(limit, 1, 500, 100);
        let refs = self.port.list(query, limit).await?;
        info!(?query, count = refs.len(), "listed messages");
        Ok(refs)
    }

    pub async fn fetch_details(&self, id: &str) -> Result<EmailDocument, InboxError> {
        validate_not_empty(id, "message id")?;
        self.port.fetch_details(id).await
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<SentMessage, InboxError> {
        if email.to.iter().all(|t| t.trim().is_empty()) {
            return Err(InboxError::invalid_input("'to' cannot be empty"));
        }
        let sent = self.port.send(email).await?;
        info!(to = ?email.to, subject = %email.subject, msg_id = %sent.id, "email sent");
        Ok(sent)
    }

    /// Lists the most recent messages and fetches each one. A message that
    /// fails to fetch is logged and left out.
    pub async fn fetch_recent(&self, limit: usize) -> Result<Vec<EmailDocument>, InboxError> {
        let limit = clamp(limit, 1, 500, 10);
        info!(limit, "fetching recent emails");
        let refs = self.port.list(None, limit).await?;

        let mut detailed = Vec::with_capacity(refs.len());
        for r in &refs {
            match self.port.fetch_details(&r.id).await {
                Ok(doc) => {
                    debug!(%doc, "fetched email");
                    detailed.push(doc);
                }
                Err(e) => warn!(id = %r.id, %e, "failed to fetch email, skipping"),
            }
        }

        info!(
            listed = refs.len(),
            fetched = detailed.len(),
            "fetched and parsed recent emails"
        );
        Ok(detailed)
    }
}

fn validate_not_empty(val: &str, name: &str) -> Result<(), InboxError> {
    if val.trim().is_empty() {
        return Err(InboxError::invalid_input(format!("{name} cannot be empty")));
    }
    Ok(())
}

fn clamp(val: usize, min: usize, max: usize, default: usize) -> usize {
    if val == 0 {
        default
    } else {
        val.max(min).min(max)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FakeMail {
        ids: Vec<&'static str>,
        poison: &'static str,
        last_limit: Mutex<Option<usize>>,
    }

    fn doc(id: &str) -> EmailDocument {
        EmailDocument {
            id: id.to_string(),
            thread_id: format!("t-{id}"),
            history_id: None,
            sender: "bob@example.com".to_string(),
            recipients: vec!["me@example.com".to_string()],
            subject: format!("subject {id}"),
            timestamp: None,
            body_text: Some("hello".to_string()),
            body_html: None,
            labels: vec!["INBOX".to_string()],
            snippet: None,
        }
    }

    #[async_trait]
    impl MailPort for FakeMail {
        async fn profile(&self) -> Result<MailProfile, InboxError> {
            Ok(MailProfile {
                email_address: "me@example.com".to_string(),
                messages_total: 3,
                threads_total: 3,
                history_id: None,
            })
        }

        async fn list(
            &self,
            _query: Option<&str>,
            limit: usize,
        ) -> Result<Vec<MessageRef>, InboxError> {
            *self.last_limit.lock().unwrap() = Some(limit);
            Ok(self
                .ids
                .iter()
                .take(limit)
                .map(|id| MessageRef {
                    id: id.to_string(),
                    thread_id: format!("t-{id}"),
                })
                .collect())
        }

        async fn fetch_details(&self, id: &str) -> Result<EmailDocument, InboxError> {
            if id == self.poison {
                return Err(InboxError::api("500 backend error"));
            }
            Ok(doc(id))
        }

        async fn send(&self, _email: &OutgoingEmail) -> Result<SentMessage, InboxError> {
            Ok(SentMessage {
                id: "sent-1".to_string(),
                thread_id: None,
            })
        }
    }

    fn service(ids: Vec<&'static str>, poison: &'static str) -> (MailService, Arc<FakeMail>) {
        let fake = Arc::new(FakeMail {
            ids,
            poison,
            last_limit: Mutex::new(None),
        });
        (MailService::new(fake.clone()), fake)
    }

    #[tokio::test]
    async fn bulk_fetch_skips_poison_message() {
        let (svc, _) = service(vec!["a", "b", "poison", "c"], "poison");

        let docs = svc.fetch_recent(10).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn zero_limit_uses_default() {
        let (svc, fake) = service(vec!["a"], "");
        svc.fetch_recent(0).await.unwrap();
        assert_eq!(*fake.last_limit.lock().unwrap(), Some(10));

        svc.list(Some("  "), 10_000).await.unwrap();
        assert_eq!(*fake.last_limit.lock().unwrap(), Some(500));
    }

    #[tokio::test]
    async fn send_requires_recipient() {
        let (svc, _) = service(vec![], "");
        let email = OutgoingEmail {
            to: vec![" ".to_string()],
            subject: "hi".to_string(),
            body: "body".to_string(),
            html: false,
        };
        assert!(matches!(
            svc.send(&email).await.unwrap_err(),
            InboxError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn fetch_details_rejects_blank_id() {
        let (svc, _) = service(vec![], "");
        assert!(svc.fetch_details("  ").await.is_err());
        assert_eq!(svc.fetch_details("x").await.unwrap().id, "x");
    }
}
