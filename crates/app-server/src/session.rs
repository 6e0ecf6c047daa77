use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use inbox_error::InboxError;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "inboxai_session";
pub const SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and checks `payload.signature` tokens, both halves base64url.
#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, InboxError> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| InboxError::internal(format!("hmac key: {e}")))
    }

    pub fn sign(&self, email: &str) -> Result<String, InboxError> {
        let now = Utc::now();
        self.sign_claims(&SessionClaims {
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        })
    }

    fn sign_claims(&self, claims: &SessionClaims) -> Result<String, InboxError> {
        let json = serde_json::to_vec(claims)
            .map_err(|e| InboxError::internal(format!("session encode: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{sig}"))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, InboxError> {
        let (payload, sig) = token
            .split_once('.')
            .ok_or_else(|| InboxError::auth("malformed session token"))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| InboxError::auth("malformed session signature"))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| InboxError::auth("invalid session signature"))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| InboxError::auth("malformed session payload"))?;
        let claims: SessionClaims = serde_json::from_slice(&json)
            .map_err(|_| InboxError::auth("malformed session payload"))?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(InboxError::auth("session expired"));
        }
        Ok(claims)
    }
}
