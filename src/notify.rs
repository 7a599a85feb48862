use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ConfigError;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CipherError {
    #[error("sealed value is not valid base64")]
    Encoding,
    #[error("sealed value is too short")]
    Truncated,
    #[error("decryption failed (wrong secret or tampered data)")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
}

#[derive(Clone)]
pub struct NoticeCipher {
    cipher: Aes256Gcm,
}

impl NoticeCipher {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    // base64(nonce || ciphertext)
    pub fn seal(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CipherError> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|_| CipherError::Encoding)?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;
        String::from_utf8(plain).map_err(|_| CipherError::Decrypt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationNotice {
    pub upstream: String,
    pub credential: String,
    pub model: String,
    pub verdict: String,
    pub rule_id: String,
    pub transcript: String,
    pub banned: bool,
    pub violation_count: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct NoticeContext<'a> {
    pub upstream: &'a str,
    pub credential: &'a str,
    pub model: &'a str,
    pub verdict: &'a str,
    pub rule_id: &'a str,
    pub transcript: &'a str,
    pub banned: bool,
    pub violation_count: u32,
}

impl ViolationNotice {
    pub fn seal(ctx: &NoticeContext<'_>, cipher: &NoticeCipher) -> Result<Self, CipherError> {
        Ok(Self {
            upstream: ctx.upstream.to_string(),
            credential: cipher.seal(ctx.credential)?,
            model: ctx.model.to_string(),
            verdict: ctx.verdict.to_string(),
            rule_id: ctx.rule_id.to_string(),
            transcript: cipher.seal(ctx.transcript)?,
            banned: ctx.banned,
            violation_count: ctx.violation_count,
            timestamp: chrono::Utc::now(),
        })
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &ViolationNotice);
}

// Writes notices to the log when no delivery channel is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &ViolationNotice) {
        warn!(
            upstream = %notice.upstream,
            model = %notice.model,
            rule_id = %notice.rule_id,
            banned = notice.banned,
            violations = notice.violation_count,
            credential = %notice.credential,
            transcript = %notice.transcript,
            "content violation"
        );
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self, ConfigError> {
        let url = reqwest::Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: &ViolationNotice) {
        match self.client.post(self.url.clone()).json(notice).send().await {
            Ok(res) if res.status().is_success() => debug!("violation notice delivered"),
            Ok(res) => warn!(status = %res.status(), "notice webhook rejected delivery"),
            Err(e) => warn!(error = %e, "notice webhook unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let cipher = NoticeCipher::new("operator-secret");
        let sealed = cipher.seal("sk-live-123").unwrap();

        assert!(!sealed.contains("sk-live-123"));
        assert_eq!(cipher.open(&sealed).unwrap(), "sk-live-123");
    }

    #[test]
    fn test_nonce_varies() {
        let cipher = NoticeCipher::new("s");
        assert_ne!(cipher.seal("same").unwrap(), cipher.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = NoticeCipher::new("right").seal("payload").unwrap();
        assert_eq!(NoticeCipher::new("wrong").open(&sealed), Err(CipherError::Decrypt));
    }

    #[test]
    fn test_garbage_input() {
        let cipher = NoticeCipher::new("s");
        assert_eq!(cipher.open("***"), Err(CipherError::Encoding));
        assert_eq!(cipher.open(&STANDARD.encode([0u8; 4])), Err(CipherError::Truncated));
    }

    #[test]
    fn test_notice_seals_sensitive_fields() {
        let cipher = NoticeCipher::new("s");
        let ctx = NoticeContext {
            upstream: "https://api.example.com",
            credential: "sk-1",
            model: "gpt-4o",
            verdict: "malicious",
            rule_id: "R1",
            transcript: "user:bad things",
            banned: false,
            violation_count: 1,
        };
        let notice = ViolationNotice::seal(&ctx, &cipher).unwrap();

        assert_eq!(notice.upstream, "https://api.example.com");
        assert_eq!(cipher.open(&notice.credential).unwrap(), "sk-1");
        assert_eq!(cipher.open(&notice.transcript).unwrap(), "user:bad things");
    }

    #[test]
    fn test_invalid_webhook_url() {
        assert!(WebhookNotifier::new(reqwest::Client::new(), "::nope").is_err());
    }
}
