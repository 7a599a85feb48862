use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const URL_ENCODE_MAX_BYTES: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictData {
    #[serde(default)]
    pub descr: Option<String>,
    #[serde(default)]
    pub match_string: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: String,
    #[serde(default)]
    pub verdict: Option<String>,
    // string or number depending on the rule set
    #[serde(default)]
    pub rule_id: Option<Value>,
    #[serde(default)]
    pub data: Option<VerdictData>,
}

impl Verdict {
    pub fn is_done(&self) -> bool {
        self.status == "done"
    }

    pub fn verdict(&self) -> &str {
        self.verdict.as_deref().unwrap_or("")
    }

    pub fn rule_id(&self) -> String {
        match &self.rule_id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "unknown".to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn description(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.descr.as_deref())
            .unwrap_or("content policy violation")
    }

    pub fn matched(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.match_string.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoding {
    UrlEncoded,
    Base64,
}

impl WordEncoding {
    // deterministic: same text, same encoding
    pub fn choose(text: &str) -> Self {
        if text.is_ascii() && text.len() <= URL_ENCODE_MAX_BYTES {
            WordEncoding::UrlEncoded
        } else {
            WordEncoding::Base64
        }
    }
}

// None means no usable verdict, the caller fails open
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Option<Verdict>;
}

pub struct HttpClassifier {
    client: reqwest::Client,
    base: String,
}

impl HttpClassifier {
    pub fn new(client: reqwest::Client, base: &str) -> Result<Self, ConfigError> {
        let base = base.trim_end_matches('/');
        reqwest::Url::parse(base).map_err(|_| ConfigError::InvalidUrl(base.to_string()))?;
        Ok(Self {
            client,
            base: base.to_string(),
        })
    }

    pub fn request_url(&self, text: &str) -> Option<reqwest::Url> {
        let (path, word) = match WordEncoding::choose(text) {
            WordEncoding::UrlEncoded => ("/", text.to_string()),
            WordEncoding::Base64 => ("/base64", STANDARD.encode(text.as_bytes())),
        };

        let mut url = reqwest::Url::parse(&format!("{}{}", self.base, path)).ok()?;
        url.query_pairs_mut().append_pair("word", &word);
        // form encoding writes spaces as '+', the classifier wants %20.
        // A literal '+' was already escaped to %2B.
        let query = url.query().map(|q| q.replace('+', "%20"));
        url.set_query(query.as_deref());
        Some(url)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Option<Verdict> {
        let url = self.request_url(text)?;

        let res = match self.client.get(url).send().await {
            Ok(res) => res,
            Err(e) => {
                warn!(error = %e, "classifier request failed");
                return None;
            }
        };

        if !res.status().is_success() {
            warn!(status = %res.status(), "classifier returned non-success status");
            return None;
        }

        match res.json::<Verdict>().await {
            Ok(verdict) => {
                debug!(status = %verdict.status, verdict = verdict.verdict(), "classifier verdict");
                Some(verdict)
            }
            Err(e) => {
                warn!(error = %e, "classifier response was not a verdict");
                None
            }
        }
    }
}
