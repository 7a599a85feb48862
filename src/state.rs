use std::sync::Arc;

use crate::audit::{Classifier, HttpClassifier};
use crate::config::{Args, RouteTable, normalize_prefix};
use crate::error::ConfigError;
use crate::forward::Forwarder;
use crate::notify::{LogNotifier, NoticeCipher, Notifier, WebhookNotifier};
use crate::store::AccessStore;

// app's shared state
pub struct AppState {
    pub routes: RouteTable,
    pub prefix: String,
    pub store: Arc<AccessStore>,
    pub forwarder: Forwarder,
    // None = audit degrades to allow
    pub classifier: Option<Arc<dyn Classifier>>,
    pub notifier: Arc<dyn Notifier>,
    // None = notices are not sent
    pub cipher: Option<NoticeCipher>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let client = reqwest::Client::new();
        let routes = RouteTable::from_json(&args.routes)?;

        let classifier = match &args.classifier_url {
            Some(url) => {
                Some(Arc::new(HttpClassifier::new(client.clone(), url)?) as Arc<dyn Classifier>)
            }
            None => None,
        };

        let notifier: Arc<dyn Notifier> = match &args.notify_webhook {
            Some(url) => Arc::new(WebhookNotifier::new(client.clone(), url)?),
            None => Arc::new(LogNotifier),
        };

        Ok(Self {
            routes,
            prefix: args.normalized_prefix(),
            store: Arc::new(AccessStore::new()),
            forwarder: Forwarder::new(client),
            classifier,
            notifier,
            cipher: args.notify_secret.as_deref().map(NoticeCipher::new),
            max_body_bytes: args.max_body_bytes,
        })
    }

    pub fn new(
        routes: RouteTable,
        prefix: &str,
        classifier: Option<Arc<dyn Classifier>>,
        notifier: Arc<dyn Notifier>,
        cipher: Option<NoticeCipher>,
    ) -> Self {
        Self {
            routes,
            prefix: normalize_prefix(prefix),
            store: Arc::new(AccessStore::new()),
            forwarder: Forwarder::new(reqwest::Client::new()),
            classifier,
            notifier,
            cipher,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}
