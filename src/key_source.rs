use std::sync::Arc;

use jsonwebtoken::jwk::{Jwk, JwkSet};

use crate::{key_set_cache::KeySetCache, Error};

/// Where signing keys come from: the identity provider's discovery endpoint, or a fixed set for local development.
#[derive(Clone)]
pub enum KeySource {
    Static(Arc<JwkSet>),
    Remote(KeySetCache),
}

impl KeySource {
    pub async fn find(&self, kid: &str) -> Result<Option<Jwk>, Arc<Error>> {
        match self {
            KeySource::Static(jwk_set) => Ok(jwk_set.find(kid).cloned()),
            KeySource::Remote(cache) => cache.resolve(kid).await,
        }
    }
}

impl From<JwkSet> for KeySource {
    fn from(jwk_set: JwkSet) -> Self {
        KeySource::Static(Arc::new(jwk_set))
    }
}

impl From<KeySetCache> for KeySource {
    fn from(cache: KeySetCache) -> Self {
        KeySource::Remote(cache)
    }
}
