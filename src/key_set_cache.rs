use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::Client;
use url::Url;

use crate::Error;

const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(60 * 60);
const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(5 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

type FetchResult = Result<Arc<CachedKeySet>, Arc<Error>>;
type InFlightFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Builder for configuring a [`KeySetCache`].
pub struct KeySetCacheBuilder {
    url: Url,
    time_to_live: Duration,
    refresh_cooldown: Duration,
    timeout: Duration,
}

impl KeySetCacheBuilder {
    /// Creates a new builder with the given discovery (JWKS) URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// How long a fetched key set is served before it is fetched again.
    pub fn with_cache(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// Minimum age of the cached key set before an unknown `kid` may trigger a refetch.
    ///
    /// Unknown key ids usually mean the provider rotated its keys, but they are also trivially forged, so refetches
    /// they cause are limited to one per cooldown.
    pub fn with_refresh_cooldown(mut self, refresh_cooldown: Duration) -> Self {
        self.refresh_cooldown = refresh_cooldown;
        self
    }

    /// Upper bound for a single fetch, from connect to the end of the body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> KeySetCache {
        KeySetCache {
            inner: Arc::new(Inner {
                http_client: Client::new(),
                url: self.url,
                time_to_live: self.time_to_live,
                refresh_cooldown: self.refresh_cooldown,
                timeout: self.timeout,
                cached: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }
}

/// Identity provider signing keys, fetched on demand and cached for all requests.
///
/// Cloning is cheap and clones share the cache. At most one fetch is in flight at any time; callers arriving while
/// one runs wait for its result. The fetch runs on its own task so it completes even if the request that started it
/// goes away.
#[derive(Clone)]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

struct Inner {
    http_client: Client,
    url: Url,
    time_to_live: Duration,
    refresh_cooldown: Duration,
    timeout: Duration,
    cached: RwLock<Option<Arc<CachedKeySet>>>,
    in_flight: Mutex<Option<InFlightFetch>>,
}

/// A key set together with the time it was fetched. Replaced as a whole, never mutated.
struct CachedKeySet {
    keys: JwkSet,
    fetched_at: Instant,
}

impl KeySetCache {
    /// Creates a builder for configuring a `KeySetCache`.
    pub fn builder(url: Url) -> KeySetCacheBuilder {
        KeySetCacheBuilder::new(url)
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Resolves `kid` to a signing key, fetching the key set if the cache can't answer.
    ///
    /// Returns `Ok(None)` if the key set doesn't contain `kid`.
    pub async fn resolve(&self, kid: &str) -> Result<Option<Jwk>, Arc<Error>> {
        let cached = self.inner.snapshot();
        if let Some(cached) = &cached {
            let age = cached.fetched_at.elapsed();
            if age < self.inner.time_to_live {
                if let Some(jwk) = cached.keys.find(kid) {
                    return Ok(Some(jwk.clone()));
                }
                if age < self.inner.refresh_cooldown {
                    tracing::debug!(kid, "kid not in cached JWK set, refresh cooldown active");
                    return Ok(None);
                }
                tracing::debug!(kid, "kid not in cached JWK set, refreshing");
            }
        }

        let observed = cached.map(|cached| cached.fetched_at);
        let refreshed = self.refresh(observed).await?;
        Ok(refreshed.keys.find(kid).cloned())
    }

    /// Joins the in-flight fetch or starts one. `observed` is the fetch time of the snapshot the caller found
    /// insufficient; a newer snapshot is returned as is.
    async fn refresh(&self, observed: Option<Instant>) -> FetchResult {
        let fetch = {
            let mut in_flight = lock(&self.inner.in_flight);
            if let Some(current) = self.inner.snapshot() {
                if Some(current.fetched_at) != observed {
                    return Ok(current);
                }
            }
            match in_flight.as_ref() {
                Some(fetch) => fetch.clone(),
                None => {
                    let fetch = Arc::clone(&self.inner).spawn_fetch();
                    *in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }
}

impl Inner {
    fn snapshot(&self) -> Option<Arc<CachedKeySet>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn spawn_fetch(self: Arc<Self>) -> InFlightFetch {
        let inner = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let result = match inner.fetch().await {
                Ok(keys) => {
                    let cached = Arc::new(CachedKeySet {
                        keys,
                        fetched_at: Instant::now(),
                    });
                    *inner.cached.write().unwrap_or_else(PoisonError::into_inner) =
                        Some(Arc::clone(&cached));
                    Ok(cached)
                }
                Err(err) => {
                    tracing::warn!(url = %inner.url, error = ?err, "failed to refresh JWK set");
                    Err(Arc::new(err))
                }
            };
            lock(&inner.in_flight).take();
            result
        });

        async move {
            task.await.unwrap_or_else(|err| {
                // The task never got to clear its slot.
                lock(&self.in_flight).take();
                tracing::error!(url = %self.url, error = %err, "JWK set fetch task failed");
                Err(Arc::new(Error::JwkSetFetchAborted(err)))
            })
        }
        .boxed()
        .shared()
    }

    async fn fetch(&self) -> Result<JwkSet, Error> {
        tracing::debug!(url = %self.url, "fetching JWK set");
        let response = self
            .http_client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::JwkSetRequestErrorResponse {
                status_code: response.status(),
            });
        }

        let jwk_set: JwkSet = response.json().await?;
        tracing::info!(url = %self.url, keys = jwk_set.keys.len(), "refreshed JWK set");
        Ok(jwk_set)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::KeySetCache;
    use crate::test_support::{
        discovery_response, discovery_url, jwk_set, mock_discovery, TestKey, DISCOVERY_PATH,
    };
    use crate::Error;

    #[tokio::test]
    async fn test_resolve_twice_fetches_once() {
        let key = TestKey::shared();
        let server = mock_discovery(&jwk_set(&[key]), 1).await;
        let cache = KeySetCache::builder(discovery_url(&server)).build();

        let first = cache.resolve(key.kid()).await.unwrap();
        let second = cache.resolve(key.kid()).await.unwrap();
        assert_eq!(first.as_ref(), Some(key.jwk()));
        assert_eq!(second.as_ref(), Some(key.jwk()));
    }

    #[tokio::test]
    async fn test_unknown_kid_within_cooldown_does_not_refetch() {
        let key = TestKey::shared();
        let server = mock_discovery(&jwk_set(&[key]), 1).await;
        let cache = KeySetCache::builder(discovery_url(&server)).build();

        assert!(cache.resolve("forged").await.unwrap().is_none());
        assert!(cache.resolve("forged").await.unwrap().is_none());
        assert!(cache.resolve(key.kid()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_kid_after_cooldown_picks_up_rotated_key() {
        let old_key = TestKey::shared();
        let new_key = TestKey::generate("rotated");

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery_response(&jwk_set(&[old_key])))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery_response(&jwk_set(&[old_key, &new_key])))
            .expect(1)
            .mount(&server)
            .await;

        let cache = KeySetCache::builder(discovery_url(&server))
            .with_refresh_cooldown(Duration::ZERO)
            .build();

        assert!(cache.resolve(old_key.kid()).await.unwrap().is_some());
        let rotated = cache.resolve(new_key.kid()).await.unwrap();
        assert_eq!(rotated.as_ref(), Some(new_key.jwk()));
    }

    #[tokio::test]
    async fn test_expired_cache_is_refetched() {
        let key = TestKey::shared();
        let server = mock_discovery(&jwk_set(&[key]), 2).await;
        let cache = KeySetCache::builder(discovery_url(&server))
            .with_cache(Duration::ZERO)
            .build();

        assert!(cache.resolve(key.kid()).await.unwrap().is_some());
        assert!(cache.resolve(key.kid()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_fetch() {
        let key = TestKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery_response(&jwk_set(&[key])).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;
        let cache = KeySetCache::builder(discovery_url(&server)).build();

        let (a, b, c) = tokio::join!(
            cache.resolve(key.kid()),
            cache.resolve(key.kid()),
            cache.resolve("forged"),
        );
        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());
        assert!(c.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_cancel_fetch() {
        let key = TestKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery_response(&jwk_set(&[key])).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&server)
            .await;
        let cache = KeySetCache::builder(discovery_url(&server)).build();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), cache.resolve(key.kid())).await;
        assert!(abandoned.is_err());

        let jwk = cache.resolve(key.kid()).await.unwrap();
        assert_eq!(jwk.as_ref(), Some(key.jwk()));
    }

    #[tokio::test]
    async fn test_error_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let cache = KeySetCache::builder(discovery_url(&server)).build();

        let err = cache.resolve("primary").await.unwrap_err();
        assert!(matches!(
            *err,
            Error::JwkSetRequestErrorResponse { status_code } if status_code == 503
        ));
    }

    #[tokio::test]
    async fn test_malformed_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;
        let cache = KeySetCache::builder(discovery_url(&server)).build();

        let err = cache.resolve("primary").await.unwrap_err();
        assert!(matches!(*err, Error::FailedJwkSetRequest(_)));
    }

    #[tokio::test]
    async fn test_stalled_provider_times_out() {
        let key = TestKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery_response(&jwk_set(&[key])).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;
        let cache = KeySetCache::builder(discovery_url(&server))
            .with_timeout(Duration::from_millis(100))
            .build();

        let err = cache.resolve(key.kid()).await.unwrap_err();
        match &*err {
            Error::FailedJwkSetRequest(err) => assert!(err.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_key_set() {
        let key = TestKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery_response(&jwk_set(&[key])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let cache = KeySetCache::builder(discovery_url(&server))
            .with_refresh_cooldown(Duration::ZERO)
            .build();

        assert!(cache.resolve(key.kid()).await.unwrap().is_some());
        assert!(cache.resolve("rotated").await.is_err());
        assert!(cache.resolve(key.kid()).await.unwrap().is_some());
    }
}
