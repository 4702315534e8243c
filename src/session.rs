use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};

use crate::browser::AuthError;
use crate::credentials::{CredentialError, CredentialResolver, Credentials};
use crate::error::Result;

/// Cookies proving a logged-in Minted identity. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    /// `None` when no cookies were collected.
    pub fn from_cookies<I>(cookies: I) -> Option<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let cookies: BTreeMap<_, _> = cookies.into_iter().collect();
        (!cookies.is_empty()).then_some(Self { cookies })
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    /// Value for a `Cookie:` request header.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Turns credentials into a session. The browser login lives behind this so
/// tests can swap it out.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<Session, AuthError>;
}

/// Process-wide single slot for the Minted session.
///
/// The slot lock is held for the whole login, so concurrent first calls
/// wait for one browser session instead of starting several.
pub struct SessionCache {
    resolver: Arc<CredentialResolver>,
    authenticator: Arc<dyn Authenticator>,
    credentials: OnceCell<Credentials>,
    slot: Mutex<Option<Session>>,
}

impl SessionCache {
    pub fn new(resolver: CredentialResolver, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            authenticator,
            credentials: OnceCell::new(),
            slot: Mutex::new(None),
        }
    }

    pub async fn get_or_create(&self) -> Result<Session> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = self.login().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Drops `stale` and logs in again. If another caller already replaced
    /// it, that newer session is returned without a second login.
    pub async fn renew(&self, stale: &Session) -> Result<Session> {
        let mut slot = self.slot.lock().await;
        if let Some(current) = slot.as_ref().filter(|current| *current != stale) {
            return Ok(current.clone());
        }
        *slot = None;
        let session = self.login().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    async fn login(&self) -> Result<Session> {
        let credentials = self.credentials().await?;
        tracing::info!(email = %credentials.email, "logging in to Minted");
        let session = self.authenticator.authenticate(credentials).await?;
        tracing::info!(cookies = session.cookie_count(), "Minted session established");
        Ok(session)
    }

    // Keyring and terminal prompt block, so resolution runs off the runtime.
    async fn credentials(&self) -> std::result::Result<&Credentials, CredentialError> {
        self.credentials
            .get_or_try_init(|| async {
                let resolver = Arc::clone(&self.resolver);
                tokio::task::spawn_blocking(move || resolver.resolve())
                    .await
                    .map_err(|e| CredentialError::Interrupted(e.to_string()))?
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credentials::tests::env;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts logins; call numbers listed in `fail_on` (1-based) are rejected.
    /// Each successful login yields a distinct `sessionid` cookie.
    #[derive(Default)]
    pub struct MockAuthenticator {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
        delay: Option<Duration>,
    }

    impl MockAuthenticator {
        pub fn failing_on(fail_on: Vec<usize>) -> Self {
            Self { fail_on, ..Self::default() }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for MockAuthenticator {
        async fn authenticate(
            &self,
            credentials: &Credentials,
        ) -> std::result::Result<Session, AuthError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on.contains(&call) {
                return Err(AuthError::Rejected { url: "https://www.minted.com/login".into() });
            }
            let cookies = [
                ("sessionid".to_string(), format!("s{call}")),
                ("user".to_string(), credentials.email.clone()),
            ];
            Ok(Session::from_cookies(cookies).unwrap())
        }
    }

    pub fn cache_with(auth: Arc<MockAuthenticator>) -> SessionCache {
        SessionCache::new(CredentialResolver::new(env("a@b.com", "x")), auth)
    }

    #[test]
    fn empty_cookie_set_is_not_a_session() {
        assert!(Session::from_cookies(Vec::new()).is_none());
    }

    #[test]
    fn renders_cookie_header_in_name_order() {
        let session = Session::from_cookies([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ])
        .unwrap();
        assert_eq!(session.cookie_header(), "a=1; b=2");
    }

    #[tokio::test]
    async fn logs_in_once_and_reuses_session() {
        let auth = Arc::new(MockAuthenticator::default());
        let cache = cache_with(auth.clone());
        let first = cache.get_or_create().await.unwrap();
        let second = cache.get_or_create().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(auth.calls(), 1);
        assert_eq!(first.cookie_header(), "sessionid=s1; user=a@b.com");
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_login() {
        let auth = Arc::new(MockAuthenticator {
            delay: Some(Duration::from_millis(20)),
            ..MockAuthenticator::default()
        });
        let cache = cache_with(auth.clone());
        let (a, b) = tokio::join!(cache.get_or_create(), cache.get_or_create());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(auth.calls(), 1);
    }

    #[tokio::test]
    async fn renew_replaces_stale_session() {
        let auth = Arc::new(MockAuthenticator::default());
        let cache = cache_with(auth.clone());
        let stale = cache.get_or_create().await.unwrap();
        let fresh = cache.renew(&stale).await.unwrap();
        assert_ne!(stale, fresh);
        assert_eq!(cache.get_or_create().await.unwrap(), fresh);
        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test]
    async fn renew_skips_login_when_already_replaced() {
        let auth = Arc::new(MockAuthenticator::default());
        let cache = cache_with(auth.clone());
        let stale = cache.get_or_create().await.unwrap();
        let fresh = cache.renew(&stale).await.unwrap();
        assert_eq!(cache.renew(&stale).await.unwrap(), fresh);
        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test]
    async fn failed_login_leaves_slot_empty() {
        let auth = Arc::new(MockAuthenticator::failing_on(vec![1]));
        let cache = cache_with(auth.clone());
        let err = cache.get_or_create().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(AuthError::Rejected { .. })));
        tokio_test::assert_ok!(cache.get_or_create().await);
        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test]
    async fn missing_credentials_skip_the_browser() {
        let auth = Arc::new(MockAuthenticator::default());
        let cache = SessionCache::new(CredentialResolver::new(vec![]), auth.clone());
        let err = cache.get_or_create().await.unwrap_err();
        assert!(matches!(err, Error::Credential(CredentialError::NotFound { .. })));
        assert_eq!(auth.calls(), 0);
    }
}
