use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;

use crate::config::{host_allowed, Config};
use crate::credentials::Credentials;
use crate::session::{Authenticator, Session};

const EMAIL_FIELD: &str = "#identifierMNTD";
const PASSWORD_FIELD: &str = "#password";
const SUBMIT_BUTTON: &str = "form button[type=\"submit\"]";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Could not launch Chrome: {0}")]
    Launch(String),
    #[error("Browser automation failed: {0}")]
    Browser(#[from] CdpError),
    #[error("Minted login page changed, '{selector}' not found: {source}")]
    FormChanged { selector: &'static str, source: CdpError },
    #[error("Minted login was rejected, still on {url} (wrong credentials or a challenge page?)")]
    Rejected { url: String },
    #[error("Login finished but no cookies were set for {domain}")]
    NoCookies { domain: String },
}

/// Logs in through the real login form in a throwaway Chrome profile.
pub struct ChromeAuthenticator {
    login_url: String,
    domain: String,
    headless: bool,
    chrome_executable: Option<PathBuf>,
    login_timeout: Duration,
}

impl ChromeAuthenticator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login_url: config.login_url.clone(),
            domain: config.allowed_domain.clone(),
            headless: config.headless,
            chrome_executable: config.chrome_executable.clone(),
            login_timeout: config.login_timeout,
        }
    }

    async fn log_in(
        &self,
        browser: &Browser,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        let page = browser.new_page(self.login_url.as_str()).await?;
        page.wait_for_navigation().await?;

        find(&page, EMAIL_FIELD).await?.click().await?.type_str(&credentials.email).await?;
        find(&page, PASSWORD_FIELD).await?.click().await?.type_str(&credentials.password).await?;
        find(&page, SUBMIT_BUTTON).await?.click().await?;

        self.wait_for_redirect(&page).await?;

        let cookies = page.get_cookies().await?;
        let total = cookies.len();
        let session = Session::from_cookies(
            cookies
                .into_iter()
                .filter(|c| host_allowed(&c.domain, &self.domain))
                .map(|c| (c.name, c.value)),
        );
        tracing::debug!(total, "collected browser cookies");
        session.ok_or_else(|| AuthError::NoCookies { domain: self.domain.clone() })
    }

    // A successful login navigates away from the login page.
    async fn wait_for_redirect(&self, page: &Page) -> Result<(), AuthError> {
        let deadline = tokio::time::Instant::now() + self.login_timeout;
        loop {
            let url = page.url().await?.unwrap_or_default();
            if !is_login_page(&url) {
                tracing::debug!(%url, "login redirected");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AuthError::Rejected { url });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Authenticator for ChromeAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        // Removed on drop, so no profile outlives the login.
        let profile = tempfile::Builder::new()
            .prefix("minted-mcp-")
            .tempdir()
            .map_err(|e| AuthError::Launch(e.to_string()))?;

        let mut builder = BrowserConfig::builder().user_data_dir(profile.path());
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(AuthError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AuthError::Launch(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("chrome event error: {e}");
                }
            }
        });

        let outcome = self.log_in(&browser, credentials).await;

        if let Err(e) = browser.close().await {
            tracing::warn!("failed to close Chrome: {e}");
        }
        if let Err(e) = browser.wait().await {
            tracing::warn!("failed to reap Chrome: {e}");
        }
        events.abort();
        drop(profile);

        if let Err(e) = &outcome {
            tracing::warn!("Minted login failed: {e}");
        }
        outcome
    }
}

async fn find(page: &Page, selector: &'static str) -> Result<Element, AuthError> {
    page.find_element(selector)
        .await
        .map_err(|source| AuthError::FormChanged { selector, source })
}

fn is_login_page(url: &str) -> bool {
    url.is_empty() || url.contains("/login")
}
