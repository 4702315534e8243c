use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DOMAIN: &str = "minted.com";
pub const LOGIN_URL: &str = "https://www.minted.com/login";
pub const CONTACTS_URL: &str = "https://addressbook.minted.com/api/contacts/contacts/?format=json";
pub const ORDERS_URL: &str = "https://addressbook.minted.com/api/orders/";
pub const GROUPS_URL: &str = "https://addressbook.minted.com/api/contacts/groups/";

/// Remote endpoints read by the API client.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub contacts: String,
    pub orders: String,
    pub groups: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            contacts: CONTACTS_URL.to_string(),
            orders: ORDERS_URL.to_string(),
            groups: GROUPS_URL.to_string(),
        }
    }
}

#[cfg(test)]
impl Endpoints {
    /// All three endpoints rooted at `base_url`, used against local mock servers.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            contacts: format!("{base}/api/contacts/contacts/?format=json"),
            orders: format!("{base}/api/orders/"),
            groups: format!("{base}/api/contacts/groups/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Every HTTP request must target this host or one of its subdomains.
    pub allowed_domain: String,
    pub login_url: String,
    pub endpoints: Endpoints,
    pub request_timeout: Duration,
    pub login_timeout: Duration,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub prompt_enabled: bool,
    pub keyring_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_domain: DEFAULT_DOMAIN.to_string(),
            login_url: LOGIN_URL.to_string(),
            endpoints: Endpoints::default(),
            request_timeout: Duration::from_secs(300),
            login_timeout: Duration::from_secs(30),
            headless: true,
            chrome_executable: None,
            prompt_enabled: true,
            keyring_enabled: true,
        }
    }
}

/// `host` is `domain` itself or one of its subdomains. Cookie domains with a
/// leading dot are accepted.
pub fn host_allowed(host: &str, domain: &str) -> bool {
    let host = host.trim_start_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    host == domain || host.strip_suffix(&domain).is_some_and(|rest| rest.ends_with('.'))
}
