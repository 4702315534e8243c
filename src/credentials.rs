use std::fmt;
use std::io::IsTerminal;

use dialoguer::{Input, Password};
use serde::Deserialize;

pub const EMAIL_VAR: &str = "MINTED_EMAIL";
pub const PASSWORD_VAR: &str = "MINTED_PASSWORD";
pub const KEYRING_SERVICE: &str = "minted.com";
pub const KEYRING_ACCOUNT: &str = "credentials";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error(
        "Minted credentials not found (tried: {}). Set MINTED_EMAIL and MINTED_PASSWORD \
         or store them in the keyring under service 'minted.com'",
        .tried.join(", ")
    )]
    NotFound { tried: Vec<String> },
    #[error("Credential prompt failed: {0}")]
    Prompt(String),
    #[error("Credential lookup was interrupted: {0}")]
    Interrupted(String),
}

/// External secret store consulted after the environment.
pub trait SecretStore: Send + Sync {
    fn describe(&self) -> String;

    /// `Ok(None)` when the store has no entry for Minted.
    fn lookup(&self) -> Result<Option<Credentials>, String>;
}

/// Last-resort interactive source. `Ok(None)` means no terminal is available.
pub trait Prompter: Send + Sync {
    fn prompt(&self) -> Result<Option<Credentials>, CredentialError>;
}

/// OS keyring entry whose secret is `{"email": ..., "password": ...}`.
pub struct KeyringStore {
    service: String,
    account: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self { service: KEYRING_SERVICE.to_string(), account: KEYRING_ACCOUNT.to_string() }
    }
}

impl SecretStore for KeyringStore {
    fn describe(&self) -> String {
        format!("keyring service '{}'", self.service)
    }

    fn lookup(&self) -> Result<Option<Credentials>, String> {
        let entry = keyring::Entry::new(&self.service, &self.account).map_err(|e| e.to_string())?;
        match entry.get_password() {
            Ok(secret) => serde_json::from_str(&secret)
                .map(Some)
                .map_err(|e| format!("malformed keyring secret: {e}")),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }
}

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self) -> Result<Option<Credentials>, CredentialError> {
        // stdin/stdout belong to the MCP transport; dialoguer talks to the terminal via stderr
        if !std::io::stderr().is_terminal() {
            return Ok(None);
        }
        let email: String = Input::new()
            .with_prompt("Minted email")
            .interact_text()
            .map_err(|e| CredentialError::Prompt(e.to_string()))?;
        let password: String = Password::new()
            .with_prompt("Minted password")
            .interact()
            .map_err(|e| CredentialError::Prompt(e.to_string()))?;
        if email.trim().is_empty() || password.is_empty() {
            return Err(CredentialError::Prompt("email and password must not be empty".into()));
        }
        Ok(Some(Credentials::new(email.trim(), password)))
    }
}

pub struct CredentialResolver {
    vars: Vec<(String, String)>,
    store: Option<Box<dyn SecretStore>>,
    prompter: Option<Box<dyn Prompter>>,
}

impl CredentialResolver {
    /// Snapshot of the process environment, with no secret store or prompt.
    pub fn from_env() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::new(vars)
    }

    pub fn new(vars: Vec<(String, String)>) -> Self {
        Self { vars, store: None, prompter: None }
    }

    pub fn with_secret_store(mut self, store: impl SecretStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Some(Box::new(prompter));
        self
    }

    /// Environment, then secret store, then prompt. The first complete source wins.
    pub fn resolve(&self) -> Result<Credentials, CredentialError> {
        let mut tried = vec![format!("environment variables {EMAIL_VAR}/{PASSWORD_VAR}")];
        if let Some(creds) = self.env_credentials() {
            tracing::debug!("using Minted credentials from environment");
            return Ok(creds);
        }

        match &self.store {
            Some(store) => {
                tried.push(store.describe());
                match store.lookup() {
                    Ok(Some(creds)) => {
                        tracing::debug!("using Minted credentials from {}", store.describe());
                        return Ok(creds);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("{} lookup failed: {e}", store.describe()),
                }
            }
            None => tried.push("secret store (disabled)".to_string()),
        }

        match &self.prompter {
            Some(prompter) => {
                if let Some(creds) = prompter.prompt()? {
                    return Ok(creds);
                }
                tried.push("interactive prompt (no terminal)".to_string());
            }
            None => tried.push("interactive prompt (disabled)".to_string()),
        }

        Err(CredentialError::NotFound { tried })
    }

    fn env_credentials(&self) -> Option<Credentials> {
        let find = |name: &str| {
            self.vars
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.trim().is_empty())
                .map(|(_, v)| v.clone())
        };
        Some(Credentials::new(find(EMAIL_VAR)?.trim(), find(PASSWORD_VAR)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub struct StaticStore(pub Result<Option<Credentials>, String>);

    impl SecretStore for StaticStore {
        fn describe(&self) -> String {
            "test store".into()
        }

        fn lookup(&self) -> Result<Option<Credentials>, String> {
            self.0.clone()
        }
    }

    pub struct StaticPrompter(pub Option<Credentials>);

    impl Prompter for StaticPrompter {
        fn prompt(&self) -> Result<Option<Credentials>, CredentialError> {
            Ok(self.0.clone())
        }
    }

    pub fn env(email: &str, password: &str) -> Vec<(String, String)> {
        vec![
            (EMAIL_VAR.to_string(), email.to_string()),
            (PASSWORD_VAR.to_string(), password.to_string()),
        ]
    }

    #[test]
    fn fails_when_every_source_is_empty() {
        let resolver = CredentialResolver::new(vec![])
            .with_secret_store(StaticStore(Ok(None)))
            .with_prompter(StaticPrompter(None));
        let err = resolver.resolve().unwrap_err();
        match err {
            CredentialError::NotFound { ref tried } => {
                assert_eq!(tried.len(), 3);
                assert!(tried[0].contains(EMAIL_VAR));
                assert_eq!(tried[1], "test store");
                assert!(tried[2].contains("no terminal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("test store"));
    }

    #[test]
    fn reports_disabled_sources() {
        let err = CredentialResolver::new(vec![]).resolve().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("secret store (disabled)"));
        assert!(msg.contains("interactive prompt (disabled)"));
    }

    #[test]
    fn environment_alone_succeeds() {
        let creds = CredentialResolver::new(env("a@b.com", "x")).resolve().unwrap();
        assert_eq!(creds, Credentials::new("a@b.com", "x"));
    }

    #[test]
    fn environment_names_are_case_insensitive() {
        let vars = vec![
            ("minted_email".to_string(), " lower@b.com ".to_string()),
            ("Minted_Password".to_string(), "pw".to_string()),
        ];
        let creds = CredentialResolver::new(vars).resolve().unwrap();
        assert_eq!(creds, Credentials::new("lower@b.com", "pw"));
    }

    #[test]
    fn secret_store_alone_succeeds() {
        let resolver = CredentialResolver::new(vec![])
            .with_secret_store(StaticStore(Ok(Some(Credentials::new("store@b.com", "s")))));
        assert_eq!(resolver.resolve().unwrap().email, "store@b.com");
    }

    #[test]
    fn prompt_alone_succeeds() {
        let resolver = CredentialResolver::new(vec![])
            .with_prompter(StaticPrompter(Some(Credentials::new("typed@b.com", "t"))));
        assert_eq!(resolver.resolve().unwrap().email, "typed@b.com");
    }

    #[test]
    fn environment_beats_store_beats_prompt() {
        let store = || StaticStore(Ok(Some(Credentials::new("store@b.com", "s"))));
        let prompt = || StaticPrompter(Some(Credentials::new("typed@b.com", "t")));

        let all = CredentialResolver::new(env("env@b.com", "e"))
            .with_secret_store(store())
            .with_prompter(prompt());
        assert_eq!(all.resolve().unwrap().email, "env@b.com");

        let no_env = CredentialResolver::new(vec![])
            .with_secret_store(store())
            .with_prompter(prompt());
        assert_eq!(no_env.resolve().unwrap().email, "store@b.com");
    }

    #[test]
    fn partial_environment_is_not_merged() {
        let vars = vec![(EMAIL_VAR.to_string(), "env@b.com".to_string())];
        let resolver = CredentialResolver::new(vars)
            .with_secret_store(StaticStore(Ok(Some(Credentials::new("store@b.com", "s")))));
        assert_eq!(resolver.resolve().unwrap(), Credentials::new("store@b.com", "s"));
    }

    #[test]
    fn store_error_falls_through_to_prompt() {
        let resolver = CredentialResolver::new(vec![])
            .with_secret_store(StaticStore(Err("backend locked".into())))
            .with_prompter(StaticPrompter(Some(Credentials::new("typed@b.com", "t"))));
        assert_eq!(resolver.resolve().unwrap().email, "typed@b.com");
    }

    /// Sets process environment variables and restores the previous values on drop.
    struct EnvGuard(Vec<(&'static str, Option<std::ffi::OsString>)>);

    impl EnvGuard {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            let saved = vars
                .iter()
                .map(|(name, value)| {
                    let previous = std::env::var_os(name);
                    std::env::set_var(name, value);
                    (*name, previous)
                })
                .collect();
            Self(saved)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, previous) in &self.0 {
                match previous {
                    Some(value) => std::env::set_var(name, value),
                    None => std::env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn from_env_reads_process_environment() {
        let _guard = EnvGuard::set(&[(EMAIL_VAR, " proc@b.com "), (PASSWORD_VAR, "from-process")]);
        let creds = CredentialResolver::from_env().resolve().unwrap();
        assert_eq!(creds.email, "proc@b.com");
        assert_eq!(creds.password, "from-process");
    }

    #[test]
    fn debug_output_hides_password() {
        let shown = format!("{:?}", Credentials::new("a@b.com", "hunter2"));
        assert!(shown.contains("a@b.com"));
        assert!(!shown.contains("hunter2"));
    }
}
