use std::cmp::Ordering;
use std::sync::Arc;

use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{redirect, Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{host_allowed, Config, Endpoints};
use crate::error::{Error, Result};
use crate::session::{Session, SessionCache};

pub const DEFAULT_ORDER_LIMIT: usize = 10;
const COMPLETED_ORDER_GROUP: &str = "completeorder";
const UNKNOWN: &str = "Unknown";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Refusing to contact {url}: only {domain} is allowed")]
    DomainNotAllowed { url: String, domain: String },
    #[error("Minted not reachable: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Minted returned HTTP {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("Minted still rejects the session after logging in again (HTTP {status})")]
    Unauthorized { status: StatusCode },
    #[error("Logging in again after HTTP {status} failed: {source}")]
    Reauthentication { status: StatusCode, source: Box<Error> },
    #[error("Invalid JSON from {url}: {source}")]
    Decode { url: String, source: serde_json::Error },
    #[error("Unexpected response from {url}: {detail}")]
    UnexpectedShape { url: String, detail: String },
    #[error("No completed card delivery found in the Minted address book")]
    NoDelivery,
}

/// Address book entry, passed through verbatim apart from the required `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Value,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl From<Contact> for Value {
    fn from(contact: Contact) -> Self {
        let mut map = contact.fields;
        map.insert("id".to_string(), contact.id);
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Order {
    /// Date used for newest-first ordering. Older records use `date` or `order_date`.
    fn date_key(&self) -> DateKey<'_> {
        let date = self
            .created_at
            .as_ref()
            .or_else(|| ["date", "order_date"].iter().find_map(|k| self.extra.get(*k)));
        DateKey::of(date)
    }
}

/// Remote dates arrive as ISO strings or epoch numbers. Descending order puts
/// strings first, then numbers, then anything else.
#[derive(Debug, PartialEq, PartialOrd)]
enum DateKey<'a> {
    Missing,
    Number(f64),
    Text(&'a str),
}

impl<'a> DateKey<'a> {
    fn of(value: Option<&'a Value>) -> Self {
        match value {
            Some(Value::String(text)) => DateKey::Text(text),
            Some(Value::Number(n)) => n.as_f64().map_or(DateKey::Missing, DateKey::Number),
            _ => DateKey::Missing,
        }
    }

    fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.partial_cmp(a).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub delivery_date: Value,
    pub order_id: Value,
    pub status: Value,
    pub recipient_count: usize,
    pub recipients: Vec<Value>,
    pub raw_delivery_data: Value,
}

impl From<Delivery> for Value {
    fn from(delivery: Delivery) -> Self {
        let mut map = Map::new();
        map.insert("delivery_date".to_string(), delivery.delivery_date);
        map.insert("order_id".to_string(), delivery.order_id);
        map.insert("status".to_string(), delivery.status);
        map.insert("recipient_count".to_string(), Value::from(delivery.recipient_count));
        map.insert("recipients".to_string(), Value::Array(delivery.recipients));
        map.insert("raw_delivery_data".to_string(), delivery.raw_delivery_data);
        Value::Object(map)
    }
}

impl Delivery {
    fn from_group(group: Value, recipients: Vec<Value>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| group.get(*k))
                .cloned()
                .unwrap_or_else(|| Value::from(UNKNOWN))
        };
        Self {
            delivery_date: pick(&["created_at", "date", "order_date"]),
            order_id: pick(&["id", "order_id", "order_number"]),
            status: pick(&["status"]),
            recipient_count: recipients.len(),
            recipients,
            raw_delivery_data: group,
        }
    }
}

/// Missing, zero and negative limits fall back to [`DEFAULT_ORDER_LIMIT`].
pub fn order_limit(limit: Option<i64>) -> usize {
    limit
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_ORDER_LIMIT)
}

/// Cookie-authenticated reads against the Minted JSON endpoints.
pub struct MintedClient {
    http: Client,
    endpoints: Endpoints,
    domain: String,
    sessions: Arc<SessionCache>,
}

impl MintedClient {
    pub fn new(
        config: &Config,
        sessions: Arc<SessionCache>,
    ) -> std::result::Result<Self, ApiError> {
        let domain = config.allowed_domain.clone();
        let redirect_domain = domain.clone();
        let http = Client::builder()
            .timeout(config.request_timeout)
            .redirect(redirect::Policy::custom(move |attempt| {
                let allowed = attempt
                    .url()
                    .host_str()
                    .is_some_and(|host| host_allowed(host, &redirect_domain));
                if allowed && attempt.previous().len() < 10 {
                    attempt.follow()
                } else {
                    attempt.stop()
                }
            }))
            .build()?;

        let client = Self { http, endpoints: config.endpoints.clone(), domain, sessions };
        let Endpoints { contacts, orders, groups } = &client.endpoints;
        for url in [contacts, orders, groups] {
            client.check_url(url)?;
        }
        Ok(client)
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub async fn fetch_contacts(&self) -> Result<Vec<Contact>> {
        let url = &self.endpoints.contacts;
        let body = self.get_json(url).await?;
        decode(url, body)
    }

    /// Newest first, at most `limit` (see [`order_limit`]).
    pub async fn fetch_orders(&self, limit: Option<i64>) -> Result<Vec<Order>> {
        let limit = order_limit(limit);
        let url = &self.endpoints.orders;
        let mut orders: Vec<Order> = match self.get_json(url).await? {
            body @ Value::Array(_) => decode(url, body)?,
            body @ Value::Object(_) => vec![decode(url, body)?],
            other => {
                return Err(unexpected(url, format!("expected a list of orders, got {other}")));
            }
        };
        orders.sort_by(|a, b| DateKey::newest_first(&a.date_key(), &b.date_key()));
        orders.truncate(limit);
        Ok(orders)
    }

    /// The most recent `completeorder` address book group and its recipients.
    pub async fn fetch_latest_delivery(&self) -> Result<Delivery> {
        let url = &self.endpoints.groups;
        let Value::Array(groups) = self.get_json(url).await? else {
            return Err(unexpected(url, "expected a list of groups".to_string()));
        };
        let latest = latest_completed_order(groups).ok_or(ApiError::NoDelivery)?;

        let individuals = latest
            .get("individuals")
            .and_then(Value::as_array)
            .filter(|people| !people.is_empty())
            .cloned();
        let contact_ids = latest
            .get("contacts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let recipients = match individuals {
            Some(people) => people,
            None if !contact_ids.is_empty() => self
                .fetch_contacts()
                .await?
                .into_iter()
                .filter(|contact| contact_ids.contains(&contact.id))
                .map(Value::from)
                .collect(),
            None => Vec::new(),
        };
        Ok(Delivery::from_group(latest, recipients))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let url = self.check_url(url)?;
        let session = self.sessions.get_or_create().await?;

        let mut resp = self.send(&url, &session).await?;
        let status = resp.status();
        if is_auth_failure(status) {
            tracing::warn!(%status, %url, "Minted rejected the session, logging in again");
            let fresh = self
                .sessions
                .renew(&session)
                .await
                .map_err(|e| ApiError::Reauthentication { status, source: Box::new(e) })?;
            resp = self.send(&url, &fresh).await?;
            if is_auth_failure(resp.status()) {
                return Err(ApiError::Unauthorized { status: resp.status() }.into());
            }
        }

        if !resp.status().is_success() {
            return Err(ApiError::Status { status: resp.status(), url: url.to_string() }.into());
        }
        let text = resp.text().await.map_err(ApiError::from)?;
        serde_json::from_str(&text)
            .map_err(|source| ApiError::Decode { url: url.to_string(), source }.into())
    }

    async fn send(
        &self,
        url: &Url,
        session: &Session,
    ) -> std::result::Result<Response, ApiError> {
        tracing::debug!(%url, "GET");
        let resp = self
            .http
            .get(url.clone())
            .header(COOKIE, session.cookie_header())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Ok(resp)
    }

    /// Only the allow-listed domain is ever contacted. Plain http is
    /// accepted for loopback hosts only.
    fn check_url(&self, url: &str) -> std::result::Result<Url, ApiError> {
        let refused = || ApiError::DomainNotAllowed {
            url: url.to_string(),
            domain: self.domain.clone(),
        };
        let parsed = Url::parse(url).map_err(|_| refused())?;
        let host = parsed.host_str().unwrap_or_default();
        let scheme_ok = match parsed.scheme() {
            "https" => true,
            "http" => matches!(host, "127.0.0.1" | "localhost" | "[::1]"),
            _ => false,
        };
        if scheme_ok && host_allowed(host, &self.domain) {
            Ok(parsed)
        } else {
            Err(refused())
        }
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

fn latest_completed_order(groups: Vec<Value>) -> Option<Value> {
    fn created_at(group: &Value) -> DateKey<'_> {
        DateKey::of(group.get("created_at"))
    }
    let mut latest: Option<Value> = None;
    for group in groups {
        if group.get("type").and_then(Value::as_str) != Some(COMPLETED_ORDER_GROUP) {
            continue;
        }
        // first one wins on equal dates
        let newer = latest
            .as_ref()
            .map_or(true, |current| created_at(&group) > created_at(current));
        if newer {
            latest = Some(group);
        }
    }
    latest
}

fn decode<T: DeserializeOwned>(url: &str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| unexpected(url, e.to_string()))
}

fn unexpected(url: &str, detail: String) -> Error {
    ApiError::UnexpectedShape { url: url.to_string(), detail }.into()
}
