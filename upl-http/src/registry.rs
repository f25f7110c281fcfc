//! Client for the x402 service registry.
//!
//! Services register themselves, report liveness and pause on shutdown;
//! clients discover services by category, price and reputation.
//!
//! ## Error Handling
//!
//! Every call fails with a [`RegistryError`]: a bad URL, a transport failure,
//! a status of 400 or above, or a body that does not match the expected
//! shape. Calls that act on the registered service fail with
//! [`RegistryError::NotRegistered`] until [`RegistryClient::register_service`]
//! succeeds or an id is supplied with [`RegistryClient::with_service_id`].

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use http::Method;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use upl::amount::Amount;
use url::Url;

use crate::error::RegistryError;

/// Lifecycle status of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    /// Accepting paid requests.
    Active,
    /// Temporarily unavailable.
    Paused,
    /// Retired.
    Deprecated,
}

/// Body of `POST /services/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistration {
    /// Public base URL of the service.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Registry category.
    pub category: String,
    /// Wallet receiving payments.
    pub owner_wallet_address: String,
    /// Price of one call, in whole units of the primary token.
    #[serde(with = "rust_decimal::serde::float")]
    pub price_per_call: Decimal,
    /// Assets the service accepts.
    pub accepted_tokens: Vec<String>,
    /// Free-form capability names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A service as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Registry id.
    #[serde(default, alias = "serviceId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Public base URL.
    pub url: String,
    /// Paid resource path, when it differs from the base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Registry category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Price of one call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_call: Option<Amount>,
    /// Accepted assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_tokens: Vec<String>,
    /// Reputation, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<f64>,
    /// Observed uptime percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_percentage: Option<f64>,
    /// Average user rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    /// Lifecycle status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
}

/// Ordering of discovery results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortBy {
    /// Cheapest first.
    Price,
    /// Best reputation first.
    Reputation,
    /// Best reputation per unit of price first.
    Value,
    /// Most recently registered first.
    Recent,
}

impl SortBy {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Reputation => "reputation",
            Self::Value => "value",
            Self::Recent => "recent",
        }
    }
}

/// Filters for `GET /services/discover`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverQuery {
    /// Free-text search.
    pub query: Option<String>,
    /// Registry category.
    pub category: Option<String>,
    /// Highest acceptable price per call.
    pub max_price: Option<Decimal>,
    /// Lowest acceptable reputation.
    pub min_reputation: Option<f64>,
    /// Lowest acceptable uptime percentage.
    pub min_uptime: Option<f64>,
    /// Result ordering.
    pub sort_by: Option<SortBy>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl DiscoverQuery {
    /// Free-text search query.
    #[must_use]
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// Query pairs in registry order, skipping unset filters.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(query) = &self.query {
            pairs.push(("query", query.clone()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(max_price) = self.max_price {
            pairs.push(("maxPrice", format!("{max_price:.9}")));
        }
        if let Some(min) = self.min_reputation {
            pairs.push(("minReputation", format!("{min:.2}")));
        }
        if let Some(min) = self.min_uptime {
            pairs.push(("minUptime", format!("{min:.2}")));
        }
        if let Some(sort_by) = self.sort_by {
            pairs.push(("sortBy", sort_by.as_str().to_owned()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterServiceResponse {
    service_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceList {
    Wrapped { services: Vec<ServiceInfo> },
    Bare(Vec<ServiceInfo>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceEnvelope {
    Wrapped { service: ServiceInfo },
    Bare(ServiceInfo),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CategoryList {
    Wrapped { categories: Vec<String> },
    Bare(Vec<String>),
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: ServiceStatus,
}

/// HTTP client for the service registry.
///
/// Holds the id of the service it registered, so one instance serves a
/// whole service lifetime: register, heartbeat, pause.
#[derive(Debug)]
pub struct RegistryClient {
    base_url: Url,
    client: Client,
    timeout: Option<Duration>,
    service_id: Mutex<Option<String>>,
}

impl RegistryClient {
    /// Creates a client for the registry at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: Client::new(),
            timeout: None,
            service_id: Mutex::new(None),
        }
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Acts on an already-registered service.
    #[must_use]
    pub fn with_service_id(self, service_id: impl Into<String>) -> Self {
        self.set_service_id(service_id.into());
        self
    }

    /// Registry base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Id of the registered service, if any.
    #[must_use]
    pub fn service_id(&self) -> Option<String> {
        self.service_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_service_id(&self, service_id: String) {
        *self.service_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(service_id);
    }

    /// Registers a service and remembers the id the registry assigns.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the request fails or the response has no id.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.registry.register_service", skip_all, err))]
    pub async fn register_service(
        &self,
        registration: &ServiceRegistration,
        cancel: &CancellationToken,
    ) -> Result<String, RegistryError> {
        let url = self.endpoint(&["services", "register"])?;
        let response: RegisterServiceResponse = self
            .send_json(
                Method::POST,
                url,
                Some(registration),
                "POST /services/register",
                cancel,
            )
            .await?;

        #[cfg(feature = "telemetry")]
        tracing::info!(service_id = %response.service_id, "Service registered with x402 registry");

        self.set_service_id(response.service_id.clone());
        Ok(response.service_id)
    }

    /// Sets the status of the registered service.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] without a service id, or the
    /// HTTP variants if the request fails.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.registry.set_status", skip_all, fields(status = ?status), err))]
    pub async fn set_service_status(
        &self,
        status: ServiceStatus,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError> {
        let id = self.service_id().ok_or(RegistryError::NotRegistered)?;
        let url = self.endpoint(&["services", &id, "status"])?;
        self.send_empty(
            Method::PATCH,
            url,
            Some(&StatusUpdate { status }),
            "PATCH /services/{id}/status",
            cancel,
        )
        .await
    }

    /// Reports that the registered service is alive.
    ///
    /// # Errors
    ///
    /// Same as [`set_service_status`](Self::set_service_status).
    pub async fn heartbeat(&self, cancel: &CancellationToken) -> Result<(), RegistryError> {
        let id = self.service_id().ok_or(RegistryError::NotRegistered)?;
        let url = self.endpoint(&["services", &id, "heartbeat"])?;
        self.send_empty::<()>(
            Method::POST,
            url,
            None,
            "POST /services/{id}/heartbeat",
            cancel,
        )
        .await?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(service_id = %id, "Heartbeat sent to registry");

        Ok(())
    }

    /// Lists services matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the request fails or the body is not a service list.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.registry.discover", skip_all, err))]
    pub async fn discover(
        &self,
        query: &DiscoverQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceInfo>, RegistryError> {
        let mut url = self.endpoint(&["services", "discover"])?;
        let pairs = query.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        let list: ServiceList = self
            .send_json::<(), _>(Method::GET, url, None, "GET /services/discover", cancel)
            .await?;
        Ok(match list {
            ServiceList::Wrapped { services } | ServiceList::Bare(services) => services,
        })
    }

    /// Cheapest service in `category`, if any.
    ///
    /// # Errors
    ///
    /// Same as [`discover`](Self::discover).
    pub async fn find_cheapest(
        &self,
        category: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ServiceInfo>, RegistryError> {
        let query = DiscoverQuery {
            category: Some(category.to_owned()),
            sort_by: Some(SortBy::Price),
            limit: Some(1),
            ..DiscoverQuery::default()
        };
        Ok(self.discover(&query, cancel).await?.into_iter().next())
    }

    /// Fetches one service by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the request fails or the body is not a service.
    pub async fn get_service(
        &self,
        service_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ServiceInfo, RegistryError> {
        let url = self.endpoint(&["services", service_id])?;
        let envelope: ServiceEnvelope = self
            .send_json::<(), _>(Method::GET, url, None, "GET /services/{id}", cancel)
            .await?;
        Ok(match envelope {
            ServiceEnvelope::Wrapped { service } | ServiceEnvelope::Bare(service) => service,
        })
    }

    /// Lists registry categories.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the request fails or the body is not a list.
    pub async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<String>, RegistryError> {
        let url = self.endpoint(&["categories"])?;
        let list: CategoryList = self
            .send_json::<(), _>(Method::GET, url, None, "GET /categories", cancel)
            .await?;
        Ok(match list {
            CategoryList::Wrapped { categories } | CategoryList::Bare(categories) => categories,
        })
    }

    /// Appends escaped path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::UrlParse {
                context: "Registry URL cannot be a base",
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
        context: &'static str,
    ) -> Result<reqwest::Response, RegistryError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|source| RegistryError::Http { context, source })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .map_err(|source| RegistryError::Http { context, source })?;
        Err(RegistryError::HttpStatus {
            context,
            status,
            body,
        })
    }

    async fn send_json<T, R>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
        context: &'static str,
        cancel: &CancellationToken,
    ) -> Result<R, RegistryError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        cancellable(cancel, async {
            self.send(method, url, body, context)
                .await?
                .json::<R>()
                .await
                .map_err(|source| RegistryError::JsonDeserialization { context, source })
        })
        .await
    }

    async fn send_empty<T>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
        context: &'static str,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError>
    where
        T: Serialize + Sync + ?Sized,
    {
        cancellable(cancel, async {
            self.send(method, url, body, context).await.map(drop)
        })
        .await
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, RegistryError>>,
) -> Result<T, RegistryError> {
    cancel
        .run_until_cancelled(fut)
        .await
        .unwrap_or(Err(RegistryError::Cancelled))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;
    use upl::UplError;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> RegistryClient {
        RegistryClient::new(Url::parse(&server.uri()).unwrap())
    }

    fn registration() -> ServiceRegistration {
        ServiceRegistration {
            url: "https://svc.example".to_owned(),
            name: "Echo".to_owned(),
            description: "Echoes input".to_owned(),
            category: "utility".to_owned(),
            owner_wallet_address: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_owned(),
            price_per_call: Decimal::from_str("0.01").unwrap(),
            accepted_tokens: vec!["CASH".to_owned(), "USDC".to_owned(), "SOL".to_owned()],
            capabilities: Vec::new(),
            tags: vec!["demo".to_owned()],
        }
    }

    fn service(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Echo",
            "description": "Echoes input",
            "url": "https://svc.example",
            "pricePerCall": 0.01,
            "reputationScore": 92.5,
            "status": "ACTIVE"
        })
    }

    #[tokio::test]
    async fn test_register_then_pause_and_heartbeat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/register"))
            .and(body_json(json!({
                "url": "https://svc.example",
                "name": "Echo",
                "description": "Echoes input",
                "category": "utility",
                "ownerWalletAddress": "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
                "pricePerCall": 0.01,
                "acceptedTokens": ["CASH", "USDC", "SOL"],
                "tags": ["demo"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "serviceId": "svc-1",
                "service": service("svc-1")
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/services/svc-1/status"))
            .and(body_json(json!({ "status": "PAUSED" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/services/svc-1/heartbeat"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let cancel = CancellationToken::new();
        let id = client.register_service(&registration(), &cancel).await.unwrap();
        assert_eq!(id, "svc-1");
        assert_eq!(client.service_id().as_deref(), Some("svc-1"));
        client.heartbeat(&cancel).await.unwrap();
        client
            .set_service_status(ServiceStatus::Paused, &cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_calls_needing_an_id_fail_before_registration() {
        let server = MockServer::start().await;
        let client = client(&server);
        let cancel = CancellationToken::new();

        let err = client.heartbeat(&cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotRegistered));
        let err = client
            .set_service_status(ServiceStatus::Active, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(UplError::from(err), UplError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discover_formats_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/discover"))
            .and(query_param("query", "echo"))
            .and(query_param("category", "utility"))
            .and(query_param("maxPrice", "0.010000000"))
            .and(query_param("minReputation", "4.50"))
            .and(query_param("minUptime", "99.00"))
            .and(query_param("sortBy", "value"))
            .and(query_param("limit", "5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "services": [service("a"), service("b")] })),
            )
            .mount(&server)
            .await;

        let query = DiscoverQuery {
            query: Some("echo".to_owned()),
            category: Some("utility".to_owned()),
            max_price: Some(Decimal::from_str("0.01").unwrap()),
            min_reputation: Some(4.5),
            min_uptime: Some(99.0),
            sort_by: Some(SortBy::Value),
            limit: Some(5),
        };
        let services = client(&server)
            .discover(&query, &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<_> = services.iter().filter_map(|s| s.id.as_deref()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(
            services[0].price_per_call.map(|p| p.as_decimal()),
            Some(Decimal::from_str("0.01").unwrap())
        );
        assert_eq!(services[0].status, Some(ServiceStatus::Active));
    }

    #[tokio::test]
    async fn test_discover_accepts_bare_list_and_find_cheapest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/discover"))
            .and(query_param("sortBy", "price"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([service("cheap")])))
            .mount(&server)
            .await;

        let cheapest = client(&server)
            .find_cheapest("utility", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cheapest.id.as_deref(), Some("cheap"));
    }

    #[tokio::test]
    async fn test_get_service_and_categories() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/svc-9"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "service": service("svc-9") })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["ai", "data"])))
            .mount(&server)
            .await;

        let client = client(&server);
        let cancel = CancellationToken::new();
        let svc = client.get_service("svc-9", &cancel).await.unwrap();
        assert_eq!(svc.name, "Echo");
        assert_eq!(client.categories(&cancel).await.unwrap(), ["ai", "data"]);
    }

    #[tokio::test]
    async fn test_malformed_body_and_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": 1 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/discover"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .mount(&server)
            .await;

        let client = client(&server);
        let cancel = CancellationToken::new();
        let err = client.get_service("broken", &cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::JsonDeserialization { .. }));
        assert!(matches!(UplError::from(err), UplError::InvalidResponse(_)));

        let err = client
            .discover(&DiscoverQuery::default(), &cancel)
            .await
            .unwrap_err();
        match UplError::from(err) {
            UplError::Network { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "db down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_call() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client(&server)
            .categories(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Cancelled));
    }
}
