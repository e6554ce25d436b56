use super::{ExchangeGateway, GatewayError};
use crate::config::StrategyConfig;
use crate::models::{AccessToken, OrderPlacement, OrderRecord, OrderState, Side};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

// Deribit API v2, JSON-RPC over HTTP GET
// Docs: https://docs.deribit.com/
const AUTH_SCOPE: &str = "trade:read_write";
const HISTORY_PAGE_SIZE: u32 = 100;

type DeribitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Exponential backoff for idempotent requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Order and transport settings for the Deribit client
#[derive(Debug, Clone)]
pub struct DeribitSettings {
    /// Contract amount per order
    pub amount: f64,
    /// Label attached to every order placed by this process
    pub label: String,
    pub request_timeout: Duration,
    pub requests_per_second: u32,
    pub retry: RetryPolicy,
}

impl Default for DeribitSettings {
    fn default() -> Self {
        Self {
            amount: 10.0,
            label: format!("gapbot-{}", uuid::Uuid::new_v4().simple()),
            request_timeout: Duration::from_secs(30),
            requests_per_second: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for the Deribit REST API
///
/// Authenticates with client credentials on every call; the access token is
/// never reused across calls. Cloning shares the rate limiter.
#[derive(Clone)]
pub struct DeribitClient {
    client: Client,
    host: String,
    client_id: String,
    client_secret: String,
    settings: DeribitSettings,
    rate_limiter: Arc<DeribitRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AuthResult {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderBook {
    mark_price: f64,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResult {
    order: RawOrder,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    order_id: String,
    direction: Side,
    // Market orders report the string "market_price" here
    #[serde(default)]
    price: serde_json::Value,
    amount: f64,
    order_state: OrderState,
}

impl RawOrder {
    fn numeric_price(&self) -> f64 {
        self.price.as_f64().unwrap_or(0.0)
    }
}

impl From<RawOrder> for OrderRecord {
    fn from(raw: RawOrder) -> Self {
        OrderRecord {
            price: raw.numeric_price(),
            id: raw.order_id,
            side: raw.direction,
            amount: raw.amount,
            status: raw.order_state,
        }
    }
}

// ============== Implementation ==============

impl DeribitClient {
    pub fn new(config: &StrategyConfig, settings: DeribitSettings) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GatewayError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            host: config.host().trim_end_matches('/').to_string(),
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
            settings,
            rate_limiter,
        })
    }

    pub fn settings(&self) -> &DeribitSettings {
        &self.settings
    }

    /// Send a JSON-RPC request, retrying throttling, server and network
    /// errors when `retry` is set.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: Option<&AccessToken>,
        retry: bool,
    ) -> Result<T, GatewayError> {
        let url = format!("{}/{}", self.host, method);
        let max_attempts = if retry {
            self.settings.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            self.rate_limiter.until_ready().await;

            let mut request = self.client.get(&url).query(params);
            if let Some(token) = token {
                request = request.bearer_auth(token.as_str());
            }

            let retryable = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await?;

                    if status.is_success() {
                        return decode_envelope(method, &body);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        GatewayError::RequestFailed(format!("{} returned {}", method, status))
                    } else {
                        // Deribit reports rejected requests as 4xx with an error envelope
                        return match serde_json::from_str::<RpcResponse<serde_json::Value>>(&body) {
                            Ok(RpcResponse {
                                error: Some(error), ..
                            }) => Err(GatewayError::Exchange {
                                code: error.code,
                                message: error.message,
                            }),
                            _ => Err(GatewayError::RequestFailed(format!(
                                "{} returned {}: {}",
                                method, status, body
                            ))),
                        };
                    }
                }
                Err(e) => GatewayError::from(e),
            };

            if attempt >= max_attempts {
                return Err(retryable);
            }

            let delay = self.settings.retry.delay_after(attempt);
            tracing::warn!(
                "Deribit {} failed: {}, retrying in {:?} (attempt {}/{})",
                method,
                retryable,
                delay,
                attempt,
                max_attempts
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Authenticate, then call a private method with the fresh token
    async fn private_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
        retry: bool,
    ) -> Result<T, GatewayError> {
        let token = self
            .authenticate(&self.client_id, &self.client_secret)
            .await?;
        self.call(method, params, Some(&token), retry).await
    }
}

fn decode_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, GatewayError> {
    let envelope: RpcResponse<T> = serde_json::from_str(body)
        .map_err(|e| GatewayError::InvalidResponse(format!("{}: {}", method, e)))?;

    if let Some(error) = envelope.error {
        return Err(GatewayError::Exchange {
            code: error.code,
            message: error.message,
        });
    }

    envelope
        .result
        .ok_or_else(|| GatewayError::InvalidResponse(format!("{}: missing result", method)))
}

#[async_trait]
impl ExchangeGateway for DeribitClient {
    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AccessToken, GatewayError> {
        let params = [
            ("grant_type", "client_credentials".to_string()),
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
            ("scope", AUTH_SCOPE.to_string()),
        ];

        let auth: AuthResult = self.call("public/auth", &params, None, true).await?;
        Ok(AccessToken::new(auth.access_token))
    }

    async fn get_mark_price(&self, instrument: &str) -> Result<f64, GatewayError> {
        let params = [
            ("instrument_name", instrument.to_string()),
            ("depth", "1".to_string()),
        ];

        let book: OrderBook = self
            .call("public/get_order_book", &params, None, true)
            .await?;

        if !book.mark_price.is_finite() || book.mark_price <= 0.0 {
            return Err(GatewayError::InvalidResponse(format!(
                "mark price for {} is {}",
                instrument, book.mark_price
            )));
        }

        tracing::debug!(instrument = %instrument, mark_price = %book.mark_price, "Fetched mark price");

        Ok(book.mark_price)
    }

    async fn place_order(
        &self,
        side: Side,
        instrument: &str,
        price: f64,
    ) -> Result<OrderPlacement, GatewayError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(GatewayError::RequestFailed(format!(
                "refusing to place {} order at price {}",
                side, price
            )));
        }

        let method = match side {
            Side::Buy => "private/buy",
            Side::Sell => "private/sell",
        };

        let params = [
            ("instrument_name", instrument.to_string()),
            ("amount", self.settings.amount.to_string()),
            ("type", "limit".to_string()),
            ("label", self.settings.label.clone()),
            ("price", price.to_string()),
            ("time_in_force", "good_til_cancelled".to_string()),
            ("post_only", "true".to_string()),
            ("reduce_only", "false".to_string()),
        ];

        // Placement is not idempotent: a retried request could double the order
        let placed: PlaceOrderResult = self.private_call(method, &params, false).await?;
        let order = placed.order;

        Ok(OrderPlacement {
            price: order.numeric_price(),
            order_id: order.order_id,
            side: order.direction,
            amount: order.amount,
            state: order.order_state,
        })
    }

    async fn cancel_all_orders(&self, instrument: &str) -> Result<(), GatewayError> {
        let params = [("instrument_name", instrument.to_string())];

        let cancelled: u64 = self
            .private_call("private/cancel_all_by_instrument", &params, true)
            .await?;

        tracing::debug!(instrument = %instrument, cancelled, "Cancelled open orders");

        Ok(())
    }

    async fn has_open_orders(&self, instrument: &str) -> Result<bool, GatewayError> {
        let params = [
            ("instrument_name", instrument.to_string()),
            ("type", "all".to_string()),
        ];

        let orders: Vec<RawOrder> = self
            .private_call("private/get_open_orders_by_instrument", &params, true)
            .await?;

        Ok(!orders.is_empty())
    }

    async fn order_history(&self, instrument: &str) -> Result<Vec<OrderRecord>, GatewayError> {
        let params = [
            ("instrument_name", instrument.to_string()),
            ("count", HISTORY_PAGE_SIZE.to_string()),
            ("offset", "0".to_string()),
            ("include_old", "true".to_string()),
            ("include_unfilled", "true".to_string()),
        ];

        let orders: Vec<RawOrder> = self
            .private_call("private/get_order_history_by_instrument", &params, true)
            .await?;

        Ok(orders.into_iter().map(OrderRecord::from).collect())
    }
}
