//! Signed Binance spot REST client

use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, warn};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use super::errors::{ExchangeError, ExchangeResult};
use super::traits::SpotExchange;
use super::types::{AssetBalance, OpenOrder, OrderSide, OrderState};

type HmacSha256 = Hmac<Sha256>;

/// Default production endpoint
pub const BINANCE_API_URL: &str = "https://api.binance.com";

/// Authenticated Binance spot REST client
///
/// Signed requests carry a millisecond `timestamp` plus an HMAC-SHA256
/// `signature` over the query string, and authenticate via the
/// `X-MBX-APIKEY` header. The HTTP client enforces a fixed timeout so a hung
/// call can never stall a polling loop.
pub struct BinanceSpotClient {
    http: reqwest::Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BinanceSpotClient {
    /// Create a new client
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> ExchangeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: base_url.unwrap_or_else(|| BINANCE_API_URL.to_string()),
        })
    }

    /// HMAC-SHA256 over the query string, hex-encoded
    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Execute a signed request and decode the JSON body
    async fn signed_request<T>(
        &self,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> ExchangeResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = Self::build_query(&params);
        let signature = self.sign(&query);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        );

        debug!("{} {}", method, path);

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Self::decode_response(response).await
    }

    /// Execute an unsigned (public market data) request
    async fn public_request<T>(&self, path: &str, params: &[(&str, String)]) -> ExchangeResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = if params.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, Self::build_query(params))
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Self::decode_response(response).await
    }

    async fn decode_response<T>(response: reqwest::Response) -> ExchangeResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ExchangeError::Parse(e.to_string()));
        }

        // 429/418 carry the rate-limit and IP-ban signals
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(ExchangeError::RateLimited);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) if err.code == -2013 => Err(ExchangeError::NotFound),
            Ok(err) => Err(ExchangeError::Api {
                code: err.code,
                reason: err.msg,
            }),
            Err(_) => Err(ExchangeError::Api {
                code: status.as_u16() as i64,
                reason: body,
            }),
        }
    }

    fn parse_price(raw: &str) -> ExchangeResult<f64> {
        raw.parse::<f64>()
            .map_err(|e| ExchangeError::Parse(format!("bad decimal '{raw}': {e}")))
    }
}

#[async_trait::async_trait]
impl SpotExchange for BinanceSpotClient {
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> ExchangeResult<u64> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format!("{quantity}")),
            ("price", format!("{price}")),
        ];

        let ack: OrderAck = self
            .signed_request(reqwest::Method::POST, "/api/v3/order", params)
            .await
            .map_err(|e| match e {
                // the order endpoint declining is a rejection, not a generic API error
                ExchangeError::Api { code, reason } => {
                    ExchangeError::OrderRejected { code, reason }
                }
                other => other,
            })?;

        Ok(ack.order_id)
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let params = vec![("symbol", symbol.to_string())];
        let orders: Vec<RestOrder> = self
            .signed_request(reqwest::Method::GET, "/api/v3/openOrders", params)
            .await?;

        orders.into_iter().map(RestOrder::into_open_order).collect()
    }

    async fn get_order_status(&self, symbol: &str, order_id: u64) -> ExchangeResult<OrderState> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        let order: RestOrder = self
            .signed_request(reqwest::Method::GET, "/api/v3/order", params)
            .await?;

        Ok(order.status)
    }

    async fn get_ticker_price(&self, symbol: &str) -> ExchangeResult<f64> {
        let params = [("symbol", symbol.to_string())];
        let ticker: TickerPrice = self.public_request("/api/v3/ticker/price", &params).await?;
        Self::parse_price(&ticker.price)
    }

    async fn get_account_balance(&self, asset: &str) -> ExchangeResult<AssetBalance> {
        let account: AccountInfo = self
            .signed_request(reqwest::Method::GET, "/api/v3/account", Vec::new())
            .await?;

        let Some(raw) = account.balances.into_iter().find(|b| b.asset == asset) else {
            warn!("Asset {} not present in account snapshot", asset);
            return Ok(AssetBalance::default());
        };

        Ok(AssetBalance {
            free: Self::parse_price(&raw.free)?,
            locked: Self::parse_price(&raw.locked)?,
        })
    }

    async fn redeem_savings(&self, product_id: &str, amount: f64) -> ExchangeResult<()> {
        let params = vec![
            ("productId", product_id.to_string()),
            ("amount", format!("{amount}")),
        ];
        let ack: RedeemAck = self
            .signed_request(
                reqwest::Method::POST,
                "/sapi/v1/simple-earn/flexible/redeem",
                params,
            )
            .await?;

        debug!("Redeem acknowledged: id={}", ack.redeem_id);
        Ok(())
    }

    async fn deposit_savings(&self, product_id: &str, amount: f64) -> ExchangeResult<()> {
        let params = vec![
            ("productId", product_id.to_string()),
            ("amount", format!("{amount}")),
        ];
        let ack: SubscribeAck = self
            .signed_request(
                reqwest::Method::POST,
                "/sapi/v1/simple-earn/flexible/subscribe",
                params,
            )
            .await?;

        debug!("Subscription acknowledged: id={}", ack.purchase_id);
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    #[serde(rename = "orderId")]
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct RestOrder {
    #[serde(rename = "orderId")]
    order_id: u64,
    status: OrderState,
    side: OrderSide,
    price: String,
}

impl RestOrder {
    fn into_open_order(self) -> ExchangeResult<OpenOrder> {
        let price = BinanceSpotClient::parse_price(&self.price)?;
        Ok(OpenOrder {
            order_id: self.order_id,
            status: self.status,
            side: self.side,
            price,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct RedeemAck {
    #[serde(rename = "redeemId")]
    redeem_id: u64,
}

#[derive(Debug, Deserialize)]
struct SubscribeAck {
    #[serde(rename = "purchaseId")]
    purchase_id: u64,
}
