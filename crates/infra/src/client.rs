//! Ports to the external inventory-and-trading service, and their HTTP
//! implementation.
//!
//! The request side is plain JSON over HTTP. The event feed is a streaming
//! HTTP response carrying newline-delimited JSON: one `FeedEvent` per line,
//! delivered in id order starting strictly after the requested checkpoint.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use itemvault_core::{AssetId, EventId, ItemId, OwnerId};
use itemvault_ledger::{FeedEvent, TradePayload};

/// External-service call failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode service response: {0}")]
    Decode(String),
}

/// An asset in a user's platform inventory, before deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryAsset {
    pub id: AssetId,
    pub name: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub inspect_link: Option<String>,
    #[serde(default)]
    pub tradable: bool,
    #[serde(default)]
    pub priced_value: Option<Decimal>,
}

/// A trade as reported by the service's listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    #[serde(flatten)]
    pub trade: TradePayload,
}

/// Filter for the trade listing endpoint.
#[derive(Debug, Clone, Copy)]
pub struct TradeFilter {
    pub owner: OwnerId,
    pub descending: bool,
}

/// Request operations on the external service.
#[async_trait]
pub trait TradingClient: Send + Sync {
    async fn load_inventory(&self, owner: OwnerId) -> Result<Vec<InventoryAsset>, ClientError>;

    async fn create_deposit(
        &self,
        trade_link: &str,
        asset_ids: &[AssetId],
    ) -> Result<(), ClientError>;

    async fn create_withdrawal(
        &self,
        trade_link: &str,
        item_ids: &[ItemId],
    ) -> Result<(), ClientError>;

    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>, ClientError>;
}

/// Ordered event stream yielded by [`EventFeed::open_stream`].
pub type EventStream = BoxStream<'static, Result<FeedEvent, ClientError>>;

/// The service's ordered event feed.
///
/// `open_stream(after)` delivers every event with id strictly greater than
/// `after`, then continues live until the connection drops.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn open_stream(&self, after: EventId) -> Result<EventStream, ClientError>;
}

#[async_trait]
impl<C> TradingClient for Arc<C>
where
    C: TradingClient + ?Sized,
{
    async fn load_inventory(&self, owner: OwnerId) -> Result<Vec<InventoryAsset>, ClientError> {
        (**self).load_inventory(owner).await
    }

    async fn create_deposit(
        &self,
        trade_link: &str,
        asset_ids: &[AssetId],
    ) -> Result<(), ClientError> {
        (**self).create_deposit(trade_link, asset_ids).await
    }

    async fn create_withdrawal(
        &self,
        trade_link: &str,
        item_ids: &[ItemId],
    ) -> Result<(), ClientError> {
        (**self).create_withdrawal(trade_link, item_ids).await
    }

    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>, ClientError> {
        (**self).list_trades(filter).await
    }
}

#[async_trait]
impl<F> EventFeed for Arc<F>
where
    F: EventFeed + ?Sized,
{
    async fn open_stream(&self, after: EventId) -> Result<EventStream, ClientError> {
        (**self).open_stream(after).await
    }
}

/// Service responses arrive wrapped in a `response` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Serialize)]
struct CreateDepositRequest<'a> {
    trade_link: &'a str,
    asset_ids: &'a [AssetId],
}

#[derive(Debug, Serialize)]
struct CreateWithdrawalRequest<'a> {
    trade_link: &'a str,
    item_ids: &'a [ItemId],
}

/// HTTP implementation of both [`TradingClient`] and [`EventFeed`].
#[derive(Debug, Clone)]
pub struct HttpTradingService {
    http: reqwest::Client,
    service_url: String,
    feed_url: String,
    api_key: String,
}

impl HttpTradingService {
    pub fn new(service_url: String, feed_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            service_url,
            feed_url,
            api_key,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.service_url, path))
            .header("x-api-key", &self.api_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.service_url, path))
            .header("x-api-key", &self.api_key)
    }
}

async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

#[async_trait]
impl TradingClient for HttpTradingService {
    async fn load_inventory(&self, owner: OwnerId) -> Result<Vec<InventoryAsset>, ClientError> {
        let resp = checked(self.get(&format!("/inventory/{owner}")).send().await?).await?;
        let envelope: Envelope<Vec<InventoryAsset>> = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(envelope.response)
    }

    async fn create_deposit(
        &self,
        trade_link: &str,
        asset_ids: &[AssetId],
    ) -> Result<(), ClientError> {
        let body = CreateDepositRequest {
            trade_link,
            asset_ids,
        };
        checked(self.post("/deposits").json(&body).send().await?).await?;
        Ok(())
    }

    async fn create_withdrawal(
        &self,
        trade_link: &str,
        item_ids: &[ItemId],
    ) -> Result<(), ClientError> {
        let body = CreateWithdrawalRequest {
            trade_link,
            item_ids,
        };
        checked(self.post("/withdrawals").json(&body).send().await?).await?;
        Ok(())
    }

    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>, ClientError> {
        let sort = if filter.descending { "desc" } else { "asc" };
        let resp = checked(
            self.get("/trades")
                .query(&[
                    ("owner", filter.owner.to_string()),
                    ("sort", sort.to_string()),
                ])
                .send()
                .await?,
        )
        .await?;
        let envelope: Envelope<Vec<TradeRecord>> = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(envelope.response)
    }
}

#[async_trait]
impl EventFeed for HttpTradingService {
    async fn open_stream(&self, after: EventId) -> Result<EventStream, ClientError> {
        let resp = self
            .http
            .get(self.feed_url.as_str())
            .query(&[("after_id", after.to_string())])
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let resp = checked(resp).await?;

        info!(after = %after, "event feed opened");

        let body = resp.bytes_stream().boxed();
        let lines = futures_util::stream::try_unfold(
            (body, Vec::<u8>::new()),
            |(mut body, mut buf)| async move {
                loop {
                    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let mut line: Vec<u8> = buf.drain(..=pos).collect();
                        line.pop();
                        if line.last() == Some(&b'\r') {
                            line.pop();
                        }
                        if line.is_empty() {
                            continue;
                        }
                        let event: FeedEvent = serde_json::from_slice(&line)
                            .map_err(|e| ClientError::Decode(e.to_string()))?;
                        return Ok(Some((event, (body, buf))));
                    }

                    match body.next().await {
                        Some(chunk) => buf.extend_from_slice(&chunk?),
                        // Remote closed the stream; a partial trailing line
                        // is discarded and re-sent after reconnect.
                        None => return Ok(None),
                    }
                }
            },
        );

        Ok(lines.boxed())
    }
}
