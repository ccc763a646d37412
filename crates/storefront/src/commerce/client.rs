//! REST client for the commerce store API.
//!
//! Uses `reqwest` 0.13 for HTTP. Caches order lookups using `moka`
//! (5-minute TTL).

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{CartId, LineItemId, OrderId};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::cache::{OrderCache, order_cache};
use super::types::{
    AddLineItemRequest, Cart, CompleteCartResponse, CreateCartRequest, Customer, ErrorPayload,
    Metadata, Order, OrderList, PromoCodesRequest, StoreQuery, UpdateCartRequest,
    UpdateLineItemRequest,
};
use super::{CommerceApi, CommerceError};
use crate::config::SyncConfig;

// =============================================================================
// Response Envelopes
// =============================================================================

#[derive(Deserialize)]
struct CartEnvelope {
    cart: Cart,
}

#[derive(Deserialize)]
struct DeletedLineEnvelope {
    parent: Cart,
}

#[derive(Deserialize)]
struct OrderEnvelope {
    order: Order,
}

#[derive(Deserialize)]
struct CustomerEnvelope {
    customer: Customer,
}

#[derive(Deserialize)]
struct TokenEnvelope {
    token: String,
}

#[derive(serde::Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(serde::Serialize)]
struct CustomerMetadataRequest<'a> {
    metadata: &'a Metadata,
}

// =============================================================================
// CommerceClient
// =============================================================================

/// Client for the commerce store API.
///
/// Cheap to clone; all clones share one connection pool and order cache.
#[derive(Clone)]
pub struct CommerceClient {
    inner: Arc<CommerceClientInner>,
}

struct CommerceClientInner {
    client: reqwest::Client,
    base_url: Url,
    publishable_key: SecretString,
    orders: OrderCache,
}

impl CommerceClient {
    /// Create a new commerce client.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Http` if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self, CommerceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(CommerceClientInner {
                client,
                base_url: config.base_url.clone(),
                publishable_key: config.publishable_key.clone(),
                orders: order_cache(),
            }),
        })
    }

    /// Build an endpoint URL from path segments and query pairs.
    fn url(&self, segments: &[&str], query: &[(String, String)]) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> reqwest::RequestBuilder {
        let builder = self
            .inner
            .client
            .request(method, url)
            .header(
                "x-publishable-api-key",
                self.inner.publishable_key.expose_secret(),
            );
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the JSON body.
    ///
    /// `what` names the resource for `NotFound` errors.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, CommerceError> {
        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CommerceError::RateLimited(retry_after));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(CommerceError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(CommerceError::NotFound(what.to_string()));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Commerce API returned non-success status"
            );
            let payload = serde_json::from_str::<ErrorPayload>(&response_text).unwrap_or_else(
                |_| ErrorPayload {
                    message: response_text.chars().take(200).collect(),
                    ..ErrorPayload::default()
                },
            );
            return Err(CommerceError::Service {
                status: status.as_u16(),
                payload,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse commerce API response"
            );
            CommerceError::from(e)
        })
    }
}

#[async_trait]
impl CommerceApi for CommerceClient {
    #[instrument(skip(self, request))]
    async fn create_cart(&self, request: &CreateCartRequest) -> Result<Cart, CommerceError> {
        let url = self.url(&["store", "carts"], &[]);
        let envelope: CartEnvelope = self
            .execute(self.request(Method::POST, url, None).json(request), "cart")
            .await?;
        debug!(cart_id = %envelope.cart.id, "Created cart");
        Ok(envelope.cart)
    }

    #[instrument(skip(self, query), fields(cart_id = %id))]
    async fn retrieve_cart(&self, id: &CartId, query: &StoreQuery) -> Result<Cart, CommerceError> {
        let url = self.url(&["store", "carts", id.as_str()], &query.pairs());
        let envelope: CartEnvelope = self
            .execute(self.request(Method::GET, url, None), &format!("cart {id}"))
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self, request), fields(cart_id = %id))]
    async fn update_cart(
        &self,
        id: &CartId,
        request: &UpdateCartRequest,
    ) -> Result<Cart, CommerceError> {
        let url = self.url(&["store", "carts", id.as_str()], &[]);
        let envelope: CartEnvelope = self
            .execute(
                self.request(Method::POST, url, None).json(request),
                &format!("cart {id}"),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self, request), fields(cart_id = %id, variant_id = %request.variant_id))]
    async fn add_line_item(
        &self,
        id: &CartId,
        request: &AddLineItemRequest,
    ) -> Result<Cart, CommerceError> {
        let url = self.url(&["store", "carts", id.as_str(), "line-items"], &[]);
        let envelope: CartEnvelope = self
            .execute(
                self.request(Method::POST, url, None).json(request),
                &format!("cart {id}"),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self, request), fields(cart_id = %id, line_id = %line_id))]
    async fn update_line_item(
        &self,
        id: &CartId,
        line_id: &LineItemId,
        request: &UpdateLineItemRequest,
    ) -> Result<Cart, CommerceError> {
        let url = self.url(
            &["store", "carts", id.as_str(), "line-items", line_id.as_str()],
            &[],
        );
        let envelope: CartEnvelope = self
            .execute(
                self.request(Method::POST, url, None).json(request),
                &format!("line item {line_id}"),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self), fields(cart_id = %id, line_id = %line_id))]
    async fn delete_line_item(
        &self,
        id: &CartId,
        line_id: &LineItemId,
    ) -> Result<Cart, CommerceError> {
        let url = self.url(
            &["store", "carts", id.as_str(), "line-items", line_id.as_str()],
            &[],
        );
        let envelope: DeletedLineEnvelope = self
            .execute(
                self.request(Method::DELETE, url, None),
                &format!("line item {line_id}"),
            )
            .await?;
        Ok(envelope.parent)
    }

    #[instrument(skip(self), fields(cart_id = %id))]
    async fn add_promotions(&self, id: &CartId, codes: &[String]) -> Result<Cart, CommerceError> {
        let url = self.url(&["store", "carts", id.as_str(), "promotions"], &[]);
        let body = PromoCodesRequest {
            promo_codes: codes.to_vec(),
        };
        let envelope: CartEnvelope = self
            .execute(
                self.request(Method::POST, url, None).json(&body),
                &format!("cart {id}"),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self), fields(cart_id = %id))]
    async fn remove_promotions(
        &self,
        id: &CartId,
        codes: &[String],
    ) -> Result<Cart, CommerceError> {
        let url = self.url(&["store", "carts", id.as_str(), "promotions"], &[]);
        let body = PromoCodesRequest {
            promo_codes: codes.to_vec(),
        };
        let envelope: CartEnvelope = self
            .execute(
                self.request(Method::DELETE, url, None).json(&body),
                &format!("cart {id}"),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self, query), fields(cart_id = %id))]
    async fn complete_cart(
        &self,
        id: &CartId,
        query: &StoreQuery,
    ) -> Result<CompleteCartResponse, CommerceError> {
        let url = self.url(&["store", "carts", id.as_str(), "complete"], &query.pairs());
        let response: CompleteCartResponse = self
            .execute(self.request(Method::POST, url, None), &format!("cart {id}"))
            .await?;

        if let CompleteCartResponse::Order { order } = &response {
            debug!(order_id = %order.id, "Cart completed");
            self.inner
                .orders
                .insert(order.id.clone(), order.clone())
                .await;
        }
        Ok(response)
    }

    #[instrument(skip(self, token, query), fields(order_id = %id))]
    async fn retrieve_order(
        &self,
        id: &OrderId,
        token: Option<&str>,
        query: &StoreQuery,
    ) -> Result<Order, CommerceError> {
        if let Some(order) = self.inner.orders.get(id).await {
            debug!("Cache hit for order");
            return Ok(order);
        }

        let url = self.url(&["store", "orders", id.as_str()], &query.pairs());
        let envelope: OrderEnvelope = self
            .execute(self.request(Method::GET, url, token), &format!("order {id}"))
            .await?;

        self.inner
            .orders
            .insert(id.clone(), envelope.order.clone())
            .await;
        Ok(envelope.order)
    }

    #[instrument(skip(self, token))]
    async fn list_orders(
        &self,
        token: &str,
        limit: u32,
        offset: u32,
    ) -> Result<OrderList, CommerceError> {
        let query = [
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        let url = self.url(&["store", "orders"], &query);
        self.execute(self.request(Method::GET, url, Some(token)), "orders")
            .await
    }

    #[instrument(skip(self, token))]
    async fn current_customer(&self, token: &str) -> Result<Customer, CommerceError> {
        let url = self.url(&["store", "customers", "me"], &[]);
        let envelope: CustomerEnvelope = self
            .execute(self.request(Method::GET, url, Some(token)), "customer")
            .await?;
        Ok(envelope.customer)
    }

    #[instrument(skip(self, token, metadata))]
    async fn update_customer_metadata(
        &self,
        token: &str,
        metadata: &Metadata,
    ) -> Result<Customer, CommerceError> {
        let url = self.url(&["store", "customers", "me"], &[]);
        let body = CustomerMetadataRequest { metadata };
        let envelope: CustomerEnvelope = self
            .execute(
                self.request(Method::POST, url, Some(token)).json(&body),
                "customer",
            )
            .await?;
        Ok(envelope.customer)
    }

    #[instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<String, CommerceError> {
        let url = self.url(&["auth", "customer", "emailpass"], &[]);
        let body = LoginRequest { email, password };
        let envelope: TokenEnvelope = self
            .execute(self.request(Method::POST, url, None).json(&body), "account")
            .await?;
        Ok(envelope.token)
    }

    fn forget_cached_orders(&self) {
        debug!("Invalidating order cache");
        self.inner.orders.invalidate_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> CommerceClient {
        let config = SyncConfig::new(Url::parse(base).unwrap(), SecretString::from("pk_test"));
        CommerceClient::new(&config).unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let client = client("http://localhost:9000");
        let url = client.url(&["store", "carts", "cart_1", "line-items"], &[]);
        assert_eq!(url.as_str(), "http://localhost:9000/store/carts/cart_1/line-items");
    }

    #[test]
    fn test_url_keeps_base_path_and_adds_query() {
        let client = client("https://api.example.com/commerce/");
        let query = StoreQuery {
            region_id: Some("reg_in".into()),
            sales_channel_id: Some("sc_web".into()),
            extra: vec![],
        };
        let url = client.url(&["store", "carts", "cart_1"], &query.pairs());
        assert_eq!(
            url.as_str(),
            "https://api.example.com/commerce/store/carts/cart_1?region_id=reg_in&sales_channel_id=sc_web"
        );
    }

    #[test]
    fn test_url_escapes_ids() {
        let client = client("http://localhost:9000");
        let url = client.url(&["store", "orders", "order/../1"], &[]);
        assert_eq!(url.as_str(), "http://localhost:9000/store/orders/order%2F..%2F1");
    }
}
