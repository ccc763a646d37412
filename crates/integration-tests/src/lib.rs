//! End-to-end test support for Cartwheel.
//!
//! [`MockCommerce`] is an in-process commerce service built on `axum`. It
//! speaks the same store API as the real service closely enough to drive
//! the engine through the real `CommerceClient`: carts come back whole with
//! totals recomputed, unknown promotion codes are ignored with a `200`, and
//! completing a cart without a shipping address answers with the cart and
//! an error instead of an order.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let mock = MockCommerce::start().await;
//! mock.add_code("VALID10", 100);
//! let (storefront, storage) = mock.storefront();
//! storefront.cart().ensure_cart().await?;
//! assert_eq!(mock.calls("create_cart"), 1);
//! ```

#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cartwheel_core::{CartId, CurrencyCode, LineItemId, OrderId, OrderStatus, PromotionId};
use cartwheel_storefront::commerce::{
    Cart, CartAddress, Customer, LineItem, Metadata, Order, OrderLineItem, Promotion,
};
use cartwheel_storefront::storage::MemoryStorage;
use cartwheel_storefront::{Storefront, SyncConfig};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// Publishable key the mock accepts.
pub const PUBLISHABLE_KEY: &str = "pk_test_cartwheel";

/// Unit price of every mock variant.
pub const UNIT_PRICE: i64 = 500;

/// Retry delay used by storefronts built from the mock.
pub const IDENTITY_RETRY_DELAY: Duration = Duration::from_millis(20);

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Deserialize)]
struct CreateCartBody {
    region_id: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct UpdateCartBody {
    email: Option<String>,
    shipping_address: Option<CartAddress>,
    billing_address: Option<CartAddress>,
}

#[derive(Deserialize)]
struct AddLineBody {
    variant_id: String,
    quantity: u32,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct UpdateLineBody {
    quantity: u32,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct PromoBody {
    promo_codes: Vec<String>,
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct CustomerBody {
    metadata: Option<Metadata>,
}

// =============================================================================
// State
// =============================================================================

struct Forced {
    status: StatusCode,
    message: String,
}

struct Account {
    password: String,
    customer: Customer,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    delay: Option<Duration>,
    carts: HashMap<String, Cart>,
    discounts: HashMap<String, Decimal>,
    orders: HashMap<String, (Order, Option<String>)>,
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    calls: HashMap<&'static str, usize>,
    queries: HashMap<&'static str, Vec<String>>,
    forced: HashMap<&'static str, VecDeque<Forced>>,
}

impl Inner {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    fn email_for(&self, headers: &HeaderMap) -> Option<String> {
        let token = headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.tokens.get(token).cloned()
    }
}

type Shared = Arc<Mutex<Inner>>;

fn lock(state: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error(status: StatusCode, kind: &str, message: &str) -> Response {
    let mut response = (status, Json(json!({ "type": kind, "message": message }))).into_response();
    if status == StatusCode::TOO_MANY_REQUESTS {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, header::HeaderValue::from_static("3"));
    }
    response
}

fn not_found(what: &str) -> Response {
    error(StatusCode::NOT_FOUND, "not_found", &format!("{what} was not found"))
}

fn unauthorized() -> Response {
    error(StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized")
}

/// Count the call, apply the delay, check the key, and pop forced failures.
async fn enter(state: &Shared, route: &'static str, headers: &HeaderMap) -> Result<(), Response> {
    let delay = {
        let mut inner = lock(state);
        *inner.calls.entry(route).or_default() += 1;
        inner.delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let key = headers
        .get("x-publishable-api-key")
        .and_then(|v| v.to_str().ok());
    if key != Some(PUBLISHABLE_KEY) {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "not_allowed",
            "A valid publishable key is required",
        ));
    }

    let forced = lock(state)
        .forced
        .get_mut(route)
        .and_then(VecDeque::pop_front);
    match forced {
        Some(f) => Err(error(f.status, "forced", &f.message)),
        None => Ok(()),
    }
}

fn empty_cart(id: String) -> Cart {
    Cart {
        id: CartId::new(id),
        email: None,
        currency_code: CurrencyCode::Inr,
        region_id: None,
        items: Vec::new(),
        shipping_address: None,
        billing_address: None,
        promotions: Vec::new(),
        subtotal: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        shipping_total: Decimal::ZERO,
        discount_total: Decimal::ZERO,
        total: Decimal::ZERO,
        completed_at: None,
        metadata: None,
    }
}

fn recompute(cart: &mut Cart, discounts: &HashMap<String, Decimal>) {
    for item in &mut cart.items {
        item.subtotal = item.unit_price * Decimal::from(item.quantity);
        item.total = item.subtotal;
    }
    cart.subtotal = cart.items.iter().map(|i| i.subtotal).sum();
    cart.discount_total = cart
        .promotion_codes()
        .iter()
        .filter_map(|code| discounts.get(&code.to_ascii_uppercase()))
        .copied()
        .sum::<Decimal>()
        .min(cart.subtotal);
    cart.total = cart.subtotal - cart.discount_total + cart.shipping_total + cart.tax_total;
}

/// Run `change` on a stored cart and answer with the whole cart.
fn with_cart(
    state: &Shared,
    id: &str,
    change: impl FnOnce(&mut Cart, &mut u64) -> Result<(), Response>,
) -> Result<Cart, Response> {
    let mut inner = lock(state);
    let Inner {
        carts,
        discounts,
        next_id,
        ..
    } = &mut *inner;
    let cart = carts.get_mut(id).ok_or_else(|| not_found("Cart"))?;
    if cart.completed_at.is_some() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "not_allowed",
            "Cart is already completed",
        ));
    }
    change(cart, next_id)?;
    recompute(cart, discounts);
    Ok(cart.clone())
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CreateCartBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "create_cart", &headers).await?;
    let mut inner = lock(&state);
    let id = inner.next("cart");
    let mut cart = empty_cart(id.clone());
    cart.email = body.email;
    cart.region_id = body.region_id.map(Into::into);
    inner.carts.insert(id, cart.clone());
    Ok(Json(json!({ "cart": cart })))
}

async fn retrieve_cart(
    State(state): State<Shared>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    enter(&state, "retrieve_cart", &headers).await?;
    lock(&state)
        .queries
        .entry("retrieve_cart")
        .or_default()
        .push(query.unwrap_or_default());
    let cart = lock(&state)
        .carts
        .get(&id)
        .cloned()
        .ok_or_else(|| not_found("Cart"))?;
    Ok(Json(json!({ "cart": cart })))
}

async fn update_cart(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateCartBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "update_cart", &headers).await?;
    let cart = with_cart(&state, &id, |cart, _| {
        if let Some(email) = body.email {
            cart.email = Some(email);
        }
        if let Some(address) = body.shipping_address {
            cart.shipping_address = Some(address);
        }
        if let Some(address) = body.billing_address {
            cart.billing_address = Some(address);
        }
        Ok(())
    })?;
    Ok(Json(json!({ "cart": cart })))
}

async fn add_line_item(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddLineBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "add_line_item", &headers).await?;
    if body.quantity == 0 {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "invalid_data",
            "Quantity must be at least 1",
        ));
    }
    let cart = with_cart(&state, &id, |cart, next_id| {
        if let Some(existing) = cart
            .items
            .iter_mut()
            .find(|i| i.variant_id.as_ref().map(|v| v.as_str()) == Some(body.variant_id.as_str()))
        {
            existing.quantity += body.quantity;
        } else {
            *next_id += 1;
            cart.items.push(LineItem {
                id: LineItemId::new(format!("cali_{next_id}")),
                variant_id: Some(body.variant_id.as_str().into()),
                product_id: None,
                title: format!("Product {}", body.variant_id),
                variant_title: None,
                thumbnail: None,
                quantity: body.quantity,
                unit_price: Decimal::new(UNIT_PRICE, 0),
                subtotal: Decimal::ZERO,
                total: Decimal::ZERO,
                metadata: body.metadata,
            });
        }
        Ok(())
    })?;
    Ok(Json(json!({ "cart": cart })))
}

async fn update_line_item(
    State(state): State<Shared>,
    Path((id, line_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<UpdateLineBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "update_line_item", &headers).await?;
    let cart = with_cart(&state, &id, |cart, _| {
        let item = cart
            .items
            .iter_mut()
            .find(|i| i.id.as_str() == line_id)
            .ok_or_else(|| not_found("Line item"))?;
        item.quantity = body.quantity;
        if body.metadata.is_some() {
            item.metadata = body.metadata;
        }
        Ok(())
    })?;
    Ok(Json(json!({ "cart": cart })))
}

async fn delete_line_item(
    State(state): State<Shared>,
    Path((id, line_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    enter(&state, "delete_line_item", &headers).await?;
    let cart = with_cart(&state, &id, |cart, _| {
        cart.items.retain(|i| i.id.as_str() != line_id);
        Ok(())
    })?;
    Ok(Json(json!({
        "id": line_id,
        "object": "line-item",
        "deleted": true,
        "parent": cart,
    })))
}

async fn add_promotions(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PromoBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "add_promotions", &headers).await?;
    let known: Vec<String> = {
        let inner = lock(&state);
        body.promo_codes
            .into_iter()
            .filter(|c| inner.discounts.contains_key(&c.to_ascii_uppercase()))
            .collect()
    };
    let cart = with_cart(&state, &id, |cart, _| {
        for code in known {
            if !cart.promotion_codes().iter().any(|c| c.eq_ignore_ascii_case(&code)) {
                cart.promotions.push(Promotion {
                    id: Some(PromotionId::new(format!("promo_{code}"))),
                    code: Some(code),
                    is_automatic: false,
                });
            }
        }
        Ok(())
    })?;
    Ok(Json(json!({ "cart": cart })))
}

async fn remove_promotions(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PromoBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "remove_promotions", &headers).await?;
    let cart = with_cart(&state, &id, |cart, _| {
        cart.promotions.retain(|p| {
            !p.code.as_ref().is_some_and(|c| {
                body.promo_codes.iter().any(|r| r.eq_ignore_ascii_case(c))
            })
        });
        Ok(())
    })?;
    Ok(Json(json!({ "cart": cart })))
}

async fn complete_cart(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    enter(&state, "complete_cart", &headers).await?;
    let owner = lock(&state).email_for(&headers);
    let mut inner = lock(&state);
    let cart = inner
        .carts
        .get(&id)
        .cloned()
        .ok_or_else(|| not_found("Cart"))?;

    if cart.shipping_address.is_none() {
        return Ok(Json(json!({
            "type": "cart",
            "cart": cart,
            "error": {
                "type": "invalid_data",
                "message": "Shipping address is required"
            }
        })));
    }

    let order_id = inner.next("order");
    let display_id = i64::try_from(inner.next_id).unwrap_or_default();
    let now = chrono::Utc::now();
    if let Some(stored) = inner.carts.get_mut(&id) {
        stored.completed_at = Some(now);
    }
    let order = Order {
        id: OrderId::new(order_id.clone()),
        display_id: Some(display_id),
        status: OrderStatus::Pending,
        fulfillment_status: None,
        payment_status: None,
        email: cart.email.clone(),
        currency_code: cart.currency_code,
        items: cart
            .items
            .iter()
            .map(|i| OrderLineItem {
                id: i.id.clone(),
                title: Some(i.title.clone()),
                variant_title: i.variant_title.clone(),
                thumbnail: i.thumbnail.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
                total: i.total,
            })
            .collect(),
        shipping_address: cart.shipping_address.clone(),
        billing_address: cart.billing_address.clone(),
        fulfillments: Vec::new(),
        payment_collections: Vec::new(),
        subtotal: cart.subtotal,
        tax_total: cart.tax_total,
        shipping_total: cart.shipping_total,
        discount_total: cart.discount_total,
        total: cart.total,
        created_at: Some(now),
    };
    inner.orders.insert(order_id, (order.clone(), owner));
    Ok(Json(json!({ "type": "order", "order": order })))
}

async fn retrieve_order(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    enter(&state, "retrieve_order", &headers).await?;
    let order = lock(&state)
        .orders
        .get(&id)
        .map(|(order, _)| order.clone())
        .ok_or_else(|| not_found("Order"))?;
    Ok(Json(json!({ "order": order })))
}

async fn list_orders(
    State(state): State<Shared>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    enter(&state, "list_orders", &headers).await?;
    let inner = lock(&state);
    let email = inner.email_for(&headers).ok_or_else(unauthorized)?;

    let params: HashMap<String, String> = query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
    let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);

    let mut mine: Vec<&Order> = inner
        .orders
        .values()
        .filter(|(_, owner)| owner.as_deref() == Some(email.as_str()))
        .map(|(order, _)| order)
        .collect();
    mine.sort_by(|a, b| b.display_id.cmp(&a.display_id));
    let count = mine.len();
    let page: Vec<&Order> = mine.into_iter().skip(offset).take(limit).collect();

    Ok(Json(json!({
        "orders": page,
        "count": count,
        "offset": offset,
        "limit": limit,
    })))
}

async fn current_customer(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    enter(&state, "current_customer", &headers).await?;
    let inner = lock(&state);
    let email = inner.email_for(&headers).ok_or_else(unauthorized)?;
    let account = inner.accounts.get(&email).ok_or_else(unauthorized)?;
    Ok(Json(json!({ "customer": account.customer })))
}

async fn update_customer(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CustomerBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "update_customer", &headers).await?;
    let mut inner = lock(&state);
    let email = inner.email_for(&headers).ok_or_else(unauthorized)?;
    let account = inner.accounts.get_mut(&email).ok_or_else(unauthorized)?;
    if let Some(metadata) = body.metadata {
        let merged = account.customer.metadata.get_or_insert_with(Metadata::new);
        for (key, value) in metadata {
            merged.insert(key, value);
        }
    }
    Ok(Json(json!({ "customer": account.customer })))
}

async fn login(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Json<Value>, Response> {
    enter(&state, "login", &headers).await?;
    let mut inner = lock(&state);
    let valid = inner
        .accounts
        .get(&body.email)
        .is_some_and(|a| a.password == body.password);
    if !valid {
        return Err(unauthorized());
    }
    let token = inner.next("tok");
    inner.tokens.insert(token.clone(), body.email);
    Ok(Json(json!({ "token": token })))
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/store/carts", post(create_cart))
        .route("/store/carts/{id}", get(retrieve_cart).post(update_cart))
        .route("/store/carts/{id}/line-items", post(add_line_item))
        .route(
            "/store/carts/{id}/line-items/{line_id}",
            post(update_line_item).delete(delete_line_item),
        )
        .route(
            "/store/carts/{id}/promotions",
            post(add_promotions).delete(remove_promotions),
        )
        .route("/store/carts/{id}/complete", post(complete_cart))
        .route("/store/orders", get(list_orders))
        .route("/store/orders/{id}", get(retrieve_order))
        .route(
            "/store/customers/me",
            get(current_customer).post(update_customer),
        )
        .route("/auth/customer/emailpass", post(login))
        .with_state(state)
}

// =============================================================================
// MockCommerce
// =============================================================================

/// A running mock commerce service. Stops when dropped.
pub struct MockCommerce {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockCommerce {
    /// Start the service on an ephemeral local port.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(Inner::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock commerce service");
        let addr = listener
            .local_addr()
            .expect("Mock commerce service has no address");
        let app = router(Arc::clone(&state));
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL of the service.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("Mock address is a valid URL")
    }

    /// Engine configuration pointing at this service.
    #[must_use]
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(
            self.base_url(),
            SecretString::from(PUBLISHABLE_KEY.to_string()),
        );
        config.identity_retry_delay = IDENTITY_RETRY_DELAY;
        config
    }

    /// A storefront over fresh in-memory client storage.
    #[must_use]
    pub fn storefront(&self) -> (Storefront, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let storefront = self.storefront_with(Arc::clone(&storage));
        (storefront, storage)
    }

    /// A storefront over existing client storage (a "second tab" or restart).
    #[must_use]
    pub fn storefront_with(&self, storage: Arc<MemoryStorage>) -> Storefront {
        Storefront::new(self.config(), storage).expect("Failed to build storefront")
    }

    /// Make every request take `delay`.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = Some(delay);
    }

    /// Accept `code` with a fixed `discount`.
    pub fn add_code(&self, code: &str, discount: i64) {
        lock(&self.state)
            .discounts
            .insert(code.to_ascii_uppercase(), Decimal::new(discount, 0));
    }

    /// Register an account.
    pub fn add_account(&self, email: &str, password: &str, customer: Customer) {
        lock(&self.state).accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                customer,
            },
        );
    }

    /// Store an order, optionally owned by `owner`'s account.
    pub fn insert_order(&self, order: Order, owner: Option<&str>) {
        lock(&self.state)
            .orders
            .insert(order.id.to_string(), (order, owner.map(str::to_string)));
    }

    /// Answer the next call to `route` with `status` and `message`.
    pub fn fail_next(&self, route: &'static str, status: StatusCode, message: &str) {
        lock(&self.state)
            .forced
            .entry(route)
            .or_default()
            .push_back(Forced {
                status,
                message: message.to_string(),
            });
    }

    /// Number of calls made to `route`.
    #[must_use]
    pub fn calls(&self, route: &str) -> usize {
        lock(&self.state).calls.get(route).copied().unwrap_or(0)
    }

    /// Total calls across all routes.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.values().sum()
    }

    /// Raw query strings received by `route`, in order.
    #[must_use]
    pub fn queries(&self, route: &str) -> Vec<String> {
        lock(&self.state)
            .queries
            .get(route)
            .cloned()
            .unwrap_or_default()
    }

    /// The service's copy of a cart.
    #[must_use]
    pub fn cart(&self, id: &CartId) -> Option<Cart> {
        lock(&self.state).carts.get(id.as_str()).cloned()
    }

    /// Number of carts created so far.
    #[must_use]
    pub fn cart_count(&self) -> usize {
        lock(&self.state).carts.len()
    }
}

impl Drop for MockCommerce {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A customer fixture.
#[must_use]
pub fn customer(id: &str, email: &str) -> Customer {
    serde_json::from_value(json!({
        "id": id,
        "email": email,
        "first_name": "Asha",
        "last_name": "Rao",
        "addresses": [{
            "id": "addr_home",
            "name": "Asha Rao",
            "street": "12 MG Road",
            "landmark": "Metro station",
            "city": "Bengaluru",
            "state": "Karnataka",
            "pincode": "560001",
            "phone": "+91 98450 00000",
            "type": "home"
        }]
    }))
    .expect("Customer fixture is valid")
}

/// An order fixture with the given statuses (as the service spells them).
#[must_use]
pub fn order(id: &str, status: &str, fulfillment_status: Option<&str>) -> Order {
    serde_json::from_value(json!({
        "id": id,
        "display_id": 7,
        "status": status,
        "fulfillment_status": fulfillment_status,
        "currency_code": "inr",
        "created_at": "2026-03-01T10:00:00Z",
        "items": [{
            "id": "ordli_1",
            "title": "Pineapple Soap",
            "quantity": 1,
            "unit_price": "500",
            "total": "500"
        }],
        "subtotal": "500",
        "total": "500"
    }))
    .expect("Order fixture is valid")
}
