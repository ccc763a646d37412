//! In-memory `CommerceApi` for unit tests.
//!
//! Behaves like the real service where the engine cares: carts are returned
//! whole, totals are recomputed on every change, unknown promotion codes are
//! silently ignored with a `200`, and completing a cart without a shipping
//! address comes back as a cart with an error.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cartwheel_core::{CartId, CurrencyCode, CustomerId, LineItemId, OrderId, OrderStatus};
use rust_decimal::Decimal;

use super::types::{
    AddLineItemRequest, Cart, CartAddress, CompleteCartResponse, CreateCartRequest, Customer,
    ErrorPayload, LineItem, Metadata, Order, OrderLineItem, OrderList, Promotion, StoreQuery,
    UpdateCartRequest, UpdateLineItemRequest,
};
use super::{CommerceApi, CommerceError};

/// Unit price of every fake variant.
pub const UNIT_PRICE: i64 = 500;

/// Build a bare cart with the given `(line_id, quantity)` lines.
pub fn cart_with(id: &str, lines: &[(&str, u32)]) -> Cart {
    let mut cart = empty_cart(CartId::new(id));
    cart.items = lines
        .iter()
        .map(|(line_id, quantity)| line(LineItemId::new(*line_id), "variant_1", *quantity))
        .collect();
    recompute(&mut cart, &HashMap::new());
    cart
}

fn empty_cart(id: CartId) -> Cart {
    Cart {
        id,
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

fn line(id: LineItemId, variant: &str, quantity: u32) -> LineItem {
    LineItem {
        id,
        variant_id: Some(variant.into()),
        product_id: None,
        title: format!("Product {variant}"),
        variant_title: None,
        thumbnail: None,
        quantity,
        unit_price: Decimal::new(UNIT_PRICE, 0),
        subtotal: Decimal::ZERO,
        total: Decimal::ZERO,
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

#[derive(Default)]
struct FakeState {
    carts: HashMap<CartId, Cart>,
    next_id: u64,
    discounts: HashMap<String, Decimal>,
    customer: Option<Customer>,
    customer_results: VecDeque<Result<Customer, CommerceError>>,
    failures: VecDeque<CommerceError>,
    calls: HashMap<&'static str, usize>,
    order_cache_resets: usize,
}

/// Fake commerce service.
#[derive(Default)]
pub struct FakeCommerce {
    state: Mutex<FakeState>,
    delay: Option<Duration>,
}

impl FakeCommerce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take `delay` (lets concurrent callers overlap).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Accept `code` with a fixed `discount`.
    pub fn with_code(self, code: &str, discount: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .discounts
            .insert(code.to_ascii_uppercase(), Decimal::new(discount, 0));
        self
    }

    /// Serve `customer` from `/customers/me`.
    pub fn with_customer(self, customer: Customer) -> Self {
        self.state.lock().unwrap().customer = Some(customer);
        self
    }

    /// Queue a one-off result for the next profile fetch.
    pub fn push_customer_result(&self, result: Result<Customer, CommerceError>) {
        self.state.lock().unwrap().customer_results.push_back(result);
    }

    /// Fail the next call (of any kind) with `error`.
    pub fn fail_next(&self, error: CommerceError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Total calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    /// Times the session asked for cached orders to be dropped.
    pub fn order_cache_resets(&self) -> usize {
        self.state.lock().unwrap().order_cache_resets
    }

    /// The server's copy of a cart.
    pub fn server_cart(&self, id: &CartId) -> Option<Cart> {
        self.state.lock().unwrap().carts.get(id).cloned()
    }

    /// Seed a cart directly.
    pub fn insert_cart(&self, cart: Cart) {
        self.state.lock().unwrap().carts.insert(cart.id.clone(), cart);
    }

    async fn enter(&self, operation: &'static str) -> Result<(), CommerceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_default() += 1;
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_cart(
        &self,
        id: &CartId,
        mutate: impl FnOnce(&mut Cart, &mut u64) -> Result<(), CommerceError>,
    ) -> Result<Cart, CommerceError> {
        let mut state = self.state.lock().unwrap();
        let FakeState {
            carts,
            next_id,
            discounts,
            ..
        } = &mut *state;
        let cart = carts
            .get_mut(id)
            .ok_or_else(|| CommerceError::NotFound(format!("cart {id}")))?;
        mutate(cart, next_id)?;
        recompute(cart, discounts);
        Ok(cart.clone())
    }
}

fn to_cart_address(payload: &crate::cart::address::AddressPayload) -> CartAddress {
    CartAddress {
        first_name: Some(payload.first_name.clone()),
        last_name: payload.last_name.clone(),
        company: payload.company.clone(),
        address_1: Some(payload.address_1.clone()),
        address_2: payload.address_2.clone(),
        city: Some(payload.city.clone()),
        province: payload.province.clone(),
        postal_code: Some(payload.postal_code.clone()),
        country_code: Some(payload.country_code.clone()),
        phone: payload.phone.clone(),
        metadata: Some(payload.metadata.clone()),
    }
}

#[async_trait]
impl CommerceApi for FakeCommerce {
    async fn create_cart(&self, request: &CreateCartRequest) -> Result<Cart, CommerceError> {
        self.enter("create_cart").await?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut cart = empty_cart(CartId::new(format!("cart_{}", state.next_id)));
        cart.email.clone_from(&request.email);
        cart.region_id.clone_from(&request.region_id);
        state.carts.insert(cart.id.clone(), cart.clone());
        Ok(cart)
    }

    async fn retrieve_cart(&self, id: &CartId, _query: &StoreQuery) -> Result<Cart, CommerceError> {
        self.enter("retrieve_cart").await?;
        self.with_cart(id, |_, _| Ok(()))
    }

    async fn update_cart(
        &self,
        id: &CartId,
        request: &UpdateCartRequest,
    ) -> Result<Cart, CommerceError> {
        self.enter("update_cart").await?;
        self.with_cart(id, |cart, _| {
            if let Some(email) = &request.email {
                cart.email = Some(email.clone());
            }
            if let Some(address) = &request.shipping_address {
                cart.shipping_address = Some(to_cart_address(address));
            }
            if let Some(address) = &request.billing_address {
                cart.billing_address = Some(to_cart_address(address));
            }
            Ok(())
        })
    }

    async fn add_line_item(
        &self,
        id: &CartId,
        request: &AddLineItemRequest,
    ) -> Result<Cart, CommerceError> {
        self.enter("add_line_item").await?;
        self.with_cart(id, |cart, next_id| {
            if let Some(existing) = cart
                .items
                .iter_mut()
                .find(|i| i.variant_id.as_ref() == Some(&request.variant_id))
            {
                existing.quantity += request.quantity;
            } else {
                *next_id += 1;
                let mut item = line(
                    LineItemId::new(format!("cali_{next_id}")),
                    request.variant_id.as_str(),
                    request.quantity,
                );
                item.metadata.clone_from(&request.metadata);
                cart.items.push(item);
            }
            Ok(())
        })
    }

    async fn update_line_item(
        &self,
        id: &CartId,
        line_id: &LineItemId,
        request: &UpdateLineItemRequest,
    ) -> Result<Cart, CommerceError> {
        self.enter("update_line_item").await?;
        self.with_cart(id, |cart, _| {
            let item = cart
                .items
                .iter_mut()
                .find(|i| &i.id == line_id)
                .ok_or_else(|| CommerceError::NotFound(format!("line item {line_id}")))?;
            item.quantity = request.quantity;
            if request.metadata.is_some() {
                item.metadata.clone_from(&request.metadata);
            }
            Ok(())
        })
    }

    async fn delete_line_item(
        &self,
        id: &CartId,
        line_id: &LineItemId,
    ) -> Result<Cart, CommerceError> {
        self.enter("delete_line_item").await?;
        self.with_cart(id, |cart, _| {
            cart.items.retain(|i| &i.id != line_id);
            Ok(())
        })
    }

    async fn add_promotions(&self, id: &CartId, codes: &[String]) -> Result<Cart, CommerceError> {
        self.enter("add_promotions").await?;
        let known: Vec<String> = {
            let state = self.state.lock().unwrap();
            codes
                .iter()
                .filter(|c| state.discounts.contains_key(&c.to_ascii_uppercase()))
                .cloned()
                .collect()
        };
        self.with_cart(id, |cart, _| {
            for code in known {
                if !cart.promotion_codes().iter().any(|c| c.eq_ignore_ascii_case(&code)) {
                    cart.promotions.push(Promotion {
                        id: Some(format!("promo_{code}").into()),
                        code: Some(code),
                        is_automatic: false,
                    });
                }
            }
            Ok(())
        })
    }

    async fn remove_promotions(
        &self,
        id: &CartId,
        codes: &[String],
    ) -> Result<Cart, CommerceError> {
        self.enter("remove_promotions").await?;
        self.with_cart(id, |cart, _| {
            cart.promotions.retain(|p| {
                !p.code
                    .as_ref()
                    .is_some_and(|c| codes.iter().any(|r| r.eq_ignore_ascii_case(c)))
            });
            Ok(())
        })
    }

    async fn complete_cart(
        &self,
        id: &CartId,
        _query: &StoreQuery,
    ) -> Result<CompleteCartResponse, CommerceError> {
        self.enter("complete_cart").await?;
        let mut state = self.state.lock().unwrap();
        let cart = state
            .carts
            .get(id)
            .cloned()
            .ok_or_else(|| CommerceError::NotFound(format!("cart {id}")))?;

        if cart.shipping_address.is_none() {
            return Ok(CompleteCartResponse::Cart {
                cart,
                error: Some(ErrorPayload {
                    kind: Some("invalid_data".to_string()),
                    code: None,
                    message: "Shipping address is required".to_string(),
                }),
            });
        }

        state.next_id += 1;
        if let Some(stored) = state.carts.get_mut(id) {
            stored.completed_at = Some(chrono::Utc::now());
        }
        let order = Order {
            id: OrderId::new(format!("order_{}", state.next_id)),
            display_id: i64::try_from(state.next_id).ok(),
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
            created_at: Some(chrono::Utc::now()),
        };
        Ok(CompleteCartResponse::Order { order })
    }

    async fn retrieve_order(
        &self,
        id: &OrderId,
        _token: Option<&str>,
        _query: &StoreQuery,
    ) -> Result<Order, CommerceError> {
        self.enter("retrieve_order").await?;
        Err(CommerceError::NotFound(format!("order {id}")))
    }

    async fn list_orders(
        &self,
        _token: &str,
        limit: u32,
        offset: u32,
    ) -> Result<OrderList, CommerceError> {
        self.enter("list_orders").await?;
        Ok(OrderList {
            orders: Vec::new(),
            count: 0,
            offset: offset.into(),
            limit: limit.into(),
        })
    }

    async fn current_customer(&self, token: &str) -> Result<Customer, CommerceError> {
        self.enter("current_customer").await?;
        let mut state = self.state.lock().unwrap();
        if let Some(result) = state.customer_results.pop_front() {
            return result;
        }
        match &state.customer {
            Some(customer) if token != "expired" => Ok(customer.clone()),
            _ => Err(CommerceError::Unauthorized),
        }
    }

    async fn update_customer_metadata(
        &self,
        _token: &str,
        metadata: &Metadata,
    ) -> Result<Customer, CommerceError> {
        self.enter("update_customer_metadata").await?;
        let mut state = self.state.lock().unwrap();
        let customer = state.customer.as_mut().ok_or(CommerceError::Unauthorized)?;
        let merged = customer.metadata.get_or_insert_with(Metadata::new);
        for (key, value) in metadata {
            merged.insert(key.clone(), value.clone());
        }
        Ok(customer.clone())
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, CommerceError> {
        self.enter("login").await?;
        if password == "correct-horse" {
            Ok(format!("token-for-{email}"))
        } else {
            Err(CommerceError::Unauthorized)
        }
    }

    fn forget_cached_orders(&self) {
        self.state.lock().unwrap().order_cache_resets += 1;
    }
}

/// A customer fixture.
pub fn customer(id: &str) -> Customer {
    Customer {
        id: CustomerId::new(id),
        email: Some(format!("{id}@example.com")),
        first_name: Some("Asha".to_string()),
        last_name: Some("Rao".to_string()),
        phone: None,
        addresses: Vec::new(),
        metadata: None,
    }
}
