//! Promotion codes against a service that answers `200` for unknown codes.

#![allow(clippy::unwrap_used)]

use cartwheel_core::RequestStatus;
use cartwheel_integration_tests::MockCommerce;
use cartwheel_storefront::SyncError;
use cartwheel_storefront::cart::{LineItemInput, Notice};
use rust_decimal::Decimal;

async fn cart_with_item(mock: &MockCommerce) -> cartwheel_storefront::Storefront {
    let (storefront, _storage) = mock.storefront();
    storefront
        .cart()
        .add_line_item(None, LineItemInput::new("variant_shirt").with_quantity(2))
        .await
        .unwrap();
    storefront
}

#[tokio::test]
async fn test_valid_code_is_applied() {
    let mock = MockCommerce::start().await;
    mock.add_code("VALID10", 100);
    let storefront = cart_with_item(&mock).await;
    let mut notices = storefront.cart().subscribe_notices();

    let cart = storefront
        .cart()
        .apply_promotion_code(None, "  VALID10 ")
        .await
        .unwrap();

    assert_eq!(cart.promotion_codes(), vec!["VALID10".to_string()]);
    assert_eq!(cart.discount_total, Decimal::new(100, 0));
    assert_eq!(cart.total, Decimal::new(900, 0));
    assert_eq!(storefront.cart().store().status(), RequestStatus::Succeeded);
    assert!(matches!(
        notices.try_recv().unwrap(),
        Notice::Success(message) if message.contains("VALID10")
    ));
}

#[tokio::test]
async fn test_unknown_code_is_rejected_despite_success_status() {
    let mock = MockCommerce::start().await;
    mock.add_code("VALID10", 100);
    let storefront = cart_with_item(&mock).await;
    let mut notices = storefront.cart().subscribe_notices();

    let err = storefront
        .cart()
        .apply_promotion_code(None, "GARBAGE")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::InvalidOrIneligibleCoupon { ref code } if code == "GARBAGE"
    ));
    assert_eq!(mock.calls("add_promotions"), 1);

    let state = storefront.cart().store().snapshot();
    assert_eq!(state.status, RequestStatus::Failed);
    assert!(state.cart.unwrap().promotions.is_empty());
    assert!(matches!(notices.try_recv().unwrap(), Notice::Error(_)));
}

#[tokio::test]
async fn test_reapplying_code_sends_nothing() {
    let mock = MockCommerce::start().await;
    mock.add_code("VALID10", 100);
    let storefront = cart_with_item(&mock).await;
    storefront
        .cart()
        .apply_promotion_code(None, "VALID10")
        .await
        .unwrap();

    let cart = storefront
        .cart()
        .apply_promotion_code(None, "valid10")
        .await
        .unwrap();

    assert_eq!(cart.promotion_codes(), vec!["VALID10".to_string()]);
    assert_eq!(mock.calls("add_promotions"), 1);
}

#[tokio::test]
async fn test_remove_code_restores_totals() {
    let mock = MockCommerce::start().await;
    mock.add_code("VALID10", 100);
    let storefront = cart_with_item(&mock).await;
    storefront
        .cart()
        .apply_promotion_code(None, "VALID10")
        .await
        .unwrap();

    let cart = storefront
        .cart()
        .remove_promotion_code(None, "VALID10")
        .await
        .unwrap();

    assert!(cart.promotions.is_empty());
    assert_eq!(cart.discount_total, Decimal::ZERO);
    assert_eq!(cart.total, Decimal::new(1000, 0));
}

#[tokio::test]
async fn test_blank_code_makes_no_request() {
    let mock = MockCommerce::start().await;
    let storefront = cart_with_item(&mock).await;

    let err = storefront
        .cart()
        .apply_promotion_code(None, "   ")
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidOrIneligibleCoupon { .. }));
    assert_eq!(mock.calls("add_promotions"), 0);
}
