//! Integration tests for checkout and fulfillment against the in-memory store.

use common::{FulfillmentStatus, Money, PaymentStatus, ProductId, UserId, VariantId};
use domain::{
    CheckoutService, FulfillmentService, LineItemRequest, OrderError, RecordingNotifier, Role,
};
use store::{
    CartLine, Customer, CustomerDirectory, InMemoryStore, InventoryLedger, Product,
    ShippingAddress, Variant,
};

struct TestHarness {
    store: InMemoryStore,
    notifier: RecordingNotifier,
    checkout: CheckoutService<InMemoryStore, RecordingNotifier>,
    fulfillment: FulfillmentService<InMemoryStore, RecordingNotifier>,
    customer: UserId,
}

impl TestHarness {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        let notifier = RecordingNotifier::new();
        let customer = UserId::new();
        store
            .insert_customer(Customer {
                id: customer,
                name: "Meera Iyer".to_string(),
                email: "meera@example.com".to_string(),
                phone: Some("9876543210".to_string()),
            })
            .await;

        Self {
            checkout: CheckoutService::new(store.clone(), notifier.clone()),
            fulfillment: FulfillmentService::new(store.clone(), notifier.clone()),
            store,
            notifier,
            customer,
        }
    }

    async fn add_product(&self, name: &str, base_cents: i64) -> ProductId {
        let id = ProductId::new();
        self.store
            .insert_product(Product {
                id,
                name: name.to_string(),
                base_price: Money::from_cents(base_cents),
                base_sale_price: None,
            })
            .await;
        id
    }

    async fn add_variant(
        &self,
        product_id: ProductId,
        price: i64,
        sale: Option<i64>,
        stock: u32,
    ) -> VariantId {
        let id = VariantId::new();
        self.store
            .insert_variant(Variant {
                id,
                product_id,
                price: Money::from_cents(price),
                sale_price: sale.map(Money::from_cents),
                stock,
                size: Some("M".to_string()),
                color: Some("Indigo".to_string()),
                material: Some("Cotton".to_string()),
            })
            .await;
        id
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        street: "4 Park Street".to_string(),
        city: "Kolkata".to_string(),
        state: "WB".to_string(),
        zip: "700016".to_string(),
        country: "IN".to_string(),
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn reserves_stock_and_creates_pending_order() {
        let h = TestHarness::new().await;
        let product = h.add_product("Kurta", 3000).await;
        let variant = h.add_variant(product, 3000, None, 5).await;

        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 2)],
            )
            .await
            .unwrap();

        assert_eq!(h.store.stock_of(variant).await.unwrap(), Some(3));
        assert_eq!(order.status, FulfillmentStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.total, Money::from_cents(6000));
        assert_eq!(order.items[0].size.as_deref(), Some("M"));
        assert_eq!(order.shipping_address, address());

        let eta = order.estimated_delivery.unwrap() - order.created_at;
        assert_eq!(eta.num_days(), 5);

        assert_eq!(h.notifier.confirmations_for(order.id), 1);
    }

    #[tokio::test]
    async fn insufficient_stock_fails_whole_order() {
        let h = TestHarness::new().await;
        let shirt = h.add_product("Shirt", 2000).await;
        let shirt_m = h.add_variant(shirt, 2000, None, 8).await;
        let scarf = h.add_product("Scarf", 900).await;
        let scarf_red = h.add_variant(scarf, 900, None, 3).await;

        let err = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![
                    LineItemRequest::new(shirt, Some(shirt_m), 1),
                    LineItemRequest::new(scarf, Some(scarf_red), 10),
                ],
            )
            .await
            .unwrap_err();

        match err {
            OrderError::InsufficientStock {
                product_id,
                variant_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, scarf);
                assert_eq!(variant_id, Some(scarf_red));
                assert_eq!(requested, 10);
                assert_eq!(available, 3);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.store.stock_of(shirt_m).await.unwrap(), Some(8));
        assert_eq!(h.store.stock_of(scarf_red).await.unwrap(), Some(3));
        assert!(h.notifier.confirmations().is_empty());
    }

    #[tokio::test]
    async fn validation_reports_products_before_variants_before_stock() {
        let h = TestHarness::new().await;
        let product = h.add_product("Belt", 1500).await;
        let other = h.add_product("Wallet", 1500).await;
        let foreign_variant = h.add_variant(other, 1500, None, 0).await;
        let missing = ProductId::new();

        let err = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![
                    LineItemRequest::new(product, Some(foreign_variant), 1),
                    LineItemRequest::new(missing, None, 1),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ProductNotFound(id) if id == missing));

        let err = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(foreign_variant), 1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::VariantNotFound { variant_id, .. } if variant_id == foreign_variant
        ));
    }

    #[tokio::test]
    async fn rejects_empty_and_zero_quantity_orders() {
        let h = TestHarness::new().await;
        let product = h.add_product("Cap", 500).await;

        assert!(matches!(
            h.checkout.create_order(h.customer, address(), vec![]).await,
            Err(OrderError::EmptyOrder)
        ));
        assert!(matches!(
            h.checkout
                .create_order(h.customer, address(), vec![LineItemRequest::new(product, None, 0)])
                .await,
            Err(OrderError::InvalidQuantity { .. })
        ));
    }

    #[tokio::test]
    async fn total_overflow_is_rejected_without_reserving() {
        let h = TestHarness::new().await;
        let product = h.add_product("Heirloom Shawl", 1000).await;
        let variant = h.add_variant(product, i64::MAX / 2, None, 5).await;

        let err = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 3)],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::AmountOverflow));
        assert_eq!(err.reason(), "amount_overflow");
        assert_eq!(h.store.stock_of(variant).await.unwrap(), Some(5));
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn total_is_snapshot_of_prices_at_checkout() {
        let h = TestHarness::new().await;
        let product = h.add_product("Saree", 9000).await;
        let on_sale = h.add_variant(product, 10000, Some(8000), 4).await;
        let full_price = h.add_variant(product, 7000, Some(7500), 4).await;

        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![
                    LineItemRequest::new(product, Some(on_sale), 2),
                    LineItemRequest::new(product, Some(full_price), 1),
                ],
            )
            .await
            .unwrap();

        let item_sum: Money = order.items.iter().map(|i| i.line_total()).sum();
        assert_eq!(order.total, item_sum);
        assert_eq!(order.total, Money::from_cents(8000 * 2 + 7000));

        h.store
            .set_variant_price(on_sale, Money::from_cents(1), None)
            .await;
        let reloaded = h
            .checkout
            .get_order(h.customer, Role::Customer, order.id)
            .await
            .unwrap();
        assert_eq!(reloaded.total, Money::from_cents(23000));
        assert_eq!(reloaded.items[0].price, Money::from_cents(8000));
    }

    #[tokio::test]
    async fn product_without_variant_uses_base_price_and_summed_stock() {
        let h = TestHarness::new().await;
        let product = h.add_product("Dupatta", 1200).await;
        let small = h.add_variant(product, 1500, None, 1).await;
        let large = h.add_variant(product, 1500, None, 2).await;

        let order = h
            .checkout
            .create_order(h.customer, address(), vec![LineItemRequest::new(product, None, 3)])
            .await
            .unwrap();
        assert_eq!(order.total, Money::from_cents(3600));
        assert_eq!(order.items[0].variant_id, None);
        assert_eq!(h.store.stock_of(small).await.unwrap(), Some(1));
        assert_eq!(h.store.stock_of(large).await.unwrap(), Some(2));

        let err = h
            .checkout
            .create_order(h.customer, address(), vec![LineItemRequest::new(product, None, 4)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { available: 3, .. }));
    }

    #[tokio::test]
    async fn duplicate_lines_are_merged_before_stock_check() {
        let h = TestHarness::new().await;
        let product = h.add_product("Sock", 200).await;
        let variant = h.add_variant(product, 200, None, 3).await;

        let err = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![
                    LineItemRequest::new(product, Some(variant), 2),
                    LineItemRequest::new(product, Some(variant), 2),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { requested: 4, .. }));
        assert_eq!(h.store.stock_of(variant).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn checkout_cart_uses_and_clears_cart() {
        let h = TestHarness::new().await;
        let product = h.add_product("Jacket", 5000).await;
        let variant = h.add_variant(product, 5000, None, 2).await;
        h.store
            .add_to_cart(
                h.customer,
                CartLine {
                    product_id: product,
                    variant_id: Some(variant),
                    quantity: 1,
                },
            )
            .await;

        let order = h.checkout.checkout_cart(h.customer, address()).await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert!(h.store.cart_lines(h.customer).await.unwrap().is_empty());

        assert!(matches!(
            h.checkout.checkout_cart(h.customer, address()).await,
            Err(OrderError::EmptyOrder)
        ));
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_checkout() {
        let h = TestHarness::new().await;
        let product = h.add_product("Mat", 700).await;
        let variant = h.add_variant(product, 700, None, 1).await;
        h.notifier.set_fail(true);

        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 1)],
            )
            .await
            .unwrap();
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.notifier.confirmations_for(order.id), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_oversell() {
        let h = TestHarness::new().await;
        let product = h.add_product("Limited Print", 4000).await;
        let variant = h.add_variant(product, 4000, None, 5).await;

        let attempts = (0..20).map(|_| {
            let checkout = CheckoutService::new(h.store.clone(), h.notifier.clone());
            let customer = h.customer;
            tokio::spawn(async move {
                checkout
                    .create_order(
                        customer,
                        address(),
                        vec![LineItemRequest::new(product, Some(variant), 1)],
                    )
                    .await
            })
        });
        let results = futures_util::future::join_all(attempts).await;

        let (ok, err): (Vec<_>, Vec<_>) = results
            .into_iter()
            .map(|r| r.unwrap())
            .partition(|r| r.is_ok());
        assert_eq!(ok.len(), 5);
        assert_eq!(err.len(), 15);
        assert!(
            err.iter()
                .all(|r| matches!(r, Err(OrderError::InsufficientStock { .. })))
        );
        assert_eq!(h.store.stock_of(variant).await.unwrap(), Some(0));
        assert_eq!(h.store.order_count().await, 5);
    }
}

mod order_queries {
    use super::*;

    #[tokio::test]
    async fn only_owner_or_admin_can_read_order() {
        let h = TestHarness::new().await;
        let product = h.add_product("Lamp", 2500).await;
        let variant = h.add_variant(product, 2500, None, 3).await;
        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 1)],
            )
            .await
            .unwrap();

        let stranger = UserId::new();
        assert!(matches!(
            h.checkout.get_order(stranger, Role::Customer, order.id).await,
            Err(OrderError::AccessDenied(_))
        ));
        assert!(h.checkout.get_order(stranger, Role::Admin, order.id).await.is_ok());
        assert_eq!(h.checkout.list_orders(h.customer).await.unwrap().len(), 1);
        assert!(h.checkout.list_orders(stranger).await.unwrap().is_empty());
    }
}

mod fulfillment {
    use super::*;

    #[tokio::test]
    async fn admin_updates_status_and_owner_is_notified() {
        let h = TestHarness::new().await;
        let product = h.add_product("Vase", 1800).await;
        let variant = h.add_variant(product, 1800, None, 2).await;
        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 1)],
            )
            .await
            .unwrap();

        let updated = h
            .fulfillment
            .update_order_status(
                Role::Admin,
                order.id,
                FulfillmentStatus::Shipped,
                Some("AWB-5521".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, FulfillmentStatus::Shipped);
        assert_eq!(updated.tracking_number.as_deref(), Some("AWB-5521"));
        assert_eq!(updated.payment_status, PaymentStatus::Unpaid);

        let updates = h.notifier.status_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].new_status, FulfillmentStatus::Shipped);
        assert_eq!(updates[0].email, "meera@example.com");

        // Backwards moves are allowed.
        let reverted = h
            .fulfillment
            .update_order_status(Role::Admin, order.id, FulfillmentStatus::Pending, None)
            .await
            .unwrap();
        assert_eq!(reverted.status, FulfillmentStatus::Pending);
        assert_eq!(reverted.tracking_number.as_deref(), Some("AWB-5521"));
    }

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let h = TestHarness::new().await;
        let product = h.add_product("Rug", 6000).await;
        let variant = h.add_variant(product, 6000, None, 1).await;
        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 1)],
            )
            .await
            .unwrap();

        let err = h
            .fulfillment
            .update_order_status(Role::Customer, order.id, FulfillmentStatus::Delivered, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden));
        assert!(h.notifier.status_updates().is_empty());
    }

    #[tokio::test]
    async fn unknown_order_and_notifier_failure() {
        let h = TestHarness::new().await;
        assert!(matches!(
            h.fulfillment
                .update_order_status(
                    Role::Admin,
                    common::OrderId::new(),
                    FulfillmentStatus::Shipped,
                    None
                )
                .await,
            Err(OrderError::OrderNotFound(_))
        ));

        let product = h.add_product("Clock", 3200).await;
        let variant = h.add_variant(product, 3200, None, 1).await;
        let order = h
            .checkout
            .create_order(
                h.customer,
                address(),
                vec![LineItemRequest::new(product, Some(variant), 1)],
            )
            .await
            .unwrap();

        h.notifier.set_fail(true);
        let updated = h
            .fulfillment
            .update_order_status(Role::Admin, order.id, FulfillmentStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(updated.status, FulfillmentStatus::Cancelled);
        assert_eq!(h.store.stock_of(variant).await.unwrap(), Some(0));
    }
}
