use async_trait::async_trait;
use chrono::Utc;
use common::{
    FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, UserId, VariantId,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CartLine, CatalogReader, Customer, CustomerDirectory, InventoryLedger, NewOrder, Order,
    OrderItem, OrderStore, PaymentSessionRecord, PaymentSettlement, PlaceOrderOutcome, Product,
    Result, ShippingAddress, StoreError, Variant,
};

const ORDER_COLUMNS: &str = r#"
    id, user_id, status, payment_status, total_cents,
    shipping_street, shipping_city, shipping_state, shipping_zip, shipping_country,
    gateway_order_id, gateway_payment_id, payment_session_id, payment_method, gateway_response,
    tracking_number, estimated_delivery, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, variant_id, product_name, quantity, price_cents,
    size, color, material
"#;

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    #[tracing::instrument(skip(self))]
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Inserts or replaces a customer.
    pub async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or replaces a product.
    pub async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, base_price_cents, base_sale_price_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                base_price_cents = EXCLUDED.base_price_cents,
                base_sale_price_cents = EXCLUDED.base_sale_price_cents
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.base_price.cents())
        .bind(product.base_sale_price.map(|m| m.cents()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or replaces a variant.
    pub async fn insert_variant(&self, variant: &Variant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_variants
                (id, product_id, price_cents, sale_price_cents, stock, size, color, material)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                price_cents = EXCLUDED.price_cents,
                sale_price_cents = EXCLUDED.sale_price_cents,
                stock = EXCLUDED.stock,
                size = EXCLUDED.size,
                color = EXCLUDED.color,
                material = EXCLUDED.material
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(variant.price.cents())
        .bind(variant.sale_price.map(|m| m.cents()))
        .bind(i64::from(variant.stock))
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(&variant.material)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Appends a line to a customer's cart.
    pub async fn add_to_cart(&self, user_id: UserId, line: &CartLine) -> Result<()> {
        sqlx::query(
            "INSERT INTO cart_items (user_id, product_id, variant_id, quantity) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(line.variant_id.map(|v| v.as_uuid()))
        .bind(i64::from(line.quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Conditional decrement shared by the ledger and the checkout transaction.
    async fn reserve_on(
        conn: &mut PgConnection,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE product_variants SET stock = stock - $1 WHERE id = $2 AND stock >= $1",
        )
        .bind(i64::from(quantity))
        .bind(variant_id.as_uuid())
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<Vec<(Uuid, OrderItem)>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position ASC"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let order_id: Uuid = row.try_get("order_id")?;
                Ok((order_id, Self::row_to_item(&row)?))
            })
            .collect()
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        for (order_id, item) in self.load_items(&ids).await? {
            if let Some(order) = orders.iter_mut().find(|o| o.id.as_uuid() == order_id) {
                order.items.push(item);
            }
        }
        Ok(orders)
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            status: status
                .parse::<FulfillmentStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            payment_status: payment_status
                .parse::<PaymentStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            total: Money::from_cents(row.try_get("total_cents")?),
            shipping_address: ShippingAddress {
                street: row.try_get("shipping_street")?,
                city: row.try_get("shipping_city")?,
                state: row.try_get("shipping_state")?,
                zip: row.try_get("shipping_zip")?,
                country: row.try_get("shipping_country")?,
            },
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            payment_session_id: row.try_get("payment_session_id")?,
            payment_method: row.try_get("payment_method")?,
            gateway_response: row.try_get("gateway_response")?,
            tracking_number: row.try_get("tracking_number")?,
            estimated_delivery: row.try_get("estimated_delivery")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            items: Vec::new(),
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: row.try_get("id")?,
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            variant_id: row
                .try_get::<Option<Uuid>, _>("variant_id")?
                .map(VariantId::from_uuid),
            product_name: row.try_get("product_name")?,
            quantity: to_u32(row.try_get("quantity")?)?,
            price: Money::from_cents(row.try_get("price_cents")?),
            size: row.try_get("size")?,
            color: row.try_get("color")?,
            material: row.try_get("material")?,
        })
    }

    fn row_to_variant(row: &PgRow) -> Result<Variant> {
        Ok(Variant {
            id: VariantId::from_uuid(row.try_get("id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            price: Money::from_cents(row.try_get("price_cents")?),
            sale_price: row
                .try_get::<Option<i64>, _>("sale_price_cents")?
                .map(Money::from_cents),
            stock: to_u32(row.try_get("stock")?)?,
            size: row.try_get("size")?,
            color: row.try_get("color")?,
            material: row.try_get("material")?,
        })
    }
}

fn to_u32(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative quantity {value}")))
}

/// `jsonb || x` concatenates arrays when `x` is not an object.
fn audit_patch(detail: &serde_json::Value) -> serde_json::Value {
    if detail.is_object() {
        detail.clone()
    } else {
        serde_json::json!({})
    }
}

#[async_trait]
impl CatalogReader for PostgresStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, base_price_cents, base_sale_price_cents FROM products WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Product {
                id: ProductId::from_uuid(row.try_get("id")?),
                name: row.try_get("name")?,
                base_price: Money::from_cents(row.try_get("base_price_cents")?),
                base_sale_price: row
                    .try_get::<Option<i64>, _>("base_sale_price_cents")?
                    .map(Money::from_cents),
            })),
            None => Ok(None),
        }
    }

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<Variant>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, price_cents, sale_price_cents, stock, size, color, material
            FROM product_variants
            WHERE id = $1
            "#,
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_variant).transpose()
    }

    async fn variants_for_product(&self, product_id: ProductId) -> Result<Vec<Variant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, price_cents, sale_price_cents, stock, size, color, material
            FROM product_variants
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_variant).collect()
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn reserve(&self, variant_id: VariantId, quantity: u32) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::reserve_on(&mut conn, variant_id, quantity).await
    }

    async fn release(&self, variant_id: VariantId, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE product_variants SET stock = stock + $1 WHERE id = $2")
            .bind(i64::from(quantity))
            .bind(variant_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stock_of(&self, variant_id: VariantId) -> Result<Option<u32>> {
        let stock: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM product_variants WHERE id = $1")
                .bind(variant_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        stock.map(to_u32).transpose()
    }
}

#[async_trait]
impl CustomerDirectory for PostgresStore {
    async fn get_customer(&self, user_id: UserId) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT id, name, email, phone FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Customer {
                id: UserId::from_uuid(row.try_get("id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                phone: row.try_get("phone")?,
            })),
            None => Ok(None),
        }
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            "SELECT product_id, variant_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CartLine {
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    variant_id: row
                        .try_get::<Option<Uuid>, _>("variant_id")?
                        .map(VariantId::from_uuid),
                    quantity: to_u32(row.try_get("quantity")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(
        skip(self, order),
        fields(order_id = %order.id, items = order.items.len())
    )]
    async fn place_order(&self, order: NewOrder) -> Result<PlaceOrderOutcome> {
        // Rows are locked in variant id order so overlapping checkouts cannot deadlock
        let mut reservations: Vec<(VariantId, u32)> = order
            .items
            .iter()
            .filter_map(|item| item.variant_id.map(|v| (v, item.quantity)))
            .collect();
        reservations.sort_by_key(|(variant_id, _)| *variant_id);

        // Dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;

        for (variant_id, quantity) in reservations {
            if !Self::reserve_on(&mut tx, variant_id, quantity).await? {
                tx.rollback().await?;
                tracing::debug!(%variant_id, requested = quantity, "reservation refused");
                return Ok(PlaceOrderOutcome::OutOfStock {
                    variant_id,
                    requested: quantity,
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, status, payment_status, total_cents,
                shipping_street, shipping_city, shipping_state, shipping_zip, shipping_country,
                estimated_delivery, created_at, updated_at
            )
            VALUES ($1, $2, 'PENDING', 'UNPAID', $3, $4, $5, $6, $7, $8, $9, $10, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total.cents())
        .bind(&order.shipping_address.street)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.state)
        .bind(&order.shipping_address.zip)
        .bind(&order.shipping_address.country)
        .bind(order.estimated_delivery)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        let placed = order.into_order();
        for (position, item) in placed.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, variant_id, product_name, quantity, price_cents,
                    size, color, material, position
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id)
            .bind(placed.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.variant_id.map(|v| v.as_uuid()))
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.price.cents())
            .bind(&item.size)
            .bind(&item.color)
            .bind(&item.material)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(placed.user_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!("order persisted");
        Ok(PlaceOrderOutcome::Placed(placed))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn attach_payment_session(
        &self,
        order_id: OrderId,
        session: &PaymentSessionRecord,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET gateway_order_id = $2,
                payment_session_id = $3,
                payment_method = $4,
                gateway_response = gateway_response || jsonb_build_object('session', $5::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND gateway_order_id IS NULL AND payment_status <> 'COMPLETED'
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(&session.gateway_order_id)
        .bind(&session.payment_session_id)
        .bind(&session.payment_method)
        .bind(&session.response)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, settlement))]
    async fn complete_payment(
        &self,
        order_id: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<Option<PaymentStatus>> {
        // The locking CTE re-reads the latest row version after a concurrent
        // writer commits, so exactly one caller observes a non-completed order.
        let previous: Option<String> = sqlx::query_scalar(
            r#"
            WITH prev AS (
                SELECT id, payment_status FROM orders WHERE id = $1 FOR UPDATE
            )
            UPDATE orders o
            SET payment_status = 'COMPLETED',
                status = 'PROCESSING',
                gateway_payment_id = COALESCE($2, o.gateway_payment_id),
                gateway_response = o.gateway_response || $3::jsonb
                    || CASE WHEN prev.payment_status = 'FAILED'
                            THEN '{"late_success": true}'::jsonb
                            ELSE '{}'::jsonb END,
                updated_at = NOW()
            FROM prev
            WHERE o.id = prev.id AND prev.payment_status <> 'COMPLETED'
            RETURNING prev.payment_status
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(&settlement.gateway_payment_id)
        .bind(audit_patch(&settlement.detail))
        .fetch_optional(&self.pool)
        .await?;

        if previous.is_none() {
            tracing::debug!("payment already completed");
        }
        previous
            .map(|s| {
                s.parse::<PaymentStatus>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .transpose()
    }

    #[tracing::instrument(skip(self, settlement))]
    async fn fail_payment(
        &self,
        order_id: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'FAILED',
                gateway_payment_id = COALESCE($2, gateway_payment_id),
                gateway_response = gateway_response || $3::jsonb,
                updated_at = NOW()
            WHERE id = $1 AND payment_status = 'UNPAID'
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(&settlement.gateway_payment_id)
        .bind(audit_patch(&settlement.detail))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_payment_detail(
        &self,
        order_id: OrderId,
        detail: &serde_json::Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET gateway_response = gateway_response || $2::jsonb,
                updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'COMPLETED'
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(audit_patch(detail))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn update_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        tracking_number: Option<String>,
    ) -> Result<Option<Order>> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                tracking_number = COALESCE($3, tracking_number),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(status.as_str())
        .bind(tracking_number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_order(order_id).await
    }
}
