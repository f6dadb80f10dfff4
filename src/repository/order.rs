use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::OrderError;
use crate::model::{Delivery, Item, Order, Payment};
use crate::service::OrderStore;

use async_trait::async_trait;

// ============================================================================
// Order Repository - durable multi-table persistence
// ============================================================================
//
// The aggregate spans four tables: orders (header), deliveries, payments
// and items. Writes happen inside one transaction so readers only ever see
// the aggregate fully present or fully absent. Reads reconstruct it with a
// header+delivery+payment join followed by an items query, merged in
// memory.
//
// create_order is deliberately not idempotent: a redelivered uid trips the
// header primary key and is classified as OrderError::Duplicate so the
// consumer's ack policy can drop it instead of requeueing forever.
//
// ============================================================================

const SELECT_AGGREGATE: &str = "
    SELECT
        o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature, o.customer_id,
        o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
        d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
        p.transaction_uid, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
        p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    JOIN deliveries d ON o.order_uid = d.order_uid
    JOIN payments p ON o.order_uid = p.transaction_uid
";

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_header(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_delivery(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&order.order_uid)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_payment(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO payments (
                transaction_uid, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_item(
        tx: &mut Transaction<'_, Postgres>,
        order_uid: &str,
        item: &Item,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO items (
                order_uid, chrt_id, track_number, price, rid, name,
                sale, size, total_price, nm_id, brand, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(order_uid)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn fetch_items(&self, uid: &str) -> Result<Vec<Item>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT chrt_id, track_number, price, rid, name, sale, size,
                    total_price, nm_id, brand, status
             FROM items
             WHERE order_uid = $1",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    /// Persist the whole aggregate in one transaction. Any single insert
    /// failure rolls everything back; the aggregate is never partially
    /// visible to readers.
    async fn create_order(&self, order: &Order) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await.map_err(OrderError::Storage)?;

        Self::insert_header(&mut tx, order)
            .await
            .map_err(|err| classify_insert_error(&order.order_uid, err))?;
        Self::insert_delivery(&mut tx, order)
            .await
            .map_err(OrderError::Storage)?;
        Self::insert_payment(&mut tx, order)
            .await
            .map_err(|err| classify_insert_error(&order.order_uid, err))?;
        for item in &order.items {
            Self::insert_item(&mut tx, &order.order_uid, item)
                .await
                .map_err(OrderError::Storage)?;
        }

        tx.commit().await.map_err(OrderError::Storage)?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "order aggregate committed"
        );
        Ok(())
    }

    /// Reconstruct one aggregate: header join first, items second. The two
    /// queries are not snapshot-isolated against a concurrent create of the
    /// same uid, which is fine under the create-once model.
    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, OrderError> {
        let query = format!("{SELECT_AGGREGATE} WHERE o.order_uid = $1");

        let row = sqlx::query(&query)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(OrderError::Storage)?;

        let Some(row) = row else {
            return Err(OrderError::NotFound);
        };

        let mut order = order_from_row(&row).map_err(OrderError::Storage)?;
        order.items = self.fetch_items(uid).await.map_err(OrderError::Storage)?;

        Ok(order)
    }

    /// Full scan for startup cache hydration: every aggregate header in one
    /// join, every item for the found uid set in a second query, grouped
    /// under the owning order in memory. Cost scales linearly with stored
    /// orders; only acceptable while the dataset stays bounded.
    async fn get_all_orders(&self) -> Result<Vec<Order>, OrderError> {
        let rows = sqlx::query(SELECT_AGGREGATE)
            .fetch_all(&self.pool)
            .await
            .map_err(OrderError::Storage)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(order_from_row(row).map_err(OrderError::Storage)?);
        }

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let uids: Vec<String> = orders.iter().map(|o| o.order_uid.clone()).collect();
        let item_rows = sqlx::query(
            "SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size,
                    total_price, nm_id, brand, status
             FROM items
             WHERE order_uid = ANY($1)",
        )
        .bind(&uids)
        .fetch_all(&self.pool)
        .await
        .map_err(OrderError::Storage)?;

        let mut items = Vec::with_capacity(item_rows.len());
        for row in &item_rows {
            let owner: String = row.try_get("order_uid").map_err(OrderError::Storage)?;
            items.push((owner, item_from_row(row).map_err(OrderError::Storage)?));
        }

        Ok(group_items(orders, items))
    }
}

/// Attach each item to its owning aggregate by uid. Items whose owner is
/// not in the header set are dropped silently; the join already decided
/// they are unreadable.
fn group_items(mut orders: Vec<Order>, items: Vec<(String, Item)>) -> Vec<Order> {
    let index: std::collections::HashMap<String, usize> = orders
        .iter()
        .enumerate()
        .map(|(i, o)| (o.order_uid.clone(), i))
        .collect();

    for (owner, item) in items {
        if let Some(&i) = index.get(&owner) {
            orders[i].items.push(item);
        }
    }

    orders
}

/// A unique violation on the header or payment primary key means the uid
/// was already persisted; everything else stays a generic storage error.
fn classify_insert_error(order_uid: &str, err: sqlx::Error) -> OrderError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return OrderError::Duplicate(order_uid.to_string());
        }
    }
    OrderError::Storage(err)
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
        delivery: Delivery {
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            zip: row.try_get("zip")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
            region: row.try_get("region")?,
            email: row.try_get("email")?,
        },
        payment: Payment {
            transaction: row.try_get("transaction_uid")?,
            request_id: row.try_get("request_id")?,
            currency: row.try_get("currency")?,
            provider: row.try_get("provider")?,
            amount: row.try_get("amount")?,
            payment_dt: row.try_get("payment_dt")?,
            bank: row.try_get("bank")?,
            delivery_cost: row.try_get("delivery_cost")?,
            goods_total: row.try_get("goods_total")?,
            custom_fee: row.try_get("custom_fee")?,
        },
        items: Vec::new(),
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testdata::sample_order;

    fn order_with_uid(uid: &str) -> Order {
        let mut order = sample_order();
        order.order_uid = uid.to_string();
        order.items.clear();
        order
    }

    fn item_with_chrt(chrt_id: i64) -> Item {
        let mut item = sample_order().items.remove(0);
        item.chrt_id = chrt_id;
        item
    }

    #[test]
    fn group_items_attaches_items_to_their_owner() {
        let orders = vec![order_with_uid("a"), order_with_uid("b")];
        let items = vec![
            ("a".to_string(), item_with_chrt(1)),
            ("b".to_string(), item_with_chrt(2)),
            ("a".to_string(), item_with_chrt(3)),
        ];

        let grouped = group_items(orders, items);

        let a = grouped.iter().find(|o| o.order_uid == "a").unwrap();
        let b = grouped.iter().find(|o| o.order_uid == "b").unwrap();
        assert_eq!(a.items.iter().map(|i| i.chrt_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(b.items.iter().map(|i| i.chrt_id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn group_items_drops_orphaned_items() {
        let orders = vec![order_with_uid("a")];
        let items = vec![("nobody".to_string(), item_with_chrt(7))];

        let grouped = group_items(orders, items);
        assert!(grouped[0].items.is_empty());
    }

    #[test]
    fn group_items_over_empty_input() {
        assert!(group_items(Vec::new(), Vec::new()).is_empty());
    }

    // Note: the transactional paths (create_order rollback on mid-aggregate
    // failure, duplicate classification from a real unique violation, the
    // join reconstruction in get_order_by_uid/get_all_orders) require a
    // running Postgres and belong to integration tests.
}
