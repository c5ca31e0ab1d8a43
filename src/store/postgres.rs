//! PostgreSQL Booking Store
//!
//! A unit of work is one `sqlx::Transaction`. Double booking is prevented by
//! `lock_rooms`: the room rows are locked `FOR UPDATE` before the overlap
//! check, so two units booking the same room run check-then-insert one after
//! the other. Reconciliation locks the invoice and booking rows the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::{BookingStore, BookingTx, StoreError};
use crate::booking::types::{
    Booking, BookingId, BookingRoom, BookingServiceLine, BookingStatus, Invoice, InvoiceId,
    InvoiceStatus, NewBooking, NewInvoice, Occupants, Room, RoomId, ServiceId, ServiceItem,
    StayInterval, UserId,
};
use crate::money::Money;

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique violations become `Constraint`; everything else stays opaque.
fn map_db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && (db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation())
    {
        return StoreError::Constraint(db.message().to_string());
    }
    StoreError::Database(e)
}

fn parse_col<T: std::str::FromStr<Err = String>>(row: &PgRow, col: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(col)?;
    raw.parse().map_err(StoreError::Corrupt)
}

fn count_col(row: &PgRow, col: &str) -> Result<u32, StoreError> {
    let v: i32 = row.try_get(col)?;
    u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("{} is negative: {}", col, v)))
}

fn row_to_booking(row: &PgRow) -> Result<Booking, StoreError> {
    Ok(Booking {
        id: BookingId(row.try_get("b_id")?),
        user_id: UserId(row.try_get("b_user_id")?),
        interval: StayInterval {
            start: row.try_get("b_start_time")?,
            end: row.try_get("b_end_time")?,
        },
        occupants: Occupants {
            adults: count_col(row, "b_num_adults")?,
            children: count_col(row, "b_num_children")?,
        },
        status: parse_col(row, "b_status")?,
        created_at: row.try_get("b_created_at")?,
    })
}

fn row_to_invoice(row: &PgRow) -> Result<Invoice, StoreError> {
    Ok(Invoice {
        id: InvoiceId(row.try_get("i_id")?),
        invoice_code: row.try_get("i_invoice_code")?,
        booking_id: BookingId(row.try_get("i_booking_id")?),
        total_amount: Money::from_minor(row.try_get("i_total_amount")?),
        payment_method: parse_col(row, "i_payment_method")?,
        status: parse_col(row, "i_status")?,
        issued_date: row.try_get("i_issued_date")?,
        paid_date: row.try_get("i_paid_date")?,
        gateway_response_code: row.try_get("i_gateway_response_code")?,
    })
}

const BOOKING_COLUMNS: &str = r#"
    b.id AS b_id, b.user_id AS b_user_id, b.start_time AS b_start_time,
    b.end_time AS b_end_time, b.num_adults AS b_num_adults,
    b.num_children AS b_num_children, b.status AS b_status, b.created_at AS b_created_at
"#;

const INVOICE_COLUMNS: &str = r#"
    i.id AS i_id, i.invoice_code AS i_invoice_code, i.booking_id AS i_booking_id,
    i.total_amount AS i_total_amount, i.payment_method AS i_payment_method,
    i.status AS i_status, i.issued_date AS i_issued_date, i.paid_date AS i_paid_date,
    i.gateway_response_code AS i_gateway_response_code
"#;

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBookingTx { tx }))
    }

    async fn find_rooms(&self, ids: &[RoomId]) -> Result<Vec<Room>, StoreError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query("SELECT id, price FROM rooms WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| -> Result<Room, StoreError> {
                Ok(Room {
                    id: RoomId(r.try_get("id")?),
                    price: Money::from_minor(r.try_get("price")?),
                })
            })
            .collect()
    }

    async fn find_services(&self, ids: &[ServiceId]) -> Result<Vec<ServiceItem>, StoreError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query("SELECT id, price FROM services WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| -> Result<ServiceItem, StoreError> {
                Ok(ServiceItem {
                    id: ServiceId(r.try_get("id")?),
                    price: Money::from_minor(r.try_get("price")?),
                })
            })
            .collect()
    }

    async fn find_invoice(&self, invoice_code: &str) -> Result<Option<Invoice>, StoreError> {
        let sql = format!(
            "SELECT {} FROM invoices i WHERE i.invoice_code = $1",
            INVOICE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(invoice_code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_invoice).transpose()
    }
}

pub struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_rooms(&mut self, room_ids: &[RoomId]) -> Result<(), StoreError> {
        // Sorted lock order keeps two multi-room units from deadlocking
        let mut ids: Vec<i64> = room_ids.iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids.dedup();

        let locked: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM rooms WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(&ids)
                .fetch_all(&mut *self.tx)
                .await?;
        debug!(requested = ids.len(), locked = locked.len(), "Room rows locked");
        Ok(())
    }

    async fn count_overlapping(
        &mut self,
        room_id: RoomId,
        interval: &StayInterval,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM booking_rooms br
            JOIN bookings b ON b.id = br.booking_id
            WHERE br.room_id = $1
              AND b.status <> 'CANCELED'
              AND b.start_time < $3
              AND $2 < b.end_time
            "#,
        )
        .bind(room_id.0)
        .bind(interval.start)
        .bind(interval.end)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<Booking, StoreError> {
        let adults = i32::try_from(booking.occupants.adults)
            .map_err(|_| StoreError::Constraint("num_adults exceeds INTEGER range".into()))?;
        let children = i32::try_from(booking.occupants.children)
            .map_err(|_| StoreError::Constraint("num_children exceeds INTEGER range".into()))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bookings
                (user_id, start_time, end_time, num_adults, num_children, status, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(booking.user_id.0)
        .bind(booking.interval.start)
        .bind(booking.interval.end)
        .bind(adults)
        .bind(children)
        .bind(BookingStatus::Booked.as_str())
        .bind(booking.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(Booking {
            id: BookingId(id),
            user_id: booking.user_id,
            interval: booking.interval,
            occupants: booking.occupants,
            status: BookingStatus::Booked,
            created_at: booking.created_at,
        })
    }

    async fn insert_invoice(&mut self, invoice: &NewInvoice) -> Result<Invoice, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoices
                (invoice_code, booking_id, total_amount, payment_method, status, issued_date)
            VALUES
                ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&invoice.invoice_code)
        .bind(invoice.booking_id.0)
        .bind(invoice.total_amount.minor_units())
        .bind(invoice.payment_method.as_str())
        .bind(InvoiceStatus::Pending.as_str())
        .bind(invoice.issued_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(Invoice {
            id: InvoiceId(id),
            invoice_code: invoice.invoice_code.clone(),
            booking_id: invoice.booking_id,
            total_amount: invoice.total_amount,
            payment_method: invoice.payment_method,
            status: InvoiceStatus::Pending,
            issued_date: invoice.issued_date,
            paid_date: None,
            gateway_response_code: None,
        })
    }

    async fn insert_booking_rooms(&mut self, rows: &[BookingRoom]) -> Result<(), StoreError> {
        let booking_ids: Vec<i64> = rows.iter().map(|r| r.booking_id.0).collect();
        let room_ids: Vec<i64> = rows.iter().map(|r| r.room_id.0).collect();
        let prices: Vec<i64> = rows.iter().map(|r| r.price_at_booking.minor_units()).collect();

        sqlx::query(
            r#"
            INSERT INTO booking_rooms (booking_id, room_id, price_at_booking)
            SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[])
            "#,
        )
        .bind(&booking_ids)
        .bind(&room_ids)
        .bind(&prices)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_booking_services(
        &mut self,
        rows: &[BookingServiceLine],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let booking_ids: Vec<i64> = rows.iter().map(|r| r.booking_id.0).collect();
        let service_ids: Vec<i64> = rows.iter().map(|r| r.service_id.0).collect();
        let quantities: Vec<i32> = rows
            .iter()
            .map(|r| i32::try_from(r.quantity))
            .collect::<Result<_, _>>()
            .map_err(|_| StoreError::Constraint("quantity exceeds INTEGER range".into()))?;
        let prices: Vec<i64> = rows.iter().map(|r| r.price_at_booking.minor_units()).collect();

        sqlx::query(
            r#"
            INSERT INTO booking_services (booking_id, service_id, quantity, price_at_booking)
            SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::int[], $4::bigint[])
            "#,
        )
        .bind(&booking_ids)
        .bind(&service_ids)
        .bind(&quantities)
        .bind(&prices)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn lock_invoice(
        &mut self,
        invoice_code: &str,
    ) -> Result<Option<(Invoice, Booking)>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}, {}
            FROM invoices i
            JOIN bookings b ON b.id = i.booking_id
            WHERE i.invoice_code = $1
            FOR UPDATE OF i, b
            "#,
            INVOICE_COLUMNS, BOOKING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(invoice_code)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some((row_to_invoice(&row)?, row_to_booking(&row)?))),
            None => Ok(None),
        }
    }

    async fn booking_rooms(
        &mut self,
        booking_id: BookingId,
    ) -> Result<Vec<BookingRoom>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT booking_id, room_id, price_at_booking
            FROM booking_rooms
            WHERE booking_id = $1
            ORDER BY room_id
            "#,
        )
        .bind(booking_id.0)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|r| -> Result<BookingRoom, StoreError> {
                Ok(BookingRoom {
                    booking_id: BookingId(r.try_get("booking_id")?),
                    room_id: RoomId(r.try_get("room_id")?),
                    price_at_booking: Money::from_minor(r.try_get("price_at_booking")?),
                })
            })
            .collect()
    }

    async fn settle(
        &mut self,
        invoice_id: InvoiceId,
        booking_id: BookingId,
        invoice_status: InvoiceStatus,
        booking_status: BookingStatus,
        paid_date: Option<DateTime<Utc>>,
        response_code: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, paid_date = $2, gateway_response_code = $3
            WHERE id = $4 AND status = 'PENDING'
            "#,
        )
        .bind(invoice_status.as_str())
        .bind(paid_date)
        .bind(response_code)
        .bind(invoice_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1
            WHERE id = $2 AND status = 'BOOKED'
            "#,
        )
        .bind(booking_status.as_str())
        .bind(booking_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            // Caller rolls back; the invoice update above is discarded with it
            return Err(StoreError::Corrupt(format!(
                "pending invoice {} with booking {} not in BOOKED",
                invoice_id, booking_id
            )));
        }
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
