// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business and customer projections, written by the account collaborator.

use chrono::{DateTime, Utc};
use plaudit_core::PlauditError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{Business, Customer, format_ts};

/// Insert or refresh a business projection.
pub async fn upsert_business(
    db: &Database,
    business: &Business,
    now: DateTime<Utc>,
) -> Result<(), PlauditError> {
    let business = business.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO businesses (id, name, review_link, website, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    review_link = excluded.review_link,
                    website = excluded.website,
                    updated_at = excluded.updated_at",
                params![
                    business.id,
                    business.name,
                    business.review_link,
                    business.website,
                    format_ts(now),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or refresh a customer projection.
pub async fn upsert_customer(
    db: &Database,
    customer: &Customer,
    now: DateTime<Utc>,
) -> Result<(), PlauditError> {
    let customer = customer.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO customers (id, business_id, first_name, last_name, email, phone,
                                        created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    email = excluded.email,
                    phone = excluded.phone,
                    updated_at = excluded.updated_at",
                params![
                    customer.id,
                    customer.business_id,
                    customer.first_name,
                    customer.last_name,
                    customer.email,
                    customer.phone,
                    format_ts(now),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_business(db: &Database, id: &str) -> Result<Option<Business>, PlauditError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, name, review_link, website FROM businesses WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Business {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        review_link: row.get(2)?,
                        website: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_customer(db: &Database, id: &str) -> Result<Option<Customer>, PlauditError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, business_id, first_name, last_name, email, phone
                 FROM customers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        business_id: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        email: row.get(4)?,
                        phone: row.get(5)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
