//! # Citizen Model
//!
//! A citizen is identified by an opaque hashed token, never by raw personal
//! data. Rows are created lazily the first time an unknown token submits an
//! interaction or proposal, and are never deleted by this core.
//!
//! ## Idempotent Creation
//!
//! `get_or_create` uses `INSERT ... ON CONFLICT DO NOTHING` followed by a
//! re-fetch so a unique-constraint race between two first-time submissions
//! resolves to the single surviving row instead of aborting the enclosing
//! transaction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// A citizen row. `identity_hash` is the one-way hashed proxy for the
/// citizen's real-world identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Citizen {
    pub id: i64,
    pub identity_hash: String,
    pub city: String,
    pub inclusion_group: Option<String>,
    pub interest_themes: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// New citizen for creation (without generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCitizen {
    pub identity_hash: String,
    pub city: String,
    pub inclusion_group: Option<String>,
    pub interest_themes: serde_json::Value,
}

const CITIZEN_COLUMNS: &str =
    "id, identity_hash, city, inclusion_group, interest_themes, created_at, updated_at";

impl Citizen {
    pub async fn find_by_id(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Citizen>, sqlx::Error> {
        sqlx::query_as::<_, Citizen>(&format!(
            "SELECT {CITIZEN_COLUMNS} FROM citizens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn find_by_identity_hash(
        tx: &mut Transaction<'_, Postgres>,
        identity_hash: &str,
    ) -> Result<Option<Citizen>, sqlx::Error> {
        sqlx::query_as::<_, Citizen>(&format!(
            "SELECT {CITIZEN_COLUMNS} FROM citizens WHERE identity_hash = $1"
        ))
        .bind(identity_hash)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Fetch the citizen for an opaque token, creating the row on first
    /// reference. Safe under concurrent first-time submission: the insert
    /// backs off on conflict and the surviving row is re-fetched.
    pub async fn get_or_create(
        tx: &mut Transaction<'_, Postgres>,
        new_citizen: NewCitizen,
    ) -> Result<Citizen, sqlx::Error> {
        if let Some(existing) = Self::find_by_identity_hash(tx, &new_citizen.identity_hash).await? {
            return Ok(existing);
        }

        let inserted = sqlx::query_as::<_, Citizen>(&format!(
            r#"
            INSERT INTO citizens (identity_hash, city, inclusion_group, interest_themes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (identity_hash) DO NOTHING
            RETURNING {CITIZEN_COLUMNS}
            "#
        ))
        .bind(&new_citizen.identity_hash)
        .bind(&new_citizen.city)
        .bind(&new_citizen.inclusion_group)
        .bind(&new_citizen.interest_themes)
        .fetch_optional(&mut **tx)
        .await?;

        match inserted {
            Some(citizen) => {
                tracing::info!(
                    citizen_id = citizen.id,
                    city = %citizen.city,
                    "Created new citizen"
                );
                Ok(citizen)
            }
            // Another writer won the race; the row exists now.
            None => Self::find_by_identity_hash(tx, &new_citizen.identity_hash)
                .await?
                .ok_or(sqlx::Error::RowNotFound),
        }
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM citizens")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
