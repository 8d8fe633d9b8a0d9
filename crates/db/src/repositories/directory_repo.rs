//! Brand and user lookups.

use brandlens_core::types::DbId;
use sqlx::PgPool;

use crate::models::directory::{BrandRow, UserRow};

pub struct BrandRepo;

impl BrandRepo {
    pub async fn create(
        pool: &PgPool,
        owner_id: DbId,
        name: &str,
        domain: Option<&str>,
    ) -> Result<BrandRow, sqlx::Error> {
        sqlx::query_as::<_, BrandRow>(
            "INSERT INTO brands (owner_id, name, domain) VALUES ($1, $2, $3) \
             RETURNING id, name, domain",
        )
        .bind(owner_id)
        .bind(name)
        .bind(domain)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BrandRow>, sqlx::Error> {
        sqlx::query_as::<_, BrandRow>("SELECT id, name, domain FROM brands WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

pub struct UserRepo;

impl UserRepo {
    pub async fn create(
        pool: &PgPool,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<UserRow, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (email, display_name) VALUES ($1, $2) \
             RETURNING id, email, display_name",
        )
        .bind(email)
        .bind(display_name)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>("SELECT id, email, display_name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
