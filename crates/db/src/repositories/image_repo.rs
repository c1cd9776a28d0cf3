//! Repository for the `images` gallery table.

use aigpic_core::types::{DbId, Timestamp};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::image::Image;

/// Column list for `images` queries.
const COLUMNS: &str = "id, filename, prompt, created_at";

/// Maximum gallery page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Default gallery page size.
pub const DEFAULT_PAGE_SIZE: i64 = 16;

/// Provides gallery queries over generated images.
pub struct ImageRepo;

impl ImageRepo {
    /// Insert one gallery row. Takes a connection so it can join the
    /// transaction that completes the owning job.
    pub async fn insert(
        conn: &mut SqliteConnection,
        filename: &str,
        prompt: &str,
        created_at: Timestamp,
    ) -> Result<DbId, sqlx::Error> {
        let result = sqlx::query("INSERT INTO images (filename, prompt, created_at) VALUES (?, ?, ?)")
            .bind(filename)
            .bind(prompt)
            .bind(created_at)
            .execute(conn)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// One page of images, newest first, plus the total row count.
    ///
    /// `page` is 1-based. Callers validate the bounds; an offset past
    /// `i64::MAX` saturates and yields an empty page.
    pub async fn list_page(
        pool: &SqlitePool,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<Image>, i64), sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images")
            .fetch_one(pool)
            .await?;

        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let query = format!(
            "SELECT {COLUMNS} FROM images ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let items = sqlx::query_as::<_, Image>(&query)
            .bind(page_size)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok((items, total))
    }

    /// The prompt that produced image `id`.
    pub async fn find_prompt(pool: &SqlitePool, id: DbId) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT prompt FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete image `id`, returning its filename if the row existed.
    pub async fn delete(pool: &SqlitePool, id: DbId) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("DELETE FROM images WHERE id = ? RETURNING filename")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
