use super::r#trait::{LibraryRepository, RepositoryError, RepositoryResult};
use crate::models::{Grouping, Item, Share};
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const GROUPING_COLUMNS: &str = "id, owner_id, name, is_staging, created_at, updated_at";

/// PostgreSQL library store (source of truth)
#[derive(Clone)]
pub struct PostgresLibraryRepository {
    pool: PgPool,
}

impl PostgresLibraryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }

    async fn ensure_grouping(&self, grouping_id: Uuid) -> RepositoryResult<Grouping> {
        self.get_grouping(grouping_id)
            .await?
            .ok_or(RepositoryError::NotFound {
                resource: "collection",
                id: grouping_id,
            })
    }
}

#[async_trait::async_trait]
impl LibraryRepository for PostgresLibraryRepository {
    async fn upsert_item(&self, item: Item) -> RepositoryResult<Item> {
        let item = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO items (id, title, author, description, cover_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                author = EXCLUDED.author,
                description = EXCLUDED.description,
                cover_url = EXCLUDED.cover_url,
                updated_at = NOW()
            RETURNING id, title, author, description, cover_url, created_at, updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.description)
        .bind(&item.cover_url)
        .bind(item.created_at)
        .bind(item.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    async fn get_item(&self, item_id: Uuid) -> RepositoryResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(
            "SELECT id, title, author, description, cover_url, created_at, updated_at \
             FROM items WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn get_grouping(&self, grouping_id: Uuid) -> RepositoryResult<Option<Grouping>> {
        let grouping = sqlx::query_as::<_, Grouping>(&format!(
            "SELECT {GROUPING_COLUMNS} FROM collections WHERE id = $1"
        ))
        .bind(grouping_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grouping)
    }

    async fn staging_grouping(&self, owner_id: Uuid) -> RepositoryResult<Option<Grouping>> {
        let grouping = sqlx::query_as::<_, Grouping>(&format!(
            "SELECT {GROUPING_COLUMNS} FROM collections WHERE owner_id = $1 AND is_staging"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grouping)
    }

    async fn groupings_containing(&self, item_id: Uuid) -> RepositoryResult<Vec<Grouping>> {
        let groupings = sqlx::query_as::<_, Grouping>(
            r#"
            SELECT c.id, c.owner_id, c.name, c.is_staging, c.created_at, c.updated_at
            FROM collections c
            JOIN collection_items ci ON ci.collection_id = c.id
            WHERE ci.item_id = $1
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(groupings)
    }

    async fn grouping_item_ids(&self, grouping_id: Uuid) -> RepositoryResult<Vec<Uuid>> {
        self.ensure_grouping(grouping_id).await?;
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT item_id FROM collection_items WHERE collection_id = $1 ORDER BY added_at",
        )
        .bind(grouping_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn grantees(&self, grouping_id: Uuid) -> RepositoryResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT grantee_id FROM collection_shares WHERE collection_id = $1",
        )
        .bind(grouping_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn create_grouping(&self, grouping: Grouping) -> RepositoryResult<Grouping> {
        let grouping = sqlx::query_as::<_, Grouping>(&format!(
            r#"
            INSERT INTO collections (id, owner_id, name, is_staging, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {GROUPING_COLUMNS}
            "#
        ))
        .bind(grouping.id)
        .bind(grouping.owner_id)
        .bind(&grouping.name)
        .bind(grouping.is_staging)
        .bind(grouping.created_at)
        .bind(grouping.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("Created collection {} for owner {}", grouping.id, grouping.owner_id);
        Ok(grouping)
    }

    async fn ensure_staging_grouping(&self, owner_id: Uuid) -> RepositoryResult<(Grouping, bool)> {
        let staging = Grouping::staging(owner_id);
        let inserted = sqlx::query_as::<_, Grouping>(&format!(
            r#"
            INSERT INTO collections (id, owner_id, name, is_staging, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, $4, $5)
            ON CONFLICT (owner_id) WHERE is_staging DO NOTHING
            RETURNING {GROUPING_COLUMNS}
            "#
        ))
        .bind(staging.id)
        .bind(staging.owner_id)
        .bind(&staging.name)
        .bind(staging.created_at)
        .bind(staging.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            debug!("Created staging collection {} for owner {}", created.id, owner_id);
            return Ok((created, true));
        }

        // Lost the race to a concurrent insert; the row is committed by now
        let existing = self
            .staging_grouping(owner_id)
            .await?
            .ok_or(RepositoryError::NotFound {
                resource: "staging collection",
                id: owner_id,
            })?;
        Ok((existing, false))
    }

    async fn rename_grouping(&self, grouping_id: Uuid, name: String) -> RepositoryResult<Grouping> {
        sqlx::query_as::<_, Grouping>(&format!(
            r#"
            UPDATE collections SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {GROUPING_COLUMNS}
            "#
        ))
        .bind(grouping_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound {
            resource: "collection",
            id: grouping_id,
        })
    }

    async fn delete_grouping(&self, grouping_id: Uuid) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let is_staging: Option<bool> =
            sqlx::query_scalar("SELECT is_staging FROM collections WHERE id = $1 FOR UPDATE")
                .bind(grouping_id)
                .fetch_optional(&mut *tx)
                .await?;

        match is_staging {
            None => {
                return Err(RepositoryError::NotFound {
                    resource: "collection",
                    id: grouping_id,
                })
            }
            Some(true) => return Err(RepositoryError::StagingProtected(grouping_id)),
            Some(false) => {}
        }

        // collection_items and collection_shares cascade
        sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(grouping_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Deleted collection {}", grouping_id);
        Ok(())
    }

    async fn add_item(&self, grouping_id: Uuid, item_id: Uuid) -> RepositoryResult<bool> {
        self.ensure_grouping(grouping_id).await?;
        if self.get_item(item_id).await?.is_none() {
            return Err(RepositoryError::NotFound {
                resource: "item",
                id: item_id,
            });
        }

        let result = sqlx::query(
            r#"
            INSERT INTO collection_items (collection_id, item_id, added_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (collection_id, item_id) DO NOTHING
            "#,
        )
        .bind(grouping_id)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_item(&self, grouping_id: Uuid, item_id: Uuid) -> RepositoryResult<bool> {
        self.ensure_grouping(grouping_id).await?;
        let result =
            sqlx::query("DELETE FROM collection_items WHERE collection_id = $1 AND item_id = $2")
                .bind(grouping_id)
                .bind(item_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_item(
        &self,
        staging_id: Uuid,
        item_id: Uuid,
        targets: Vec<Uuid>,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let removed =
            sqlx::query("DELETE FROM collection_items WHERE collection_id = $1 AND item_id = $2")
                .bind(staging_id)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        if removed.rows_affected() == 0 {
            return Err(RepositoryError::NotStaged {
                item_id,
                grouping_id: staging_id,
            });
        }

        for target in targets {
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM collections WHERE id = $1")
                    .bind(target)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_none() {
                return Err(RepositoryError::NotFound {
                    resource: "collection",
                    id: target,
                });
            }

            sqlx::query(
                r#"
                INSERT INTO collection_items (collection_id, item_id, added_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (collection_id, item_id) DO NOTHING
                "#,
            )
            .bind(target)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_share(&self, share: Share) -> RepositoryResult<bool> {
        self.ensure_grouping(share.grouping_id).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO collection_shares (collection_id, grantee_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (collection_id, grantee_id) DO NOTHING
            "#,
        )
        .bind(share.grouping_id)
        .bind(share.grantee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_share(&self, share: Share) -> RepositoryResult<bool> {
        self.ensure_grouping(share.grouping_id).await?;
        let result = sqlx::query(
            "DELETE FROM collection_shares WHERE collection_id = $1 AND grantee_id = $2",
        )
        .bind(share.grouping_id)
        .bind(share.grantee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
