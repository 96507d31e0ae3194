//! pgvector-backed store of story content (C6): schema, search, and the
//! embedding-dimension migration routine.

use crate::error::{BookGeneratorError, Result};
use crate::rag::embedding::EmbeddingProvider;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct StoryRow {
    pub id: i32,
    pub story_name: String,
    pub prompt_file_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub id: i32,
    pub content_type: String,
    pub content: String,
    pub metadata: JsonValue,
    pub similarity: Option<f64>,
}

#[derive(Debug, Default, Clone)]
pub struct NewChunk {
    pub story_id: i32,
    pub content_type: String,
    pub content_subtype: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub metadata: JsonValue,
    pub embedding: Vec<f32>,
    pub chapter_number: Option<i32>,
    pub scene_number: Option<i32>,
}

#[derive(Debug, Default, Clone)]
pub struct SearchQuery {
    pub story_id: Option<i32>,
    pub content_type: Option<String>,
    pub metadata_filters: Option<JsonValue>,
    pub limit: i64,
    pub threshold: f64,
}

pub struct VectorStore {
    pool: PgPool,
    vector_dimensions: usize,
}

const CANONICAL_INDEXES: &[&str] = &[
    "content_chunks_story_id_idx",
    "content_chunks_content_type_idx",
    "content_chunks_chapter_scene_idx",
    "content_chunks_created_at_idx",
    "content_chunks_type_subtype_idx",
    "content_chunks_metadata_gin_idx",
    "content_chunks_embedding_hnsw_idx",
    "content_chunks_embedding_ivfflat_idx",
];

impl VectorStore {
    pub async fn connect(database_url: &str, vector_dimensions: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool,
            vector_dimensions,
        })
    }

    pub fn from_pool(pool: PgPool, vector_dimensions: usize) -> Self {
        Self {
            pool,
            vector_dimensions,
        }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stories (
                id SERIAL PRIMARY KEY,
                story_name VARCHAR(255) UNIQUE NOT NULL,
                prompt_file_name VARCHAR(255) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        self.create_content_chunks_table("content_chunks", self.vector_dimensions)
            .await?;
        self.create_indexes("content_chunks", CANONICAL_INDEXES)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS migration_status (
                id SERIAL PRIMARY KEY,
                migration_type VARCHAR(50) NOT NULL,
                from_dim INT,
                to_dim INT,
                status VARCHAR(20) NOT NULL,
                migration_table_name VARCHAR(100),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                completed_at TIMESTAMPTZ,
                error_message TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_content_chunks_table(&self, table_name: &str, dimensions: usize) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table_name} (
                id SERIAL PRIMARY KEY,
                story_id INT NOT NULL REFERENCES stories(id),
                content_type VARCHAR(50) NOT NULL,
                content_subtype VARCHAR(50),
                title VARCHAR(255),
                content TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                embedding VECTOR({dimensions}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                chapter_number INT,
                scene_number INT
            )"
        );
        sqlx::query(sqlx::AssertSqlSafe(sql.clone())).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_indexes(&self, table_name: &str, names: &[&str]) -> Result<()> {
        let statements = [
            format!("CREATE INDEX IF NOT EXISTS {} ON {table_name} (story_id)", names[0]),
            format!("CREATE INDEX IF NOT EXISTS {} ON {table_name} (content_type)", names[1]),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table_name} (chapter_number, scene_number)",
                names[2]
            ),
            format!("CREATE INDEX IF NOT EXISTS {} ON {table_name} (created_at)", names[3]),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table_name} (content_type, content_subtype)",
                names[4]
            ),
            format!("CREATE INDEX IF NOT EXISTS {} ON {table_name} USING gin (metadata)", names[5]),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table_name} USING hnsw (embedding vector_cosine_ops)",
                names[6]
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table_name} USING ivfflat (embedding vector_cosine_ops)",
                names[7]
            ),
        ];
        for stmt in statements {
            sqlx::query(sqlx::AssertSqlSafe(stmt)).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn create_story(&self, story_name: &str, prompt_file_name: &str) -> Result<i32> {
        let existing = sqlx::query("SELECT id FROM stories WHERE story_name = $1")
            .bind(story_name)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = existing {
            return Ok(row.get::<i32, _>("id"));
        }
        let row = sqlx::query(
            "INSERT INTO stories (story_name, prompt_file_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(story_name)
        .bind(prompt_file_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i32, _>("id"))
    }

    pub async fn list_stories(&self) -> Result<Vec<StoryRow>> {
        let rows = sqlx::query("SELECT id, story_name, prompt_file_name, created_at FROM stories")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoryRow {
                id: r.get("id"),
                story_name: r.get("story_name"),
                prompt_file_name: r.get("prompt_file_name"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn get_story_content(&self, story_id: i32) -> Result<Vec<(i32, String, String, JsonValue)>> {
        let rows = sqlx::query(
            "SELECT id, content_type, content, metadata FROM content_chunks WHERE story_id = $1",
        )
        .bind(story_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("id"), r.get("content_type"), r.get("content"), r.get("metadata")))
            .collect())
    }

    pub async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i32> {
        let embedding = pgvector::Vector::from(chunk.embedding.clone());
        let row = sqlx::query(
            "INSERT INTO content_chunks
                (story_id, content_type, content_subtype, title, content, metadata, embedding, chapter_number, scene_number)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(chunk.story_id)
        .bind(&chunk.content_type)
        .bind(&chunk.content_subtype)
        .bind(&chunk.title)
        .bind(&chunk.body)
        .bind(&chunk.metadata)
        .bind(embedding)
        .bind(chunk.chapter_number)
        .bind(chunk.scene_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i32, _>("id"))
    }

    pub async fn search(&self, query_vec: &[f32], query: &SearchQuery) -> Result<Vec<ChunkRow>> {
        let embedding = pgvector::Vector::from(query_vec.to_vec());
        let mut sql = String::from(
            "SELECT id, content_type, content, metadata, 1 - (embedding <=> $1) AS similarity
             FROM content_chunks WHERE 1 - (embedding <=> $1) >= $2",
        );
        let mut arg_idx = 3;
        if query.story_id.is_some() {
            sql.push_str(&format!(" AND story_id = ${arg_idx}"));
            arg_idx += 1;
        }
        if query.content_type.is_some() {
            sql.push_str(&format!(" AND content_type = ${arg_idx}"));
            arg_idx += 1;
        }
        sql.push_str(" ORDER BY similarity DESC LIMIT $");
        sql.push_str(&arg_idx.to_string());

        let mut q = sqlx::query(sqlx::AssertSqlSafe(sql.clone())).bind(embedding).bind(query.threshold);
        if let Some(story_id) = query.story_id {
            q = q.bind(story_id);
        }
        if let Some(content_type) = &query.content_type {
            q = q.bind(content_type.clone());
        }
        q = q.bind(query.limit);

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| ChunkRow {
                id: r.get("id"),
                content_type: r.get("content_type"),
                content: r.get("content"),
                metadata: r.get("metadata"),
                similarity: r.try_get("similarity").ok(),
            })
            .collect())
    }

    pub async fn delete_by_filters(&self, content_type: &str, metadata_contains: Option<&JsonValue>) -> Result<u64> {
        let result = if let Some(filter) = metadata_contains {
            sqlx::query("DELETE FROM content_chunks WHERE content_type = $1 AND metadata @> $2")
                .bind(content_type)
                .bind(filter)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("DELETE FROM content_chunks WHERE content_type = $1")
                .bind(content_type)
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected())
    }

    /// Step 2 of the migration routine: inspect the embedding column's type
    /// modifier to discover the current dimension.
    pub async fn discover_current_dimension(&self) -> Result<usize> {
        let row = sqlx::query(
            "SELECT atttypmod AS typmod FROM pg_attribute
             WHERE attrelid = 'content_chunks'::regclass AND attname = 'embedding'",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => {
                let typmod: i32 = r.get("typmod");
                if typmod > 0 {
                    Ok(typmod as usize)
                } else {
                    Ok(self.vector_dimensions)
                }
            }
            None => Ok(self.vector_dimensions),
        }
    }

    pub async fn record_migration_start(&self, from_dim: usize, to_dim: usize, table_name: &str) -> Result<i32> {
        let row = sqlx::query(
            "INSERT INTO migration_status (migration_type, from_dim, to_dim, status, migration_table_name)
             VALUES ('embedding_dimension', $1, $2, 'in_progress', $3) RETURNING id",
        )
        .bind(from_dim as i32)
        .bind(to_dim as i32)
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i32, _>("id"))
    }

    pub async fn record_migration_complete(&self, id: i32, error: Option<&str>) -> Result<()> {
        let status = if error.is_some() { "failed" } else { "completed" };
        sqlx::query(
            "UPDATE migration_status SET status = $1, completed_at = now(), error_message = $2 WHERE id = $3",
        )
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Runs the full embedding-dimension migration routine (§4.6.1).
    /// `dry_run` performs only steps 1-3 and makes no writes.
    pub async fn migrate_embeddings(
        &mut self,
        new_embedding: &dyn EmbeddingProvider,
        dry_run: bool,
    ) -> Result<MigrationOutcome> {
        // Step 1: probe the new embedding provider.
        let probe = new_embedding.embed_single("dimension probe").await?;
        let new_dim = probe.len();

        // Step 2: discover current dimension.
        let current_dim = self.discover_current_dimension().await?;

        // Step 3: no-op if unchanged.
        if current_dim == new_dim {
            return Ok(MigrationOutcome::NoOpSameDimension { dimension: current_dim });
        }

        if dry_run {
            return Ok(MigrationOutcome::DryRunPlan {
                from_dim: current_dim,
                to_dim: new_dim,
            });
        }

        let migration_table = format!("content_chunks_migration_{new_dim}");
        // Step 4: migration table with identical schema except dimension.
        self.create_content_chunks_table(&migration_table, new_dim).await?;
        let migration_indexes: Vec<String> = CANONICAL_INDEXES
            .iter()
            .map(|n| format!("{migration_table}_{n}"))
            .collect();
        let migration_index_refs: Vec<&str> = migration_indexes.iter().map(|s| s.as_str()).collect();
        self.create_indexes(&migration_table, &migration_index_refs).await?;

        // Step 5: record in-progress migration.
        let migration_id = self
            .record_migration_start(current_dim, new_dim, &migration_table)
            .await?;

        // Step 6: re-embed every chunk across every story.
        let rows = sqlx::query(
            "SELECT id, story_id, content_type, content_subtype, title, content, metadata, chapter_number, scene_number
             FROM content_chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut migrated = 0usize;
        let mut errors = Vec::new();
        for row in &rows {
            let content: String = row.get("content");
            let embed_result = new_embedding.embed_single(&content).await;
            match embed_result {
                Ok(vector) => {
                    let embedding = pgvector::Vector::from(vector);
                    let insert_sql = format!(
                        "INSERT INTO {migration_table}
                            (story_id, content_type, content_subtype, title, content, metadata, embedding, chapter_number, scene_number)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
                    );
                    let result = sqlx::query(sqlx::AssertSqlSafe(insert_sql))
                        .bind(row.get::<i32, _>("story_id"))
                        .bind(row.get::<String, _>("content_type"))
                        .bind(row.get::<Option<String>, _>("content_subtype"))
                        .bind(row.get::<Option<String>, _>("title"))
                        .bind(&content)
                        .bind(row.get::<JsonValue, _>("metadata"))
                        .bind(embedding)
                        .bind(row.get::<Option<i32>, _>("chapter_number"))
                        .bind(row.get::<Option<i32>, _>("scene_number"))
                        .execute(&self.pool)
                        .await;
                    match result {
                        Ok(_) => migrated += 1,
                        Err(e) => errors.push(e.to_string()),
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
            if migrated.is_multiple_of(10) {
                tracing::info!(migrated, total = rows.len(), "migration progress");
            }
        }

        // Step 7: if errors occurred, record failure and bail before swapping.
        if !errors.is_empty() {
            self.record_migration_complete(migration_id, Some(&errors.join("; ")))
                .await?;
            return Ok(MigrationOutcome::FailedWithErrors { errors });
        }

        // Step 8: atomic rename-swap.
        let old_has_rows: bool = sqlx::query("SELECT count(*) AS c FROM content_chunks")
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("c")
            > 0;

        if old_has_rows {
            sqlx::query("ALTER TABLE content_chunks RENAME TO content_chunks_backup")
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("DROP TABLE content_chunks").execute(&self.pool).await?;
        }
        sqlx::query(sqlx::AssertSqlSafe(format!("ALTER TABLE {migration_table} RENAME TO content_chunks")))
            .execute(&self.pool)
            .await?;
        for (canonical, migration_name) in CANONICAL_INDEXES.iter().zip(migration_indexes.iter()) {
            sqlx::query(sqlx::AssertSqlSafe(format!("ALTER INDEX {migration_name} RENAME TO {canonical}")))
                .execute(&self.pool)
                .await?;
        }

        self.vector_dimensions = new_dim;

        // Step 10: mark complete.
        self.record_migration_complete(migration_id, None).await?;

        // Step 11: clean up any other leftover migration tables.
        self.cleanup_leftover_migration_tables().await?;

        Ok(MigrationOutcome::Migrated {
            from_dim: current_dim,
            to_dim: new_dim,
            rows_migrated: migrated,
            backup_table: if old_has_rows {
                Some("content_chunks_backup".to_string())
            } else {
                None
            },
        })
    }

    pub async fn drop_backup_table(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS content_chunks_backup")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_leftover_migration_tables(&self) -> Result<()> {
        let rows = sqlx::query(
            "SELECT tablename FROM pg_tables WHERE tablename LIKE 'content_chunks_migration_%'",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let name: String = row.get("tablename");
            sqlx::query(sqlx::AssertSqlSafe(format!("DROP TABLE IF EXISTS {name}")))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum MigrationOutcome {
    NoOpSameDimension { dimension: usize },
    DryRunPlan { from_dim: usize, to_dim: usize },
    Migrated {
        from_dim: usize,
        to_dim: usize,
        rows_migrated: usize,
        backup_table: Option<String>,
    },
    FailedWithErrors { errors: Vec<String> },
}

impl From<MigrationOutcome> for Result<()> {
    fn from(outcome: MigrationOutcome) -> Self {
        match outcome {
            MigrationOutcome::FailedWithErrors { errors } => {
                Err(BookGeneratorError::MigrationError(errors.join("; ")))
            }
            _ => Ok(()),
        }
    }
}
