use anyhow::{anyhow, Context};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row};

use crate::error::{Error, Result};
use crate::model::{Element, Id, Project};
use crate::store::traits::{ElementFilter, ElementStore, ProjectStore};

/// PostgreSQL-backed store. Elements are persisted as one JSONB document per
/// row with extracted columns for the predicates the engine filters on, plus
/// a generated tsvector column for full-text search.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run idempotent schema setup.
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS elements (
                id TEXT PRIMARY KEY,
                project TEXT NOT NULL,
                branch TEXT NOT NULL,
                parent TEXT,
                source TEXT,
                target TEXT,
                archived BOOLEAN NOT NULL DEFAULT FALSE,
                doc JSONB NOT NULL,
                search TSVECTOR GENERATED ALWAYS AS (
                    to_tsvector('english',
                        coalesce(doc->>'name', '') || ' ' ||
                        coalesce(doc->>'documentation', '') || ' ' ||
                        replace(id, ':', ' '))
                ) STORED
            )
            "#,
            "CREATE INDEX IF NOT EXISTS elements_scope_idx ON elements (project, branch)",
            "CREATE INDEX IF NOT EXISTS elements_parent_idx ON elements (parent)",
            "CREATE INDEX IF NOT EXISTS elements_search_idx ON elements USING GIN (search)",
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                doc JSONB NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to run schema migration")?;
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ElementFilter) {
        builder.push(" WHERE project = ");
        builder.push_bind(filter.project.clone());
        builder.push(" AND branch = ");
        builder.push_bind(filter.branch.clone());
        if !filter.include_archived {
            builder.push(" AND NOT archived");
        }
        if let Some(ids) = &filter.ids {
            builder.push(" AND id = ANY(");
            builder.push_bind(ids.clone());
            builder.push(")");
        }
        if let Some(parents) = &filter.parents {
            builder.push(" AND parent = ANY(");
            builder.push_bind(parents.clone());
            builder.push(")");
        }
        if let Some(sources) = &filter.sources {
            builder.push(" AND source = ANY(");
            builder.push_bind(sources.clone());
            builder.push(")");
        }
        if let Some(targets) = &filter.targets {
            builder.push(" AND target = ANY(");
            builder.push_bind(targets.clone());
            builder.push(")");
        }
        for (key, value) in &filter.equals {
            match key.strip_prefix("custom.") {
                Some(custom_key) => {
                    builder.push(" AND doc->'custom'->>");
                    builder.push_bind(custom_key.to_string());
                    builder.push(" = ");
                    builder.push_bind(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()));
                }
                None => {
                    builder.push(" AND doc->>");
                    builder.push_bind(key.clone());
                    builder.push(" = ");
                    builder.push_bind(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()));
                }
            }
        }
    }

    fn push_paging(builder: &mut QueryBuilder<'_, Postgres>, filter: &ElementFilter) {
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }
        if let Some(skip) = filter.skip {
            builder.push(" OFFSET ");
            builder.push_bind(skip as i64);
        }
    }

    fn row_to_element(row: &sqlx::postgres::PgRow) -> Result<Element> {
        let doc: serde_json::Value = row.get("doc");
        serde_json::from_value(doc)
            .map_err(|e| Error::Database(anyhow!(e).context("Malformed element document")))
    }
}

#[async_trait::async_trait]
impl ElementStore for PostgresStore {
    async fn find_elements(&self, filter: &ElementFilter) -> Result<Vec<Element>> {
        let mut builder = QueryBuilder::new("SELECT doc FROM elements");
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY id");
        Self::push_paging(&mut builder, filter);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query elements")?;
        rows.iter().map(Self::row_to_element).collect()
    }

    async fn insert_elements(&self, elements: &[Element]) -> Result<u64> {
        if elements.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::new(
            "INSERT INTO elements (id, project, branch, parent, source, target, archived, doc) ",
        );
        let mut docs = Vec::with_capacity(elements.len());
        for element in elements {
            docs.push(
                serde_json::to_value(element)
                    .context("Failed to serialize element document")?,
            );
        }
        builder.push_values(elements.iter().zip(docs), |mut row, (element, doc)| {
            row.push_bind(element.id.clone())
                .push_bind(element.project.clone())
                .push_bind(element.branch.clone())
                .push_bind(element.parent.clone())
                .push_bind(element.source.clone())
                .push_bind(element.target.clone())
                .push_bind(element.archived)
                .push_bind(doc);
        });

        // No ON CONFLICT clause: a duplicate id must surface as a unique
        // violation, it is the backstop for the engine's advisory pre-check.
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to insert elements")?;
        Ok(result.rows_affected())
    }

    async fn replace_elements(&self, elements: &[Element]) -> Result<u64> {
        let mut replaced = 0_u64;
        for element in elements {
            let doc = serde_json::to_value(element)
                .context("Failed to serialize element document")?;
            let result = sqlx::query(
                r#"
                INSERT INTO elements (id, project, branch, parent, source, target, archived, doc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    parent = EXCLUDED.parent,
                    source = EXCLUDED.source,
                    target = EXCLUDED.target,
                    archived = EXCLUDED.archived,
                    doc = EXCLUDED.doc
                "#,
            )
            .bind(&element.id)
            .bind(&element.project)
            .bind(&element.branch)
            .bind(&element.parent)
            .bind(&element.source)
            .bind(&element.target)
            .bind(element.archived)
            .bind(doc)
            .execute(&self.pool)
            .await
            .context("Failed to replace element")?;
            replaced += result.rows_affected();
        }
        Ok(replaced)
    }

    async fn delete_elements(&self, ids: &[Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM elements WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .context("Failed to delete elements")?;
        Ok(result.rows_affected())
    }

    async fn search_elements(&self, filter: &ElementFilter, text: &str) -> Result<Vec<Element>> {
        let mut builder = QueryBuilder::new("SELECT doc FROM elements");
        Self::push_filter(&mut builder, filter);
        builder.push(" AND search @@ plainto_tsquery('english', ");
        builder.push_bind(text.to_string());
        builder.push(") ORDER BY ts_rank(search, plainto_tsquery('english', ");
        builder.push_bind(text.to_string());
        builder.push(")) DESC, id");
        Self::push_paging(&mut builder, filter);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to search elements")?;
        rows.iter().map(Self::row_to_element).collect()
    }
}

#[async_trait::async_trait]
impl ProjectStore for PostgresStore {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT doc FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch project")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let doc: serde_json::Value = row.get("doc");
        let project = serde_json::from_value(doc)
            .map_err(|e| Error::Database(anyhow!(e).context("Malformed project document")))?;
        Ok(Some(project))
    }

    async fn upsert_project(&self, project: Project) -> Result<()> {
        let doc = serde_json::to_value(&project)
            .context("Failed to serialize project document")?;
        sqlx::query(
            r#"
            INSERT INTO projects (id, doc)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(&project.id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .context("Failed to upsert project")?;
        Ok(())
    }
}
