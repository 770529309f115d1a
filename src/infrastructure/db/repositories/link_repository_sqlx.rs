use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgConnection, PgRow};

use crate::application::ports::link_repository::LinkRepository;
use crate::domain::links::link::{BacklinkInfo, Link, LinkType, NodeKind, NodeMeta};
use crate::infrastructure::db::PgPool;

const LINK_COLUMNS: &str = "l.id, l.source_type, l.source_id, l.target_type, l.target_id, \
     l.link_type, l.context, l.position, l.created_at, l.updated_at";

pub struct SqlxLinkRepository {
    pub pool: PgPool,
}

impl SqlxLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn link_from_row(row: &PgRow) -> anyhow::Result<Link> {
    let link_type: String = row.try_get("link_type")?;
    Ok(Link {
        id: row.try_get("id")?,
        source_type: row.try_get::<String, _>("source_type")?.parse()?,
        source_id: row.try_get("source_id")?,
        target_type: row.try_get::<String, _>("target_type")?.parse()?,
        target_id: row.try_get("target_id")?,
        link_type: LinkType::parse(&link_type)
            .with_context(|| format!("unknown link type {link_type}"))?,
        context: row.try_get("context")?,
        position: row.try_get("position")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

async fn insert_row(conn: &mut PgConnection, link: &Link) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO links (
                id, source_type, source_id, target_type, target_id,
                link_type, context, position, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(&link.id)
    .bind(link.source_type.as_str())
    .bind(&link.source_id)
    .bind(link.target_type.as_str())
    .bind(&link.target_id)
    .bind(link.link_type.as_str())
    .bind(&link.context)
    .bind(link.position)
    .bind(link.created_at)
    .bind(link.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl LinkRepository for SqlxLinkRepository {
    async fn insert_link(&self, link: &Link) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut *conn, link).await
    }

    async fn replace_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
        links: &[Link],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM links WHERE source_type = $1 AND source_id = $2")
            .bind(source_type.as_str())
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        for link in links {
            insert_row(&mut *tx, link).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
    ) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM links WHERE source_type = $1 AND source_id = $2")
            .bind(source_type.as_str())
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_link(&self, link_id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_page_id_by_title(&self, title: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            r#"SELECT id FROM pages
               WHERE LOWER(TRIM(title)) = LOWER($1)
               ORDER BY updated_at DESC LIMIT 1"#,
        )
        .bind(title.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<String, _>("id")))
    }

    async fn find_page_id_by_alias(&self, alias: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            r#"SELECT p.id FROM page_aliases a
               JOIN pages p ON p.id = a.page_id
               WHERE LOWER(TRIM(a.alias)) = LOWER($1)
               ORDER BY p.updated_at DESC LIMIT 1"#,
        )
        .bind(alias.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<String, _>("id")))
    }

    async fn block_exists(&self, block_id: &str) -> anyhow::Result<bool> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM blocks WHERE id = $1")
            .bind(block_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n > 0)
    }

    async fn backlinks_for(
        &self,
        target_id: &str,
        target_type: Option<NodeKind>,
    ) -> anyhow::Result<Vec<BacklinkInfo>> {
        let sql = format!(
            r#"SELECT {LINK_COLUMNS},
                   COALESCE(p.title, LEFT(split_part(b.content, E'\n', 1), 50), l.source_id) AS source_title,
                   COALESCE(p.content, b.content) AS source_content
               FROM links l
               LEFT JOIN pages p ON l.source_type = 'page' AND p.id = l.source_id
               LEFT JOIN blocks b ON l.source_type = 'block' AND b.id = l.source_id
               WHERE l.target_id = $1 AND ($2::text IS NULL OR l.target_type = $2)
               ORDER BY l.created_at DESC"#
        );
        let rows = sqlx::query(&sql)
            .bind(target_id)
            .bind(target_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<BacklinkInfo> {
                Ok(BacklinkInfo {
                    link: link_from_row(row)?,
                    source_title: row.try_get("source_title")?,
                    source_content: row.try_get("source_content")?,
                })
            })
            .collect()
    }

    async fn forward_links_for(
        &self,
        source_id: &str,
        source_type: Option<NodeKind>,
    ) -> anyhow::Result<Vec<Link>> {
        let sql = format!(
            r#"SELECT {LINK_COLUMNS} FROM links l
               WHERE l.source_id = $1 AND ($2::text IS NULL OR l.source_type = $2)
               ORDER BY l.position ASC NULLS LAST, l.created_at ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(source_id)
            .bind(source_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(link_from_row).collect()
    }

    async fn node_meta(&self, id: &str) -> anyhow::Result<Option<NodeMeta>> {
        let row = sqlx::query(
            r#"SELECT id, title, kind FROM (
                   SELECT id, title, 'page' AS kind, 0 AS rank FROM pages WHERE id = $1
                   UNION ALL
                   SELECT id, LEFT(split_part(content, E'\n', 1), 50) AS title, 'block' AS kind, 1 AS rank
                   FROM blocks WHERE id = $1
               ) nodes
               ORDER BY rank LIMIT 1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> anyhow::Result<NodeMeta> {
            Ok(NodeMeta {
                id: r.try_get("id")?,
                title: r.try_get("title")?,
                kind: r.try_get::<String, _>("kind")?.parse()?,
            })
        })
        .transpose()
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
