//! Postgres store: `ts_rank` full-text ranking, pgvector cosine ranking, and embedding DDL.
//!
//! Embedding columns are untyped `vector` so a provider switch does not require a
//! column rewrite. Similarity queries cast to `vector(N)` and only consider rows
//! whose stored dimensionality is `N`, which is also the predicate of the partial
//! HNSW index created by [`ensure_hnsw_index`].

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use pgvector::Vector;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use super::{
    build_tsquery, Author, BackfillCursor, EmbeddingStore, ItemMetadata, LexicalQuery,
    SearchFilters, SearchHit, SearchStore, SemanticQuery,
};
use crate::error::StoreError;
use crate::item::{ItemContent, ItemKey, ItemKind, PostType, SearchableItem};

/// Text search configuration used for vectors, queries, and headlines.
pub const TEXT_SEARCH_CONFIG: &str = "english";

const HEADLINE_OPTIONS: &str = "StartSel=<mark>, StopSel=</mark>, MaxWords=50, MinWords=30, MaxFragments=1";
const SNIPPET_CHARS: usize = 200;

type SqlParams = Vec<Box<dyn ToSql + Sync + Send>>;

/// Column expressions for one content table, written against its query alias.
struct KindSql {
    alias: &'static str,
    parent_join: Option<&'static str>,
    author_type: &'static str,
    author_id: &'static str,
    item_type: &'static str,
    title: &'static str,
    /// Text indexed for full-text search.
    document: &'static str,
    /// Same expression without the alias, for index DDL.
    bare_document: &'static str,
    /// Text highlighted into the snippet.
    excerpt: &'static str,
    tags: &'static str,
    status: &'static str,
    vote_score: &'static str,
    answers_count: &'static str,
    post_type: Option<&'static str>,
    /// `title`, `description`-style fields fed back into [`ItemContent`].
    content_fields: [&'static str; 4],
}

fn kind_sql(kind: ItemKind) -> KindSql {
    match kind {
        ItemKind::Post => KindSql {
            alias: "p",
            parent_join: None,
            author_type: "p.posted_by_type",
            author_id: "p.posted_by_id",
            item_type: "p.type::text",
            title: "p.title",
            document: "p.title || ' ' || p.description",
            bare_document: "title || ' ' || description",
            excerpt: "p.description",
            tags: "COALESCE(p.tags, ARRAY[]::text[])",
            status: "COALESCE(p.status::text, '')",
            vote_score: "(p.upvotes - p.downvotes)",
            answers_count: "(SELECT COUNT(*) FROM {answers} x WHERE x.question_id = p.id AND x.deleted_at IS NULL)",
            post_type: Some("p.type::text"),
            content_fields: ["p.title", "p.description", "''", "''"],
        },
        ItemKind::Answer => KindSql {
            alias: "a",
            parent_join: Some("LEFT JOIN {posts} parent ON a.question_id = parent.id"),
            author_type: "a.author_type",
            author_id: "a.author_id",
            item_type: "'answer'",
            title: "LEFT(a.content, 100)",
            document: "a.content",
            bare_document: "content",
            excerpt: "a.content",
            tags: "COALESCE(parent.tags, ARRAY[]::text[])",
            status: "CASE WHEN a.is_accepted THEN 'accepted' ELSE '' END",
            vote_score: "(a.upvotes - a.downvotes)",
            answers_count: "0",
            post_type: None,
            content_fields: ["a.content", "''", "''", "''"],
        },
        ItemKind::Approach => KindSql {
            alias: "a",
            parent_join: Some("LEFT JOIN {posts} parent ON a.problem_id = parent.id"),
            author_type: "a.author_type",
            author_id: "a.author_id",
            item_type: "'approach'",
            title: "LEFT(COALESCE(a.angle, '') || ' ' || COALESCE(a.method, ''), 100)",
            document: "COALESCE(a.angle, '') || ' ' || COALESCE(a.method, '') || ' ' || COALESCE(a.outcome, '') || ' ' || COALESCE(a.solution, '')",
            bare_document: "COALESCE(angle, '') || ' ' || COALESCE(method, '') || ' ' || COALESCE(outcome, '') || ' ' || COALESCE(solution, '')",
            excerpt: "COALESCE(a.angle, '') || ' ' || COALESCE(a.method, '') || ' ' || COALESCE(a.outcome, '') || ' ' || COALESCE(a.solution, '')",
            tags: "COALESCE(parent.tags, ARRAY[]::text[])",
            status: "COALESCE(a.status::text, '')",
            vote_score: "0",
            answers_count: "0",
            post_type: None,
            content_fields: [
                "COALESCE(a.angle, '')",
                "COALESCE(a.method, '')",
                "COALESCE(a.outcome, '')",
                "COALESCE(a.solution, '')",
            ],
        },
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Store backed by a single `tokio_postgres` connection.
#[derive(Clone)]
pub struct PgStore {
    client: Arc<Client>,
    schema: String,
}

impl PgStore {
    /// Wraps an existing client; content tables live in `schema`.
    pub fn new(client: Arc<Client>, schema: impl Into<String>) -> Self {
        Self {
            client,
            schema: schema.into(),
        }
    }

    /// Connects and drives the connection on a background task.
    pub async fn connect(database_url: &str, schema: impl Into<String>) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });
        Ok(Self::new(Arc::new(client), schema))
    }

    /// Underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Schema holding the content tables.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(name))
    }

    fn from_clause(&self, kind: ItemKind, sql: &KindSql) -> String {
        let parent = sql
            .parent_join
            .map(|join| join.replace("{posts}", &self.table("posts")))
            .unwrap_or_default();
        format!(
            "{table} {alias} {parent} \
             LEFT JOIN {users} u ON {author_type} = 'human' AND {author_id} = u.id::text \
             LEFT JOIN {agents} ag ON {author_type} = 'agent' AND {author_id} = ag.id::text",
            table = self.table(kind.table()),
            alias = sql.alias,
            users = self.table("users"),
            agents = self.table("agents"),
            author_type = sql.author_type,
            author_id = sql.author_id,
        )
    }

    fn hit_columns(&self, sql: &KindSql, snippet: &str, score: &str) -> String {
        let answers_count = sql.answers_count.replace("{answers}", &self.table("answers"));
        format!(
            "{alias}.id::text AS id, \
             {item_type} AS item_type, \
             COALESCE({title}, '') AS title, \
             COALESCE({snippet}, '') AS snippet, \
             {tags} AS tags, \
             {status} AS status, \
             {author_type}::text AS author_type, \
             {author_id}::text AS author_id, \
             COALESCE(CASE WHEN {author_type} = 'human' THEN u.display_name ELSE ag.display_name END, {author_id}::text) AS author_name, \
             ({vote_score})::BIGINT AS vote_score, \
             ({answers_count})::BIGINT AS answers_count, \
             (EXTRACT(EPOCH FROM {alias}.created_at) * 1000)::BIGINT AS created_ms, \
             (EXTRACT(EPOCH FROM {alias}.updated_at) * 1000)::BIGINT AS updated_ms, \
             ({score})::FLOAT8 AS score",
            alias = sql.alias,
            item_type = sql.item_type,
            title = sql.title,
            tags = sql.tags,
            status = sql.status,
            author_type = sql.author_type,
            author_id = sql.author_id,
            vote_score = sql.vote_score,
        )
    }

    fn lexical_sql(&self, kind: ItemKind, filters: &SearchFilters, params: &mut SqlParams) -> String {
        let sql = kind_sql(kind);
        let (tsvector, tsquery) = text_match(&sql);
        let snippet = format!(
            "ts_headline('{TEXT_SEARCH_CONFIG}', {}, {tsquery}, '{HEADLINE_OPTIONS}')",
            sql.excerpt
        );
        let score = format!("ts_rank({tsvector}, {tsquery})");
        let filter_sql = filter_clause(&sql, filters, params);
        format!(
            "SELECT {columns} FROM {from} \
             WHERE {alias}.deleted_at IS NULL AND {tsvector} @@ {tsquery} {filter_sql} \
             ORDER BY score DESC, {alias}.created_at DESC \
             LIMIT $2",
            columns = self.hit_columns(&sql, &snippet, &score),
            from = self.from_clause(kind, &sql),
            alias = sql.alias,
        )
    }

    fn lexical_count_sql(
        &self,
        kind: ItemKind,
        filters: &SearchFilters,
        params: &mut SqlParams,
    ) -> String {
        let sql = kind_sql(kind);
        let (tsvector, tsquery) = text_match(&sql);
        let filter_sql = filter_clause(&sql, filters, params);
        format!(
            "SELECT COUNT(*) FROM {from} \
             WHERE {alias}.deleted_at IS NULL AND {tsvector} @@ {tsquery} {filter_sql}",
            from = self.from_clause(kind, &sql),
            alias = sql.alias,
        )
    }

    fn semantic_sql(
        &self,
        kind: ItemKind,
        dims: usize,
        filters: &SearchFilters,
        params: &mut SqlParams,
    ) -> String {
        let sql = kind_sql(kind);
        let distance = format!("{}.embedding::vector({dims}) <=> $1", sql.alias);
        let snippet = format!("LEFT({}, {SNIPPET_CHARS})", sql.excerpt);
        let score = format!("1 - ({distance})");
        let filter_sql = filter_clause(&sql, filters, params);
        format!(
            "SELECT {columns} FROM {from} \
             WHERE {alias}.deleted_at IS NULL \
               AND {alias}.embedding IS NOT NULL \
               AND vector_dims({alias}.embedding) = {dims} {filter_sql} \
             ORDER BY {distance} ASC \
             LIMIT $2",
            columns = self.hit_columns(&sql, &snippet, &score),
            from = self.from_clause(kind, &sql),
            alias = sql.alias,
        )
    }

    async fn ranked(
        &self,
        kind: ItemKind,
        sql: String,
        params: SqlParams,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|param| &**param as &(dyn ToSql + Sync))
            .collect();
        let rows = self.client.query(sql.as_str(), &refs).await?;
        rows.iter().map(|row| hit_from_row(kind, row)).collect()
    }

    async fn counted(&self, sql: String, params: SqlParams) -> Result<u64, StoreError> {
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|param| &**param as &(dyn ToSql + Sync))
            .collect();
        let row = self.client.query_one(sql.as_str(), &refs).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    fn missing_sql(&self, kinds: &[ItemKind]) -> String {
        let selects: Vec<String> = kinds
            .iter()
            .map(|kind| {
                let sql = kind_sql(*kind);
                let [f1, f2, f3, f4] = sql.content_fields;
                format!(
                    "SELECT '{label}'::text AS kind, \
                            {alias}.id::text AS id, \
                            {post_type} AS post_type, \
                            {f1}::text AS f1, {f2}::text AS f2, {f3}::text AS f3, {f4}::text AS f4, \
                            (EXTRACT(EPOCH FROM {alias}.created_at) * 1000)::BIGINT AS created_ms, \
                            (EXTRACT(EPOCH FROM {alias}.updated_at) * 1000)::BIGINT AS updated_ms \
                     FROM {table} {alias} \
                     WHERE {alias}.deleted_at IS NULL \
                       AND ({alias}.embedding IS NULL OR vector_dims({alias}.embedding) <> $1) \
                       AND btrim(COALESCE({document}, '')) <> ''",
                    label = kind.as_str(),
                    document = sql.document,
                    alias = sql.alias,
                    post_type = sql.post_type.unwrap_or("NULL::text"),
                    table = self.table(kind.table()),
                )
            })
            .collect();
        format!(
            "SELECT kind, id, post_type, f1, f2, f3, f4, created_ms, updated_ms \
             FROM ({union}) missing \
             WHERE $2::BIGINT IS NULL \
                OR (created_ms, id COLLATE \"C\", kind COLLATE \"C\") > ($2::BIGINT, $3::text, $4::text) \
             ORDER BY created_ms, id COLLATE \"C\", kind COLLATE \"C\" \
             LIMIT $5",
            union = selects.join(" UNION ALL "),
        )
    }
}

/// `(tsvector, tsquery)` expressions; the tsquery text is always `$1`.
fn text_match(sql: &KindSql) -> (String, String) {
    (
        format!("to_tsvector('{TEXT_SEARCH_CONFIG}', {})", sql.document),
        format!("to_tsquery('{TEXT_SEARCH_CONFIG}', $1)"),
    )
}

fn filter_clause(sql: &KindSql, filters: &SearchFilters, params: &mut SqlParams) -> String {
    let mut clauses = Vec::new();
    let mut push = |template: String, param: Box<dyn ToSql + Sync + Send>, params: &mut SqlParams| {
        params.push(param);
        clauses.push(template.replace("{n}", &format!("${}", params.len())));
    };
    if let (Some(post_type), Some(column)) = (filters.post_type, sql.post_type) {
        push(
            format!("AND {column} = {{n}}"),
            Box::new(post_type.as_str().to_string()),
            params,
        );
    }
    if !filters.tags.is_empty() {
        push(
            format!("AND {} && {{n}}::text[]", sql.tags),
            Box::new(filters.tags.clone()),
            params,
        );
    }
    if let Some(status) = &filters.status {
        push(format!("AND {} = {{n}}", sql.status), Box::new(status.clone()), params);
    }
    if let Some(author_id) = &filters.author_id {
        push(
            format!("AND {}::text = {{n}}", sql.author_id),
            Box::new(author_id.clone()),
            params,
        );
    }
    if let Some(author_type) = filters.author_type {
        push(
            format!("AND {}::text = {{n}}", sql.author_type),
            Box::new(author_type.as_str().to_string()),
            params,
        );
    }
    if let Some(from) = filters.from_date {
        push(
            format!("AND {}.created_at >= {{n}}::date", sql.alias),
            Box::new(from),
            params,
        );
    }
    if let Some(to) = filters.to_date {
        push(
            format!("AND {}.created_at < {{n}}::date + 1", sql.alias),
            Box::new(to),
            params,
        );
    }
    clauses.join(" ")
}

fn hit_from_row(kind: ItemKind, row: &Row) -> Result<SearchHit, StoreError> {
    let id: String = row.try_get("id")?;
    let author_type: String = row.try_get("author_type")?;
    let author_type = author_type.parse().map_err(StoreError::InvalidRow)?;
    Ok(SearchHit {
        key: ItemKey::new(kind, id),
        item_type: row.try_get("item_type")?,
        title: row.try_get("title")?,
        snippet: row.try_get("snippet")?,
        metadata: ItemMetadata {
            tags: row.try_get("tags")?,
            status: row.try_get("status")?,
            author: Author {
                id: row.try_get("author_id")?,
                author_type,
                display_name: row.try_get("author_name")?,
            },
            vote_score: row.try_get("vote_score")?,
            answers_count: row.try_get("answers_count")?,
        },
        created_epoch_ms: row.try_get("created_ms")?,
        updated_epoch_ms: row.try_get("updated_ms")?,
        raw_score: row.try_get("score")?,
    })
}

fn item_from_row(row: &Row) -> Result<SearchableItem, StoreError> {
    let kind: String = row.try_get("kind")?;
    let kind: ItemKind = kind.parse().map_err(StoreError::InvalidRow)?;
    let fields: [String; 4] = [
        row.try_get("f1")?,
        row.try_get("f2")?,
        row.try_get("f3")?,
        row.try_get("f4")?,
    ];
    let [f1, f2, f3, f4] = fields;
    let content = match kind {
        ItemKind::Post => {
            let post_type: Option<String> = row.try_get("post_type")?;
            let post_type: PostType = post_type
                .as_deref()
                .unwrap_or_default()
                .parse()
                .map_err(StoreError::InvalidRow)?;
            ItemContent::Post {
                post_type,
                title: f1,
                description: f2,
            }
        }
        ItemKind::Answer => ItemContent::Answer { content: f1 },
        ItemKind::Approach => ItemContent::Approach {
            angle: f1,
            method: f2,
            outcome: f3,
            solution: f4,
        },
    };
    let mut item = SearchableItem::new(row.try_get::<_, String>("id")?, content, row.try_get("created_ms")?);
    item.updated_epoch_ms = row.try_get("updated_ms")?;
    Ok(item)
}

fn merge_ranked(per_kind: Vec<Vec<SearchHit>>, limit: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = per_kind.into_iter().flatten().collect();
    hits.sort_by(|a, b| {
        b.raw_score
            .total_cmp(&a.raw_score)
            .then_with(|| b.created_epoch_ms.cmp(&a.created_epoch_ms))
            .then_with(|| a.key.cmp(&b.key))
    });
    hits.truncate(limit);
    hits
}

fn limit_param(limit: usize) -> Result<i64, StoreError> {
    i64::try_from(limit).map_err(|_| StoreError::InvalidRow(format!("limit {limit} exceeds i64")))
}

fn dims_param(dims: usize) -> Result<i32, StoreError> {
    i32::try_from(dims).map_err(|_| StoreError::InvalidRow(format!("dimension {dims} exceeds i32")))
}

#[async_trait]
impl SearchStore for PgStore {
    async fn lexical_ranking(&self, query: LexicalQuery<'_>) -> Result<Vec<SearchHit>, StoreError> {
        let Some(tsquery) = build_tsquery(query.text) else {
            return Ok(Vec::new());
        };
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit_param(query.limit)?;
        let per_kind = try_join_all(query.kinds.iter().map(|kind| {
            let mut params: SqlParams = vec![Box::new(tsquery.clone()), Box::new(limit)];
            let sql = self.lexical_sql(*kind, query.filters, &mut params);
            self.ranked(*kind, sql, params)
        }))
        .await?;
        Ok(merge_ranked(per_kind, query.limit))
    }

    async fn lexical_count(&self, query: LexicalQuery<'_>) -> Result<u64, StoreError> {
        let Some(tsquery) = build_tsquery(query.text) else {
            return Ok(0);
        };
        let per_kind = try_join_all(query.kinds.iter().map(|kind| {
            let mut params: SqlParams = vec![Box::new(tsquery.clone())];
            let sql = self.lexical_count_sql(*kind, query.filters, &mut params);
            self.counted(sql, params)
        }))
        .await?;
        Ok(per_kind.into_iter().sum())
    }

    async fn semantic_ranking(&self, query: SemanticQuery<'_>) -> Result<Vec<SearchHit>, StoreError> {
        if query.embedding.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        let dims = query.embedding.len();
        let vector = Vector::from(query.embedding.to_vec());
        let limit = limit_param(query.limit)?;
        let per_kind = try_join_all(query.kinds.iter().map(|kind| {
            let mut params: SqlParams = vec![Box::new(vector.clone()), Box::new(limit)];
            let sql = self.semantic_sql(*kind, dims, query.filters, &mut params);
            self.ranked(*kind, sql, params)
        }))
        .await?;
        Ok(merge_ranked(per_kind, query.limit))
    }
}

#[async_trait]
impl EmbeddingStore for PgStore {
    async fn count_missing(&self, kinds: &[ItemKind], dims: usize) -> Result<u64, StoreError> {
        let dims = dims_param(dims)?;
        let mut total = 0u64;
        for kind in kinds {
            let sql = format!(
                "SELECT COUNT(*) FROM {} \
                 WHERE deleted_at IS NULL AND (embedding IS NULL OR vector_dims(embedding) <> $1) \
                   AND btrim(COALESCE({}, '')) <> ''",
                self.table(kind.table()),
                kind_sql(*kind).bare_document,
            );
            let row = self.client.query_one(sql.as_str(), &[&dims]).await?;
            let count: i64 = row.try_get(0)?;
            total += count.max(0) as u64;
        }
        Ok(total)
    }

    async fn next_missing_batch(
        &self,
        kinds: &[ItemKind],
        dims: usize,
        cursor: Option<&BackfillCursor>,
        limit: usize,
    ) -> Result<Vec<SearchableItem>, StoreError> {
        if kinds.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let dims = dims_param(dims)?;
        let after_ms: Option<i64> = cursor.map(|c| c.created_epoch_ms);
        let after_id: Option<String> = cursor.map(|c| c.key.id.clone());
        let after_kind: Option<String> = cursor.map(|c| c.key.kind.as_str().to_string());
        let limit = limit_param(limit)?;
        let sql = self.missing_sql(kinds);
        let rows = self
            .client
            .query(
                sql.as_str(),
                &[&dims, &after_ms, &after_id, &after_kind, &limit],
            )
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn store_embedding(&self, key: &ItemKey, embedding: &[f32]) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET embedding = $1 WHERE id = $2::text::uuid AND deleted_at IS NULL",
            self.table(key.kind.table())
        );
        let vector = Vector::from(embedding.to_vec());
        let updated = self.client.execute(sql.as_str(), &[&vector, &key.id]).await?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: key.kind,
                id: key.id.clone(),
            });
        }
        Ok(())
    }
}

/// Enables the pgvector extension.
pub async fn ensure_vector_extension(client: &Client) -> Result<(), StoreError> {
    client
        .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
        .await?;
    Ok(())
}

/// Adds the untyped `embedding vector` column to a content table.
pub async fn ensure_embedding_column(
    client: &Client,
    schema: &str,
    kind: ItemKind,
) -> Result<(), StoreError> {
    let sql = format!(
        "ALTER TABLE {}.{} ADD COLUMN IF NOT EXISTS embedding vector",
        quote_ident(schema),
        quote_ident(kind.table())
    );
    client.execute(sql.as_str(), &[]).await?;
    Ok(())
}

/// Index name for the partial HNSW index of one dimensionality.
pub fn hnsw_index_name(kind: ItemKind, dims: usize) -> String {
    format!("{}_embedding_hnsw_{dims}_idx", sanitize_ident(kind.table()))
}

/// DDL for the cosine HNSW index over rows whose embedding has `dims` dimensions.
pub fn hnsw_index_sql(schema: &str, kind: ItemKind, dims: usize) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {schema}.{table} \
         USING hnsw ((embedding::vector({dims})) vector_cosine_ops) \
         WHERE vector_dims(embedding) = {dims}",
        index = quote_ident(&hnsw_index_name(kind, dims)),
        schema = quote_ident(schema),
        table = quote_ident(kind.table()),
    )
}

/// Creates the partial HNSW index for the configured dimensionality.
pub async fn ensure_hnsw_index(
    client: &Client,
    schema: &str,
    kind: ItemKind,
    dims: usize,
) -> Result<(), StoreError> {
    client
        .execute(hnsw_index_sql(schema, kind, dims).as_str(), &[])
        .await?;
    Ok(())
}

/// Creates the GIN expression index the lexical ranking uses.
pub async fn ensure_fts_index(client: &Client, schema: &str, kind: ItemKind) -> Result<(), StoreError> {
    let sql = format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {schema}.{table} \
         USING GIN (to_tsvector('{TEXT_SEARCH_CONFIG}', {document}))",
        index = quote_ident(&format!("{}_fts_idx", sanitize_ident(kind.table()))),
        schema = quote_ident(schema),
        table = quote_ident(kind.table()),
        document = kind_sql(kind).bare_document,
    );
    client.execute(sql.as_str(), &[]).await?;
    Ok(())
}

/// Refreshes planner statistics after index changes.
pub async fn analyze_table(client: &Client, schema: &str, kind: ItemKind) -> Result<(), StoreError> {
    let sql = format!("ANALYZE {}.{}", quote_ident(schema), quote_ident(kind.table()));
    client.execute(sql.as_str(), &[]).await?;
    Ok(())
}

/// Runs every DDL step for `kinds`; safe to repeat.
pub async fn ensure_schema(
    client: &Client,
    schema: &str,
    kinds: &[ItemKind],
    dims: usize,
) -> Result<(), StoreError> {
    ensure_vector_extension(client).await?;
    for kind in kinds {
        ensure_embedding_column(client, schema, *kind).await?;
        ensure_hnsw_index(client, schema, *kind, dims).await?;
        ensure_fts_index(client, schema, *kind).await?;
        analyze_table(client, schema, *kind).await?;
        info!(table = kind.table(), dims, "search schema ready");
    }
    Ok(())
}
