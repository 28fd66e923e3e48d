//! FTS5 index for grade search
//!
//! Three external-content-free FTS5 tables mirror the searchable text of primary
//! storage. Queries run a `MATCH` per category, rank with `bm25()` and join back
//! to primary storage for population counts and summary tags.
//! The index is (re)built offline by `rebuild_search_index` on a writable handle.

use crate::classifier::SearchQuery;
use crate::database::{entity_sql, row_to_result, Database, DatabaseError, DatabaseResult};
use crate::interface::{Category, MatchSource, Relevance, RetrievalError, RetrievalTier, SearchResult};
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// FTS5 table backing one category
struct IndexTable {
    name: &'static str,
    /// Column joined back to the primary table's id
    key: &'static str,
    /// `bm25()` column weights, one per FTS column in declaration order
    weights: &'static str,
}

const COURSES_INDEX: IndexTable = IndexTable {
    name: "courses_fts",
    key: "class_id",
    // class_id, dept_abbr, course_num, course_code, compact_code, class_desc
    weights: "0.0, 8.0, 4.0, 10.0, 10.0, 1.0",
};

const PROFESSORS_INDEX: IndexTable = IndexTable {
    name: "professors_fts",
    key: "professor_id",
    weights: "0.0, 1.0",
};

const DEPARTMENTS_INDEX: IndexTable = IndexTable {
    name: "departments_fts",
    key: "dept_abbr",
    // dept_abbr, dept_name
    weights: "10.0, 2.0",
};

fn index_table(category: Category) -> &'static IndexTable {
    match category {
        Category::Course => &COURSES_INDEX,
        Category::Professor => &PROFESSORS_INDEX,
        Category::Department => &DEPARTMENTS_INDEX,
    }
}

/// `MATCH` against the category's index, best `bm25` first, then population
fn indexed_query_sql(category: Category) -> String {
    let index = index_table(category);
    let sql = entity_sql(category);
    format!(
        "SELECT {columns}, m.score
         FROM (SELECT {key} AS entity_id, bm25({name}, {weights}) AS score
               FROM {name} WHERE {name} MATCH ?1) m
         JOIN {from} ON {id} = m.entity_id
         {joins}
         ORDER BY m.score ASC, {population} DESC, {id} ASC
         LIMIT ?2",
        columns = sql.columns,
        key = index.key,
        name = index.name,
        weights = index.weights,
        from = sql.from,
        id = sql.id,
        joins = sql.joins,
        population = sql.population,
    )
}

/// Primary retrieval tier: entity-scoped FTS5 queries
pub struct IndexedTier {
    db: Arc<Database>,
}

impl IndexedTier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl RetrievalTier for IndexedTier {
    fn source(&self) -> MatchSource {
        MatchSource::Indexed
    }

    fn retrieve(
        &self,
        query: &SearchQuery,
        category: Category,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let expression = query.fts_expression(category);
        let sql = indexed_query_sql(category);
        let score_column = entity_sql(category).column_count;

        let rows = self.db.with_interruptible(token, runtime, |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params![expression, limit as i64], |row| {
                let bm25: f64 = row.get(score_column)?;
                row_to_result(category, row, Relevance::indexed(bm25))
            })?;
            let results = rows.collect::<rusqlite::Result<Vec<_>>>();
            results
        })?;

        #[cfg(feature = "perf-log")]
        tracing::debug!(
            category = category.as_str(),
            rows = rows.len(),
            elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
            "indexed retrieval"
        );

        Ok(rows)
    }
}

/// Row counts written by a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub courses: usize,
    pub professors: usize,
    pub departments: usize,
}

/// Whether all three index tables exist
pub fn has_search_index(db: &Database) -> DatabaseResult<bool> {
    for category in Category::ALL {
        if !db.table_exists(index_table(category).name)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Drop and recreate the FTS5 tables from primary storage in one transaction.
pub fn rebuild_search_index(db: &Database) -> DatabaseResult<IndexStats> {
    if db.is_read_only() {
        return Err(DatabaseError::ReadOnly);
    }

    let mut conn = db.get_conn()?;
    let tx = conn.transaction()?;
    tx.execute_batch(
        "
        DROP TABLE IF EXISTS courses_fts;
        DROP TABLE IF EXISTS professors_fts;
        DROP TABLE IF EXISTS departments_fts;

        CREATE VIRTUAL TABLE courses_fts USING fts5(
            class_id UNINDEXED,
            dept_abbr,
            course_num,
            course_code,
            compact_code,
            class_desc,
            tokenize = 'unicode61 remove_diacritics 2'
        );

        CREATE VIRTUAL TABLE professors_fts USING fts5(
            professor_id UNINDEXED,
            name,
            tokenize = 'unicode61 remove_diacritics 2'
        );

        CREATE VIRTUAL TABLE departments_fts USING fts5(
            dept_abbr,
            dept_name,
            tokenize = 'unicode61 remove_diacritics 2'
        );
    ",
    )?;

    let courses = tx.execute(
        "INSERT INTO courses_fts (class_id, dept_abbr, course_num, course_code, compact_code, class_desc)
         SELECT id,
                COALESCE(dept_abbr, ''),
                COALESCE(course_num, ''),
                TRIM(COALESCE(dept_abbr, '') || ' ' || COALESCE(course_num, '')),
                COALESCE(dept_abbr, '') || COALESCE(course_num, ''),
                class_desc
         FROM classdistribution",
        [],
    )?;
    let professors = tx.execute(
        "INSERT INTO professors_fts (professor_id, name) SELECT id, name FROM professor",
        [],
    )?;
    let departments = tx.execute(
        "INSERT INTO departments_fts (dept_abbr, dept_name) SELECT dept_abbr, dept_name FROM departmentdistribution",
        [],
    )?;
    tx.commit()?;

    info!(courses, professors, departments, "rebuilt search index");
    Ok(IndexStats { courses, professors, departments })
}
