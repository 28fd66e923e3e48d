//! SQLite access layer for grade data
//!
//! Primary storage: professors, courses (`classdistribution`), departments,
//! per-instructor distributions and per-term grade counts, plus the summary
//! tables joined into search rows for tag rendering.
//! Uses r2d2 connection pooling; the request path opens the file read-only.

use crate::interface::{
    CandidateSource, Category, CourseResult, DepartmentResult, GradeSummary, MatchSource,
    ProfessorResult, Relevance, RetrievalError, RetrievalTier, SearchResult,
};
use crate::classifier::SearchQuery;
use crate::models::{aggregate_grades, GradeCounts};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Missing table: {0}")]
    MissingTable(String),
    #[error("Query interrupted")]
    Interrupted,
    #[error("Database opened read-only")]
    ReadOnly,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Map statement failures onto the cases callers recover from differently
fn map_query_error(e: rusqlite::Error) -> DatabaseError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ffi::ErrorCode::OperationInterrupted =>
        {
            DatabaseError::Interrupted
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) | rusqlite::Error::SqlInputError { msg, .. }
            if msg.starts_with("no such table") =>
        {
            DatabaseError::MissingTable(msg.trim_start_matches("no such table:").trim().to_string())
        }
        _ => DatabaseError::Sqlite(e),
    }
}

/// Escape `LIKE` wildcards and the escape character itself
pub(crate) fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ─────────────────────────────────────────────────────────────────────────────
// ENTITY SQL
// ─────────────────────────────────────────────────────────────────────────────

/// SQL fragments to select one category's rows in the shape `row_to_result` reads
pub(crate) struct EntitySql {
    /// Primary table with its alias
    pub from: &'static str,
    pub columns: &'static str,
    pub joins: &'static str,
    pub population: &'static str,
    pub id: &'static str,
    pub substring_filter: &'static str,
    /// Number of columns in `columns`; extra columns start at this index
    pub column_count: usize,
}

const COURSE_SQL: EntitySql = EntitySql {
    from: "classdistribution c",
    columns: "c.id, COALESCE(c.dept_abbr, ''), COALESCE(c.course_num, ''), c.class_desc, \
              c.total_students, s.average_gpa, s.most_grade, s.most_percent",
    joins: "LEFT JOIN class_summary s ON s.class_id = c.id",
    population: "c.total_students",
    id: "c.id",
    substring_filter: r"REPLACE(LOWER(COALESCE(c.dept_abbr, '') || COALESCE(c.course_num, '')), ' ', '') LIKE ?1 ESCAPE '\'
                      OR REPLACE(LOWER(c.class_desc), ' ', '') LIKE ?1 ESCAPE '\'",
    column_count: 8,
};

const PROFESSOR_SQL: EntitySql = EntitySql {
    from: "professor p",
    columns: "p.id, p.name, COALESCE(pop.total_students, 0), p.RMP_score, \
              s.average_gpa, s.most_grade, s.most_percent",
    joins: "LEFT JOIN (SELECT d.instructor_id AS instructor_id, SUM(t.students) AS total_students
                       FROM distribution d JOIN termdistribution t ON t.dist_id = d.id
                       GROUP BY d.instructor_id) pop ON pop.instructor_id = p.id
            LEFT JOIN instructor_summary s ON s.instructor_id = p.id",
    population: "COALESCE(pop.total_students, 0)",
    id: "p.id",
    substring_filter: r"REPLACE(LOWER(p.name), ' ', '') LIKE ?1 ESCAPE '\'",
    column_count: 7,
};

const DEPARTMENT_SQL: EntitySql = EntitySql {
    from: "departmentdistribution d",
    columns: "d.dept_abbr, d.dept_name, COALESCE(pop.total_students, 0), \
              s.average_gpa, s.most_grade, s.most_percent",
    joins: "LEFT JOIN (SELECT dept_abbr, SUM(total_students) AS total_students
                       FROM classdistribution GROUP BY dept_abbr) pop ON pop.dept_abbr = d.dept_abbr
            LEFT JOIN department_summary s ON s.dept_abbr = d.dept_abbr",
    population: "COALESCE(pop.total_students, 0)",
    id: "d.dept_abbr",
    substring_filter: r"REPLACE(LOWER(d.dept_abbr), ' ', '') LIKE ?1 ESCAPE '\'
                      OR REPLACE(LOWER(d.dept_name), ' ', '') LIKE ?1 ESCAPE '\'",
    column_count: 6,
};

pub(crate) fn entity_sql(category: Category) -> &'static EntitySql {
    match category {
        Category::Course => &COURSE_SQL,
        Category::Professor => &PROFESSOR_SQL,
        Category::Department => &DEPARTMENT_SQL,
    }
}

fn summary_at(row: &Row, first: usize) -> rusqlite::Result<Option<GradeSummary>> {
    let average_gpa: Option<f64> = row.get(first)?;
    let most_grade: Option<String> = row.get(first + 1)?;
    let most_percent: Option<f64> = row.get(first + 2)?;
    if average_gpa.is_none() && most_grade.is_none() {
        return Ok(None);
    }
    Ok(Some(GradeSummary {
        average_gpa: average_gpa.unwrap_or(0.0),
        most_grade: most_grade.unwrap_or_default(),
        most_percent: most_percent.unwrap_or(0.0),
    }))
}

/// Typed row mapping for the columns of `entity_sql(category)`
pub(crate) fn row_to_result(
    category: Category,
    row: &Row,
    relevance: Relevance,
) -> rusqlite::Result<SearchResult> {
    Ok(match category {
        Category::Course => SearchResult::Course(CourseResult {
            id: row.get(0)?,
            dept_abbr: row.get(1)?,
            course_num: row.get(2)?,
            class_desc: row.get(3)?,
            total_students: row.get(4)?,
            summary: summary_at(row, 5)?,
            relevance,
        }),
        Category::Professor => SearchResult::Professor(ProfessorResult {
            id: row.get(0)?,
            name: row.get(1)?,
            total_students: row.get(2)?,
            rmp_score: row.get(3)?,
            summary: summary_at(row, 4)?,
            relevance,
        }),
        Category::Department => SearchResult::Department(DepartmentResult {
            dept_abbr: row.get(0)?,
            dept_name: row.get(1)?,
            total_students: row.get(2)?,
            summary: summary_at(row, 3)?,
            relevance,
        }),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// DATABASE
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe database wrapper using connection pooling
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    read_only: bool,
}

impl Database {
    /// Open or create a writable database and ensure the schema exists.
    /// Used by index population and fixture generation, never by the request path.
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys=ON;
                PRAGMA synchronous=NORMAL;
                PRAGMA cache_size=-32000;
            ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(2).build(manager)?;

        let db = Self { pool, read_only: false };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an existing database for queries only.
    pub fn open_read_only<P: AsRef<Path>>(path: P, pool_size: u32) -> DatabaseResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DatabaseError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database not found: {}", path.display()),
            )));
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA query_only=ON;
                    PRAGMA cache_size=-16000;
                ",
                )?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(5))
            .build(manager)?;

        Ok(Self { pool, read_only: true })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys=ON;")?;
            Ok(())
        });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool, read_only: false };
        db.setup_schema()?;
        Ok(db)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Get a connection from the pool
    pub(crate) fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS professor (
                id INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                RMP_score FLOAT,
                RMP_diff FLOAT,
                RMP_would_take_again FLOAT,
                RMP_link VARCHAR(512)
            );

            CREATE TABLE IF NOT EXISTS departmentdistribution (
                id INTEGER PRIMARY KEY,
                campus VARCHAR(8),
                dept_abbr VARCHAR(4) NOT NULL UNIQUE,
                dept_name VARCHAR(255) NOT NULL
            );

            CREATE TABLE IF NOT EXISTS classdistribution (
                id INTEGER PRIMARY KEY,
                campus VARCHAR(8),
                dept_abbr VARCHAR(4),
                course_num VARCHAR(8),
                class_desc VARCHAR(255) NOT NULL,
                total_students INTEGER NOT NULL DEFAULT 0,
                total_grades JSON NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS distribution (
                id INTEGER PRIMARY KEY,
                class_id INTEGER NOT NULL REFERENCES classdistribution(id) ON DELETE CASCADE,
                instructor_id INTEGER REFERENCES professor(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS termdistribution (
                id INTEGER PRIMARY KEY,
                dist_id INTEGER NOT NULL REFERENCES distribution(id) ON DELETE CASCADE,
                students INTEGER NOT NULL,
                term INTEGER NOT NULL,
                grades JSON NOT NULL
            );

            CREATE TABLE IF NOT EXISTS class_summary (
                class_id INTEGER PRIMARY KEY,
                average_gpa FLOAT,
                most_grade VARCHAR(2),
                most_percent FLOAT
            );

            CREATE TABLE IF NOT EXISTS instructor_summary (
                instructor_id INTEGER PRIMARY KEY,
                average_gpa FLOAT,
                most_grade VARCHAR(2),
                most_percent FLOAT
            );

            CREATE TABLE IF NOT EXISTS department_summary (
                dept_abbr VARCHAR(4) PRIMARY KEY,
                average_gpa FLOAT,
                most_grade VARCHAR(2),
                most_percent FLOAT
            );

            CREATE INDEX IF NOT EXISTS idx_class_dept ON classdistribution(dept_abbr);
            CREATE INDEX IF NOT EXISTS idx_distribution_class ON distribution(class_id);
            CREATE INDEX IF NOT EXISTS idx_distribution_instructor ON distribution(instructor_id);
            CREATE INDEX IF NOT EXISTS idx_termdistribution_dist ON termdistribution(dist_id);
            "#,
        )?;
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Run `f` on a pooled connection with SQLite C-level interrupt support.
    ///
    /// A watcher task interrupts the running statement when `token` is cancelled;
    /// it is aborted when `f` returns.
    pub(crate) fn with_interruptible<T>(
        &self,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> DatabaseResult<T> {
        if token.is_cancelled() {
            return Err(DatabaseError::Interrupted);
        }

        let conn = self.get_conn()?;
        let interrupt_handle = conn.get_interrupt_handle();

        let token_clone = token.clone();
        let watcher = runtime.spawn(async move {
            token_clone.cancelled().await;
            interrupt_handle.interrupt();
        });
        let _abort_guard = AbortOnDropHandle::new(watcher);

        f(&conn).map_err(map_query_error)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read path
    // ─────────────────────────────────────────────────────────────────────────

    /// Case- and space-insensitive substring match, most populous first.
    /// `needle` must already be lowercased with whitespace removed.
    pub fn substring_matches(
        &self,
        category: Category,
        needle: &str,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> DatabaseResult<Vec<SearchResult>> {
        let sql = entity_sql(category);
        let query = format!(
            "SELECT {} FROM {} {} WHERE {} ORDER BY {} DESC, {} ASC LIMIT ?2",
            sql.columns, sql.from, sql.joins, sql.substring_filter, sql.population, sql.id
        );
        let pattern = format!("%{}%", escape_like(needle));

        self.with_interruptible(token, runtime, |conn| {
            let mut stmt = conn.prepare_cached(&query)?;
            let rows = stmt.query_map(params![pattern, limit as i64], |row| {
                row_to_result(category, row, Relevance::substring())
            })?;
            let results = rows.collect::<rusqlite::Result<Vec<_>>>();
            results
        })
    }

    /// Top entities of a category by population
    pub fn top_by_population(
        &self,
        category: Category,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> DatabaseResult<Vec<SearchResult>> {
        let sql = entity_sql(category);
        let query = format!(
            "SELECT {} FROM {} {} ORDER BY {} DESC, {} ASC LIMIT ?1",
            sql.columns, sql.from, sql.joins, sql.population, sql.id
        );

        self.with_interruptible(token, runtime, |conn| {
            let mut stmt = conn.prepare_cached(&query)?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                row_to_result(category, row, Relevance::fuzzy(0.0))
            })?;
            let results = rows.collect::<rusqlite::Result<Vec<_>>>();
            results
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write path (fixtures and demo data)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn insert_department(&self, dept_abbr: &str, dept_name: &str) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO departmentdistribution (campus, dept_abbr, dept_name) VALUES ('ATL', ?1, ?2)
             ON CONFLICT(dept_abbr) DO UPDATE SET dept_name = excluded.dept_name",
            params![dept_abbr, dept_name],
        )?;
        Ok(())
    }

    /// Insert a course with no recorded students yet. Returns its id.
    pub fn insert_course(&self, dept_abbr: &str, course_num: &str, class_desc: &str) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO classdistribution (campus, dept_abbr, course_num, class_desc, total_students, total_grades)
             VALUES ('ATL', ?1, ?2, ?3, 0, '{}')",
            params![dept_abbr, course_num, class_desc],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_professor(&self, name: &str, rmp_score: Option<f64>) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO professor (name, RMP_score) VALUES (?1, ?2)",
            params![name, rmp_score],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record one term of grades for a course section taught by `professor_id`
    /// (`None` for an unlisted instructor). Adds to the course totals.
    pub fn record_term(
        &self,
        class_id: i64,
        professor_id: Option<i64>,
        term: u32,
        grades: &GradeCounts,
    ) -> DatabaseResult<i64> {
        let students: i64 = grades.values().filter(|&&c| c > 0).sum();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM distribution WHERE class_id = ?1 AND instructor_id IS ?2",
                params![class_id, professor_id],
                |row| row.get(0),
            )
            .optional()?;
        let dist_id = match existing {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO distribution (class_id, instructor_id) VALUES (?1, ?2)",
                    params![class_id, professor_id],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO termdistribution (dist_id, students, term, grades) VALUES (?1, ?2, ?3, ?4)",
            params![dist_id, students, term, serde_json::to_string(grades)?],
        )?;
        let term_id = tx.last_insert_rowid();

        let total_grades: String = tx.query_row(
            "SELECT total_grades FROM classdistribution WHERE id = ?1",
            params![class_id],
            |row| row.get(0),
        )?;
        let mut totals: GradeCounts = serde_json::from_str(&total_grades)?;
        for (grade, count) in grades {
            *totals.entry(grade.clone()).or_insert(0) += count;
        }
        tx.execute(
            "UPDATE classdistribution SET total_students = total_students + ?1, total_grades = ?2 WHERE id = ?3",
            params![students, serde_json::to_string(&totals)?, class_id],
        )?;

        tx.commit()?;
        Ok(term_id)
    }

    /// Recompute `class_summary`, `instructor_summary` and `department_summary`
    /// from the recorded term distributions.
    pub fn refresh_summaries(&self) -> DatabaseResult<()> {
        let mut conn = self.get_conn()?;

        let mut by_class: HashMap<i64, Vec<GradeCounts>> = HashMap::new();
        let mut by_instructor: HashMap<i64, Vec<GradeCounts>> = HashMap::new();
        let mut by_department: HashMap<String, Vec<GradeCounts>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT d.class_id, d.instructor_id, c.dept_abbr, t.grades
                 FROM termdistribution t
                 JOIN distribution d ON d.id = t.dist_id
                 JOIN classdistribution c ON c.id = d.class_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            for row in rows {
                let (class_id, instructor_id, dept_abbr, grades) = row?;
                let grades: GradeCounts = serde_json::from_str(&grades)?;
                if let Some(instructor_id) = instructor_id {
                    by_instructor.entry(instructor_id).or_default().push(grades.clone());
                }
                if let Some(dept_abbr) = dept_abbr {
                    by_department.entry(dept_abbr).or_default().push(grades.clone());
                }
                by_class.entry(class_id).or_default().push(grades);
            }
        }

        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM class_summary; DELETE FROM instructor_summary; DELETE FROM department_summary;",
        )?;
        {
            let mut insert_class = tx.prepare(
                "INSERT INTO class_summary (class_id, average_gpa, most_grade, most_percent) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (class_id, grades) in &by_class {
                if let Some(s) = aggregate_grades(grades) {
                    insert_class.execute(params![class_id, s.average_gpa, s.most_grade, s.most_percent])?;
                }
            }

            let mut insert_instructor = tx.prepare(
                "INSERT INTO instructor_summary (instructor_id, average_gpa, most_grade, most_percent) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (instructor_id, grades) in &by_instructor {
                if let Some(s) = aggregate_grades(grades) {
                    insert_instructor.execute(params![instructor_id, s.average_gpa, s.most_grade, s.most_percent])?;
                }
            }

            let mut insert_department = tx.prepare(
                "INSERT INTO department_summary (dept_abbr, average_gpa, most_grade, most_percent) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (dept_abbr, grades) in &by_department {
                if let Some(s) = aggregate_grades(grades) {
                    insert_department.execute(params![dept_abbr, s.average_gpa, s.most_grade, s.most_percent])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SUBSTRING TIER
// ─────────────────────────────────────────────────────────────────────────────

/// Fallback retrieval directly against primary storage
pub struct SubstringTier {
    db: Arc<Database>,
}

impl SubstringTier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl RetrievalTier for SubstringTier {
    fn source(&self) -> MatchSource {
        MatchSource::Substring
    }

    fn retrieve(
        &self,
        query: &SearchQuery,
        category: Category,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let needle = query.compact();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.db.substring_matches(category, &needle, limit, token, runtime)?)
    }
}

impl CandidateSource for Database {
    fn candidate_pool(
        &self,
        category: Category,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        Ok(self.top_by_population(category, limit, token, runtime)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, Classification};

    fn grades(pairs: &[(&str, i64)]) -> GradeCounts {
        pairs.iter().map(|(g, c)| (g.to_string(), *c)).collect()
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_department("CS", "Computer Science").unwrap();
        db.insert_department("MATH", "Mathematics").unwrap();
        let cs1301 = db.insert_course("CS", "1301", "Introduction to Computing").unwrap();
        let cs1331 = db.insert_course("CS", "1331", "Intro to Object Oriented Programming").unwrap();
        let math1551 = db.insert_course("MATH", "1551", "Differential Calculus").unwrap();
        let smith = db.insert_professor("Smith, John", Some(4.2)).unwrap();
        let lee = db.insert_professor("Lee, Ana", None).unwrap();
        db.record_term(cs1301, Some(smith), 202502, &grades(&[("A", 300), ("B", 100)])).unwrap();
        db.record_term(cs1301, Some(smith), 202408, &grades(&[("A", 50)])).unwrap();
        db.record_term(cs1331, Some(lee), 202502, &grades(&[("B", 120)])).unwrap();
        db.record_term(math1551, None, 202502, &grades(&[("C", 80), ("W", 5)])).unwrap();
        db.refresh_summaries().unwrap();
        db
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_record_term_updates_totals() {
        let db = seeded();
        let conn = db.get_conn().unwrap();
        let (students, totals): (i64, String) = conn
            .query_row(
                "SELECT total_students, total_grades FROM classdistribution WHERE course_num = '1301'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(students, 450);
        let totals: GradeCounts = serde_json::from_str(&totals).unwrap();
        assert_eq!(totals["A"], 350);

        let dists: i64 = conn
            .query_row("SELECT COUNT(*) FROM distribution", [], |row| row.get(0))
            .unwrap();
        assert_eq!(dists, 3, "same class and instructor share a distribution");
    }

    #[test]
    fn test_substring_matches_ignore_case_and_spaces() {
        let db = seeded();
        let rt = runtime();
        let token = CancellationToken::new();

        let rows = db
            .substring_matches(Category::Course, "cs13", 10, &token, rt.handle())
            .unwrap();
        assert_eq!(rows.len(), 2);
        // Most populous first
        assert!(matches!(&rows[0], SearchResult::Course(c) if c.course_num == "1301"));
        assert_eq!(rows[0].relevance().source, MatchSource::Substring);

        let rows = db
            .substring_matches(Category::Course, "differentialcalc", 10, &token, rt.handle())
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = db
            .substring_matches(Category::Professor, "smith,j", 10, &token, rt.handle())
            .unwrap();
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            SearchResult::Professor(p) => {
                assert_eq!(p.total_students, 450);
                assert_eq!(p.rmp_score, Some(4.2));
                assert!(p.summary.is_some());
            }
            other => panic!("Expected professor, got {:?}", other),
        }
    }

    #[test]
    fn test_substring_wildcards_are_literal() {
        let db = seeded();
        let rt = runtime();
        let token = CancellationToken::new();
        for needle in ["%", "_", "\\", "'--", "\";droptableprofessor;"] {
            let rows = db
                .substring_matches(Category::Department, needle, 10, &token, rt.handle())
                .unwrap();
            assert!(rows.is_empty(), "{:?} matched {:?}", needle, rows);
        }
    }

    #[test]
    fn test_top_by_population_and_summaries() {
        let db = seeded();
        let rt = runtime();
        let token = CancellationToken::new();

        let departments = db.top_by_population(Category::Department, 50, &token, rt.handle()).unwrap();
        let abbrs: Vec<_> = departments
            .iter()
            .map(|r| match r {
                SearchResult::Department(d) => (d.dept_abbr.clone(), d.total_students),
                other => panic!("Expected department, got {:?}", other),
            })
            .collect();
        assert_eq!(abbrs, vec![("CS".to_string(), 570), ("MATH".to_string(), 85)]);

        let professors = db.top_by_population(Category::Professor, 1, &token, rt.handle()).unwrap();
        assert_eq!(professors.len(), 1);
        assert!(matches!(&professors[0], SearchResult::Professor(p) if p.name == "Smith, John"));
    }

    #[test]
    fn test_cancelled_token_short_circuits() {
        let db = seeded();
        let rt = runtime();
        let token = CancellationToken::new();
        token.cancel();
        let result = db.substring_matches(Category::Course, "cs", 10, &token, rt.handle());
        assert!(matches!(result, Err(DatabaseError::Interrupted)));
    }

    #[test]
    fn test_missing_table_is_reported() {
        let db = seeded();
        let rt = runtime();
        let token = CancellationToken::new();
        let result = db.with_interruptible(&token, rt.handle(), |conn| {
            conn.query_row("SELECT COUNT(*) FROM courses_fts", [], |row| row.get::<_, i64>(0))
        });
        match result {
            Err(DatabaseError::MissingTable(table)) => assert_eq!(table, "courses_fts"),
            other => panic!("Expected MissingTable, got {:?}", other),
        }
    }

    #[test]
    fn test_substring_tier_uses_compact_text() {
        let db = Arc::new(seeded());
        let tier = SubstringTier::new(db);
        let rt = runtime();
        let token = CancellationToken::new();
        let query = match classify("Computer  Sci").unwrap() {
            Classification::Query(q) => q,
            Classification::Rejected => panic!("Expected query"),
        };
        let rows = tier.retrieve(&query, Category::Department, 10, &token, rt.handle()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(tier.source(), MatchSource::Substring);
    }

    #[test]
    fn test_read_only_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grades.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_department("CS", "Computer Science").unwrap();
        }

        let db = Database::open_read_only(&path, 2).unwrap();
        assert!(db.is_read_only());
        assert!(db.table_exists("professor").unwrap());
        assert!(db.insert_department("EE", "Electrical Engineering").is_err());
        assert!(matches!(
            crate::indexer::rebuild_search_index(&db),
            Err(DatabaseError::ReadOnly)
        ));

        assert!(matches!(
            Database::open_read_only(dir.path().join("missing.db"), 2),
            Err(DatabaseError::Io(_))
        ));
    }
}
