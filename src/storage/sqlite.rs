//! `SQLite` record store: schema, pragmas, and lead queries.
//!
//! The record store is the source of truth for leads. The index store only
//! ever holds derived data, so every query here must be answerable without a
//! cache attached. Substring matching is case-insensitive (`LOWER(col) LIKE`),
//! the same semantics as a relational `ILIKE` predicate.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::info;

use crate::model::types::{Lead, LeadPriority, LeadStatus, SearchFilters};

/// Error from record-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("lead {0} not found")]
    NotFound(i64),
    #[error("invalid keywords payload: {0}")]
    Keywords(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY,
    company TEXT NOT NULL,
    contact TEXT,
    email TEXT,
    phone TEXT,
    website TEXT,
    industry TEXT,
    location TEXT,
    revenue TEXT,
    employees TEXT,
    description TEXT,
    keywords TEXT NOT NULL DEFAULT '[]',
    score INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'new',
    priority TEXT NOT NULL DEFAULT 'medium',
    indexed_at INTEGER,
    last_contact INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_company ON leads(company);
CREATE INDEX IF NOT EXISTS idx_leads_industry ON leads(industry);
CREATE INDEX IF NOT EXISTS idx_leads_location ON leads(location);
CREATE INDEX IF NOT EXISTS idx_leads_indexed_at ON leads(indexed_at);
";

/// Columns selected for every lead read, kept in one place so row mapping
/// stays in sync.
const LEAD_COLUMNS: &str = "id, company, contact, email, phone, website, industry, location, \
     revenue, employees, description, keywords, score, status, priority, \
     indexed_at, last_contact, created_at, updated_at";

/// Fields the suggestion path can take distinct prefixes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    Company,
    Industry,
}

impl DistinctField {
    fn column(self) -> &'static str {
        match self {
            DistinctField::Company => "company",
            DistinctField::Industry => "industry",
        }
    }
}

/// Thread-safe handle to the leads database.
///
/// The connection sits behind a mutex so one store value can serve concurrent
/// request handlers; statements are short-lived and the lock is held per call.
pub struct LeadStore {
    conn: Mutex<Connection>,
}

impl LeadStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = LeadStore {
            conn: Mutex::new(conn),
        };
        store.init()?;
        info!(path = %path.display(), "lead_store_opened");
        Ok(store)
    }

    /// Ephemeral store for tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        let store = LeadStore {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let value: String = conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        Ok(value.parse().unwrap_or(0))
    }

    // ---- writes ----------------------------------------------------------

    /// Insert a lead, returning its id. `created_at`/`updated_at` default to
    /// now when unset; `indexed_at` is never written here — only the indexer
    /// owns that column.
    pub fn insert_lead(&self, lead: &Lead) -> Result<i64> {
        let now = Utc::now();
        let created = lead.created_at.unwrap_or(now);
        let updated = lead.updated_at.unwrap_or(now);
        let keywords = serde_json::to_string(&lead.keywords)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO leads (company, contact, email, phone, website, industry, location, \
             revenue, employees, description, keywords, score, status, priority, \
             last_contact, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                lead.company,
                lead.contact,
                lead.email,
                lead.phone,
                lead.website,
                lead.industry,
                lead.location,
                lead.revenue,
                lead.employees,
                lead.description,
                keywords,
                lead.score,
                lead.status.as_str(),
                lead.priority.as_str(),
                lead.last_contact.map(ts_ms),
                ts_ms(created),
                ts_ms(updated),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_lead(&self, id: i64) -> Result<()> {
        let affected = self
            .conn
            .lock()
            .execute("DELETE FROM leads WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Stamp the lead as indexed. Only the indexer calls this.
    pub fn mark_indexed(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn.lock().execute(
            "UPDATE leads SET indexed_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![ts_ms(at), ts_ms(Utc::now()), id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Reset the indexed marker, e.g. after a retraction.
    pub fn clear_indexed(&self, id: i64) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE leads SET indexed_at = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // ---- reads -----------------------------------------------------------

    pub fn find_by_id(&self, id: i64) -> Result<Option<Lead>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let lead = conn
            .query_row(&sql, params![id], lead_from_row)
            .optional()?;
        Ok(lead)
    }

    pub fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Lead>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..ids.len()).map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE id IN ({placeholders}) ORDER BY id"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), lead_from_row)?;
        collect_leads(rows)
    }

    /// OR-semantics substring search across company/description for every
    /// term and phrase, AND-ed with the filter predicates, capped at `limit`.
    /// With no terms or phrases the filters alone select candidates.
    pub fn search_text(
        &self,
        terms: &[String],
        phrases: &[String],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Lead>> {
        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        let needles: Vec<&String> = terms.iter().chain(phrases.iter()).collect();
        if !needles.is_empty() {
            let mut clauses = Vec::with_capacity(needles.len() * 2);
            for needle in needles {
                let pat = like_pattern(needle);
                clauses.push("LOWER(company) LIKE ?".to_string());
                args.push(Box::new(pat.clone()));
                clauses.push("LOWER(description) LIKE ?".to_string());
                args.push(Box::new(pat));
            }
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }

        push_filter_predicates(&mut sql, &mut args, filters);

        sql.push_str(" ORDER BY id LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|b| &**b)),
            lead_from_row,
        )?;
        collect_leads(rows)
    }

    /// Distinct non-empty values of `field` starting with `prefix`,
    /// case-insensitively, for the suggestion path.
    pub fn distinct_starting_with(
        &self,
        field: DistinctField,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let column = field.column();
        let sql = format!(
            "SELECT DISTINCT {column} FROM leads \
             WHERE {column} IS NOT NULL AND {column} != '' AND LOWER({column}) LIKE ? \
             ORDER BY {column} LIMIT ?"
        );
        let pattern = format!("{}%", prefix.to_lowercase().replace(['%', '_'], " "));
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }

    pub fn count_leads(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM leads", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_indexed(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE indexed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Stable id-ordered page over the whole corpus, for bulk indexing.
    pub fn page(&self, offset: usize, limit: usize) -> Result<Vec<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY id LIMIT ?1 OFFSET ?2");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], lead_from_row)?;
        collect_leads(rows)
    }
}

fn like_pattern(needle: &str) -> String {
    // Escape nothing: the needle is already normalized to word characters,
    // whitespace, and hyphens before it reaches the store.
    format!("%{}%", needle.to_lowercase())
}

fn push_filter_predicates(
    sql: &mut String,
    args: &mut Vec<Box<dyn rusqlite::ToSql>>,
    filters: &SearchFilters,
) {
    if let Some(industry) = &filters.industry {
        sql.push_str(" AND LOWER(industry) LIKE ?");
        args.push(Box::new(like_pattern(industry)));
    }
    if let Some(location) = &filters.location {
        sql.push_str(" AND LOWER(location) LIKE ?");
        args.push(Box::new(like_pattern(location)));
    }
    if let Some(size) = &filters.company_size {
        sql.push_str(" AND LOWER(employees) LIKE ?");
        args.push(Box::new(like_pattern(size)));
    }
    if let Some(revenue) = &filters.revenue_range {
        sql.push_str(" AND LOWER(revenue) LIKE ?");
        args.push(Box::new(like_pattern(revenue)));
    }
    for keyword in &filters.keywords {
        let pat = like_pattern(keyword);
        sql.push_str(
            " AND (LOWER(company) LIKE ? OR LOWER(description) LIKE ? OR LOWER(industry) LIKE ?)",
        );
        args.push(Box::new(pat.clone()));
        args.push(Box::new(pat.clone()));
        args.push(Box::new(pat));
    }
}

fn ts_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_ts_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn lead_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    let keywords_json: String = row.get(11)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json).unwrap_or_default();
    let status: String = row.get(13)?;
    let priority: String = row.get(14)?;
    Ok(Lead {
        id: Some(row.get(0)?),
        company: row.get(1)?,
        contact: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        website: row.get(5)?,
        industry: row.get(6)?,
        location: row.get(7)?,
        revenue: row.get(8)?,
        employees: row.get(9)?,
        description: row.get(10)?,
        keywords,
        score: row.get(12)?,
        status: LeadStatus::parse(&status),
        priority: LeadPriority::parse(&priority),
        indexed_at: row.get::<_, Option<i64>>(15)?.and_then(from_ts_ms),
        last_contact: row.get::<_, Option<i64>>(16)?.and_then(from_ts_ms),
        created_at: from_ts_ms(row.get(17)?),
        updated_at: from_ts_ms(row.get(18)?),
    })
}

fn collect_leads(
    rows: impl Iterator<Item = rusqlite::Result<Lead>>,
) -> Result<Vec<Lead>> {
    let mut leads = Vec::new();
    for row in rows {
        leads.push(row?);
    }
    Ok(leads)
}
