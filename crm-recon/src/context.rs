//! Run context: database pool, settings and schema catalog
//!
//! One [`ReconContext`] is built per command invocation and handed to every
//! operation. The schema catalog replaces ad hoc introspection queries: it is
//! loaded once and reloaded explicitly after DDL.

use crate::discovery::{fetch_columns, find_column, list_tables, match_table_hint};
use crate::synonyms;
use crm_common::config::Settings;
use crm_common::db::{init_database, LEGACY_SCHEMA, TARGET_SCHEMA};
use crm_common::Result;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

use crate::db::customers::DEFAULT_LEGACY_PHONE_COLUMN;

/// Cached table -> ordered columns map for the target and legacy schemas
#[derive(Debug, Default, Clone)]
pub struct SchemaCatalog {
    /// (schema, table) -> columns; table names keep their stored spelling
    tables: BTreeMap<(String, String), Vec<String>>,
    loaded: bool,
}

impl SchemaCatalog {
    /// Load both schemas
    pub async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let mut catalog = Self::default();
        catalog.reload(conn).await?;
        Ok(catalog)
    }

    /// Re-read every table and column
    pub async fn reload(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        let mut tables = BTreeMap::new();
        for schema in [TARGET_SCHEMA, LEGACY_SCHEMA] {
            for table in list_tables(conn, schema).await? {
                let columns = fetch_columns(conn, schema, &table).await?;
                tables.insert((schema.to_string(), table), columns);
            }
        }
        debug!("Schema catalog loaded: {} tables", tables.len());
        self.tables = tables;
        self.loaded = true;
        Ok(())
    }

    /// Drop cached state; the next [`ReconContext::catalog`] call reloads
    pub fn invalidate(&mut self) {
        self.tables.clear();
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Table names of a schema, in name order
    pub fn tables(&self, schema: &str) -> Vec<String> {
        self.tables
            .keys()
            .filter(|(s, _)| s == schema)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Columns of a table (case-insensitive table lookup)
    pub fn columns(&self, schema: &str, table: &str) -> Option<&[String]> {
        self.tables
            .iter()
            .find(|((s, t), _)| s == schema && t.eq_ignore_ascii_case(table))
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.columns(schema, table).is_some()
    }

    /// Table for the given hints (see [`match_table_hint`])
    pub fn find_table(&self, schema: &str, hints: &[&str]) -> Option<String> {
        match_table_hint(&self.tables(schema), hints)
    }

    /// First candidate column present in a table
    pub fn find_column(&self, schema: &str, table: &str, candidates: &[&str]) -> Option<String> {
        self.columns(schema, table)
            .and_then(|columns| find_column(columns, candidates))
    }

    /// Which column of the target `customers` table holds the legacy phone
    pub fn legacy_phone_column(&self) -> String {
        self.find_column(TARGET_SCHEMA, "customers", synonyms::customer::PHONE)
            .unwrap_or_else(|| DEFAULT_LEGACY_PHONE_COLUMN.to_string())
    }
}

/// Everything an operation needs
pub struct ReconContext {
    pub pool: SqlitePool,
    pub settings: Settings,
    catalog: SchemaCatalog,
}

impl ReconContext {
    /// Open the configured databases and load the schema catalog
    pub async fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let pool = init_database(&settings.database, settings.legacy_database.as_deref()).await?;
        Self::with_pool(pool, settings).await
    }

    /// Build around an existing pool (tests, in-memory runs)
    pub async fn with_pool(pool: SqlitePool, settings: Settings) -> Result<Self> {
        let catalog = {
            let mut conn = pool.acquire().await?;
            SchemaCatalog::load(&mut conn).await?
        };
        Ok(Self {
            pool,
            settings,
            catalog,
        })
    }

    /// The schema catalog, reloaded first if it was invalidated
    pub async fn catalog(&mut self) -> Result<&SchemaCatalog> {
        if !self.catalog.is_loaded() {
            let mut conn = self.pool.acquire().await?;
            self.catalog.reload(&mut conn).await?;
        }
        Ok(&self.catalog)
    }

    /// Reload the catalog now (after DDL)
    pub async fn refresh_catalog(&mut self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.catalog.reload(&mut conn).await
    }

    /// Mark the catalog stale without reloading
    pub fn invalidate_catalog(&mut self) {
        self.catalog.invalidate();
    }
}
