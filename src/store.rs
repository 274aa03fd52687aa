// Copyright 2026 Infomed Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use fs2::FileExt;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::functions::FunctionFlags;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use sha2::Digest;
use sha2::Sha256;

use crate::display::generic_dci;
use crate::model::Composant;
use crate::model::GenericGroup;
use crate::model::MatchCandidate;
use crate::model::Specialite;
use crate::model::SubstanceNom;
use crate::model::TableName;
use crate::reference::AllowList;
use crate::trigram;

pub struct Store {
    pub conn: Connection,
    pub path: PathBuf,
    lock: Option<StoreLock>,
}

struct StoreLock {
    _file: File,
    path: PathBuf,
    mode: StoreMode,
}

impl StoreLock {
    fn new(file: File, path: PathBuf, mode: StoreMode) -> Self {
        Self {
            _file: file,
            path,
            mode,
        }
    }
}

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy)]
pub enum StoreMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub specialite_count: i64,
    pub substance_count: i64,
    pub composant_count: i64,
    pub generic_count: i64,
    pub index_count: i64,
    pub db_size_bytes: u64,
    pub imported_at: Option<String>,
}

#[derive(Debug)]
pub struct IntegrityReport {
    pub status: String,
    pub stats: StoreStats,
    /// Search index rows pointing at ids missing from their table.
    pub dangling_index_rows: i64,
}

impl Store {
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("store already exists at {}", path.display());
        }
        let _lock = Self::acquire_lock(path, StoreMode::ReadWrite)?;
        let conn = Self::open_connection(path, StoreMode::ReadWrite)?;
        Self::apply_pragmas(&conn, StoreMode::ReadWrite)?;
        Self::create_schema(&conn)?;
        Self::set_meta(&conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    pub fn open(path: &Path, mode: StoreMode) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "store not found at {}; run `infomed init` first",
                path.display()
            );
        }
        let lock = Self::acquire_lock(path, mode)?;
        let conn = Self::open_connection(path, mode)?;
        Self::apply_pragmas(&conn, mode)?;
        match mode {
            StoreMode::ReadWrite => Self::migrate(&conn)?,
            StoreMode::ReadOnly => {
                let version = Self::schema_version(&conn)?;
                if version != SCHEMA_VERSION {
                    anyhow::bail!(
                        "store schema version {} is not supported (expected {})",
                        version,
                        SCHEMA_VERSION
                    );
                }
            }
        }
        Self::register_functions(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            lock: Some(lock),
        })
    }

    /// Unlocked, schema-initialized store.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        Self::create_schema(&conn)?;
        Self::set_meta(&conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        Self::register_functions(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
            lock: None,
        })
    }

    fn open_connection(path: &Path, mode: StoreMode) -> Result<Connection> {
        let flags = match mode {
            StoreMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            StoreMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("open {}", path.display()))?;
        conn.busy_timeout(Duration::from_millis(5000))
            .context("set busy timeout")?;
        Ok(conn)
    }

    fn apply_pragmas(conn: &Connection, mode: StoreMode) -> Result<()> {
        let mut batch = String::from("PRAGMA foreign_keys=ON;");
        if matches!(mode, StoreMode::ReadWrite) {
            batch = format!("PRAGMA journal_mode=DELETE;\nPRAGMA synchronous=NORMAL;\n{batch}");
        }
        conn.execute_batch(&batch).context("apply pragmas")?;
        Ok(())
    }

    /// `unaccent(text)` and `word_similarity(query, token)` as used by the
    /// search index query.
    fn register_functions(conn: &Connection) -> Result<()> {
        let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
        conn.create_scalar_function("unaccent", 1, flags, |ctx| {
            let text: String = ctx.get(0)?;
            Ok(trigram::unaccent(&text))
        })
        .context("register unaccent")?;
        conn.create_scalar_function("word_similarity", 2, flags, |ctx| {
            let query: String = ctx.get(0)?;
            let token: String = ctx.get(1)?;
            Ok(trigram::word_similarity(&query, &token))
        })
        .context("register word_similarity")?;
        Ok(())
    }

    fn lock_path_for(path: &Path) -> Result<PathBuf> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string_lossy().as_bytes());
        let hash = hex::encode(hasher.finalize());
        let mut dir = std::env::temp_dir();
        dir.push("infomed");
        fs::create_dir_all(&dir).with_context(|| format!("create lock dir {}", dir.display()))?;
        Ok(dir.join(format!("infomed-{hash}.lock")))
    }

    fn acquire_lock(path: &Path, mode: StoreMode) -> Result<StoreLock> {
        let lock_path = Self::lock_path_for(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("open lock file {}", lock_path.display()))?;
        let deadline = Instant::now() + Duration::from_millis(5000);
        loop {
            let locked = match mode {
                StoreMode::ReadOnly => file.try_lock_shared().map_err(|err| err.to_string()),
                StoreMode::ReadWrite => file.try_lock_exclusive().map_err(|err| err.to_string()),
            };
            match locked {
                Ok(()) => return Ok(StoreLock::new(file, lock_path, mode)),
                Err(_) if Instant::now() >= deadline => {
                    let mode_label = match mode {
                        StoreMode::ReadOnly => "read",
                        StoreMode::ReadWrite => "write",
                    };
                    anyhow::bail!(
                        "store is locked for {mode_label} access; another process may be using {}",
                        path.display()
                    );
                }
                Err(_) => {
                    sleep(Duration::from_millis(50));
                }
            }
        }
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (\n  key TEXT PRIMARY KEY,\n  value TEXT\n);\n\nCREATE TABLE IF NOT EXISTS Specialite (\n  SpecId TEXT PRIMARY KEY,\n  SpecDenom01 TEXT NOT NULL,\n  SpecGeneId TEXT\n);\n\nCREATE TABLE IF NOT EXISTS Subs_Nom (\n  NomId TEXT PRIMARY KEY,\n  NomLib TEXT NOT NULL\n);\n\nCREATE TABLE IF NOT EXISTS Composant (\n  SpecId TEXT NOT NULL,\n  NomId TEXT NOT NULL,\n  CompoDosage TEXT\n);\n\nCREATE TABLE IF NOT EXISTS GroupeGene (\n  SpecId TEXT NOT NULL,\n  LibLong TEXT NOT NULL\n);\n\nCREATE TABLE IF NOT EXISTS search_index (\n  table_name TEXT NOT NULL,\n  id TEXT NOT NULL,\n  token TEXT NOT NULL\n);\n\nCREATE INDEX IF NOT EXISTS idx_spec_denom ON Specialite(SpecDenom01);\nCREATE INDEX IF NOT EXISTS idx_spec_gene ON Specialite(SpecGeneId);\nCREATE INDEX IF NOT EXISTS idx_compo_spec ON Composant(SpecId);\nCREATE INDEX IF NOT EXISTS idx_compo_nom ON Composant(NomId);\nCREATE INDEX IF NOT EXISTS idx_gene_spec ON GroupeGene(SpecId);\nCREATE INDEX IF NOT EXISTS idx_search_table ON search_index(table_name, id);",
        )
        .context("create schema")?;
        Ok(())
    }

    pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .context("set meta")?;
        Ok(())
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key=?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("read meta {key}"))?;
        Ok(value)
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                params![name],
                |row| row.get(0),
            )
            .context("check table")?;
        Ok(count > 0)
    }

    fn schema_version(conn: &Connection) -> Result<i64> {
        if !Self::table_exists(conn, "meta")? {
            return Ok(0);
        }
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key='schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("read schema_version")?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version = Self::schema_version(conn)?;
        if version > SCHEMA_VERSION {
            anyhow::bail!(
                "store schema version {} is newer than supported {}",
                version,
                SCHEMA_VERSION
            );
        }
        if version == SCHEMA_VERSION {
            return Ok(());
        }
        Self::create_schema(conn)?;
        Self::set_meta(conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    fn count(&self, sql: &str) -> Result<i64> {
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("count: {sql}"))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoreStats {
            specialite_count: self.count("SELECT COUNT(*) FROM Specialite")?,
            substance_count: self.count("SELECT COUNT(*) FROM Subs_Nom")?,
            composant_count: self.count("SELECT COUNT(*) FROM Composant")?,
            generic_count: self.count("SELECT COUNT(*) FROM GroupeGene")?,
            index_count: self.count("SELECT COUNT(*) FROM search_index")?,
            db_size_bytes,
            imported_at: self.meta("imported_at")?,
        })
    }

    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let status: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .context("integrity_check")?;
        let dangling_index_rows = self.count(
            "SELECT COUNT(*) FROM search_index i\n             WHERE (i.table_name = 'Specialite' AND NOT EXISTS (SELECT 1 FROM Specialite s WHERE s.SpecId = i.id))\n                OR (i.table_name = 'Subs_Nom' AND NOT EXISTS (SELECT 1 FROM Subs_Nom n WHERE n.NomId = i.id))",
        )?;
        let stats = self.stats()?;
        Ok(IntegrityReport {
            status,
            stats,
            dangling_index_rows,
        })
    }

    /// Rebuilds `search_index` from specialty names and substance labels.
    /// The previous index is kept if any row fails to insert.
    pub fn rebuild_search_index(&self) -> Result<usize> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match self.fill_search_index() {
            Ok(inserted) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(inserted)
            }
            Err(err) => {
                self.conn.execute_batch("ROLLBACK")?;
                Err(err)
            }
        }
    }

    /// Replaces the index rows inside the caller's transaction.
    pub(crate) fn fill_search_index(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM search_index", [])
            .context("clear search_index")?;
        let mut inserted = 0usize;
        for (table, sql) in [
            (TableName::Specialite, "SELECT SpecId, SpecDenom01 FROM Specialite"),
            (TableName::SubsNom, "SELECT NomId, NomLib FROM Subs_Nom"),
        ] {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            for (id, label) in entries {
                let token = trigram::index_token(&label);
                if token.is_empty() {
                    continue;
                }
                self.conn
                    .execute(
                        "INSERT INTO search_index (table_name, id, token) VALUES (?1, ?2, ?3)",
                        params![table.as_str(), &id, token],
                    )
                    .with_context(|| format!("index {table} {id}"))?;
                inserted += 1;
            }
        }
        Self::set_meta(&self.conn, "index_rows", &inserted.to_string())?;
        Ok(inserted)
    }

    /// Index rows whose token is similar enough to `query`, best first.
    pub fn search_matches(&self, query: &str, threshold: f64) -> Result<Vec<MatchCandidate>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name, id, token, sml FROM (\n               SELECT table_name, id, token, word_similarity(unaccent(?1), token) AS sml\n               FROM search_index\n             )\n             WHERE sml >= ?2\n             ORDER BY sml DESC, length(token) ASC, table_name ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![query, threshold], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (table, id, token, score) = row.context("read search_index match")?;
            match TableName::from_str(&table) {
                Ok(table_name) => out.push(MatchCandidate {
                    table_name,
                    id,
                    token,
                    score,
                }),
                Err(err) => tracing::warn!(%err, id = %id, "skipping search_index row"),
            }
        }
        Ok(out)
    }

    /// Allow-listed specialties matched directly or composed of one of the
    /// given substances, with their full composition.
    pub fn specialites_for(
        &self,
        specialite_ids: &[String],
        substance_ids: &[String],
        allow: &AllowList,
    ) -> Result<Vec<Specialite>> {
        if (specialite_ids.is_empty() && substance_ids.is_empty()) || allow.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT s.SpecId, s.SpecDenom01, s.SpecGeneId,\n                    (SELECT json_group_array(c.NomId) FROM Composant c WHERE c.SpecId = s.SpecId)\n             FROM Specialite s\n             WHERE (s.SpecId IN ({}) OR s.SpecId IN (SELECT SpecId FROM Composant WHERE NomId IN ({})))\n               AND s.SpecId IN ({})\n             ORDER BY s.SpecDenom01 ASC, s.SpecId ASC",
            placeholders(specialite_ids.len()),
            placeholders(substance_ids.len()),
            placeholders(allow.len()),
        );
        let values = text_values([specialite_ids, substance_ids, allow.ids()]);
        self.query_specialites(&sql, values)
    }

    fn query_specialites(&self, sql: &str, values: Vec<SqlValue>) -> Result<Vec<Specialite>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (spec_id, denomination, gene_id, substances) = row?;
            let substance_ids = match substances {
                Some(json) => parse_id_array(&json)
                    .with_context(|| format!("parse composition of {spec_id}"))?,
                None => Vec::new(),
            };
            out.push(Specialite {
                spec_id,
                denomination,
                gene_id: gene_id.filter(|g| !g.is_empty()),
                substance_ids,
            });
        }
        Ok(out)
    }

    /// Substances among `substance_ids` that compose an allow-listed specialty.
    pub fn substances_for(
        &self,
        substance_ids: &[String],
        allow: &AllowList,
    ) -> Result<Vec<SubstanceNom>> {
        if substance_ids.is_empty() || allow.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT NomId, NomLib FROM Subs_Nom\n             WHERE NomId IN ({})\n               AND NomId IN (SELECT NomId FROM Composant WHERE SpecId IN ({}))\n             ORDER BY NomLib ASC, NomId ASC",
            placeholders(substance_ids.len()),
            placeholders(allow.len()),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(text_values([substance_ids, allow.ids()])),
            |row| {
                Ok(SubstanceNom {
                    nom_id: row.get(0)?,
                    label: row.get(1)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// First letters of allow-listed specialty names.
    pub fn specialite_letters(&self, allow: &AllowList) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT substr(SpecDenom01, 1, 1) AS letter FROM Specialite\n             WHERE SpecId IN ({})\n             ORDER BY letter ASC",
            placeholders(allow.len()),
        );
        self.query_strings(&sql, text_values([allow.ids()]))
    }

    pub fn specialites_by_letter(&self, letter: &str, allow: &AllowList) -> Result<Vec<Specialite>> {
        let sql = format!(
            "SELECT s.SpecId, s.SpecDenom01, s.SpecGeneId,\n                    (SELECT json_group_array(c.NomId) FROM Composant c WHERE c.SpecId = s.SpecId)\n             FROM Specialite s\n             WHERE s.SpecDenom01 LIKE ? ESCAPE '\\'\n               AND s.SpecId IN ({})\n             ORDER BY s.SpecDenom01 ASC, s.SpecId ASC",
            placeholders(allow.len()),
        );
        let mut values = vec![SqlValue::Text(like_prefix(letter))];
        values.extend(text_values([allow.ids()]));
        self.query_specialites(&sql, values)
    }

    /// First letters of generic groups holding an allow-listed specialty.
    pub fn generic_letters(&self, allow: &AllowList) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT substr(g.LibLong, 1, 1) AS letter\n             FROM GroupeGene g\n             JOIN Specialite s ON s.SpecGeneId = g.SpecId\n             WHERE s.SpecId IN ({})\n             ORDER BY letter ASC",
            placeholders(allow.len()),
        );
        self.query_strings(&sql, text_values([allow.ids()]))
    }

    pub fn generics_by_letter(&self, letter: &str, allow: &AllowList) -> Result<Vec<GenericGroup>> {
        let sql = format!(
            "SELECT DISTINCT g.SpecId, g.LibLong\n             FROM GroupeGene g\n             JOIN Specialite s ON s.SpecGeneId = g.SpecId\n             WHERE g.LibLong LIKE ? ESCAPE '\\'\n               AND s.SpecId IN ({})\n             ORDER BY g.LibLong ASC, g.SpecId ASC",
            placeholders(allow.len()),
        );
        let mut values = vec![SqlValue::Text(like_prefix(&letter.to_uppercase()))];
        values.extend(text_values([allow.ids()]));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            let label: String = row.get(1)?;
            Ok(GenericGroup {
                group_id: row.get(0)?,
                dci: generic_dci(&label),
                label,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn specialite(&self, cis: &str) -> Result<Option<Specialite>> {
        let found = self.query_specialites(
            "SELECT s.SpecId, s.SpecDenom01, s.SpecGeneId,\n                    (SELECT json_group_array(c.NomId) FROM Composant c WHERE c.SpecId = s.SpecId)\n             FROM Specialite s WHERE s.SpecId = ?",
            vec![SqlValue::Text(cis.to_string())],
        )?;
        Ok(found.into_iter().next())
    }

    pub fn composants(&self, cis: &str) -> Result<Vec<Composant>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.NomId, COALESCE(n.NomLib, c.NomId), c.CompoDosage\n             FROM Composant c\n             LEFT JOIN Subs_Nom n ON n.NomId = c.NomId\n             WHERE c.SpecId = ?1\n             ORDER BY c.rowid ASC",
        )?;
        let rows = stmt.query_map(params![cis], |row| {
            Ok(Composant {
                nom_id: row.get(0)?,
                label: row.get(1)?,
                dosage: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn query_strings(&self, sql: &str, values: Vec<SqlValue>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let path = lock.path.clone();
            let mode = lock.mode;
            drop(lock);
            if matches!(mode, StoreMode::ReadWrite) {
                let _ = fs::remove_file(path);
            }
        }
    }
}

/// `?, ?, ?` for an `IN` list; SQLite accepts an empty list.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn text_values<const N: usize>(groups: [&[String]; N]) -> Vec<SqlValue> {
    groups
        .iter()
        .flat_map(|ids| ids.iter().map(|id| SqlValue::Text(id.clone())))
        .collect()
}

fn like_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn parse_id_array(json: &str) -> Result<Vec<String>> {
    let raw: Vec<Option<String>> = serde_json::from_str(json)?;
    let mut ids: Vec<String> = Vec::new();
    for id in raw.into_iter().flatten() {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod tests {
    use tempfile::tempdir;

    use super::*;

    /// Two paracetamol specialties, one ibuprofen specialty, one specialty
    /// outside the allow-list.
    pub(crate) fn seeded_store() -> Result<Store> {
        let store = Store::open_in_memory()?;
        store.conn.execute_batch(
            "INSERT INTO Specialite VALUES ('60234100', 'DOLIPRANE 1000 mg, comprimé', '1');\n             INSERT INTO Specialite VALUES ('60234200', 'DOLIPRANE 500 mg, gélule', '1');\n             INSERT INTO Specialite VALUES ('61266250', 'ADVIL 200 mg, comprimé enrobé', NULL);\n             INSERT INTO Specialite VALUES ('69999999', 'EFFERALGAN 1 g, comprimé', '1');\n             INSERT INTO Subs_Nom VALUES ('02202', 'PARACÉTAMOL');\n             INSERT INTO Subs_Nom VALUES ('01504', 'IBUPROFÈNE');\n             INSERT INTO Subs_Nom VALUES ('09999', 'CODÉINE');\n             INSERT INTO Composant VALUES ('60234100', '02202', '1000 mg');\n             INSERT INTO Composant VALUES ('60234200', '02202', '500 mg');\n             INSERT INTO Composant VALUES ('61266250', '01504', '200 mg');\n             INSERT INTO Composant VALUES ('69999999', '02202', '1 g');\n             INSERT INTO Composant VALUES ('69999999', '09999', '30 mg');\n             INSERT INTO GroupeGene VALUES ('1', 'PARACETAMOL 1000 mg - DOLIPRANE 1000 mg, comprimé');",
        )?;
        store.rebuild_search_index()?;
        Ok(store)
    }

    pub(crate) fn allow() -> AllowList {
        AllowList::new(
            ["60234100", "60234200", "61266250"]
                .into_iter()
                .map(String::from),
        )
    }

    #[test]
    fn init_then_open_read_only() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("infomed.db");
        Store::init(&db_path)?;
        assert!(Store::init(&db_path).is_err());

        let store_a = Store::open(&db_path, StoreMode::ReadOnly)?;
        let store_b = Store::open(&db_path, StoreMode::ReadOnly)?;
        assert_eq!(store_a.stats()?.specialite_count, 0);
        assert_eq!(store_b.stats()?.index_count, 0);
        Ok(())
    }

    #[test]
    fn open_missing_store_fails() {
        let dir = tempdir().expect("tempdir");
        let err = Store::open(&dir.path().join("nope.db"), StoreMode::ReadOnly)
            .err()
            .expect("missing store");
        assert!(err.to_string().contains("run `infomed init` first"));
    }

    #[test]
    fn search_matches_are_ranked_and_thresholded() -> Result<()> {
        let store = seeded_store()?;
        let matches = store.search_matches("Paracétamol", 0.6)?;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].table_name, TableName::SubsNom);
        assert_eq!(matches[0].id, "02202");
        assert_eq!(matches[0].score, 1.0);

        let matches = store.search_matches("doliprane", 0.6)?;
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        // Equal scores: shorter token first.
        assert_eq!(ids, vec!["60234200", "60234100"]);
        Ok(())
    }

    #[test]
    fn specialites_for_respects_allow_list() -> Result<()> {
        let store = seeded_store()?;
        let specs = store.specialites_for(&[], &["02202".to_string()], &allow())?;
        let ids: Vec<&str> = specs.iter().map(|s| s.spec_id.as_str()).collect();
        assert_eq!(ids, vec!["60234100", "60234200"]);
        assert_eq!(specs[0].substance_ids, vec!["02202".to_string()]);
        assert_eq!(specs[0].gene_id.as_deref(), Some("1"));
        Ok(())
    }

    #[test]
    fn substances_for_requires_allow_listed_composition() -> Result<()> {
        let store = seeded_store()?;
        let subs = store.substances_for(&["02202".to_string(), "09999".to_string()], &allow())?;
        let ids: Vec<&str> = subs.iter().map(|s| s.nom_id.as_str()).collect();
        assert_eq!(ids, vec!["02202"]);
        Ok(())
    }

    #[test]
    fn letters_and_generics() -> Result<()> {
        let store = seeded_store()?;
        assert_eq!(store.specialite_letters(&allow())?, vec!["A", "D"]);
        assert_eq!(store.specialites_by_letter("d", &allow())?.len(), 2);
        assert!(store.specialites_by_letter("%", &allow())?.is_empty());
        assert_eq!(store.generic_letters(&allow())?, vec!["P"]);
        let generics = store.generics_by_letter("p", &allow())?;
        assert_eq!(generics.len(), 1);
        assert_eq!(generics[0].dci, "PARACETAMOL 1000 mg");
        Ok(())
    }

    #[test]
    fn failed_rebuild_keeps_previous_index() -> Result<()> {
        let store = seeded_store()?;
        store.conn.execute_batch(
            "CREATE TRIGGER reject_paracetamol BEFORE INSERT ON search_index\n             WHEN NEW.id = '02202'\n             BEGIN SELECT RAISE(ABORT, 'index row rejected'); END;",
        )?;
        let err = store.rebuild_search_index().unwrap_err();
        assert!(format!("{err:#}").contains("index Subs_Nom 02202"));
        assert_eq!(store.stats()?.index_count, 7);
        assert_eq!(store.search_matches("paracetamol", 0.6)?.len(), 1);

        store.conn.execute_batch("DROP TRIGGER reject_paracetamol")?;
        assert_eq!(store.rebuild_search_index()?, 7);
        Ok(())
    }

    #[test]
    fn integrity_reports_dangling_index_rows() -> Result<()> {
        let store = seeded_store()?;
        store
            .conn
            .execute("DELETE FROM Subs_Nom WHERE NomId = '09999'", [])?;
        let report = store.integrity_check()?;
        assert_eq!(report.status, "ok");
        assert_eq!(report.dangling_index_rows, 1);
        Ok(())
    }
}
