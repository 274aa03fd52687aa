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

use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::store::Store;

/// One JSONL line of a catalogue dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table")]
enum DumpRow {
    Specialite {
        #[serde(rename = "SpecId")]
        spec_id: String,
        #[serde(rename = "SpecDenom01")]
        denomination: String,
        #[serde(rename = "SpecGeneId", default)]
        gene_id: Option<String>,
    },
    #[serde(rename = "Subs_Nom")]
    SubsNom {
        #[serde(rename = "NomId")]
        nom_id: String,
        #[serde(rename = "NomLib")]
        label: String,
    },
    Composant {
        #[serde(rename = "SpecId")]
        spec_id: String,
        #[serde(rename = "NomId")]
        nom_id: String,
        #[serde(rename = "CompoDosage", default)]
        dosage: Option<String>,
    },
    GroupeGene {
        #[serde(rename = "SpecId")]
        group_id: String,
        #[serde(rename = "LibLong")]
        label: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferStats {
    pub specialites: usize,
    pub substances: usize,
    pub composants: usize,
    pub generics: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_rows: Option<usize>,
}

impl TransferStats {
    pub fn total(&self) -> usize {
        self.specialites + self.substances + self.composants + self.generics
    }

    fn count(&mut self, row: &DumpRow) {
        match row {
            DumpRow::Specialite { .. } => self.specialites += 1,
            DumpRow::SubsNom { .. } => self.substances += 1,
            DumpRow::Composant { .. } => self.composants += 1,
            DumpRow::GroupeGene { .. } => self.generics += 1,
        }
    }
}

fn clean_id(id: &str) -> String {
    id.trim().to_string()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn export_store(store: &Store, mut writer: impl Write) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    let queries: [(&str, fn(&rusqlite::Row<'_>) -> rusqlite::Result<DumpRow>); 4] = [
        (
            "SELECT SpecId, SpecDenom01, SpecGeneId FROM Specialite ORDER BY SpecId",
            |row| {
                Ok(DumpRow::Specialite {
                    spec_id: row.get(0)?,
                    denomination: row.get(1)?,
                    gene_id: row.get(2)?,
                })
            },
        ),
        ("SELECT NomId, NomLib FROM Subs_Nom ORDER BY NomId", |row| {
            Ok(DumpRow::SubsNom {
                nom_id: row.get(0)?,
                label: row.get(1)?,
            })
        }),
        (
            "SELECT SpecId, NomId, CompoDosage FROM Composant ORDER BY rowid",
            |row| {
                Ok(DumpRow::Composant {
                    spec_id: row.get(0)?,
                    nom_id: row.get(1)?,
                    dosage: row.get(2)?,
                })
            },
        ),
        ("SELECT SpecId, LibLong FROM GroupeGene ORDER BY rowid", |row| {
            Ok(DumpRow::GroupeGene {
                group_id: row.get(0)?,
                label: row.get(1)?,
            })
        }),
    ];

    for (sql, map) in queries {
        let mut stmt = store.conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?;
        for row in rows {
            let row = row?;
            let line = serde_json::to_string(&row)?;
            writeln!(writer, "{line}")?;
            stats.count(&row);
        }
    }
    writer.flush()?;
    Ok(stats)
}

/// Replaces the catalogue tables with the dump read from `reader` and
/// rebuilds the search index in the same transaction. Nothing is written if
/// any line or index row fails.
pub fn import_store(store: &Store, reader: impl Read) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    let mut buf = BufReader::new(reader);

    store.conn.execute_batch("BEGIN IMMEDIATE")?;
    let res = (|| -> Result<()> {
        store.conn.execute_batch(
            "DELETE FROM Composant; DELETE FROM GroupeGene; DELETE FROM Specialite; DELETE FROM Subs_Nom;",
        )?;
        let mut line = String::new();
        let mut line_no = 0usize;
        loop {
            line.clear();
            let bytes = buf.read_line(&mut line)?;
            if bytes == 0 {
                break;
            }
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let row: DumpRow = serde_json::from_str(trimmed)
                .with_context(|| format!("parse import line {line_no}"))?;
            insert_row(store, &row).with_context(|| format!("insert import line {line_no}"))?;
            stats.count(&row);
        }
        stats.index_rows = Some(store.fill_search_index()?);
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format import timestamp")?;
        Store::set_meta(&store.conn, "imported_at", &now)?;
        Ok(())
    })();

    if let Err(err) = res {
        store.conn.execute_batch("ROLLBACK")?;
        return Err(err);
    }
    store.conn.execute_batch("COMMIT")?;

    tracing::info!(
        specialites = stats.specialites,
        substances = stats.substances,
        composants = stats.composants,
        generics = stats.generics,
        "import complete"
    );
    Ok(stats)
}

fn insert_row(store: &Store, row: &DumpRow) -> Result<()> {
    match row {
        DumpRow::Specialite {
            spec_id,
            denomination,
            gene_id,
        } => {
            store.conn.execute(
                "INSERT OR REPLACE INTO Specialite (SpecId, SpecDenom01, SpecGeneId) VALUES (?1, ?2, ?3)",
                params![clean_id(spec_id), denomination.trim(), clean_optional(gene_id.clone())],
            )?;
        }
        DumpRow::SubsNom { nom_id, label } => {
            store.conn.execute(
                "INSERT OR REPLACE INTO Subs_Nom (NomId, NomLib) VALUES (?1, ?2)",
                params![clean_id(nom_id), label.trim()],
            )?;
        }
        DumpRow::Composant {
            spec_id,
            nom_id,
            dosage,
        } => {
            store.conn.execute(
                "INSERT INTO Composant (SpecId, NomId, CompoDosage) VALUES (?1, ?2, ?3)",
                params![clean_id(spec_id), clean_id(nom_id), clean_optional(dosage.clone())],
            )?;
        }
        DumpRow::GroupeGene { group_id, label } => {
            store.conn.execute(
                "INSERT INTO GroupeGene (SpecId, LibLong) VALUES (?1, ?2)",
                params![clean_id(group_id), label.trim()],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{"table":"Specialite","SpecId":" 60234100 ","SpecDenom01":"DOLIPRANE 1000 mg, comprimé","SpecGeneId":"1"}
{"table":"Specialite","SpecId":"61266250","SpecDenom01":"ADVIL 200 mg, comprimé enrobé","SpecGeneId":""}

{"table":"Subs_Nom","NomId":"02202","NomLib":"PARACÉTAMOL"}
{"table":"Subs_Nom","NomId":"01504","NomLib":"IBUPROFÈNE"}
{"table":"Composant","SpecId":"60234100","NomId":"02202","CompoDosage":"1000 mg"}
{"table":"Composant","SpecId":"61266250","NomId":"01504"}
{"table":"GroupeGene","SpecId":"1","LibLong":"PARACETAMOL 1000 mg - DOLIPRANE 1000 mg, comprimé"}
"#;

    #[test]
    fn import_trims_ids_and_rebuilds_index() -> Result<()> {
        let store = Store::open_in_memory()?;
        let stats = import_store(&store, DUMP.as_bytes())?;
        assert_eq!(stats.specialites, 2);
        assert_eq!(stats.substances, 2);
        assert_eq!(stats.composants, 2);
        assert_eq!(stats.generics, 1);
        assert_eq!(stats.index_rows, Some(4));

        let spec = store.specialite("60234100")?.expect("trimmed id");
        assert_eq!(spec.substance_ids, vec!["02202".to_string()]);
        let advil = store.specialite("61266250")?.expect("advil");
        assert_eq!(advil.gene_id, None);
        assert!(store.meta("imported_at")?.is_some());
        Ok(())
    }

    #[test]
    fn export_reproduces_import() -> Result<()> {
        let store = Store::open_in_memory()?;
        import_store(&store, DUMP.as_bytes())?;
        let mut out = Vec::new();
        let exported = export_store(&store, &mut out)?;
        assert_eq!(exported.total(), 7);

        let copy = Store::open_in_memory()?;
        import_store(&copy, out.as_slice())?;
        let mut again = Vec::new();
        export_store(&copy, &mut again)?;
        assert_eq!(String::from_utf8(out)?, String::from_utf8(again)?);
        Ok(())
    }

    #[test]
    fn bad_line_rolls_back() -> Result<()> {
        let store = Store::open_in_memory()?;
        import_store(&store, DUMP.as_bytes())?;
        let broken = format!("{DUMP}{{\"table\":\"Presentation\",\"id\":\"1\"}}\n");
        let err = import_store(&store, broken.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 9"));
        assert_eq!(store.stats()?.specialite_count, 2);
        Ok(())
    }

    #[test]
    fn failed_index_rolls_back_import() -> Result<()> {
        let store = Store::open_in_memory()?;
        import_store(&store, DUMP.as_bytes())?;
        let imported_at = store.meta("imported_at")?;
        store.conn.execute_batch(
            "CREATE TRIGGER reject_ibuprofene BEFORE INSERT ON search_index\n             WHEN NEW.id = '01504'\n             BEGIN SELECT RAISE(ABORT, 'index row rejected'); END;",
        )?;

        let renamed = DUMP.replace("ADVIL", "NUROFEN");
        assert!(import_store(&store, renamed.as_bytes()).is_err());
        let stats = store.stats()?;
        assert_eq!(stats.specialite_count, 2);
        assert_eq!(stats.index_count, 4);
        assert_eq!(store.meta("imported_at")?, imported_at);
        let advil = store.specialite("61266250")?.expect("advil kept");
        assert!(advil.denomination.starts_with("ADVIL"));
        Ok(())
    }
}
