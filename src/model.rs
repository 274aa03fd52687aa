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

//! Shared domain types used across the store, search, browsing and output.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::display::format_spec_name;
use crate::display::group_name;

/// Source table of a search index row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TableName {
    #[serde(rename = "Specialite")]
    Specialite,
    #[serde(rename = "Subs_Nom")]
    SubsNom,
}

impl TableName {
    pub fn as_str(self) -> &'static str {
        match self {
            TableName::Specialite => "Specialite",
            TableName::SubsNom => "Subs_Nom",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Specialite" => Ok(TableName::Specialite),
            "Subs_Nom" => Ok(TableName::SubsNom),
            other => anyhow::bail!("unknown search_index table_name {other:?}"),
        }
    }
}

/// A search index row scored against one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub table_name: TableName,
    pub id: String,
    pub token: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specialite {
    #[serde(rename = "SpecId")]
    pub spec_id: String,
    #[serde(rename = "SpecDenom01")]
    pub denomination: String,
    #[serde(rename = "SpecGeneId")]
    pub gene_id: Option<String>,
    #[serde(rename = "SubsNomId")]
    pub substance_ids: Vec<String>,
}

impl Specialite {
    pub fn group_name(&self) -> String {
        group_name(&self.denomination)
    }

    pub fn composed_of(&self, nom_id: &str) -> bool {
        self.substance_ids.iter().any(|id| id == nom_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstanceNom {
    #[serde(rename = "NomId")]
    pub nom_id: String,
    #[serde(rename = "NomLib")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Composant {
    #[serde(rename = "NomId")]
    pub nom_id: String,
    #[serde(rename = "NomLib")]
    pub label: String,
    #[serde(rename = "CompoDosage")]
    pub dosage: Option<String>,
}

/// Specialties sharing one normalized group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicamentGroup {
    pub name: String,
    pub specialites: Vec<Specialite>,
}

impl MedicamentGroup {
    pub fn contains(&self, spec_id: &str) -> bool {
        self.specialites.iter().any(|s| s.spec_id == spec_id)
    }

    pub fn display_name(&self) -> String {
        format_spec_name(&self.name)
    }
}

/// Groups specialties by normalized name, keeping first-seen group order and
/// input order inside each group.
pub fn group_specialites(
    specialites: impl IntoIterator<Item = Specialite>,
) -> Vec<MedicamentGroup> {
    let mut groups: Vec<MedicamentGroup> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for specialite in specialites {
        let name = specialite.group_name();
        match by_name.get(&name) {
            Some(&idx) => groups[idx].specialites.push(specialite),
            None => {
                by_name.insert(name.clone(), groups.len());
                groups.push(MedicamentGroup {
                    name,
                    specialites: vec![specialite],
                });
            }
        }
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResultItem {
    Substance(SubstanceNom),
    Group(MedicamentGroup),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenericGroup {
    #[serde(rename = "SpecId")]
    pub group_id: String,
    #[serde(rename = "LibLong")]
    pub label: String,
    pub dci: String,
}
