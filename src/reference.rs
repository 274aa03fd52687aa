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

//! Static reference files shipped next to the store: the eligibility
//! allow-list and the ATC classification tables.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Serialize;

/// Ordered list of eligible specialty ids.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: Vec<String>,
    index: HashSet<String>,
}

impl AllowList {
    pub fn new(ids: impl IntoIterator<Item = String>) -> Self {
        let mut list = Self::default();
        for id in ids {
            let id = id.trim().to_string();
            if id.is_empty() || !list.index.insert(id.clone()) {
                continue;
            }
            list.ids.push(id);
        }
        list
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read allow-list {}", path.display()))?;
        let ids: Vec<String> = serde_json::from_str(&text)
            .with_context(|| format!("parse allow-list {}", path.display()))?;
        let list = Self::new(ids);
        tracing::debug!(entries = list.len(), path = %path.display(), "loaded allow-list");
        Ok(list)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AtcLevel {
    pub code: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AtcClass {
    pub code: String,
    pub level1: AtcLevel,
    pub level2: AtcLevel,
}

/// CIS → ATC code, plus optional labels per ATC code.
#[derive(Debug, Clone, Default)]
pub struct AtcTable {
    codes: HashMap<String, String>,
    labels: HashMap<String, String>,
}

impl AtcTable {
    pub fn load(path: &Path, labels_path: Option<&Path>) -> Result<Self> {
        let codes = read_pairs(path).with_context(|| format!("read ATC table {}", path.display()))?;
        let labels = match labels_path {
            Some(p) => read_pairs(p).with_context(|| format!("read ATC labels {}", p.display()))?,
            None => HashMap::new(),
        };
        tracing::debug!(codes = codes.len(), labels = labels.len(), "loaded ATC tables");
        Ok(Self { codes, labels })
    }

    pub fn code(&self, cis: &str) -> Option<&str> {
        self.codes.get(cis).map(String::as_str)
    }

    /// Level 1 is the anatomical group (first letter), level 2 the
    /// therapeutic subgroup (first three characters).
    pub fn classify(&self, cis: &str) -> Option<AtcClass> {
        let code = self.code(cis)?;
        let level = |len: usize| {
            let prefix: String = code.chars().take(len).collect();
            AtcLevel {
                label: self.labels.get(&prefix).cloned(),
                code: prefix,
            }
        };
        Some(AtcClass {
            code: code.to_string(),
            level1: level(1),
            level2: level(3),
        })
    }
}

fn read_pairs(path: &Path) -> Result<HashMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut out = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let (Some(key), Some(value)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.entry(key.to_string())
            .or_insert_with(|| value.trim().to_string());
    }
    Ok(out)
}

/// Reference data loaded on first access and never mutated afterwards.
#[derive(Debug)]
pub struct Reference {
    allow_list_path: PathBuf,
    atc_path: PathBuf,
    atc_labels_path: Option<PathBuf>,
    allow_list: OnceCell<AllowList>,
    atc: OnceCell<AtcTable>,
}

impl Reference {
    pub fn new(allow_list_path: PathBuf, atc_path: PathBuf, atc_labels_path: Option<PathBuf>) -> Self {
        Self {
            allow_list_path,
            atc_path,
            atc_labels_path,
            allow_list: OnceCell::new(),
            atc: OnceCell::new(),
        }
    }

    pub fn with_allow_list(self, list: AllowList) -> Self {
        let _ = self.allow_list.set(list);
        self
    }

    pub fn allow_list(&self) -> Result<&AllowList> {
        self.allow_list
            .get_or_try_init(|| AllowList::load(&self.allow_list_path))
    }

    /// A missing ATC file yields an empty table rather than an error.
    pub fn atc(&self) -> Result<&AtcTable> {
        self.atc.get_or_try_init(|| {
            if !self.atc_path.exists() {
                tracing::warn!(path = %self.atc_path.display(), "ATC table missing");
                return Ok(AtcTable::default());
            }
            AtcTable::load(&self.atc_path, self.atc_labels_path.as_deref())
        })
    }
}
