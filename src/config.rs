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

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::trigram::DEFAULT_THRESHOLD;

pub const CONFIG_FILE: &str = "infomed.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_path: PathBuf,
    pub allow_list_path: PathBuf,
    pub leaflet_archive_path: PathBuf,
    pub atc_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atc_labels_path: Option<PathBuf>,
    pub similarity_threshold: f64,
    pub page_length: usize,
    pub search_cache_entries: usize,
    pub leaflet_cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("infomed.db"),
            allow_list_path: PathBuf::from("liste_CIS_MVP.json"),
            leaflet_archive_path: PathBuf::from("Notices_RCP_html.zip"),
            atc_path: PathBuf::from("CIS-ATC.csv"),
            atc_labels_path: None,
            similarity_threshold: DEFAULT_THRESHOLD,
            page_length: 10,
            search_cache_entries: 256,
            leaflet_cache_entries: 512,
        }
    }
}

/// A loaded configuration together with the directory it was found in.
#[derive(Debug, Clone)]
pub struct ConfigCtx {
    pub root: PathBuf,
    pub config: Config,
}

impl ConfigCtx {
    pub fn load_from_cwd() -> Result<Self> {
        let cwd = std::env::current_dir().context("get current dir")?;
        Self::load_from(&cwd)
    }

    pub fn load_from(start: &Path) -> Result<Self> {
        let root = find_config_root(start)
            .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE} not found; run `infomed init` first"))?;
        let config = read_config(&root.join(CONFIG_FILE))?;
        Ok(Self { root, config })
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve(&self.config.store_path)
    }

    pub fn allow_list_path(&self) -> PathBuf {
        self.resolve(&self.config.allow_list_path)
    }

    pub fn leaflet_archive_path(&self) -> PathBuf {
        self.resolve(&self.config.leaflet_archive_path)
    }

    pub fn atc_path(&self) -> PathBuf {
        self.resolve(&self.config.atc_path)
    }

    pub fn atc_labels_path(&self) -> Option<PathBuf> {
        self.config.atc_labels_path.as_deref().map(|p| self.resolve(p))
    }
}

pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let mut cur = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    loop {
        if cur.join(CONFIG_FILE).is_file() {
            return Some(cur);
        }
        match cur.parent() {
            Some(parent) => cur = parent.to_path_buf(),
            None => return None,
        }
    }
}

pub fn read_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut config: Config = toml::from_str(&text).with_context(|| format!("parse {CONFIG_FILE}"))?;
    if !(0.0..=1.0).contains(&config.similarity_threshold) {
        tracing::warn!(
            threshold = config.similarity_threshold,
            "similarity_threshold out of range, clamping"
        );
        config.similarity_threshold = config.similarity_threshold.clamp(0.0, 1.0);
    }
    if config.page_length == 0 {
        config.page_length = 1;
    }
    Ok(config)
}

pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    let text = toml::to_string_pretty(config).context("serialize config")?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
