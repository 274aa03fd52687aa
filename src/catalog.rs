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

//! Read-side entry point shared by every command and the batch loop.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use anyhow::Result;
use lru::LruCache;
use serde::Serialize;

use crate::browse;
use crate::browse::BrowsePage;
use crate::browse::GenericsListing;
use crate::config::Config;
use crate::config::ConfigCtx;
use crate::display::format_spec_name;
use crate::display::simple_composants;
use crate::error::NotFound;
use crate::leaflet::Leaflet;
use crate::leaflet::LeafletArchive;
use crate::model::Composant;
use crate::model::SearchResultItem;
use crate::model::Specialite;
use crate::reference::AtcClass;
use crate::reference::Reference;
use crate::search;
use crate::search::MatchIds;
use crate::search::Resolved;
use crate::store::Store;
use crate::store::StoreMode;

#[derive(Debug, Clone, Serialize)]
pub struct SpecialiteDetail {
    pub specialite: Specialite,
    pub group_name: String,
    pub display_name: String,
    pub substances: Vec<Composant>,
    pub composants: Vec<Composant>,
    pub generic: bool,
    pub eligible: bool,
    pub atc: Option<AtcClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaflet: Option<Leaflet>,
}

pub struct Catalog {
    store: Store,
    reference: Reference,
    archive: LeafletArchive,
    threshold: f64,
    page_length: usize,
    search_cache: Mutex<LruCache<String, Arc<Vec<SearchResultItem>>>>,
    resolved_cache: Mutex<LruCache<MatchIds, Arc<Resolved>>>,
    leaflet_cache: Mutex<LruCache<String, Option<Arc<Leaflet>>>>,
}

fn capacity(entries: usize) -> NonZeroUsize {
    NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Catalog {
    pub fn open(ctx: &ConfigCtx) -> Result<Self> {
        let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;
        let reference = Reference::new(ctx.allow_list_path(), ctx.atc_path(), ctx.atc_labels_path());
        let archive = LeafletArchive::new(ctx.leaflet_archive_path());
        Ok(Self::from_parts(&ctx.config, store, reference, archive))
    }

    pub fn from_parts(
        config: &Config,
        store: Store,
        reference: Reference,
        archive: LeafletArchive,
    ) -> Self {
        Self {
            store,
            reference,
            archive,
            threshold: config.similarity_threshold,
            page_length: config.page_length,
            search_cache: Mutex::new(LruCache::new(capacity(config.search_cache_entries))),
            resolved_cache: Mutex::new(LruCache::new(capacity(config.search_cache_entries))),
            leaflet_cache: Mutex::new(LruCache::new(capacity(config.leaflet_cache_entries))),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn search(&self, query: &str) -> Result<Arc<Vec<SearchResultItem>>> {
        let key = query.trim().to_string();
        if let Some(hit) = lock(&self.search_cache).get(&key).cloned() {
            tracing::debug!(query = %key, "search cache hit");
            return Ok(hit);
        }
        let allow = self.reference.allow_list()?;
        let results = search::search_with(&self.store, self.threshold, &key, |ids| {
            if let Some(hit) = lock(&self.resolved_cache).get(ids).cloned() {
                tracing::debug!("resolved rows cache hit");
                return Ok(hit);
            }
            let resolved = Arc::new(search::resolve(&self.store, ids, allow)?);
            lock(&self.resolved_cache).put(ids.clone(), Arc::clone(&resolved));
            Ok(resolved)
        })?;
        let results = Arc::new(results);
        lock(&self.search_cache).put(key, Arc::clone(&results));
        Ok(results)
    }

    /// The parsed leaflet for `cis`, `None` when the archive has no entry.
    /// Absent entries are cached; errors are not.
    pub fn leaflet(&self, cis: &str) -> Result<Option<Arc<Leaflet>>> {
        let cis = cis.trim();
        if let Some(hit) = lock(&self.leaflet_cache).get(cis).cloned() {
            tracing::debug!(cis, "leaflet cache hit");
            return Ok(hit);
        }
        let leaflet = self.archive.load(cis)?.map(Arc::new);
        lock(&self.leaflet_cache).put(cis.to_string(), leaflet.clone());
        Ok(leaflet)
    }

    pub fn show(&self, cis: &str, with_leaflet: bool) -> Result<SpecialiteDetail> {
        let cis = cis.trim();
        let specialite = self
            .store
            .specialite(cis)?
            .ok_or_else(|| NotFound::new(format!("specialty {cis}")))?;
        let composants = self.store.composants(cis)?;
        let substances = simple_composants(&composants).into_iter().cloned().collect();
        let atc = self.reference.atc()?.classify(cis);
        let eligible = self.reference.allow_list()?.contains(cis);
        let leaflet = if with_leaflet {
            self.leaflet(cis)?.map(|l| (*l).clone())
        } else {
            None
        };
        Ok(SpecialiteDetail {
            group_name: specialite.group_name(),
            display_name: format_spec_name(&specialite.denomination),
            generic: specialite.gene_id.is_some(),
            specialite,
            substances,
            composants,
            eligible,
            atc,
            leaflet,
        })
    }

    pub fn browse(&self, letter: &str, page: usize) -> Result<BrowsePage> {
        let allow = self.reference.allow_list()?;
        browse::browse(&self.store, allow, letter, page, self.page_length)
    }

    pub fn generics(&self, letter: &str) -> Result<GenericsListing> {
        let allow = self.reference.allow_list()?;
        browse::generics(&self.store, allow, letter)
    }
}
