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

//! Alphabetic listings of groups and generic groups.

use anyhow::Result;
use serde::Serialize;

use crate::error::NotFound;
use crate::model::GenericGroup;
use crate::model::MedicamentGroup;
use crate::model::group_specialites;
use crate::reference::AllowList;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowsePage {
    pub letter: String,
    pub letters: Vec<String>,
    pub page: usize,
    pub page_count: usize,
    pub groups: Vec<MedicamentGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenericsListing {
    pub letter: String,
    pub letters: Vec<String>,
    pub groups: Vec<GenericGroup>,
}

fn normalize_letter(letter: &str) -> Result<String> {
    let mut chars = letter.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c.to_uppercase().collect()),
        _ => Err(NotFound::new(format!("letter {letter:?}")).into()),
    }
}

/// One page of the allow-listed groups whose name starts with `letter`.
/// `page` is 1-based.
pub fn browse(
    store: &Store,
    allow: &AllowList,
    letter: &str,
    page: usize,
    page_length: usize,
) -> Result<BrowsePage> {
    let letter = normalize_letter(letter)?;
    let page_length = page_length.max(1);
    let groups = group_specialites(store.specialites_by_letter(&letter, allow)?);
    if groups.is_empty() {
        return Err(NotFound::new(format!("specialties starting with {letter}")).into());
    }
    let page_count = groups.len().div_ceil(page_length);
    if page == 0 || page > page_count {
        return Err(NotFound::new(format!("page {page} of {letter}")).into());
    }
    let groups: Vec<MedicamentGroup> = groups
        .into_iter()
        .skip((page - 1) * page_length)
        .take(page_length)
        .collect();
    tracing::debug!(%letter, page, page_count, groups = groups.len(), "browse");
    Ok(BrowsePage {
        letters: store.specialite_letters(allow)?,
        letter,
        page,
        page_count,
        groups,
    })
}

/// Generic groups whose label starts with `letter`. An empty listing is not
/// an error.
pub fn generics(store: &Store, allow: &AllowList, letter: &str) -> Result<GenericsListing> {
    let letter = normalize_letter(letter)?;
    let groups = store.generics_by_letter(&letter, allow)?;
    Ok(GenericsListing {
        letters: store.generic_letters(allow)?,
        letter,
        groups,
    })
}
