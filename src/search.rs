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

//! Fuzzy search over specialty and substance names.
//!
//! Matching happens in the store (`word_similarity` over `search_index`).
//! Matches are then resolved against the allow-list and ranked here: a
//! substance match brings along every group containing that substance, and a
//! specialty match brings its own group.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::model::MatchCandidate;
use crate::model::SearchResultItem;
use crate::model::Specialite;
use crate::model::SubstanceNom;
use crate::model::TableName;
use crate::model::group_specialites;
use crate::reference::AllowList;
use crate::store::Store;

/// Matched ids split by table, each in ranked order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MatchIds {
    pub specialite_ids: Vec<String>,
    pub substance_ids: Vec<String>,
}

impl MatchIds {
    pub fn from_matches(matches: &[MatchCandidate]) -> Self {
        let mut ids = Self::default();
        for m in matches {
            match m.table_name {
                TableName::Specialite => ids.specialite_ids.push(m.id.clone()),
                TableName::SubsNom => ids.substance_ids.push(m.id.clone()),
            }
        }
        ids
    }
}

/// Allow-listed rows backing one set of matches.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub specialites: Vec<Specialite>,
    pub substances: Vec<SubstanceNom>,
}

pub fn resolve(store: &Store, ids: &MatchIds, allow: &AllowList) -> Result<Resolved> {
    let specialites = store.specialites_for(&ids.specialite_ids, &ids.substance_ids, allow)?;
    let substances = store.substances_for(&ids.substance_ids, allow)?;
    Ok(Resolved {
        specialites,
        substances,
    })
}

/// Runs one query: store-side matching, resolution through `resolve`, ranking.
pub fn search_with(
    store: &Store,
    threshold: f64,
    query: &str,
    resolve: impl FnOnce(&MatchIds) -> Result<Arc<Resolved>>,
) -> Result<Vec<SearchResultItem>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let started = Instant::now();
    let matches = store.search_matches(query, threshold)?;
    let match_ms = started.elapsed().as_millis();
    if matches.is_empty() {
        tracing::debug!(query, match_ms, "no matches");
        return Ok(Vec::new());
    }

    let resolved = resolve(&MatchIds::from_matches(&matches))?;
    let results = rank(&matches, &resolved);
    tracing::debug!(
        query,
        matches = matches.len(),
        specialites = resolved.specialites.len(),
        substances = resolved.substances.len(),
        results = results.len(),
        match_ms,
        total_ms = started.elapsed().as_millis(),
        "search"
    );
    Ok(results)
}

/// Orders resolved rows by the matches that produced them. Each group is
/// emitted once; ties keep match order.
pub fn rank(matches: &[MatchCandidate], resolved: &Resolved) -> Vec<SearchResultItem> {
    let groups = group_specialites(resolved.specialites.iter().cloned());
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut scored: Vec<(f64, SearchResultItem)> = Vec::new();

    for m in matches {
        match m.table_name {
            TableName::SubsNom => {
                let Some(substance) = resolved.substances.iter().find(|s| s.nom_id == m.id) else {
                    continue;
                };
                scored.push((m.score, SearchResultItem::Substance(substance.clone())));
                for group in &groups {
                    if emitted.contains(group.name.as_str())
                        || !group.specialites.iter().any(|s| s.composed_of(&m.id))
                    {
                        continue;
                    }
                    let direct = matches
                        .iter()
                        .find(|c| c.table_name == TableName::Specialite && group.contains(&c.id))
                        .map_or(0.0, |c| c.score);
                    emitted.insert(group.name.as_str());
                    scored.push((m.score + direct, SearchResultItem::Group(group.clone())));
                }
            }
            TableName::Specialite => {
                if let Some(group) = groups.iter().find(|g| g.contains(&m.id))
                    && emitted.insert(group.name.as_str())
                {
                    scored.push((m.score, SearchResultItem::Group(group.clone())));
                }
            }
        }
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::allow;
    use crate::store::tests::seeded_store;
    use crate::trigram::DEFAULT_THRESHOLD;

    fn search(
        store: &Store,
        allow: &AllowList,
        threshold: f64,
        query: &str,
    ) -> Result<Vec<SearchResultItem>> {
        search_with(store, threshold, query, |ids| resolve(store, ids, allow).map(Arc::new))
    }

    fn candidate(table_name: TableName, id: &str, score: f64) -> MatchCandidate {
        MatchCandidate {
            table_name,
            id: id.to_string(),
            token: id.to_string(),
            score,
        }
    }

    fn specialite(id: &str, name: &str, substances: &[&str]) -> Specialite {
        Specialite {
            spec_id: id.to_string(),
            denomination: name.to_string(),
            gene_id: None,
            substance_ids: substances.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn labels(items: &[SearchResultItem]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item {
                SearchResultItem::Substance(s) => format!("substance:{}", s.label),
                SearchResultItem::Group(g) => format!("group:{}", g.name),
            })
            .collect()
    }

    #[test]
    fn empty_query_returns_nothing() -> Result<()> {
        let store = seeded_store()?;
        assert!(search(&store, &allow(), DEFAULT_THRESHOLD, "   ")?.is_empty());
        assert!(search(&store, &allow(), DEFAULT_THRESHOLD, "zzzzqqq")?.is_empty());
        Ok(())
    }

    #[test]
    fn exact_substance_comes_before_its_group() -> Result<()> {
        let store = seeded_store()?;
        let results = search(&store, &allow(), DEFAULT_THRESHOLD, "paracétamol")?;
        assert_eq!(labels(&results), vec!["substance:PARACÉTAMOL", "group:DOLIPRANE"]);
        let SearchResultItem::Group(group) = &results[1] else {
            panic!("expected group");
        };
        let ids: Vec<&str> = group.specialites.iter().map(|s| s.spec_id.as_str()).collect();
        assert_eq!(ids, vec!["60234100", "60234200"]);
        Ok(())
    }

    #[test]
    fn specialty_matches_collapse_into_one_group() -> Result<()> {
        let store = seeded_store()?;
        let results = search(&store, &allow(), DEFAULT_THRESHOLD, "doliprane")?;
        assert_eq!(labels(&results), vec!["group:DOLIPRANE"]);
        Ok(())
    }

    #[test]
    fn results_stay_inside_allow_list() -> Result<()> {
        let store = seeded_store()?;
        assert!(search(&store, &allow(), DEFAULT_THRESHOLD, "codeine")?.is_empty());
        assert!(search(&store, &allow(), DEFAULT_THRESHOLD, "efferalgan")?.is_empty());
        let list = allow();
        for item in search(&store, &list, DEFAULT_THRESHOLD, "paracetamol")? {
            if let SearchResultItem::Group(group) = item {
                assert!(group.specialites.iter().all(|s| list.contains(&s.spec_id)));
            }
        }
        Ok(())
    }

    #[test]
    fn search_is_deterministic() -> Result<()> {
        let store = seeded_store()?;
        let first = search(&store, &allow(), DEFAULT_THRESHOLD, "ibuprofene")?;
        let second = search(&store, &allow(), DEFAULT_THRESHOLD, "ibuprofene")?;
        assert_eq!(first, second);
        assert_eq!(labels(&first), vec!["substance:IBUPROFÈNE", "group:ADVIL"]);
        Ok(())
    }

    #[test]
    fn direct_match_boosts_substance_group() {
        let matches = vec![
            candidate(TableName::Specialite, "2", 0.9),
            candidate(TableName::SubsNom, "S", 0.7),
        ];
        let resolved = Resolved {
            specialites: vec![
                specialite("1", "ALPHA 10 mg", &["S"]),
                specialite("2", "BETA 5 mg", &["S"]),
            ],
            substances: vec![SubstanceNom {
                nom_id: "S".into(),
                label: "SUBSTANCE".into(),
            }],
        };
        let results = rank(&matches, &resolved);
        // BETA is emitted first by the specialty match (0.9), ALPHA through the
        // substance with no direct match (0.7), then the substance itself ties.
        assert_eq!(
            labels(&results),
            vec!["group:BETA", "substance:SUBSTANCE", "group:ALPHA"]
        );
    }

    #[test]
    fn substance_first_adds_best_direct_score() {
        let matches = vec![
            candidate(TableName::SubsNom, "S", 0.8),
            candidate(TableName::Specialite, "2", 0.6),
            candidate(TableName::Specialite, "3", 0.95),
        ];
        let resolved = Resolved {
            specialites: vec![
                specialite("1", "ALPHA 10 mg", &["S"]),
                specialite("2", "BETA 5 mg", &["S"]),
                specialite("3", "GAMMA 1 g", &[]),
            ],
            substances: vec![SubstanceNom {
                nom_id: "S".into(),
                label: "SUBSTANCE".into(),
            }],
        };
        let results = rank(&matches, &resolved);
        // BETA: 0.8 + 0.6, GAMMA: 0.95, ALPHA: 0.8 (ties with the substance,
        // which was pushed first).
        assert_eq!(
            labels(&results),
            vec!["group:BETA", "group:GAMMA", "substance:SUBSTANCE", "group:ALPHA"]
        );
    }

    #[test]
    fn unresolved_matches_are_dropped() {
        let matches = vec![
            candidate(TableName::SubsNom, "missing", 1.0),
            candidate(TableName::Specialite, "gone", 1.0),
        ];
        assert!(rank(&matches, &Resolved::default()).is_empty());
    }
}
