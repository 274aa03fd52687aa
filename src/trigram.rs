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

//! Trigram word similarity and accent folding, compatible with the
//! `pg_trgm` / `unaccent` behaviour the search index was designed around.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

type Trigram = [char; 3];

/// Default `pg_trgm.word_similarity_threshold`.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

pub fn unaccent(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.nfd() {
        match c {
            '\u{0300}'..='\u{036F}' => {}
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'ß' => out.push_str("ss"),
            _ => out.push(c),
        }
    }
    out
}

/// Token stored in the search index for a display label.
pub fn index_token(label: &str) -> String {
    unaccent(label.trim()).to_lowercase()
}

/// Ordered trigrams of every word, duplicates kept.
fn trigrams(s: &str) -> Vec<Trigram> {
    let lower = s.to_lowercase();
    let mut out = Vec::new();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            out.push([window[0], window[1], window[2]]);
        }
    }
    out
}

/// Greatest similarity between the trigram set of `query` and any contiguous
/// extent of the ordered trigrams of `target`.
pub fn word_similarity(query: &str, target: &str) -> f64 {
    let wanted: HashSet<Trigram> = trigrams(query).into_iter().collect();
    if wanted.is_empty() {
        return 0.0;
    }
    let ordered = trigrams(target);

    let mut best = 0.0f64;
    for lo in 0..ordered.len() {
        // Extents opening on a foreign trigram are dominated by the one
        // starting at the next shared trigram.
        if !wanted.contains(&ordered[lo]) {
            continue;
        }
        let mut seen: HashSet<Trigram> = HashSet::new();
        let mut common = 0usize;
        for trigram in &ordered[lo..] {
            let shared = wanted.contains(trigram);
            if seen.insert(*trigram) && shared {
                common += 1;
            }
            if !shared {
                continue;
            }
            let union = wanted.len() + seen.len() - common;
            let sml = common as f64 / union as f64;
            if sml > best {
                best = sml;
            }
        }
        if best >= 1.0 {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_pg_trgm_reference_value() {
        let sml = word_similarity("word", "two words");
        assert!((sml - 0.8).abs() < 1e-9, "got {sml}");
    }

    #[test]
    fn identical_words_score_one() {
        assert_eq!(word_similarity("doliprane", "doliprane 1000 mg"), 1.0);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(word_similarity("DOLIPRANE", "doliprane"), 1.0);
    }

    #[test]
    fn unrelated_words_score_low() {
        assert!(word_similarity("ibuprofene", "doliprane") < DEFAULT_THRESHOLD);
    }

    #[test]
    fn empty_query_scores_zero() {
        assert_eq!(word_similarity("", "doliprane"), 0.0);
        assert_eq!(word_similarity("  --  ", "doliprane"), 0.0);
    }

    #[test]
    fn typo_stays_above_threshold() {
        assert!(word_similarity("paracetamole", "paracetamol") >= DEFAULT_THRESHOLD);
    }

    #[test]
    fn unaccent_folds_marks_and_ligatures() {
        assert_eq!(unaccent("PARACÉTAMOL"), "PARACETAMOL");
        assert_eq!(unaccent("cœur"), "coeur");
        assert_eq!(index_token("  Éther  "), "ether");
    }
}
