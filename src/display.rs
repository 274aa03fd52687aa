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

use crate::model::Composant;

/// Normalized group name of a specialty denomination: everything before the
/// first digit or comma.
pub fn group_name(denomination: &str) -> String {
    let trimmed = denomination.trim();
    let end = trimmed
        .find(|c: char| c.is_ascii_digit() || c == ',')
        .unwrap_or(trimmed.len());
    let prefix = trimmed[..end].trim();
    if prefix.is_empty() {
        trimmed.to_string()
    } else {
        prefix.to_string()
    }
}

pub fn format_spec_name(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let letters = word.chars().filter(|c| c.is_alphabetic()).count();
            let shouting = letters >= 2 && !word.chars().any(|c| c.is_lowercase());
            if !shouting {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// DCI part of a generic group label (`"PARACETAMOL 1 g - DOLIPRANE 1 g"`).
pub fn generic_dci(label: &str) -> String {
    label
        .split(" - ")
        .next()
        .unwrap_or(label)
        .trim()
        .to_string()
}

/// Distinct substances of a composition, first occurrence wins.
pub fn simple_composants(composants: &[Composant]) -> Vec<&Composant> {
    let mut out: Vec<&Composant> = Vec::new();
    for composant in composants {
        if !out.iter().any(|c| c.nom_id == composant.nom_id) {
            out.push(composant);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_name_stops_at_dosage_or_comma() {
        assert_eq!(group_name("DOLIPRANE 1000 mg, comprimé"), "DOLIPRANE");
        assert_eq!(group_name("SPASFON LYOC, lyophilisat oral"), "SPASFON LYOC");
        assert_eq!(group_name("  ADVIL  "), "ADVIL");
        assert_eq!(group_name("5-FLUOROURACILE"), "5-FLUOROURACILE");
    }

    #[test]
    fn format_spec_name_softens_capitals() {
        assert_eq!(
            format_spec_name("DOLIPRANE 1000 mg, comprimé"),
            "Doliprane 1000 mg, comprimé"
        );
        assert_eq!(format_spec_name("A"), "A");
    }

    #[test]
    fn generic_dci_keeps_first_segment() {
        assert_eq!(
            generic_dci("PARACETAMOL 1000 mg - DOLIPRANE 1000 mg, comprimé"),
            "PARACETAMOL 1000 mg"
        );
        assert_eq!(generic_dci("IBUPROFENE"), "IBUPROFENE");
    }

    #[test]
    fn simple_composants_dedupes_by_substance() {
        let rows = vec![
            Composant {
                nom_id: "1".into(),
                label: "A".into(),
                dosage: None,
            },
            Composant {
                nom_id: "1".into(),
                label: "A".into(),
                dosage: Some("5 mg".into()),
            },
            Composant {
                nom_id: "2".into(),
                label: "B".into(),
                dosage: None,
            },
        ];
        let labels: Vec<&str> = simple_composants(&rows)
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["A", "B"]);
    }
}
