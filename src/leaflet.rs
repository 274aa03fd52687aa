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

//! Patient leaflets: archive lookup, legacy decoding and section splitting.
//!
//! A leaflet is a long run of `<p>` tags at the top level of the body. Most
//! of the time sections are announced by `<a name="Ann3b...">` anchors inside
//! one of those paragraphs; older documents only carry the numbered heading
//! text, so the first four boundaries also accept a heading match.

use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::ElementRef;
use scraper::Html;
use scraper::Node;
use scraper::Selector;
use serde::Serialize;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::LeafletError;

pub const ARCHIVE_DIR: &str = "Notices_RCP_html";

pub fn entry_name(cis: &str) -> String {
    format!("{ARCHIVE_DIR}/{cis}_notice.htm")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaflet {
    pub updated_at: String,
    pub generalities: Vec<String>,
    pub usage: Vec<String>,
    pub warnings: Vec<String>,
    pub how_to: Vec<String>,
    pub side_effects: Vec<String>,
    pub storage: Vec<String>,
    pub composition: Vec<String>,
}

impl Leaflet {
    /// Sections with their display titles, in document order.
    pub fn sections(&self) -> [(&'static str, &[String]); 7] {
        [
            ("Généralités", &self.generalities),
            ("A quoi sert-il", &self.usage),
            ("Précautions", &self.warnings),
            ("Comment le prendre ?", &self.how_to),
            ("Effets indésirables", &self.side_effects),
            ("Conservation", &self.storage),
            ("Composition", &self.composition),
        ]
    }
}

enum Heading {
    Equals(&'static str),
    StartsWith(&'static str),
}

struct Boundary {
    description: &'static str,
    selector: &'static str,
    heading: Option<Heading>,
}

const BOUNDARIES: [Boundary; 7] = [
    Boundary {
        description: "generalities",
        selector: "[name=Ann3bDenomination]",
        heading: Some(Heading::Equals("Dénomination du médicament")),
    },
    Boundary {
        description: "usage",
        selector: "[name=Ann3bQuestceque]",
        heading: Some(Heading::StartsWith("1. QU’EST-CE QU’")),
    },
    Boundary {
        description: "warnings",
        selector: "[name=Ann3bInfoNecessaires]",
        heading: Some(Heading::StartsWith("2. QUELLES SONT LES INFORMATIONS")),
    },
    Boundary {
        description: "how to",
        selector: "[name=Ann3bCommentPrendre]",
        heading: Some(Heading::StartsWith("3. COMMENT UTILISER")),
    },
    Boundary {
        description: "side effects",
        selector: "[name=Ann3bEffetsIndesirables]",
        heading: None,
    },
    Boundary {
        description: "storage",
        selector: "[name=Ann3bConservation]",
        heading: None,
    },
    Boundary {
        description: "composition",
        selector: "[name=Ann3bEmballage],[name=Ann3bContenu],[name=Ann3bInfoSupp]",
        heading: None,
    },
];

static BOUNDARY_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    BOUNDARIES
        .iter()
        .map(|b| Selector::parse(b.selector).expect("boundary selector"))
        .collect()
});

static UPDATE_MARKER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".DateNotif").expect("update marker selector"));

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body selector"));

const TITLE_CLASS: &str = "AmmAnnexeTitre";

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_READ_HINT: usize = 1 << 20;

impl Boundary {
    fn matches(&self, selector: &Selector, el: Option<ElementRef<'_>>) -> bool {
        let Some(el) = el else {
            return false;
        };
        if el.select(selector).next().is_some() {
            return true;
        }
        let Some(heading) = &self.heading else {
            return false;
        };
        let text: String = el.text().collect();
        let text = text.trim();
        match heading {
            Heading::Equals(expected) => text == *expected,
            Heading::StartsWith(prefix) => text.starts_with(prefix),
        }
    }
}

/// Windows-1252, regardless of any byte order mark.
pub fn decode(bytes: &[u8]) -> String {
    encoding_rs::WINDOWS_1252
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

/// The ZIP holding every leaflet, opened on first use.
pub struct LeafletArchive {
    path: PathBuf,
    zip: Mutex<Option<ZipArchive<File>>>,
}

impl LeafletArchive {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            zip: Mutex::new(None),
        }
    }

    fn open_zip(path: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(path)
            .with_context(|| format!("open leaflet archive {}", path.display()))?;
        ZipArchive::new(file).with_context(|| format!("read leaflet archive {}", path.display()))
    }

    /// Raw bytes of the leaflet entry for `cis`, `None` when absent.
    pub fn read_entry(&self, cis: &str) -> Result<Option<Vec<u8>>> {
        let mut guard = self
            .zip
            .lock()
            .map_err(|_| anyhow::anyhow!("leaflet archive lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(Self::open_zip(&self.path)?);
        }
        let archive = guard.as_mut().context("leaflet archive unavailable")?;

        let name = entry_name(cis);
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read {name} from leaflet archive"));
            }
        };
        let mut bytes = Vec::with_capacity(read_capacity(entry.size()));
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("read {name} from leaflet archive"))?;
        Ok(Some(bytes))
    }

    pub fn load(&self, cis: &str) -> Result<Option<Leaflet>> {
        let Some(bytes) = self.read_entry(cis)? else {
            tracing::debug!(cis, "no leaflet in archive");
            return Ok(None);
        };
        let html = decode(&bytes);
        match parse_leaflet(cis, &html) {
            Ok(leaflet) => Ok(Some(leaflet)),
            Err(err) => {
                tracing::warn!(cis = err.cis(), error = %err, "leaflet rejected");
                Err(err.into())
            }
        }
    }
}

fn read_capacity(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_READ_HINT)
}

pub fn parse_leaflet(cis: &str, html: &str) -> Result<Leaflet, LeafletError> {
    let (updated_at, runs) = split_document(cis, html)?;
    let mut runs = runs.into_iter().skip(1);
    let mut next = || runs.next().unwrap_or_default();
    Ok(Leaflet {
        updated_at,
        generalities: next(),
        usage: next(),
        warnings: next(),
        how_to: next(),
        side_effects: next(),
        storage: next(),
        composition: next(),
    })
}

/// Update label and the eight runs of rendered body children, preamble first.
fn split_document(cis: &str, html: &str) -> Result<(String, Vec<Vec<String>>), LeafletError> {
    let doc = Html::parse_document(html);

    let marker = doc
        .select(&UPDATE_MARKER)
        .next()
        .ok_or_else(|| LeafletError::MissingUpdateMarker {
            cis: cis.to_string(),
        })?;
    let updated_at = marker.text().collect::<String>().trim().to_string();

    let body = locate_body(&doc).ok_or_else(|| LeafletError::MissingBody {
        cis: cis.to_string(),
    })?;
    let children: Vec<_> = body.children().collect();
    let ranges = partition(cis, &children, |boundary, selector, node| {
        boundary.matches(selector, ElementRef::wrap(node))
    })?;

    let runs = ranges
        .into_iter()
        .map(|range| {
            children[range]
                .iter()
                .filter_map(|node| render_node(node.value(), ElementRef::wrap(*node)))
                .collect()
        })
        .collect();
    Ok((updated_at, runs))
}

/// The `body` element, or the `html` root when the content sits directly
/// under it (recognised by its title paragraph).
fn locate_body(doc: &Html) -> Option<ElementRef<'_>> {
    if let Some(body) = doc.select(&BODY).next() {
        return Some(body);
    }
    let root = doc.root_element();
    let has_title = root
        .children()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().classes().any(|c| c == TITLE_CLASS));
    has_title.then_some(root)
}

/// Splits `children` into eight contiguous runs, one boundary at a time; each
/// boundary is searched from the start of the previous one.
fn partition<N: Copy>(
    cis: &str,
    children: &[N],
    is_boundary: impl Fn(&Boundary, &Selector, N) -> bool,
) -> Result<Vec<Range<usize>>, LeafletError> {
    let mut cursor = 0usize;
    let mut runs = Vec::with_capacity(BOUNDARIES.len() + 1);
    for (idx, (boundary, selector)) in BOUNDARIES.iter().zip(BOUNDARY_SELECTORS.iter()).enumerate() {
        let offset = children[cursor..]
            .iter()
            .position(|node| is_boundary(boundary, selector, *node))
            .ok_or_else(|| LeafletError::MissingSection {
                cis: cis.to_string(),
                index: idx + 1,
                description: boundary.description,
            })?;
        runs.push(cursor..cursor + offset);
        cursor += offset;
    }
    runs.push(cursor..children.len());
    Ok(runs)
}

fn render_node(node: &Node, el: Option<ElementRef<'_>>) -> Option<String> {
    match node {
        Node::Element(_) => el.map(|el| el.html()),
        Node::Text(text) => Some(escape_text(text)),
        Node::Comment(comment) => Some(format!("<!--{}-->", &**comment)),
        _ => None,
    }
}

// Text nodes have no `ElementRef` to serialize; this follows html5ever's
// text escaping so they match the output of `ElementRef::html`.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}
