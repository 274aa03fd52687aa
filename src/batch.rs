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

//! JSON requests against a [`Catalog`], one response per request.

use std::io::BufRead;
use std::io::Write;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;

use crate::catalog::Catalog;
use crate::output::JsonResponse;
use crate::output::QueryOut;
use crate::output::StatsOut;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Search {
        query: String,
    },
    Leaflet {
        cis: String,
    },
    Show {
        cis: String,
        #[serde(default)]
        leaflet: bool,
    },
    Browse {
        letter: String,
        #[serde(default = "first_page")]
        page: usize,
    },
    Generics {
        letter: String,
    },
}

fn first_page() -> usize {
    1
}

fn took_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

pub fn respond(catalog: &Catalog, request: &Request) -> Result<JsonResponse> {
    let started = Instant::now();
    let resp = match request {
        Request::Search { query } => {
            let results = catalog.search(query)?;
            let values = results
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            JsonResponse::ok()
                .with_query(QueryOut::text(query))
                .with_results(values)
                .with_stats(StatsOut {
                    took_ms: took_ms(started),
                    total_hits: Some(results.len() as i64),
                    ..Default::default()
                })
        }
        Request::Leaflet { cis } => {
            let leaflet = catalog.leaflet(cis)?;
            let item = match leaflet {
                Some(leaflet) => serde_json::to_value(&*leaflet)?,
                None => serde_json::Value::Null,
            };
            JsonResponse::ok()
                .with_query(QueryOut::cis(cis))
                .with_item(item)
        }
        Request::Show { cis, leaflet } => {
            let detail = catalog.show(cis, *leaflet)?;
            JsonResponse::ok()
                .with_query(QueryOut::cis(cis))
                .with_item(serde_json::to_value(&detail)?)
        }
        Request::Browse { letter, page } => {
            let listing = catalog.browse(letter, *page)?;
            JsonResponse::ok()
                .with_query(QueryOut::letter(letter, Some(*page)))
                .with_page(serde_json::to_value(&listing)?)
        }
        Request::Generics { letter } => {
            let listing = catalog.generics(letter)?;
            JsonResponse::ok()
                .with_query(QueryOut::letter(letter, None))
                .with_page(serde_json::to_value(&listing)?)
        }
    };
    Ok(resp)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub requests: usize,
    pub failed: usize,
}

/// Answers every non-blank line of `reader`. Bad lines and failed requests
/// produce an error response; the loop only stops on I/O errors.
pub fn run_batch(
    catalog: &Catalog,
    reader: impl BufRead,
    mut writer: impl Write,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("read batch request")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        summary.requests += 1;
        let resp = serde_json::from_str::<Request>(trimmed)
            .with_context(|| format!("parse batch request on line {}", idx + 1))
            .and_then(|request| respond(catalog, &request));
        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                summary.failed += 1;
                tracing::warn!(line = idx + 1, error = %format!("{err:#}"), "batch request failed");
                JsonResponse::from_error(&err)
            }
        };
        writeln!(writer, "{}", serde_json::to_string(&resp)?).context("write batch response")?;
        writer.flush()?;
    }
    Ok(summary)
}
