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

use thiserror::Error;

/// A leaflet entry exists but its document cannot be segmented.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeafletError {
    #[error("{cis} : could not find leaflet update node")]
    MissingUpdateMarker { cis: String },

    #[error("{cis} : could not find body node")]
    MissingBody { cis: String },

    #[error("{cis} : no tag found for section boundary {index} ({description})")]
    MissingSection {
        cis: String,
        index: usize,
        description: &'static str,
    },
}

impl LeafletError {
    pub fn cis(&self) -> &str {
        match self {
            LeafletError::MissingUpdateMarker { cis }
            | LeafletError::MissingBody { cis }
            | LeafletError::MissingSection { cis, .. } => cis,
        }
    }
}

/// A browse request addressed a letter or page with nothing to show.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{what} not found")]
pub struct NotFound {
    pub what: String,
}

impl NotFound {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// Error code reported in JSON responses.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if err.downcast_ref::<LeafletError>().is_some() {
        "malformed_source"
    } else if err.downcast_ref::<NotFound>().is_some() {
        "not_found"
    } else {
        "error"
    }
}
