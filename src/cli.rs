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

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(
    name = "infomed",
    version,
    about = "French drug catalogue search and patient leaflets"
)]
pub struct Cli {
    /// Log debug events to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write infomed.toml and create an empty store
    Init {
        /// Directory to initialize
        path: Option<PathBuf>,
    },

    /// Load a JSONL catalogue dump, replacing current tables
    Import(ImportArgs),

    /// Dump catalogue tables as JSONL
    Export(ExportArgs),

    /// Rebuild the search index
    Reindex(JsonFlag),

    /// Fuzzy search over specialties and substances
    Search(SearchArgs),

    /// Patient leaflet sections for a specialty
    Leaflet(CisArgs),

    /// Specialty detail
    Show(ShowArgs),

    /// Groups starting with a letter, paginated
    Browse(BrowseArgs),

    /// Generic groups starting with a letter
    Generics(LetterArgs),

    /// Answer JSON requests read from stdin, one per line
    Batch,

    /// Show stats
    Stats(JsonFlag),

    /// Run integrity checks
    Doctor(JsonFlag),

    /// Print a shell completion script
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
pub struct JsonFlag {
    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Input file (JSONL)
    pub path: PathBuf,

    /// Output JSON stats
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file (defaults to stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Output JSON stats (requires --out)
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CisArgs {
    /// Specialty id (CIS)
    pub cis: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Specialty id (CIS)
    pub cis: String,

    /// Include the patient leaflet
    #[arg(long)]
    pub leaflet: bool,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BrowseArgs {
    /// First letter of the name
    pub letter: String,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct LetterArgs {
    /// First letter of the label
    pub letter: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}
