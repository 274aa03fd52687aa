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

mod batch;
mod browse;
mod catalog;
mod cli;
mod config;
mod display;
mod error;
mod leaflet;
mod model;
mod output;
mod reference;
mod search;
mod store;
mod transfer;
mod trigram;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::batch::Request;
use crate::catalog::Catalog;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::config::CONFIG_FILE;
use crate::config::Config;
use crate::config::ConfigCtx;
use crate::display::simple_composants;
use crate::model::SearchResultItem;
use crate::output::JsonResponse;
use crate::output::StatsOut;
use crate::output::print_json;
use crate::store::Store;
use crate::store::StoreMode;

const LOG_ENV: &str = "INFOMED_LOG";

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Import(args) => handle_result(cmd_import(args.path, args.json), args.json),
        Commands::Export(args) => handle_result(cmd_export(args.out, args.json), args.json),
        Commands::Reindex(flag) => handle_result(cmd_reindex(flag.json), flag.json),
        Commands::Search(args) => handle_result(cmd_search(args.query, args.json), args.json),
        Commands::Leaflet(args) => handle_result(cmd_leaflet(args.cis, args.json), args.json),
        Commands::Show(args) => {
            handle_result(cmd_show(args.cis, args.leaflet, args.json), args.json)
        }
        Commands::Browse(args) => {
            handle_result(cmd_browse(args.letter, args.page, args.json), args.json)
        }
        Commands::Generics(args) => {
            handle_result(cmd_generics(args.letter, args.json), args.json)
        }
        Commands::Batch => cmd_batch(),
        Commands::Stats(flag) => handle_result(cmd_stats(flag.json), flag.json),
        Commands::Doctor(flag) => handle_result(cmd_doctor(flag.json), flag.json),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "infomed", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn handle_result(result: Result<()>, json: bool) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if json {
                let resp = JsonResponse::from_error(&err);
                print_json(&resp)?;
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn open_catalog() -> Result<Catalog> {
    let ctx = ConfigCtx::load_from_cwd()?;
    Catalog::open(&ctx)
}

fn open_writable() -> Result<Store> {
    let ctx = ConfigCtx::load_from_cwd()?;
    Store::open(&ctx.store_path(), StoreMode::ReadWrite)
}

fn cmd_init(path: Option<PathBuf>) -> Result<()> {
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&root).with_context(|| format!("create dir {root:?}"))?;

    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        anyhow::bail!("{CONFIG_FILE} already exists at {}", config_path.display());
    }

    let config = Config::default();
    config::write_config(&config_path, &config)?;

    let store_path = root.join(&config.store_path);
    Store::init(&store_path)?;

    println!("Initialized infomed store at {}", store_path.display());
    Ok(())
}

fn cmd_import(path: PathBuf, json: bool) -> Result<()> {
    let started = Instant::now();
    let store = open_writable()?;
    let file = std::fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let stats = transfer::import_store(&store, file)?;

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: started.elapsed().as_millis() as i64,
            total_hits: Some(stats.total() as i64),
            transfer: Some(stats),
            ..Default::default()
        });
        print_json(&resp)?;
    } else {
        println!(
            "Imported {} specialties, {} substances, {} composition rows, {} generic groups",
            stats.specialites, stats.substances, stats.composants, stats.generics
        );
    }
    Ok(())
}

fn cmd_export(out: Option<PathBuf>, json: bool) -> Result<()> {
    if json && out.is_none() {
        anyhow::bail!("--json requires --out for export");
    }
    let started = Instant::now();
    let ctx = ConfigCtx::load_from_cwd()?;
    let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;

    let stats = if let Some(path) = out {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        let stats = transfer::export_store(&store, tmp.as_file_mut())?;
        tmp.persist(&path)
            .with_context(|| format!("write {}", path.display()))?;
        stats
    } else {
        let stdout = std::io::stdout();
        let handle = stdout.lock();
        transfer::export_store(&store, handle)?
    };

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: started.elapsed().as_millis() as i64,
            total_hits: Some(stats.total() as i64),
            transfer: Some(stats),
            ..Default::default()
        });
        print_json(&resp)?;
    }
    Ok(())
}

fn cmd_reindex(json: bool) -> Result<()> {
    let started = Instant::now();
    let store = open_writable()?;
    let rows = store.rebuild_search_index()?;

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: started.elapsed().as_millis() as i64,
            total_hits: Some(rows as i64),
            ..Default::default()
        });
        print_json(&resp)?;
    } else {
        println!("Indexed {rows} names");
    }
    Ok(())
}

fn cmd_search(query: String, json: bool) -> Result<()> {
    let catalog = open_catalog()?;
    if json {
        return print_json(&batch::respond(&catalog, &Request::Search { query })?);
    }

    let results = catalog.search(&query)?;
    if results.is_empty() {
        println!("No results");
        return Ok(());
    }
    for item in results.iter() {
        match item {
            SearchResultItem::Substance(substance) => {
                println!("substance  {}  {}", substance.nom_id, substance.label);
            }
            SearchResultItem::Group(group) => {
                println!("group      {}", group.display_name());
                for specialite in &group.specialites {
                    println!("  {}  {}", specialite.spec_id, specialite.denomination);
                }
            }
        }
    }
    Ok(())
}

fn cmd_leaflet(cis: String, json: bool) -> Result<()> {
    let catalog = open_catalog()?;
    if json {
        return print_json(&batch::respond(&catalog, &Request::Leaflet { cis })?);
    }

    let Some(leaflet) = catalog.leaflet(&cis)? else {
        println!("No leaflet for {cis}");
        return Ok(());
    };
    println!("{}", leaflet.updated_at);
    for (title, nodes) in leaflet.sections() {
        println!("\n## {title} ({} nodes)", nodes.len());
        for node in nodes {
            println!("{node}");
        }
    }
    Ok(())
}

fn cmd_show(cis: String, with_leaflet: bool, json: bool) -> Result<()> {
    let catalog = open_catalog()?;
    if json {
        let request = Request::Show {
            cis,
            leaflet: with_leaflet,
        };
        return print_json(&batch::respond(&catalog, &request)?);
    }

    let detail = catalog.show(&cis, with_leaflet)?;
    println!("{}  {}", detail.specialite.spec_id, detail.display_name);
    println!("Group: {}", detail.group_name);
    println!("Eligible: {}", if detail.eligible { "yes" } else { "no" });
    println!("Generic: {}", if detail.generic { "yes" } else { "no" });
    if let Some(atc) = &detail.atc {
        println!(
            "ATC: {} ({} {}, {} {})",
            atc.code,
            atc.level1.code,
            atc.level1.label.as_deref().unwrap_or("-"),
            atc.level2.code,
            atc.level2.label.as_deref().unwrap_or("-"),
        );
    }
    println!("Composition:");
    for composant in simple_composants(&detail.composants) {
        println!(
            "  {}  {}",
            composant.label,
            composant.dosage.as_deref().unwrap_or("")
        );
    }
    if let Some(leaflet) = &detail.leaflet {
        println!("Leaflet: {}", leaflet.updated_at);
    }
    Ok(())
}

fn cmd_browse(letter: String, page: usize, json: bool) -> Result<()> {
    let catalog = open_catalog()?;
    if json {
        return print_json(&batch::respond(&catalog, &Request::Browse { letter, page })?);
    }

    let listing = catalog.browse(&letter, page)?;
    println!(
        "{} (page {}/{})  letters: {}",
        listing.letter,
        listing.page,
        listing.page_count,
        listing.letters.join(" ")
    );
    for group in &listing.groups {
        println!("{}", group.display_name());
        for specialite in &group.specialites {
            println!("  {}  {}", specialite.spec_id, specialite.denomination);
        }
    }
    Ok(())
}

fn cmd_generics(letter: String, json: bool) -> Result<()> {
    let catalog = open_catalog()?;
    if json {
        return print_json(&batch::respond(&catalog, &Request::Generics { letter })?);
    }

    let listing = catalog.generics(&letter)?;
    println!("{}  letters: {}", listing.letter, listing.letters.join(" "));
    for group in &listing.groups {
        println!("{}  {}", group.group_id, group.dci);
    }
    Ok(())
}

fn cmd_batch() -> Result<()> {
    let catalog = open_catalog()?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let summary = batch::run_batch(&catalog, stdin.lock(), stdout.lock())?;
    tracing::info!(
        requests = summary.requests,
        failed = summary.failed,
        "batch complete"
    );
    Ok(())
}

fn cmd_stats(json: bool) -> Result<()> {
    let started = Instant::now();
    let catalog = open_catalog()?;
    let stats = catalog.store().stats()?;

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: started.elapsed().as_millis() as i64,
            store: Some(stats),
            ..Default::default()
        });
        print_json(&resp)?;
    } else {
        println!("Specialties: {}", stats.specialite_count);
        println!("Substances: {}", stats.substance_count);
        println!("Composition rows: {}", stats.composant_count);
        println!("Generic groups: {}", stats.generic_count);
        println!("Index rows: {}", stats.index_count);
        println!("DB size: {} bytes", stats.db_size_bytes);
        println!(
            "Imported: {}",
            stats.imported_at.as_deref().unwrap_or("never")
        );
    }
    Ok(())
}

fn cmd_doctor(json: bool) -> Result<()> {
    let started = Instant::now();
    let catalog = open_catalog()?;
    let report = catalog.store().integrity_check()?;
    let mut warnings = Vec::new();
    if report.dangling_index_rows > 0 {
        warnings.push(format!(
            "{} search index rows point at missing ids; run `infomed reindex`",
            report.dangling_index_rows
        ));
    }

    if json {
        let resp = JsonResponse::ok()
            .with_stats(StatsOut {
                took_ms: started.elapsed().as_millis() as i64,
                store: Some(report.stats),
                integrity: Some(report.status),
                dangling_index_rows: Some(report.dangling_index_rows),
                ..Default::default()
            })
            .with_warnings(warnings);
        print_json(&resp)?;
    } else {
        println!("Integrity: {}", report.status);
        for warning in warnings {
            eprintln!("warning: {warning}");
        }
    }
    Ok(())
}
