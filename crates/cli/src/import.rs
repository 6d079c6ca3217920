// Import, validate and stats commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crmsync_core::{
    Client, Company, Contact, Lead, LeadState, Mission, Organisation, Subject, Table,
};
use crmsync_io::{load_bundle, SqlMapped, SqliteStore};
use crmsync_recon::{ImportContext, ImportError, ImportReport, Importer, SubjectReport};

use crate::exit_codes::{import_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_PARTIAL, EXIT_USAGE};
use crate::CliError;

pub struct ImportArgs {
    pub root: PathBuf,
    pub db: Option<PathBuf>,
    pub subsidiary: Option<String>,
    pub config: Option<PathBuf>,
    pub missions: bool,
    pub keep_going: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
}

// ============================================================================
// import
// ============================================================================

pub fn cmd_import(args: ImportArgs) -> Result<(), CliError> {
    let ctx = build_context(&args)?;
    let db = resolve_db(args.db.as_deref(), true)?;
    log::info!("database: {}", db.display());

    let mut store = SqliteStore::open(&db)
        .map_err(|e| CliError::storage(format!("{}: {e}", db.display())))?;
    let mut importer = Importer::new(&mut store, &ctx)?;
    let result = importer.import_dir(&args.root);
    let report = importer.finish();

    // The report is written even when the run aborted: it names the failing record.
    print_summary(&report);
    emit_report(&report, args.json, args.output.as_deref())?;

    match result {
        Ok(()) if report.has_failures() => Err(CliError::new(
            EXIT_PARTIAL,
            format!("{} record(s) failed", report.failure_count()),
        )),
        Ok(()) => Ok(()),
        Err(e) => Err(import_failure(e)),
    }
}

fn import_failure(e: ImportError) -> CliError {
    let err = CliError::new(import_exit_code(&e), e.to_string());
    if e.is_data_error() {
        err.with_hint("use --keep-going to import the remaining records")
    } else {
        err
    }
}

/// Settings come from `--config` when given, then flags override them.
fn build_context(args: &ImportArgs) -> Result<ImportContext, CliError> {
    let mut ctx = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::new(EXIT_CONFIG, format!("{}: {e}", path.display()))
            })?;
            ImportContext::from_toml(&text)?
        }
        None => {
            let subsidiary = args.subsidiary.clone().ok_or_else(|| {
                CliError::usage("no subsidiary given")
                    .with_hint("pass --subsidiary, set CRMSYNC_SUBSIDIARY or use --config")
            })?;
            ImportContext::new(subsidiary)
        }
    };

    if let Some(subsidiary) = &args.subsidiary {
        ctx.subsidiary = subsidiary.clone();
    }
    if args.missions {
        ctx.import_missions = true;
    }
    if args.keep_going {
        ctx.fail_fast = false;
    }
    ctx.validate()?;
    Ok(ctx)
}

fn print_summary(report: &ImportReport) {
    for subject in &report.subjects {
        eprintln!("{}", summary_line(subject));
        if subject.is_clean() {
            continue;
        }
        for failure in &subject.failures {
            match &failure.record {
                Some(record) => eprintln!("  failed {record}: {}", failure.message),
                None => eprintln!("  failed: {}", failure.message),
            }
        }
    }
}

fn summary_line(s: &SubjectReport) -> String {
    format!(
        "{}: {} loaded, {} created, {} updated, {} unchanged, {} skipped, {} failed",
        s.subject,
        s.loaded,
        s.created,
        s.updated,
        s.unchanged,
        s.skipped.len(),
        s.failures.len()
    )
}

fn emit_report(report: &ImportReport, json: bool, output: Option<&Path>) -> Result<(), CliError> {
    if !json && output.is_none() {
        return Ok(());
    }
    let text = report
        .to_json()
        .map_err(|e| CliError::new(EXIT_ERROR, format!("failed to serialize report: {e}")))?;

    if let Some(path) = output {
        std::fs::write(path, &text)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("{}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    if json {
        println!("{text}");
    }
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(root: &Path, json: bool) -> Result<(), CliError> {
    let batch = load_bundle(root).map_err(|e| CliError::from(ImportError::from(e)))?;

    if json {
        let counts: serde_json::Map<String, serde_json::Value> = Subject::ALL
            .into_iter()
            .map(|s| (s.dir_name().to_string(), batch.count(s).into()))
            .collect();
        let text = serde_json::to_string_pretty(&counts)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{text}");
    } else {
        for subject in Subject::ALL {
            eprintln!("{subject}: {} record(s)", batch.count(subject));
        }
        eprintln!("{}: ok", root.display());
    }
    Ok(())
}

// ============================================================================
// stats
// ============================================================================

pub fn cmd_stats(db: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let db = resolve_db(db.as_deref(), false)?;
    if !db.is_file() {
        return Err(CliError::usage(format!("{}: no such database", db.display()))
            .with_hint("run `crmsync import` first"));
    }
    let store = SqliteStore::open(&db)
        .map_err(|e| CliError::storage(format!("{}: {e}", db.display())))?;

    let counts = [
        ("companies", count::<Company>(&store)?),
        ("organisations", count::<Organisation>(&store)?),
        ("contacts", count::<Contact>(&store)?),
        ("clients", count::<Client>(&store)?),
        ("leads", count::<Lead>(&store)?),
        ("missions", count::<Mission>(&store)?),
    ];

    let mut by_state: BTreeMap<&'static str, usize> =
        LeadState::ALL.into_iter().map(|s| (s.as_str(), 0)).collect();
    let leads = Table::<Lead>::all(&store).map_err(|e| CliError::storage(e.to_string()))?;
    for lead in &leads {
        *by_state.entry(lead.attrs.state.as_str()).or_default() += 1;
    }

    if json {
        let mut value = serde_json::Map::new();
        for (name, n) in counts {
            value.insert(name.to_string(), n.into());
        }
        let states: serde_json::Map<String, serde_json::Value> = by_state
            .iter()
            .map(|(state, n)| (state.to_string(), (*n).into()))
            .collect();
        value.insert("leads_by_state".to_string(), states.into());
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{text}");
    } else {
        println!("{}", db.display());
        for (name, n) in counts {
            println!("  {name:<14} {n}");
        }
        for (state, n) in by_state.iter().filter(|(_, n)| **n > 0) {
            println!("    {state:<12} {n}");
        }
    }
    Ok(())
}

fn count<E: SqlMapped>(store: &SqliteStore) -> Result<usize, CliError> {
    store.count::<E>().map_err(|e| CliError::storage(e.to_string()))
}

/// `--db`, or the per-user default. With `create`, the default's parent
/// directory is created.
fn resolve_db(db: Option<&Path>, create: bool) -> Result<PathBuf, CliError> {
    if let Some(path) = db {
        return Ok(path.to_path_buf());
    }
    let dir = dirs::data_dir()
        .ok_or_else(|| {
            CliError::new(EXIT_USAGE, "no data directory on this system").with_hint("pass --db")
        })?
        .join("crmsync");
    if create {
        std::fs::create_dir_all(&dir)
            .map_err(|e| CliError::storage(format!("{}: {e}", dir.display())))?;
    }
    Ok(dir.join("crm.sqlite"))
}
