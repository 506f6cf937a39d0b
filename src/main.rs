mod cli;

use tapedeck::{
    config,
    metadata::{merge::MergedRecord, providers::build_registry, MergeResolver},
    reconcile::{ReconcileError, ReconcileOptions, Reconciler, SqliteRecordStore},
};
use tapedeck_common::{Checksum, ContentUnit};
use tapedeck_db::pool::{get_conn, init_pool, DbPool};
use tapedeck_db::queries::{content_units, records};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tapedeck=trace,tapedeck_db=debug,tapedeck_common=debug,reqwest=debug".to_string()
        } else {
            "tapedeck=info,tapedeck_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Reconcile { dry_run, fan_out } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(reconcile(cli.config.as_deref(), dry_run, fan_out))
        }
        Commands::Import { manifest } => import(&manifest, cli.config.as_deref()),
        Commands::Show { checksum } => show(&checksum, cli.config.as_deref()),
        Commands::Fields => fields(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tapedeck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_store(config: &config::Config) -> Result<DbPool> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
    }
    let db_path_str = db_path.to_string_lossy();
    tracing::debug!("Opening database at {}", db_path_str);
    init_pool(&db_path_str).with_context(|| format!("Failed to open database: {}", db_path_str))
}

async fn reconcile(
    config_path: Option<&Path>,
    dry_run: bool,
    fan_out: Option<usize>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    config.reconcile.dry_run |= dry_run;
    if let Some(fan_out) = fan_out {
        config.reconcile.fan_out = fan_out;
    }
    config::validate_config(&config)?;

    let policy = config.field_policy()?;
    let call_policy = config.reconcile.call_policy();
    let registry = build_registry(&config.providers, call_policy.timeout)?;
    let pool = open_store(&config)?;

    let units = {
        let conn = get_conn(&pool)?;
        content_units::list_units(&conn)?
    };
    if units.is_empty() {
        println!("No content units in the store. Use `tapedeck import` first.");
        return Ok(());
    }

    let reconciler = Reconciler::new(
        &registry,
        MergeResolver::new(policy),
        Arc::new(SqliteRecordStore::new(pool)),
        call_policy,
        ReconcileOptions::from_config(&config),
    );

    match reconciler.run(&units).await {
        Ok(summary) => {
            println!(
                "Reconciled {} units in {} groups",
                summary.units, summary.groups
            );
            for key in &summary.unverified {
                println!("  Unverified (no remote listing): {}", key);
            }
            for (key, extra) in &summary.unlisted {
                let extra: Vec<_> = extra.iter().map(ToString::to_string).collect();
                println!("  Unlisted local episodes in {}: {}", key, extra.join(", "));
            }
            if summary.committed {
                println!("Records committed.");
            } else {
                println!("[DRY RUN] No records written.");
                for commit in &summary.commits {
                    println!("{}: {}", commit.key, commit.group.to_json()?);
                }
            }
            Ok(())
        }
        Err(ReconcileError::VerificationMismatch { report, path }) => {
            eprint!("{}", report.render());
            match path {
                Some(path) => anyhow::bail!(
                    "Episode verification failed, nothing committed. Report written to {:?}",
                    path
                ),
                None => anyhow::bail!("Episode verification failed, nothing committed"),
            }
        }
        Err(e) => Err(e).context("Reconciliation failed"),
    }
}

fn import(manifest: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest: {:?}", manifest))?;
    let units: Vec<ContentUnit> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {:?}", manifest))?;

    let pool = open_store(&config)?;
    let conn = get_conn(&pool)?;

    let mut added = 0;
    for unit in &units {
        if content_units::ensure_unit(&conn, unit)? {
            added += 1;
        } else {
            tracing::debug!(checksum = %unit.checksum, "Unit already imported, skipping");
        }
    }

    println!(
        "Imported {} units ({} already present)",
        added,
        units.len() - added
    );
    Ok(())
}

fn show(checksum: &str, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let checksum = Checksum::parse(checksum)?;

    let pool = open_store(&config)?;
    let conn = get_conn(&pool)?;

    let unit = content_units::get_unit(&conn, &checksum)?
        .with_context(|| format!("No content unit with checksum {}", checksum))?;
    let stored = records::get_unit_record::<MergedRecord>(&conn, &checksum)?;

    let output = match stored {
        Some(stored) => serde_json::json!({
            "unit": unit,
            "reconciled_at": stored.reconciled_at.to_rfc3339(),
            "record": stored.record,
        }),
        None => serde_json::json!({
            "unit": unit,
            "reconciled_at": null,
            "record": null,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn fields(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let policy = config.field_policy()?;

    println!("{:<6} {:<10} {:<6} PRIORITY", "KIND", "FIELD", "SCOPE");
    for (kind, spec, order) in policy.entries() {
        let order: Vec<_> = order.iter().map(|p| p.as_str()).collect();
        let scope = match spec.scope {
            tapedeck::metadata::FieldScope::Group => "group",
            tapedeck::metadata::FieldScope::Unit => "unit",
        };
        println!(
            "{:<6} {:<10} {:<6} {}",
            kind.to_string(),
            spec.name,
            scope,
            order.join(" > ")
        );
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Database: {}", config.database.path.display());
            println!("  Fan-out: {}", config.reconcile.fan_out);
            println!(
                "  Unlisted local episodes: {:?}",
                config.verification.on_unlisted_local
            );
            println!(
                "  Priority overrides: {}",
                config.priority.fields.len()
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            config::validate_config(&config)?;
            println!("Default config:");
            println!("  Database: {}", config.database.path.display());
        }
    }

    Ok(())
}
