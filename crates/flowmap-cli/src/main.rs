//! `flowmap`: aplica una tabla de mapeo de flujos contra una base Postgres.
//!
//! Códigos de salida: 0 ok, 2 error de uso/entrada, 4 corrida abortada,
//! 5 error de backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use flowmap_core::{CatalogProvider, EngineSettings, ReplacementReport, Replacer, ReplacerConfig};
use flowmap_domain::MappingTable;
use flowmap_persistence::{PgFlowStore, PoolProvider};
use log::{error, info};

const EXIT_USAGE: i32 = 2;
const EXIT_ABORTED: i32 = 4;
const EXIT_BACKEND: i32 = 5;

#[derive(Parser, Debug)]
#[command(name = "flowmap", version, about = "Reemplazo de flujos según una tabla de mapeo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Carga la tabla y muestra cuántas entradas son elegibles.
    Check {
        #[arg(long)]
        mapping: PathBuf,
    },
    /// Ejecuta el reemplazo sobre la base configurada en DATABASE_URL.
    Replace(ReplaceArgs),
}

#[derive(clap::Args, Debug)]
struct ReplaceArgs {
    #[arg(long)]
    mapping: PathBuf,
    /// Reescribe intercambios de procesos.
    #[arg(long)]
    processes: bool,
    /// Reescribe factores de métodos de impacto.
    #[arg(long)]
    methods: bool,
    /// Borra los flujos origen que queden sin uso (requiere --processes y --methods).
    #[arg(long)]
    delete_mapped: bool,
    /// Catálogo JSON de flujos destino a persistir antes de indexar.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Destino de la tabla con estados; por defecto stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    pool_size: Option<usize>,
    #[arg(long)]
    poll_secs: Option<u64>,
    #[arg(long)]
    page_size: Option<usize>,
}

impl ReplaceArgs {
    fn settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::from_env();
        if let Some(n) = self.pool_size {
            settings = settings.with_pool_size(n);
        }
        if let Some(s) = self.poll_secs {
            settings = settings.with_poll_interval(Duration::from_secs(s.max(1)));
        }
        if let Some(n) = self.page_size {
            settings = settings.with_page_size(n);
        }
        settings
    }
}

fn read_table(path: &Path) -> Result<MappingTable, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("no se pudo leer {}: {e}", path.display()))?;
    MappingTable::from_json(&raw).map_err(|e| format!("tabla inválida {}: {e}", path.display()))
}

fn check(mapping: &Path) -> i32 {
    match read_table(mapping) {
        Ok(table) => {
            println!("tabla '{}': {} entradas, {} elegibles", table.name, table.len(), table.eligible_count());
            0
        }
        Err(e) => {
            eprintln!("[flowmap check] {e}");
            EXIT_USAGE
        }
    }
}

fn print_summary(report: &ReplacementReport) {
    println!("elegibles={} omitidas={} intentados={} reemplazados={} fallidos={} borrados={} abortada={}",
             report.eligible,
             report.skipped.len(),
             report.stats.attempted,
             report.stats.replaced,
             report.stats.failed,
             report.deleted.len(),
             report.aborted);
    for (domain, stats) in &report.domains {
        println!("  {domain}: {}/{} reemplazados, {} fallidos", stats.replaced, stats.attempted, stats.failed);
    }
}

async fn replace(args: ReplaceArgs) -> i32 {
    let mut table = match read_table(&args.mapping) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("[flowmap replace] {e}");
            return EXIT_USAGE;
        }
    };
    let catalog = match &args.catalog {
        Some(path) => {
            let parsed = std::fs::read_to_string(path).map_err(|e| e.to_string())
                                                      .and_then(|raw| CatalogProvider::from_json("catalog", &raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(c) => Some(c),
                Err(e) => {
                    eprintln!("[flowmap replace] catálogo inválido {}: {e}", path.display());
                    return EXIT_USAGE;
                }
            }
        }
        None => None,
    };

    let pool = match flowmap_persistence::build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[flowmap replace] pool error: {e}");
            return EXIT_BACKEND;
        }
    };
    let store = Arc::new(PgFlowStore::new(PoolProvider { pool }));
    let mut replacer = Replacer::new(store);
    if let Some(catalog) = catalog {
        info!("catálogo de destino: {} flujos", catalog.len());
        replacer = replacer.with_provider(Arc::new(catalog));
    }

    let conf = ReplacerConfig { processes: args.processes,
                                methods: args.methods,
                                delete_mapped: args.delete_mapped,
                                settings: args.settings() };
    let report = replacer.run(&conf, &table).await;
    report.apply(&mut table);
    print_summary(&report);

    let json = match table.to_json_pretty() {
        Ok(j) => j,
        Err(e) => {
            error!("no se pudo serializar la tabla: {e}");
            return EXIT_USAGE;
        }
    };
    match &args.out {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                eprintln!("[flowmap replace] no se pudo escribir {}: {e}", path.display());
                return EXIT_USAGE;
            }
        }
        None => println!("{json}"),
    }

    if report.aborted {
        EXIT_ABORTED
    } else {
        0
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Check { mapping } => check(&mapping),
        Command::Replace(args) => replace(args).await,
    };
    std::process::exit(code);
}
