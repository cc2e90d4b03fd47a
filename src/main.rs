//! Corrida de demostración del motor sobre la base en memoria de `seed`.

use flowmap_core::{EngineSettings, Replacer, ReplacerConfig};
use flowmap_rust::seed;
use log::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let seed::DemoData { store, mut table, .. } = seed::demo();
    info!("demo: {} entradas de mapeo, {} flujos en la base", table.len(), store.flow_count());

    let conf = ReplacerConfig::all_domains().with_delete_mapped(true).with_settings(EngineSettings::from_env());
    let report = Replacer::new(store).run(&conf, &table).await;
    report.apply(&mut table);

    println!("reemplazados={} fallidos={} borrados={}",
             report.stats.replaced,
             report.stats.failed,
             report.deleted.len());
    for entry in &table.entries {
        let status = entry.source_flow.status.as_ref().map(|s| s.message()).unwrap_or("-");
        println!("  {} -> {}: {}", entry.source_flow.display_name(), entry.target_flow.display_name(), status);
    }
    match table.to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(e) => error!("no se pudo serializar la tabla: {e}"),
    }
}
