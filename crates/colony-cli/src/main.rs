use std::env;

use colony_core::{run_simulation, RoleCatalog, SqliteStore};
use contracts::{Role, SimConfig};

fn print_usage() {
    println!("colony-cli <command>");
    println!("commands:");
    println!("  catalog");
    println!("    prints every role with its states and loadout tiers");
    println!("  simulate <run_id> <seed> [ticks] [sqlite_path] [scenario...]");
    println!("    runs a deterministic colony simulation and persists records to sqlite");
    println!("    scenarios: raid, construction_backlog");
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing seed".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid seed: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("COLONY_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "colony_runs.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn print_catalog() {
    let catalog = RoleCatalog::default_catalog();
    for role in Role::ALL {
        let Ok(definition) = catalog.definition(role) else {
            continue;
        };
        println!("{role}:");
        let states = definition
            .states
            .iter()
            .map(|state| format!("{state:?}"))
            .collect::<Vec<_>>()
            .join(" -> ");
        println!("  states: {states}");
        for tier in &definition.loadouts {
            let parts = tier
                .parts
                .iter()
                .map(|part| format!("{part:?}"))
                .collect::<Vec<_>>()
                .join(",");
            println!("  tier {:>4}: {parts}", tier.cost);
        }
    }
}

fn run_simulate(args: &[String]) -> Result<(), String> {
    let run_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing run_id".to_string())?;
    let seed = parse_seed(args.get(3))?;
    let ticks = args
        .get(4)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid ticks: {value}"))
        })
        .transpose()?
        .unwrap_or(500);
    let sqlite_path = parse_sqlite_path(args.get(5));

    let mut config = SimConfig::default();
    config.run_id = run_id.clone();
    config.seed = seed;
    config.ticks = ticks;
    for scenario in args.iter().skip(6) {
        config.scenario_flags.insert(scenario.clone(), true);
    }

    let mut store = SqliteStore::open(&sqlite_path)
        .map_err(|err| format!("failed to open sqlite store: {err}"))?;
    let report =
        run_simulation(&config, &mut store).map_err(|err| format!("simulation failed: {err}"))?;

    println!(
        "simulated run_id={} seed={} ticks={} events={} sqlite={}",
        run_id,
        seed,
        report.ticks,
        report.events.len(),
        sqlite_path
    );
    for (colony_id, counts) in &report.populations {
        let level = report.levels.get(colony_id).copied().unwrap_or(0);
        let summary = counts
            .iter()
            .map(|(role, count)| format!("{role}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {colony_id} level={level} {summary}");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("catalog") => {
            print_catalog();
        }
        Some("simulate") => {
            if let Err(err) = run_simulate(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
