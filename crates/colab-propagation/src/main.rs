use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colab_propagation::test_harness::{run_scenario, run_simulator, run_simulator_with, TestHarness};
use colab_propagation::FileConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cli() -> Command {
    Command::new("colab-propagation")
        .version(colab_propagation::VERSION)
        .about("Resource reference propagation engine")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the randomized propagation simulator")
                .arg(
                    Arg::new("operations")
                        .long("operations")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML file with [engine] and [simulator] tables"),
                ),
        )
        .subcommand(
            Command::new("certify")
                .about("Run the simulator over a range of seeds")
                .arg(
                    Arg::new("seeds")
                        .long("seeds")
                        .default_value("10")
                        .value_parser(value_parser!(u64))
                        .help("Seeds 0..N to run"),
                )
                .arg(
                    Arg::new("operations")
                        .long("operations")
                        .default_value("2000")
                        .value_parser(value_parser!(u64))
                        .help("Operations per seed"),
                ),
        )
        .subcommand(
            Command::new("scenario")
                .about("Walk one resource through its whole life and print each step")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,colab_propagation::engine=warn".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn load_config(args: &ArgMatches) -> Result<Option<FileConfig>> {
    let Some(path) = args.get_one::<PathBuf>("config") else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = FileConfig::from_toml(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    tracing::info!("Configuration loaded from {}", path.display());
    Ok(Some(config))
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let file = load_config(args)?;
            let mut config = file.as_ref().map(|f| f.simulator.clone()).unwrap_or_default();
            if let Some(operations) = args.get_one::<u64>("operations") {
                config.total_operations = *operations;
            }
            if let Some(seed) = args.get_one::<u64>("seed") {
                config.seed = *seed;
            }
            if args.get_flag("stop-on-violation") {
                config.stop_on_first_violation = true;
            }

            tracing::info!(
                "Running simulator: {} operations, seed {}",
                config.total_operations,
                config.seed
            );
            let report = match file {
                Some(file) => run_simulator_with(config, file.engine),
                None => run_simulator(config),
            };
            println!("{}", report.generate_text());

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("certify", args)) => {
            let seeds = args.get_one::<u64>("seeds").copied().unwrap_or(10);
            let operations = args.get_one::<u64>("operations").copied().unwrap_or(2000);

            let report = TestHarness::run_certification(seeds, operations);

            println!("Certification Report:");
            println!("  Seeds Tested: {}", report.seeds_tested);
            println!("  Total Violations: {}", report.total_violations);
            if !report.failed_seeds.is_empty() {
                println!("  Failed Seeds: {:?}", report.failed_seeds);
            }
            println!("  Status: {}", if report.passed() { "PASSED" } else { "FAILED" });

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("scenario", args)) => {
            let report = run_scenario().context("Walkthrough was rejected")?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
