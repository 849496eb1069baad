use std::path::PathBuf;
use std::sync::Arc;

use structopt::StructOpt;

use hsafe::analysis::read_analysis_stream;
use hsafe::config::Config;
use hsafe::detection::TrafficGenerator;
use hsafe::models::{IpCondition, NewRule, RuleAction, RuleCondition};
use hsafe::output::{OutputFormat, OutputHandler};
use hsafe::persistence::SqliteRuleRepository;
use hsafe::rules::{RuleService, RuleStore};
use hsafe::simulation::Simulator;

/// H-SAFE network simulator command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "hsafe", about = "Firewall rule simulator CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Manage the session user's rules
    Rules {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[structopt(subcommand)]
        command: RulesCommand,
    },
    /// Run a fixed number of simulation ticks and print the events
    Simulate {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Number of ticks to run
        #[structopt(short, long, default_value = "10")]
        ticks: usize,
        /// Seed for reproducible traffic
        #[structopt(short, long)]
        seed: Option<u64>,
    },
    /// Summarize a newline-delimited JSON capture analysis result
    Analyze {
        /// Path to the analysis output
        #[structopt(short, long)]
        file: PathBuf,
    },
}

#[derive(StructOpt, Debug)]
pub enum RulesCommand {
    /// List active rules in evaluation order
    List,
    /// Add a rule at the lowest priority
    Add {
        #[structopt(short, long)]
        name: String,
        /// IP, Protocol, Port or Signature
        #[structopt(short = "t", long = "type", default_value = "IP")]
        kind: String,
        /// Condition for non-IP rules
        #[structopt(long, default_value = "")]
        condition: String,
        #[structopt(long)]
        source: Option<String>,
        #[structopt(long)]
        dest: Option<String>,
        #[structopt(long)]
        port: Option<String>,
        /// Flag, Block, Reject, Allow or Log
        #[structopt(short, long, default_value = "Flag")]
        action: String,
    },
    /// Delete a rule by id
    Delete { id: i64 },
}

fn load_config(path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Config::from_file(path)
    } else {
        log::warn!("Config file {:?} not found, using defaults", path);
        Ok(Config::default())
    }
}

fn open_service(config: &Config) -> Result<RuleService, Box<dyn std::error::Error>> {
    let repository = Arc::new(SqliteRuleRepository::new(&config.persistence.db_path)?);
    let service = RuleService::new(repository, RuleStore::shared(), config.session.user_id.clone());
    service.refresh()?;
    Ok(service)
}

fn run_rules(config: &Config, command: RulesCommand) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;

    match command {
        RulesCommand::List => {
            let rules = service.rules();
            println!("{} active rule(s) for {}:\n", rules.len(), service.user_id());
            for rule in rules {
                println!(
                    "  #{:<4} {:<20} {:<10} {:<40} {}",
                    rule.id,
                    rule.name,
                    rule.kind().to_string(),
                    rule.condition.to_string(),
                    rule.action
                );
            }
        }
        RulesCommand::Add {
            name,
            kind,
            condition,
            source,
            dest,
            port,
            action,
        } => {
            let condition = if kind == "IP" {
                RuleCondition::Ip(IpCondition::new(
                    source.as_deref(),
                    dest.as_deref(),
                    port.as_deref(),
                ))
            } else {
                RuleCondition::parse(&kind, &condition)
            };
            let rule = NewRule::new(name, condition, RuleAction::from_str(&action))?;
            let stored = service.add_rule(rule)?;
            println!("Rule added with id {} and action {}", stored.id, stored.action);
        }
        RulesCommand::Delete { id } => {
            if service.delete_rule(id)? {
                println!("Rule {} deleted", id);
            } else {
                eprintln!("No rule with id {}", id);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn run_simulation(
    config: &Config,
    ticks: usize,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let mut simulator = Simulator::new(service.store().clone(), &config.simulation);
    if let Some(seed) = seed {
        simulator = simulator.with_source(TrafficGenerator::seeded(seed));
    }

    let mut output = OutputHandler::new(OutputFormat::from_str(&config.output.format), None)?;
    for _ in 0..ticks {
        output.write_event(&simulator.step())?;
    }

    let events = simulator.events();
    let alerts = events.iter().filter(|e| e.alert).count();
    let matched = events.iter().filter(|e| !e.is_allowed()).count();
    println!(
        "\n{} event(s) in log: {} matched a rule, {} alert(s)",
        events.len(),
        matched,
        alerts
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Rules { config, command } => {
            let config = load_config(&config)?;
            run_rules(&config, command)?;
        }
        Cli::Simulate {
            config,
            ticks,
            seed,
        } => {
            let config = load_config(&config)?;
            run_simulation(&config, ticks, seed)?;
        }
        Cli::Analyze { file } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            let report = runtime.block_on(async {
                let file = tokio::fs::File::open(&file).await?;
                let report = read_analysis_stream(file).await?;
                Ok::<_, Box<dyn std::error::Error>>(report)
            })?;

            println!(
                "Analyzed {} packet(s), {} malicious, {} backend error(s)\n",
                report.packets.len(),
                report.malicious_count(),
                report.errors.len()
            );
            for packet in &report.packets {
                println!(
                    "  #{:<3} {} {} -> {} {}/{} {} ({})",
                    packet.id,
                    packet.timestamp,
                    packet.source,
                    packet.destination,
                    packet.protocol,
                    packet.port,
                    packet.status,
                    packet.reason
                );
            }
            for error in &report.errors {
                println!("  error: {}", error);
            }
        }
    }

    Ok(())
}
