use clap::{command, Parser, Subcommand};
use lexgate::{
    config::{self, ConfigValidation, EngineConfig},
    dependency::{preprocess, Question},
    fast_path,
    integrity::{validate_modules, VariableRegistry},
    ActivationMode, Error, FactMap, InternalResult, JsonFileModuleStore, ModeRepair, Module,
    ModuleDecision, RuleNode, RuleEvaluator,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one rule against a fact map
    Eval {
        #[arg(long)]
        rule: PathBuf,
        #[arg(long)]
        facts: PathBuf,
    },
    /// Decide every module of a catalogue for one run
    Decide {
        #[arg(long)]
        modules: PathBuf,
        #[arg(long)]
        facts: PathBuf,
        #[arg(long)]
        doc_type: Option<String>,
    },
    /// Check rule variables against the variable catalogues
    Validate {
        #[arg(long)]
        modules: PathBuf,
        #[arg(long)]
        extraction: PathBuf,
        #[arg(long)]
        system: PathBuf,
    },
    /// Rewrite stored activation modes that drifted from the rules
    Repair {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark answers of hidden questions as not applicable
    Preprocess {
        #[arg(long)]
        questions: PathBuf,
        #[arg(long)]
        answers: PathBuf,
    },
}

#[derive(Serialize)]
struct DecisionLine<'a> {
    module: &'a str,
    mode: ActivationMode,
    #[serde(flatten)]
    decision: ModuleDecision,
    fast_path: Option<bool>,
}

fn load_config(path: Option<&Path>) -> InternalResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => {
            let config = EngineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn load_facts(path: &Path, config: &EngineConfig) -> InternalResult<FactMap> {
    let value: Value = config::from_file(path)?;
    if !value.is_object() {
        return Err(Error::internal(format!(
            "{} must hold a JSON object of facts",
            path.display()
        )));
    }
    Ok(FactMap::from_json(&value, &config.not_applicable_sentinel))
}

fn print_json<T: Serialize>(value: &T) -> InternalResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Returns the process exit code.
fn run(cli: &Cli, config: &EngineConfig) -> InternalResult<i32> {
    match &cli.command {
        Command::Eval { rule, facts } => {
            let rule: RuleNode = config::from_file(rule)?;
            let facts = load_facts(facts, config)?;
            debug!(%rule, "evaluating rule");
            print_json(&RuleEvaluator::new().evaluate_with_evidence(&rule, &facts))?;
        }
        Command::Decide {
            modules,
            facts,
            doc_type,
        } => {
            let modules: Vec<Module> = config::from_file(modules)?;
            let facts = load_facts(facts, config)?;
            let doc_type = doc_type.as_deref().or(config.default_doc_type.as_deref());
            let lines: Vec<DecisionLine> = modules
                .iter()
                .map(|module| DecisionLine {
                    module: &module.id,
                    mode: module.effective_mode(),
                    decision: module.decide(&facts, doc_type),
                    fast_path: fast_path(module, &facts, doc_type),
                })
                .collect();
            info!(modules = lines.len(), ?doc_type, "modules decided");
            print_json(&lines)?;
        }
        Command::Validate {
            modules,
            extraction,
            system,
        } => {
            let modules: Vec<Module> = config::from_file(modules)?;
            let registry = VariableRegistry::from_catalogue_files(extraction, system)?;
            let report = validate_modules(&modules, &registry);
            print_json(&report)?;
            if !report.is_clean() && config.fail_on_unknown_variables {
                warn!(findings = report.findings.len(), "integrity check failed");
                return Ok(2);
            }
        }
        Command::Repair { store, dry_run } => {
            let mut store = JsonFileModuleStore::new(store);
            let report = ModeRepair::new().dry_run(*dry_run).run(&mut store)?;
            print_json(&report)?;
        }
        Command::Preprocess { questions, answers } => {
            let records: Value = config::from_file(questions)?;
            let questions = Question::list_from_json(&records, &config.not_applicable_sentinel)?;
            let answers = load_facts(answers, config)?;
            let resolved = preprocess(&answers, &questions);
            print_json(&resolved.to_json(&config.not_applicable_sentinel))?;
        }
    }
    Ok(0)
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("config: {:?}", config);

    match run(&cli, &config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
