use clap::{Parser, Subcommand};
use colored::Colorize;
use ddv_lang::{
    Action, ChangeSet, Dict, GrammarKind, MemoryGraph, Model, ModelDescriptor, ModelRegistry, Options, Outcome,
    Principal, QueryEngine, RuleEngine, Template, TemplateEngine,
};
use miette::{IntoDiagnostic, miette};
use serde::Deserialize;
use std::io::{self, BufWriter, Read, Write};
use std::{fs, path::Path, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ddv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To print the steps a query compiles to:\n\
    ddv steps 'Person(age > 30) UNION Robot LIMIT 10'\n\n\
    ## To run a query against a graph:\n\
    ddv query 'Person-[knows]->Person' --graph graph.json\n\n\
    ## To render a template:\n\
    ddv render page.html --model ada.json --model-type Person\n\n\
    ## To check a template for syntax errors:\n\
    ddv validate --grammar markup page.html")]
#[command(
    about = "ddv compiles graph queries into step pipelines and renders templates and rules against models.",
    long_about = None
)]
pub struct Cli {
    /// Load engine options from a TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum GrammarArg {
    Query,
    Rule,
    Script,
    Expression,
    Markup,
}

impl From<GrammarArg> for GrammarKind {
    fn from(grammar: GrammarArg) -> Self {
        match grammar {
            GrammarArg::Query => GrammarKind::Query,
            GrammarArg::Rule => GrammarKind::Rule,
            GrammarArg::Script => GrammarKind::Script,
            GrammarArg::Expression => GrammarKind::Expression,
            GrammarArg::Markup => GrammarKind::Markup,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum ActionArg {
    #[default]
    Read,
    Create,
    Update,
    Delete,
    Render,
}

impl From<ActionArg> for Action {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Read => Action::Read,
            ActionArg::Create => Action::Create,
            ActionArg::Update => Action::Update,
            ActionArg::Delete => Action::Delete,
            ActionArg::Render => Action::Render,
        }
    }
}

#[derive(Clone, Debug, clap::Args)]
struct ModelArgs {
    /// JSON object holding the model's fields
    #[arg(short, long)]
    model: PathBuf,

    /// Registered model type of the model
    #[arg(short = 't', long)]
    model_type: String,

    /// JSON principal (`id`, `name`, `roles`, `claims`); anonymous when omitted
    #[arg(short, long)]
    user: Option<PathBuf>,

    /// JSON array of model descriptors; defaults to registering just the model type
    #[arg(short, long)]
    registry: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check source text for syntax errors
    Validate {
        #[arg(short, long, value_enum)]
        grammar: GrammarArg,
        /// File to check; standard input when omitted
        file: Option<PathBuf>,
    },
    /// Print the step pipeline a query compiles to
    Steps {
        query: String,
        /// Print the pipeline as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a query against a JSON graph
    Query {
        query: String,
        #[arg(short, long)]
        graph: PathBuf,
    },
    /// Render a template for a model instance
    Render {
        template: PathBuf,
        #[clap(flatten)]
        model: ModelArgs,
    },
    /// Evaluate a rule for a model instance
    Rule {
        rule: PathBuf,
        #[clap(flatten)]
        model: ModelArgs,
        #[arg(short, long, value_enum, default_value_t)]
        action: ActionArg,
    },
}

/// Settings read from `--config`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: Options,
}

impl Config {
    pub fn from_toml(text: &str) -> miette::Result<Self> {
        toml::from_str(text).into_diagnostic()
    }
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();
        let config = self.config()?;

        match &self.commands {
            Commands::Validate { grammar, file } => {
                let text = read_input(file.as_deref())?;
                let validation = ddv_lang::validate((*grammar).into(), &text);
                if validation.ok {
                    return Ok(());
                }

                let stdout = io::stdout();
                let mut handle = BufWriter::new(stdout.lock());
                for error in &validation.errors {
                    writeln!(
                        handle,
                        "  {}: {} at line {}, column {}",
                        "Error".red().bold(),
                        error.message(),
                        error.line(),
                        error.column()
                    )
                    .into_diagnostic()?;
                }
                handle.flush().into_diagnostic()?;

                Err(miette!("{} syntax error(s) found", validation.errors.len()))
            }
            Commands::Steps { query, json } => {
                let mut engine = QueryEngine::new();
                engine.set_options(config.engine.clone());
                let pipeline = engine.compile(None, query)?;

                if *json {
                    println!("{}", serde_json::to_string_pretty(pipeline.as_ref()).into_diagnostic()?);
                } else {
                    println!("{}", pipeline);
                }
                Ok(())
            }
            Commands::Query { query, graph } => {
                let graph = MemoryGraph::from_json(&read_file(graph)?).into_diagnostic()?;
                let mut engine = QueryEngine::new();
                engine.set_options(config.engine.clone());

                let result = engine.query(&graph, None, query)?;
                debug!(matches = result.len(), "Query finished");
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
                Ok(())
            }
            Commands::Render { template, model } => {
                let (registry, instance, principal) = model.load()?;
                let mut engine = TemplateEngine::new(registry);
                engine.set_options(config.engine.clone());

                let template = Template::new(file_name(template), read_file(template)?);
                print!("{}", engine.render(&template, &instance, &principal)?);
                Ok(())
            }
            Commands::Rule { rule, model, action } => {
                let (registry, instance, principal) = model.load()?;
                let mut engine = RuleEngine::new(registry);
                engine.set_options(config.engine.clone());

                let compiled = engine.compile(&file_name(rule), &instance.model_type, &read_file(rule)?)?;
                match engine.evaluate(&compiled, &instance, &principal, (*action).into(), &ChangeSet::new())? {
                    Outcome::Value(value) => {
                        println!("{}", serde_json::to_string(&value).into_diagnostic()?);
                        Ok(())
                    }
                    Outcome::Fault(fault) => Err(miette!("Rule faulted: {}", fault)),
                }
            }
        }
    }

    fn init_tracing(&self) {
        let level = match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "debug",
            (false, _) => "trace",
        };

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
            .with_writer(io::stderr)
            .try_init()
            .ok();
    }

    fn config(&self) -> miette::Result<Config> {
        match &self.config {
            Some(path) => Config::from_toml(&read_file(path)?),
            None => Ok(Config::default()),
        }
    }
}

impl ModelArgs {
    fn load(&self) -> miette::Result<(ModelRegistry, Model, Principal)> {
        let registry = match &self.registry {
            Some(path) => ModelRegistry::from_json(&read_file(path)?).map_err(|e| miette!(e.to_string()))?,
            None => {
                let mut registry = ModelRegistry::new();
                registry
                    .register(ModelDescriptor::new(self.model_type.as_str()))
                    .into_diagnostic()?;
                registry
            }
        };

        let fields: Dict = serde_json::from_str(&read_file(&self.model)?).into_diagnostic()?;
        let model = Model {
            model_type: self.model_type.as_str().into(),
            fields,
        };

        let principal = match &self.user {
            Some(path) => serde_json::from_str(&read_file(path)?).into_diagnostic()?,
            None => Principal::anonymous(),
        };

        Ok((registry, model, principal))
    }
}

fn read_file(path: &Path) -> miette::Result<String> {
    if !path.exists() {
        return Err(miette!("File not found: {}", path.display()));
    }
    fs::read_to_string(path).into_diagnostic()
}

fn read_input(path: Option<&Path>) -> miette::Result<String> {
    match path {
        Some(path) => read_file(path),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).into_diagnostic()?;
            Ok(text)
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
