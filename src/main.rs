//! `cs-annotator` -- terminal front end for counter-speech annotation.
//!
//! Loads the configuration, dataset and label taxonomy, then runs one of:
//! - `labels`   print the annotation guidelines
//! - `assign`   show (and claim, in bucket mode) an annotator's slice
//! - `annotate` interactive labelling session
//! - `progress` completion of a previously saved export
//!
//! Logs go to stderr; `RUST_LOG` overrides the default `cs_annotator=info`.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use cs_annotator::assignment::{lookup_assignment, resolve_assignment, CompletedRegistry};
use cs_annotator::config::{load_config, AppConfig};
use cs_annotator::export::open_sink;
use cs_annotator::labels::load_labels;
use cs_annotator::session::{Command, Session};
use cs_annotator::state::{load_dataset, AnnotationStore, CaseProvider, Dataset, SelectionLimit};

#[derive(Parser)]
#[command(name = "cs-annotator")]
#[command(about = "Label counter-speech strategies on hate speech / counter speech pairs")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CS_ANNOTATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset file (overrides config)
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the strategy taxonomy and guidelines
    Labels,
    /// Show the slice of the dataset assigned to a username
    Assign {
        #[arg(short, long)]
        user: String,
    },
    /// Start an interactive annotation session
    Annotate {
        #[arg(short, long)]
        user: String,
    },
    /// Report completion from a saved export
    Progress {
        #[arg(short, long)]
        user: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cs_annotator=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = &cli.dataset {
        config.dataset.path = path.to_string_lossy().into_owned();
    }

    let labels = load_labels(config.annotation.labels_file.as_deref())?;

    match cli.command {
        Commands::Labels => {
            print!("{}", labels.guidelines());
            Ok(())
        }
        Commands::Assign { user } => {
            let dataset = open_dataset(&config)?;
            let assignment = resolve_assignment(&config.assignment, &user, dataset.len())?;
            match assignment.bucket {
                Some(bucket) => println!(
                    "{} -> bucket {bucket}, pairs {}-{}",
                    assignment.username,
                    assignment.range.start + 1,
                    assignment.range.end
                ),
                None => println!(
                    "{} -> pairs {}-{}",
                    assignment.username,
                    assignment.range.start + 1,
                    assignment.range.end
                ),
            }
            Ok(())
        }
        Commands::Annotate { user } => {
            let dataset = open_dataset(&config)?;
            let sink = open_sink(&config.export, user.trim());
            let completed = completed_registry(&config);
            let session = Session::start(&config, dataset, labels, &user, sink, completed)?;
            run_session(session)
        }
        Commands::Progress { user } => {
            let dataset = open_dataset(&config)?;
            let Some(assignment) = lookup_assignment(&config.assignment, &user, dataset.len())?
            else {
                anyhow::bail!("'{}' has no assigned bucket yet", user.trim());
            };

            let sink = open_sink(&config.export, &assignment.username);
            let mut store = AnnotationStore::new(
                assignment.username.clone(),
                labels,
                SelectionLimit::from_config(config.annotation.max_selections),
            );
            store.restore(&sink.load_rows()?, &dataset);
            println!(
                "{}: {}",
                assignment.username,
                store.compute_progress(assignment.range)
            );
            Ok(())
        }
    }
}

fn open_dataset(config: &AppConfig) -> anyhow::Result<Dataset> {
    let path = shellexpand::tilde(&config.dataset.path).into_owned();
    load_dataset(Path::new(&path), config.dataset.format, &config.dataset.columns)
        .with_context(|| format!("loading dataset {path}"))
}

fn completed_registry(config: &AppConfig) -> Option<CompletedRegistry> {
    config
        .assignment
        .completed_path
        .as_deref()
        .map(|p| CompletedRegistry::new(shellexpand::tilde(p).into_owned()))
}

fn run_session(mut session: Session) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("{}", session.render_page());
    println!("Type 'help' for commands.");

    for line in stdin.lock().lines() {
        let line = line.context("reading input")?;
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        let reply = session.execute(command)?;
        println!("{}", reply.text);
        if reply.quit {
            return Ok(());
        }
        print!("> ");
        stdout.flush()?;
    }

    if !session.is_submitted() {
        tracing::warn!("Input closed before submit; unsaved annotations are discarded");
    }
    Ok(())
}
