//! CLI interface for Framewise
//!
//! Provides command-line interface for:
//! - Predicting labels for whitespace-tokenized text
//! - Scoring a model against `token/LABEL` tagged text
//! - Inspecting a model artifact

use crate::aggregator::{ResultAggregator, ResultSet};
use crate::config::EngineConfig;
use crate::engine::PredictionType;
use crate::model::{fingerprint, DataplaneKey, Model, ModelArtifact, Value};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "framewise")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic windowed number-set inference over hashed token features")]
#[command(
    long_about = "Framewise - deterministic sequence labelling from precomputed number-set tables\n\n\
    Framewise slides a window over each token sequence, hashes configured combinations of\n\
    window positions into feature ids, and merges the probability tables those ids point at\n\
    into one ranked prediction per position.\n\n\
    Key Features:\n\
    • Identical input always yields identical output\n\
    • Explicit fallback and tie-break policy\n\
    • Optional amplification toward a target label set\n\
    • Accuracy scoring with per-prediction-type tallies\n\n\
    Examples:\n\
      framewise predict -m pos.json -i sentences.txt\n\
      framewise score -m pos.json -i tagged.txt -v\n\
      framewise inspect -m pos.json"
)]
#[command(author = "Framewise Contributors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Predict a label for every token
    #[command(
        long_about = "Predict a label for every token\n\n\
        Each input line is one sequence, split on whitespace. Output has one line per\n\
        input line with every token written as token/LABEL. Values the label map does\n\
        not know are written as <?>.\n\n\
        Example:\n\
          framewise predict -m pos.json -i sentences.txt\n\
          echo 'the cat sat' | framewise predict -m pos.json --values"
    )]
    Predict {
        /// Model artifact (JSON)
        #[arg(short, long, value_name = "FILE", help_heading = "Required")]
        model: PathBuf,

        /// Input text, one sequence per line (stdin when omitted)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Dataplane to use instead of the model default
        #[arg(short, long, value_name = "DIMENSION/DATAPLANE", value_parser = parse_dataplane)]
        dataplane: Option<DataplaneKey>,

        /// Print raw values instead of labels
        #[arg(long)]
        values: bool,

        /// Enable verbose output and debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Score predictions against tagged text
    #[command(
        long_about = "Score predictions against tagged text\n\n\
        Each input line is one sequence of token/LABEL pairs separated by whitespace.\n\
        The label after the last '/' is the expected value. Prints overall accuracy and\n\
        pass/fail tallies per prediction type.\n\n\
        Example:\n\
          framewise score -m pos.json -i tagged.txt -v"
    )]
    Score {
        /// Model artifact (JSON)
        #[arg(short, long, value_name = "FILE", help_heading = "Required")]
        model: PathBuf,

        /// Tagged input, one sequence per line (stdin when omitted)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Dataplane to use instead of the model default
        #[arg(short, long, value_name = "DIMENSION/DATAPLANE", value_parser = parse_dataplane)]
        dataplane: Option<DataplaneKey>,

        /// Enable verbose output and debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Describe a model artifact
    Inspect {
        /// Model artifact (JSON)
        #[arg(short, long, value_name = "FILE", help_heading = "Required")]
        model: PathBuf,

        /// List every number set
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Commands::Predict { verbose, .. }
            | Commands::Score { verbose, .. }
            | Commands::Inspect { verbose, .. } => *verbose,
        }
    }
}

pub fn run() -> io::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.verbose());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out)
}

/// Run a parsed command, writing its report to `out`.
pub fn execute<W: Write>(cli: Cli, out: &mut W) -> io::Result<()> {
    match cli.command {
        Commands::Predict {
            model,
            input,
            config,
            dataplane,
            values,
            verbose,
        } => {
            let (model, _) = load_model(&model)?;
            let aggregator = aggregator(&model, config.as_deref(), dataplane.as_ref())?;
            let sequences: Vec<Vec<String>> = read_lines(input.as_deref())?
                .iter()
                .map(|line| tokenize(line))
                .collect();

            if verbose {
                writeln!(
                    out,
                    "Framewise v{} - Predict ({})",
                    env!("CARGO_PKG_VERSION"),
                    aggregator.dataplane().key()
                )?;
                writeln!(out, "=====================================")?;
            }

            let results = aggregator.predict_batch(&sequences);
            for (tokens, predicted) in sequences.iter().zip(&results.outputs) {
                let line: Vec<String> = tokens
                    .iter()
                    .zip(predicted)
                    .map(|(token, &value)| {
                        if values {
                            format!("{token}/{value}")
                        } else {
                            format!("{token}/{}", model.label(value))
                        }
                    })
                    .collect();
                writeln!(out, "{}", line.join(" "))?;
            }

            if verbose {
                writeln!(out)?;
                writeln!(out, "  Sequences: {}", results.outputs.len())?;
                writeln!(out, "  Positions: {}", results.total)?;
                writeln!(out, "  Skipped: {}", results.skipped)?;
                writeln!(out, "  Elapsed: {:.3}s", results.elapsed.as_secs_f64())?;
            }
            Ok(())
        }

        Commands::Score {
            model,
            input,
            config,
            dataplane,
            verbose,
        } => {
            let (model, _) = load_model(&model)?;
            let aggregator = aggregator(&model, config.as_deref(), dataplane.as_ref())?;
            let mut sequences = Vec::new();
            let mut expected = Vec::new();
            for line in read_lines(input.as_deref())? {
                let (tokens, labels) = parse_tagged_line(&line);
                expected.push(
                    labels
                        .iter()
                        .map(|label| model.value_for_label(label).unwrap_or(Value::MIN))
                        .collect::<Vec<_>>(),
                );
                sequences.push(tokens);
            }

            let results = aggregator
                .predict_batch_scored(&sequences, &expected)
                .map_err(io::Error::other)?;
            write_score(out, &results, verbose)
        }

        Commands::Inspect { model, verbose } => {
            let (model, digest) = load_model(&model)?;
            write_inspect(out, &model, &digest, verbose)
        }
    }
}

/// Load a model artifact and its SHA-256 fingerprint.
pub fn load_model(path: &Path) -> io::Result<(Model, String)> {
    let bytes = fs::read(path)?;
    let digest = fingerprint(&bytes);
    let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
    let model = artifact.into_model().map_err(io::Error::other)?;
    Ok((model, digest))
}

fn aggregator<'m>(
    model: &'m Model,
    config: Option<&Path>,
    dataplane: Option<&DataplaneKey>,
) -> io::Result<ResultAggregator<'m>> {
    let config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let aggregator = ResultAggregator::with_config(model, config);
    match dataplane {
        Some(key) => aggregator.for_dataplane(key).map_err(io::Error::other),
        None => Ok(aggregator),
    }
}

fn read_lines(input: Option<&Path>) -> io::Result<Vec<String>> {
    let lines: Vec<String> = match input {
        Some(path) => fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect(),
        None => io::stdin().lock().lines().collect::<io::Result<_>>()?,
    };
    Ok(lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect())
}

/// Split a line into whitespace-separated tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Split `token/LABEL` pairs at the last `/`.
///
/// A pair without `/` keeps the whole text as token and an empty label.
pub fn parse_tagged_line(line: &str) -> (Vec<String>, Vec<String>) {
    line.split_whitespace()
        .map(|pair| match pair.rsplit_once('/') {
            Some((token, label)) if !token.is_empty() => (token.to_string(), label.to_string()),
            _ => (pair.to_string(), String::new()),
        })
        .unzip()
}

fn parse_dataplane(s: &str) -> Result<DataplaneKey, String> {
    match s.split_once('/') {
        Some((dimension, dataplane)) if !dimension.is_empty() && !dataplane.is_empty() => {
            Ok(DataplaneKey::new(dimension, dataplane))
        }
        _ => Err(format!("expected DIMENSION/DATAPLANE, got '{s}'")),
    }
}

fn write_score<W: Write>(out: &mut W, results: &ResultSet, verbose: bool) -> io::Result<()> {
    writeln!(
        out,
        "Accuracy: {:.4} ({}/{})",
        results.accuracy(),
        results.passed,
        results.passed + results.failed
    )?;
    writeln!(out, "  Positions: {}", results.total)?;
    writeln!(out, "  Skipped: {}", results.skipped)?;
    writeln!(out, "  Unknown: {}", results.unknown)?;
    for ptype in PredictionType::ALL {
        let Some(tally) = results.type_tallies.get(&ptype) else {
            continue;
        };
        writeln!(
            out,
            "  {:<16} {:>6}  pass {:>6}  fail {:>6}",
            ptype.name(),
            tally.total,
            tally.passed,
            tally.failed
        )?;
    }
    if verbose {
        writeln!(out, "  Elapsed: {:.3}s", results.elapsed.as_secs_f64())?;
    }
    Ok(())
}

fn write_inspect<W: Write>(out: &mut W, model: &Model, digest: &str, verbose: bool) -> io::Result<()> {
    writeln!(out, "Model: {}", model.tag())?;
    if !model.description().is_empty() {
        writeln!(out, "  Description: {}", model.description())?;
    }
    writeln!(out, "  SHA-256: {digest}")?;
    writeln!(out, "  Empty sentinel: {}", model.empty())?;
    writeln!(out, "  Label maps: {}", model.labels().map_count())?;
    writeln!(out, "  Default dataplane: {}", model.default_dataplane().key())?;

    for dp in model.dataplanes() {
        writeln!(out)?;
        writeln!(out, "Dataplane {}", dp.key())?;
        writeln!(
            out,
            "  Window: {} (before {}, after {})",
            dp.window(),
            dp.before(),
            dp.after()
        )?;
        writeln!(out, "  Framer: {:?}", dp.framer())?;
        writeln!(out, "  Method: {:?}", dp.prob_method())?;
        if let Some(source) = dp.dependent_source() {
            writeln!(out, "  Dependent source: {source}")?;
        }
        writeln!(out, "  Number sets: {}", dp.number_sets().len())?;
        writeln!(out, "  Groups: {}", dp.store().group_count())?;
        writeln!(out, "  Defaults: {}", dp.defaults().entries().len())?;
        if verbose {
            for (i, ns) in dp.number_sets().iter().enumerate() {
                let slots: Vec<String> = ns.slots().iter().map(|s| s.slot.to_string()).collect();
                let mut role = String::new();
                if dp.full_set() == Some(i) {
                    role.push_str(" full");
                }
                if dp.identity_set() == Some(i) {
                    role.push_str(" identity");
                }
                writeln!(
                    out,
                    "  [{i}] {} slots [{}] {:?} weight {} vectors {}{role}",
                    ns.name().unwrap_or("-"),
                    slots.join(","),
                    ns.kind(),
                    ns.weight_class(),
                    ns.len()
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(feature = "logging")]
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(not(feature = "logging"))]
fn init_logging(_verbose: bool) {}
