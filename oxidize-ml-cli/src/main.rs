//! `oxidize-ml`: fetch a benchmark dataset into the local cache and summarize it.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use oxidize_ml::prelude::*;

#[derive(Parser)]
#[command(name = "oxidize-ml")]
#[command(about = "Download and inspect OxidizeML benchmark datasets", long_about = None)]
struct Cli {
    /// Cache directory (default: $OXIDIZE_ML_DATASETS_DIR or ~/.oxidize-ml/datasets)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Base URL to download dataset files from
    #[arg(long, global = true)]
    origin: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boston Housing price regression
    BostonHousing {
        /// Fraction of samples held out for testing
        #[arg(long, default_value_t = boston_housing::DEFAULT_TEST_SPLIT)]
        test_split: f64,

        /// Shuffle seed
        #[arg(long, default_value_t = boston_housing::DEFAULT_SEED)]
        seed: u64,
    },

    /// Fashion-MNIST clothing images
    FashionMnist,

    /// IMDB review sentiment
    Imdb(ImdbArgs),

    /// IMDB word index: vocabulary size, or the ids of the given words
    WordIndex {
        words: Vec<String>,
    },
}

#[derive(clap::Args)]
struct ImdbArgs {
    /// JSON file with default options; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Keep only ids below this value
    #[arg(long)]
    num_words: Option<usize>,

    /// Treat ids below this value as out of vocabulary
    #[arg(long)]
    skip_top: Option<usize>,

    /// Drop reviews longer than this
    #[arg(long)]
    maxlen: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, conflicts_with = "no_start_char")]
    start_char: Option<i64>,

    /// Do not prepend a start marker
    #[arg(long)]
    no_start_char: bool,

    #[arg(long, conflicts_with = "no_oov_char")]
    oov_char: Option<i64>,

    /// Remove out-of-vocabulary ids instead of replacing them
    #[arg(long)]
    no_oov_char: bool,

    #[arg(long)]
    index_from: Option<i64>,
}

impl ImdbArgs {
    fn to_options(&self) -> DatasetResult<ImdbOptions> {
        let mut options = match &self.options {
            Some(path) => ImdbOptions::from_json_file(path)?,
            None => ImdbOptions::default(),
        };
        if self.num_words.is_some() {
            options.num_words = self.num_words;
        }
        if let Some(skip_top) = self.skip_top {
            options.skip_top = skip_top;
        }
        if self.maxlen.is_some() {
            options.maxlen = self.maxlen;
        }
        if let Some(seed) = self.seed {
            options.seed = seed;
        }
        if self.no_start_char {
            options.start_char = None;
        } else if self.start_char.is_some() {
            options.start_char = self.start_char;
        }
        if self.no_oov_char {
            options.oov_char = None;
        } else if self.oov_char.is_some() {
            options.oov_char = self.oov_char;
        }
        if let Some(index_from) = self.index_from {
            options.index_from = index_from;
        }
        Ok(options)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn label_counts<T: Ord + Copy>(labels: &[T]) -> BTreeMap<T, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DatasetsConfig::from_env_with(cli.cache_dir.clone(), cli.origin.clone())?;
    println!("Cache: {}", config.cache_dir.display());
    let source = DatasetSource::new(config)?;

    match cli.command {
        Commands::BostonHousing { test_split, seed } => {
            let ((x_train, y_train), (x_test, y_test)) =
                boston_housing::load_data(&source, test_split, seed)?;
            println!("Boston Housing (test_split={test_split}, seed={seed})");
            println!("  x_train: {x_train}");
            println!("  x_test:  {x_test}");
            for (name, y) in [("y_train", &y_train), ("y_test", &y_test)] {
                if y.is_empty() {
                    println!("  {name}: empty");
                } else {
                    println!(
                        "  {name}: {} targets in [{:.1}, {:.1}]",
                        y.len(),
                        y.min_all()?,
                        y.max_all()?
                    );
                }
            }
        }

        Commands::FashionMnist => {
            let ((x_train, y_train), (x_test, y_test)) = fashion_mnist::load_data(&source)?;
            println!("Fashion-MNIST");
            println!("  x_train: {x_train}");
            println!("  x_test:  {x_test}");
            println!("  {:<12} {:>7} {:>7}", "class", "train", "test");
            let train_counts = label_counts(y_train.data());
            let test_counts = label_counts(y_test.data());
            for (label, name) in fashion_mnist::CLASS_NAMES.iter().enumerate() {
                let label = label as u8;
                println!(
                    "  {:<12} {:>7} {:>7}",
                    name,
                    train_counts.get(&label).copied().unwrap_or(0),
                    test_counts.get(&label).copied().unwrap_or(0)
                );
            }
        }

        Commands::Imdb(args) => {
            let options = args.to_options()?;
            let ((x_train, y_train), (x_test, y_test)) = imdb::load_data(&source, &options)?;
            println!("IMDB ({options:?})");
            for (name, x, y) in [("train", &x_train, &y_train), ("test", &x_test, &y_test)] {
                let counts = label_counts(y.data());
                println!("  {name}: {x}");
                println!(
                    "    negative={} positive={}",
                    counts.get(&0).copied().unwrap_or(0),
                    counts.get(&1).copied().unwrap_or(0)
                );
            }
        }

        Commands::WordIndex { words } => {
            let index = imdb::load_word_index(&source)?;
            if words.is_empty() {
                println!("IMDB word index: {} words", index.len());
            }
            for word in &words {
                match index.get(word.to_lowercase().as_str()) {
                    Some(id) => println!("{word}\t{id}"),
                    None => println!("{word}\t-"),
                }
            }
        }
    }

    Ok(())
}
