use std::env;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch::{
    config, quality::FaceQuality, Controller, Embedding, EmbeddingExtractor, Event, FileStore,
    IdentityStore, OnnxEncoder, TensorLayout,
};
use log::{info, warn};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "facematch")]
#[command(version, about = "Enroll faces as embeddings and identify probe faces")]
struct Cli {
    /// Config file (defaults to the system config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the embedding of a cropped face image as JSON
    Embed {
        image: PathBuf,
        /// Model takes channel-first input
        #[arg(long)]
        nchw: bool,
    },
    /// Enroll an identity from a JSON-lines file of captured samples
    Enroll {
        /// Identity label to store the samples under
        #[arg(short, long)]
        label: String,
        samples: PathBuf,
    },
    /// Identify a probe embedding (JSON array) or, with --image, a face image
    Identify {
        probe: PathBuf,
        #[arg(long)]
        image: bool,
        #[arg(long)]
        nchw: bool,
    },
    /// List enrolled identities
    List,
    /// Remove all samples enrolled for an identity
    Purge { label: String },
    /// Open config file in editor
    Config,
}

/// One line of an enrollment capture log.
#[derive(Deserialize)]
struct CapturedSample {
    timestamp_ms: u64,
    embedding: Embedding,
    #[serde(default)]
    quality: Option<FaceQuality>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Embed { image, nchw } => embed(&cfg, &image, nchw),
        Commands::Enroll { label, samples } => enroll(&cfg, &label, &samples),
        Commands::Identify { probe, image, nchw } => identify(&cfg, &probe, image, nchw),
        Commands::List => list(&cfg),
        Commands::Purge { label } => purge(&cfg, &label),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn layout(nchw: bool) -> TensorLayout {
    if nchw {
        TensorLayout::Nchw
    } else {
        TensorLayout::Nhwc
    }
}

fn extract(cfg: &config::Config, image: &Path, nchw: bool) -> Result<Embedding> {
    let mut encoder = OnnxEncoder::open(&cfg.model_path, layout(nchw))
        .context("Failed to initialize embedding model")?;
    let img = image::open(image).with_context(|| format!("opening {}", image.display()))?;
    let vector = encoder.extract(&img).context("Failed to extract embedding")?;
    Ok(Embedding::new(vector))
}

fn embed(cfg: &config::Config, image: &Path, nchw: bool) -> Result<()> {
    let embedding = extract(cfg, image, nchw)?;
    info!("{}-dimensional embedding", embedding.len());
    println!("{}", serde_json::to_string(&embedding)?);
    Ok(())
}

fn enroll(cfg: &config::Config, label: &str, samples: &Path) -> Result<()> {
    info!("Enrolling identity: {}", label);

    let store: Arc<dyn IdentityStore> = Arc::new(FileStore::open(&cfg.store_path));
    let mut controller = Controller::new(cfg.session(), cfg.matcher(), cfg.quality_gate(), store);
    controller.begin_register();

    let file =
        std::fs::File::open(samples).with_context(|| format!("opening {}", samples.display()))?;
    let mut ready = false;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: CapturedSample = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid sample", samples.display(), n + 1))?;

        let event = match sample.quality {
            Some(quality) => controller.on_face(&quality, sample.embedding, sample.timestamp_ms)?,
            None => controller.on_embedding(sample.embedding, sample.timestamp_ms)?,
        };
        match event {
            Event::Progress { collected, percent } => {
                info!("Sample {} accepted ({}%)", collected, percent)
            }
            Event::Skipped(reason) => warn!("Line {}: sample skipped ({:?})", n + 1, reason),
            Event::Ignored => warn!("Line {}: sample ignored", n + 1),
            Event::ReadyToFinalize { samples } => {
                info!("Collected {} samples", samples);
                ready = true;
                break;
            }
            Event::Identified(_) => {}
        }
    }

    if !ready {
        let collected = controller.session().len();
        let target = controller.session().target_sample_count();
        controller.cancel();
        anyhow::bail!(
            "Only {} of {} samples were usable, nothing was enrolled",
            collected,
            target
        );
    }

    let records = controller
        .finalize(label)
        .context("Failed to save enrollment")?;
    info!("✓ Enrolled {} sample(s) for: {}", records.len(), label.trim());
    Ok(())
}

fn identify(cfg: &config::Config, probe: &Path, image: bool, nchw: bool) -> Result<()> {
    let embedding = if image {
        extract(cfg, probe, nchw)?
    } else {
        let raw = std::fs::read_to_string(probe)
            .with_context(|| format!("reading {}", probe.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", probe.display()))?
    };

    let store: Arc<dyn IdentityStore> = Arc::new(FileStore::open(&cfg.store_path));
    let mut controller = Controller::new(cfg.session(), cfg.matcher(), cfg.quality_gate(), store);
    controller.begin_find();

    match controller.on_embedding(embedding, 0)? {
        Event::Identified(result) => {
            println!("{}\t{:.4}", result.identity, result.score);
            Ok(())
        }
        other => anyhow::bail!("unexpected identification outcome: {:?}", other),
    }
}

fn list(cfg: &config::Config) -> Result<()> {
    let store = FileStore::open(&cfg.store_path);
    let labels = store.labels().context("Failed to load face records")?;
    if labels.is_empty() {
        info!("No enrolled identities in {}", store.path().display());
    }
    for (label, count) in labels {
        println!("{}\t{}", label, count);
    }
    Ok(())
}

fn purge(cfg: &config::Config, label: &str) -> Result<()> {
    info!("Purging enrolled faces for: {}", label);

    let removed = FileStore::open(&cfg.store_path)
        .purge(label)
        .context("Failed to purge face records")?;

    info!("✓ Removed {} sample(s) for: {}", removed, label);
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
