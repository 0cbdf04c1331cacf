//! `eegbench` command line: ingest recordings, run pipelines, extract
//! features, and manage models against a local store.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use eegbench::features::{build_extractor, ExtractorConfig, FeatureExtractor};
use eegbench::loader::load_csv;
use eegbench::manager::{DatasetManager, FeatureOutcome, PipelineOutcome};
use eegbench::models::ModelsManager;
use eegbench::preprocess::{Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "eegbench", version, about = "EEG analysis workbench")]
struct Cli {
    /// Store root directory (catalog, payloads, models).
    #[arg(long, env = "EEGBENCH_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a CSV recording into the store.
    Ingest {
        path: PathBuf,
        /// Sampling frequency of the recording in Hz (not stored in CSV).
        #[arg(long)]
        sfreq: f64,
        /// Detect and split off a label column.
        #[arg(long)]
        labels: bool,
    },
    /// List raw datasets.
    List,
    /// Show one raw dataset.
    Info { id: String },
    /// Delete a raw dataset (its processed children stay).
    Delete { id: String },
    /// Apply a pipeline (JSON config file) to a raw dataset.
    Apply {
        id: String,
        /// Pipeline configuration: {"random_state": .., "steps": [{"name": .., "params": {..}}]}
        #[arg(long)]
        pipeline: PathBuf,
        /// Print the result instead of persisting it.
        #[arg(long)]
        preview: bool,
    },
    /// List processed datasets, optionally for one raw parent.
    Processed {
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a processed dataset.
    DeleteProcessed { id: String },
    /// Extract features from a processed dataset.
    Extract {
        proc_id: String,
        /// Extractor names (time_domain, psd, band_power); outputs are
        /// concatenated column-wise in the given order.
        #[arg(short, long = "extractor", required = true)]
        extractors: Vec<String>,
        /// Print shapes instead of persisting the feature set.
        #[arg(long)]
        preview: bool,
    },
    /// List feature sets, optionally for one processed parent.
    Features {
        #[arg(long)]
        parent: Option<String>,
    },
    /// Model catalog operations.
    #[command(subcommand)]
    Models(ModelsCommand),
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// Register a model parameter file.
    Add {
        path: PathBuf,
        /// Backend type tag (e.g. linear).
        #[arg(long = "type")]
        model_type: String,
        #[arg(long)]
        name: Option<String>,
    },
    List,
    Delete {
        id: String,
    },
    /// Run a model over a stored feature set.
    Predict {
        model_id: String,
        feature_id: String,
    },
}

fn store_root(cli: &Cli) -> PathBuf {
    cli.store.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eegbench")
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let root = store_root(&cli);

    match cli.command {
        Command::Ingest {
            path,
            sfreq,
            labels,
        } => {
            let manager = DatasetManager::open(&root)?;
            let sample = load_csv(&path, sfreq, labels)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let id = manager.add_sample(&sample, &filename)?;
            println!("{id}");
        }
        Command::List => {
            let manager = DatasetManager::open(&root)?;
            for record in manager.list_samples()? {
                println!(
                    "{}  {}  {} ch x {} samples @ {} Hz  ({})",
                    record.id,
                    record.filename,
                    record.n_channels,
                    record.n_samples,
                    record.sfreq,
                    record.created_at
                );
            }
        }
        Command::Info { id } => {
            let manager = DatasetManager::open(&root)?;
            match manager.store().get_dataset(&id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("dataset {id} not found"),
            }
        }
        Command::Delete { id } => {
            let manager = DatasetManager::open(&root)?;
            if !manager.delete_sample(&id)? {
                bail!("dataset {id} not found");
            }
        }
        Command::Apply {
            id,
            pipeline,
            preview,
        } => {
            let manager = DatasetManager::open(&root)?;
            let text = std::fs::read_to_string(&pipeline)
                .with_context(|| format!("reading pipeline config {}", pipeline.display()))?;
            let config: PipelineConfig = serde_json::from_str(&text)
                .with_context(|| format!("parsing pipeline config {}", pipeline.display()))?;
            let mut pipeline = Pipeline::from_config(&config)?;

            match manager.apply_pipeline(&id, &mut pipeline, !preview)? {
                PipelineOutcome::Stored(proc_id) => println!("{proc_id}"),
                PipelineOutcome::Preview(sample) => println!(
                    "preview: shape {:?} @ {} Hz (not persisted)",
                    sample.data.shape(),
                    sample.sfreq
                ),
            }
        }
        Command::Processed { parent } => {
            let manager = DatasetManager::open(&root)?;
            for record in manager.list_processed(parent.as_deref())? {
                println!(
                    "{}  parent {}  {} ch x {} samples @ {} Hz  {} steps  ({})",
                    record.id,
                    record.parent_id,
                    record.n_channels,
                    record.n_samples,
                    record.sfreq,
                    record.pipeline_config.steps.len(),
                    record.created_at
                );
            }
        }
        Command::DeleteProcessed { id } => {
            let manager = DatasetManager::open(&root)?;
            if !manager.delete_processed(&id)? {
                bail!("processed dataset {id} not found");
            }
        }
        Command::Extract {
            proc_id,
            extractors,
            preview,
        } => {
            let manager = DatasetManager::open(&root)?;
            let record = manager
                .get_processed_info(&proc_id)?
                .with_context(|| format!("processed dataset {proc_id} not found"))?;

            // Spectral extractors take their sampling rate from the record.
            let mut built: Vec<Box<dyn FeatureExtractor>> = Vec::new();
            for name in &extractors {
                let params = match name.as_str() {
                    "psd" | "band_power" => serde_json::json!({ "sfreq": record.sfreq }),
                    _ => serde_json::json!({}),
                };
                built.push(build_extractor(&ExtractorConfig {
                    name: name.clone(),
                    params,
                })?);
            }

            match manager.extract_features(&proc_id, &mut built, None, !preview)? {
                FeatureOutcome::Stored(feat_id) => println!("{feat_id}"),
                FeatureOutcome::Preview { features, .. } => println!(
                    "preview: {} instances x {} features (not persisted)",
                    features.nrows(),
                    features.ncols()
                ),
            }
        }
        Command::Features { parent } => {
            let manager = DatasetManager::open(&root)?;
            for record in manager.list_features(parent.as_deref())? {
                println!(
                    "{}  parent {}  {} x {}  labels: {}  ({})",
                    record.id,
                    record.parent_id,
                    record.n_instances,
                    record.n_features,
                    record.labels.is_some(),
                    record.created_at
                );
            }
        }
        Command::Models(command) => {
            let manager = ModelsManager::open(&root)?;
            match command {
                ModelsCommand::Add {
                    path,
                    model_type,
                    name,
                } => {
                    let id = manager.add_model(name.as_deref(), &model_type, &path, "builtin", None)?;
                    println!("{id}");
                }
                ModelsCommand::List => {
                    for record in manager.list_models()? {
                        println!(
                            "{}  {}  [{}]  {}  ({})",
                            record.id,
                            record.name,
                            record.model_type,
                            record.file_path,
                            record.created_at
                        );
                    }
                }
                ModelsCommand::Delete { id } => {
                    if !manager.delete_model(&id)? {
                        bail!("model {id} not found");
                    }
                }
                ModelsCommand::Predict {
                    model_id,
                    feature_id,
                } => {
                    let datasets = DatasetManager::open(&root)?;
                    let (features, _labels) = datasets
                        .get_features_data(&feature_id)?
                        .with_context(|| format!("feature set {feature_id} not found"))?;
                    let model = manager.load_model(&model_id)?;
                    let predictions = model.predict(&features)?;
                    for p in predictions {
                        println!("{p}");
                    }
                }
            }
        }
    }
    Ok(())
}
