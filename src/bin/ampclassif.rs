use std::path::PathBuf;

use ampclassif::{
    benchmark,
    config::{load_config, Config},
    dataset,
    ensemble::{self, GridMode},
    model::{LinearModel, ModelError, Predictor},
    output::{output_path, write_table_to_file},
    pipeline::Pipeline,
    reports::{parse_report, ReportTool},
    services::{transport::HttpTransport, Params, Service},
};
use anyhow::Context;
use clap::{value_parser, Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(about = "Antimicrobial peptide prediction through remote services and a local model.")]
struct Args {
    #[arg(short, long, global = true, value_parser=value_parser!(PathBuf), help = "TOML configuration file.")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "More log output (repeatable).")]
    verbose: u8,

    #[arg(short, long, global = true, help = "Only log errors.")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict every sequence of the input files.
    Predict {
        #[command(subcommand)]
        predictor: Predict,
    },
    /// Convert FASTA files into labelled `name,sequence,active` CSV files.
    Fasta2csv {
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
    },
    /// Score prediction files against ground truth datasets.
    Benchmark {
        #[arg(value_parser=value_parser!(PathBuf))]
        datasets_dir: PathBuf,
        #[arg(value_parser=value_parser!(PathBuf))]
        predictions_dir: PathBuf,
        #[arg(long, help = "Print the results without saving them.")]
        no_save: bool,
    },
    /// Search ensemble weights that put the most actives among the top candidates.
    GridSearch {
        #[arg(value_parser=value_parser!(PathBuf), help = "CSV with `<model>_score` columns and a 0/1 `class` column.")]
        training_set: PathBuf,
        #[arg(short, long = "model", required = true, help = "Model whose scores are combined; repeat for several.")]
        models: Vec<String>,
        #[arg(long, default_value_t = 0.01)]
        step: f64,
        #[arg(long, value_enum, default_value_t = Mode::UnitSum)]
        mode: Mode,
        #[arg(long, default_value_t = 100)]
        top_k: usize,
        #[arg(long, help = "Only print the best N weight vectors.")]
        limit: Option<usize>,
    },
    /// Convert a saved hemolysis predictor report into prediction CSV.
    ParseReport {
        #[arg(value_enum)]
        tool: Tool,
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
    },
    /// List the strains known to DBAASP.
    Strains,
}

#[derive(Subcommand, Debug)]
enum Predict {
    Dbaasp {
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
        #[arg(short, long, help = "Target strain; repeat for several. Defaults to the configured strain.")]
        strain: Vec<String>,
        #[arg(long, conflicts_with = "strain", help = "Run once for every configured strain.")]
        all_strains: bool,
    },
    Stm {
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
    },
    Camp {
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
    },
    Amplify {
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        organism: Option<String>,
        #[arg(long, help = "Genome accession; switches to the genome chunk budget.")]
        accession: Option<String>,
    },
    /// Run the local model.
    Ampscanner {
        #[arg(required = true, value_parser=value_parser!(PathBuf))]
        inputs: Vec<PathBuf>,
        #[arg(short, long, value_parser=value_parser!(PathBuf), help = "Model file; overrides model.path.")]
        model: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    UnitSum,
    FullCube,
}

impl From<Mode> for GridMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::UnitSum => GridMode::UnitSum,
            Mode::FullCube => GridMode::FullCube,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Tool {
    Happenn,
    HlppredFuse,
    Hemopi,
    Hemopred,
}

impl From<Tool> for ReportTool {
    fn from(tool: Tool) -> Self {
        match tool {
            Tool::Happenn => ReportTool::Happenn,
            Tool::HlppredFuse => ReportTool::HlppredFuse,
            Tool::Hemopi => ReportTool::Hemopi,
            Tool::Hemopred => ReportTool::Hemopred,
        }
    }
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(args.verbose, args.quiet))
        // Keep stdout free for results.
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(err) = run(args) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Could not load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Predict { predictor } => predict(config, predictor),
        Command::Fasta2csv { inputs } => {
            for input in inputs {
                dataset::fasta_to_csv(&input)
                    .with_context(|| format!("Could not convert {}", input.display()))?;
            }
            Ok(())
        }
        Command::Benchmark {
            datasets_dir,
            predictions_dir,
            no_save,
        } => {
            let rows = benchmark::benchmark(&datasets_dir, &predictions_dir)?;
            benchmark::write_benchmark(&rows, std::io::stdout())?;
            if !no_save {
                benchmark::save_benchmark(&rows, &predictions_dir)?;
            }
            Ok(())
        }
        Command::GridSearch {
            training_set,
            models,
            step,
            mode,
            top_k,
            limit,
        } => {
            let candidates = ensemble::read_training_set(&training_set, &models)
                .with_context(|| format!("Could not read {}", training_set.display()))?;
            let results =
                ensemble::grid_search_weights(&candidates, models.len(), step, mode.into(), top_k)?;
            let shown = limit.unwrap_or(results.len()).min(results.len());
            ensemble::write_grid_search(&results[..shown], &models, std::io::stdout())?;
            Ok(())
        }
        Command::ParseReport { tool, inputs } => {
            let tool = ReportTool::from(tool);
            for input in inputs {
                let table = parse_report(tool, &input)
                    .with_context(|| format!("Could not parse {}", input.display()))?;
                let out = output_path(&input, config.output_dir.as_deref(), tool.name(), None);
                write_table_to_file(&table, &out)?;
                info!(output_file = out.to_str(), n_rows = table.len(), "Saved predictions.");
            }
            Ok(())
        }
        Command::Strains => {
            config
                .dbaasp
                .strains
                .iter()
                .for_each(|strain| println!("{}", strain));
            Ok(())
        }
    }
}

fn predict(config: Config, predictor: Predict) -> anyhow::Result<()> {
    let transport = HttpTransport::new(&config.http.user_agent)?;

    let (inputs, service, param_sets) = match predictor {
        Predict::Ampscanner { inputs, model } => {
            let model_path = model
                .or_else(|| config.model.path.clone())
                .ok_or(ModelError::MissingModel)?;
            let classifier = LinearModel::load(&model_path)
                .with_context(|| format!("Could not load model {}", model_path.display()))?;
            let predictor = Predictor::new(classifier, &config.model);
            let pipeline = Pipeline::new(config, transport);
            for input in inputs {
                pipeline.run_local(&input, &predictor)?;
            }
            return Ok(());
        }
        Predict::Dbaasp {
            inputs,
            strain,
            all_strains,
        } => {
            let strains = if all_strains {
                config.dbaasp.strains.clone()
            } else {
                strain
            };
            let param_sets = if strains.is_empty() {
                vec![Params::default()]
            } else {
                strains
                    .into_iter()
                    .map(|strain| Params {
                        strain: Some(strain),
                        ..Params::default()
                    })
                    .collect()
            };
            (inputs, Service::Dbaasp, param_sets)
        }
        Predict::Stm { inputs } => (inputs, Service::Stm, vec![Params::default()]),
        Predict::Camp { inputs } => (inputs, Service::Camp, vec![Params::default()]),
        Predict::Amplify {
            inputs,
            organism,
            accession,
        } => (
            inputs,
            Service::Amplify,
            vec![Params {
                organism,
                accession,
                ..Params::default()
            }],
        ),
    };

    let pipeline = Pipeline::new(config, transport);
    for input in &inputs {
        for params in &param_sets {
            pipeline
                .run(input, service, params)
                .with_context(|| format!("{} failed for {}", service, input.display()))?;
        }
    }
    Ok(())
}
