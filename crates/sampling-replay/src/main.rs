use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{command, CommandFactory, Parser};
use itertools::Itertools;
use sampling_core::{ModelInfo, SampleReport, SamplingContext};
use serde::Serialize;
use tokio::{
    fs::File,
    io::{AsyncReadExt, BufReader},
};

mod config;

/// Join `name` onto `root` unless it is absolute. Names climbing out with `..` are refused.
pub fn build_path(root: impl AsRef<Path>, name: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let name = name.as_ref();
    if name.ancestors().any(|p| p.ends_with(Path::new(".."))) {
        bail!("cannot have \"..\" in names");
    }
    match name.is_absolute() || name.starts_with(root) {
        true => Ok(name.into()),
        false => Ok(root.join(name)),
    }
}

async fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await?;
    Ok(contents)
}

pub async fn load_config(path: impl AsRef<Path>) -> Result<config::Config> {
    let path = path.as_ref();
    let contents = read_to_string(path).await?;
    let config: config::Config = toml::from_str(&contents)?;
    let root = path.parent().unwrap_or(Path::new(""));
    config.resolve(root)
}

/// Score vectors, one per position, stored as a JSON array of arrays.
pub async fn load_scores(path: impl AsRef<Path>) -> Result<Vec<Vec<f32>>> {
    let contents = read_to_string(path).await?;
    let scores: Vec<Vec<f32>> = serde_json::from_str(&contents)?;
    if let Some((position, row)) = scores.iter().find_position(|row| row.is_empty()) {
        bail!("score row {position} is empty ({} entries)", row.len());
    }
    Ok(scores)
}

#[derive(Debug, Clone, Serialize)]
struct Step<'a> {
    position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(flatten)]
    report: SampleReport,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    pub grammar_first: bool,
    pub apply_grammar: bool,
    pub stop_on_finish: bool,
}

/// Sample one token per score row, feeding every selection back into the context.
pub fn replay(
    context: &mut SamplingContext,
    scores: &[Vec<f32>],
    options: ReplayOptions,
) -> Result<Vec<SampleReport>> {
    let mut reports = Vec::with_capacity(scores.len());
    for position in 0..scores.len() {
        let token = context.sample(scores, position as i32, options.grammar_first)?;
        context.accept(token, options.apply_grammar);
        if let Some(report) = context.last_sample() {
            reports.push(report.clone());
        }
        if options.stop_on_finish && context.is_finished() {
            log::info!("[replay][finished][position: {position}]");
            break;
        }
    }
    Ok(reports)
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Overrides `replay.scores` in the config.
    #[arg(long, short, value_name = "FILE")]
    scores: Option<PathBuf>,
    /// Overrides `replay.grammar_first` in the config.
    #[arg(long, short)]
    grammar_first: bool,
    /// Overrides `sampling.seed` in the config.
    #[arg(long)]
    seed: Option<u32>,
}

async fn run(args: Args) -> Result<()> {
    let path = args
        .config
        .clone()
        .unwrap_or("assets/configs/Replay.toml".into());
    log::info!("reading config {}...", path.to_string_lossy());
    let config::Config {
        model,
        mut sampling,
        replay: options,
    } = load_config(&path).await?;

    if let Some(seed) = args.seed {
        sampling.seed = seed;
    }
    let Some(scores_path) = args.scores.or(options.scores) else {
        bail!("no score file given, set `replay.scores` or pass `--scores`");
    };
    let scores = load_scores(&scores_path).await?;
    log::info!(
        "loaded {} score rows from {}",
        scores.len(),
        scores_path.to_string_lossy()
    );

    let info = ModelInfo::from(model);
    let texts = info
        .tokens
        .iter()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .collect_vec();
    let mut context = SamplingContext::new(&info, sampling)?;
    log::info!("[replay][seed: {}]", context.seed());

    let options = ReplayOptions {
        grammar_first: args.grammar_first || options.grammar_first,
        apply_grammar: options.apply_grammar,
        stop_on_finish: options.stop_on_finish,
    };
    let reports = replay(&mut context, &scores, options)?;
    for (position, report) in reports.into_iter().enumerate() {
        let text = texts.get(report.token as usize).map(String::as_str);
        let step = Step {
            position,
            text,
            report,
        };
        println!("{}", serde_json::to_string(&step)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_module_level("sampling_replay", log::LevelFilter::Info)
        .with_module_level("sampling_core", log::LevelFilter::Info)
        .init()
        .expect("start logger");

    let args = Args::parse();

    let cmd = Args::command();
    let version = cmd.get_version().unwrap_or("0.0.1");
    let bin_name = cmd.get_bin_name().unwrap_or("sampling_replay");

    log::info!("{}\tversion: {}", bin_name, version);

    if let Err(err) = run(args).await {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
