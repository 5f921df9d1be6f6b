pub mod codecs;
pub mod config;
pub mod conformance;
pub mod containers;
pub mod conversion_job;
pub mod error;
pub mod ffmpeg;
pub mod file_path_handler;
pub mod filescanner;
pub mod fstools;
pub mod pipeline;
pub mod probe;
pub mod profile;
pub mod queue_processor;
pub mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kdam::{term, tqdm, BarExt};
use log::{debug, error, info, warn};
use rustop::opts;
use signal_hook::consts::{SIGINT, SIGTERM};

use config::{CliOptions, Config};
use file_path_handler::FilePathHandler;
use filescanner::FileScanner;
use pipeline::{GpuSlot, Pipeline};
use probe::FFprobe;
use queue_processor::{QueueProcessor, QueueProcessorMessage};
use report::{FileOutcome, RunReport};

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Bring a media library in line with a target encoding profile.";
        opt gpu:bool=false, desc:"Encode with NVENC instead of the CPU.";
        opt audit:bool=false, desc:"Report non-conformant files without converting them.";
        opt verbose:bool=false, desc:"Log debug output.";
        opt workers:Option<usize>, desc:"Number of files to work on at once. [1]";
        opt config:Option<String>, desc:"TOML file with a [profile] table and defaults for these options.";
        opt retries:Option<u32>, desc:"Attempts at deleting or renaming a locked file. [5]";
        opt retry_delay:Option<f64>, desc:"Seconds between those attempts. [5]";
        opt timeout:Option<u64>, desc:"Kill an encode after this many seconds, 0 for never. [0]";
        opt ffmpeg:Option<String>, desc:"ffmpeg binary. [ffmpeg]";
        opt ffprobe:Option<String>, desc:"ffprobe binary. [ffprobe]";
        param root:String, desc:"Media directory (or a single file).";
    }.parse_or_exit();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let file_config = match args.config.as_ref().map(|p| config::load_file(&PathBuf::from(p))).transpose() {
        Ok(file_config) => file_config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        },
    };
    let cli = CliOptions {
        root: PathBuf::from(&args.root),
        gpu: args.gpu,
        audit_only: args.audit,
        workers: args.workers,
        retries: args.retries,
        retry_delay_secs: args.retry_delay,
        timeout_secs: args.timeout,
        ffmpeg: args.ffmpeg.map(PathBuf::from),
        ffprobe: args.ffprobe.map(PathBuf::from),
    };
    let config = match config::resolve(cli, file_config) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        },
    };

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            warn!("Unable to install handler for signal {}: {}", signal, err);
        }
    }

    let ffprobe = FFprobe::new(&config.ffprobe, config.profile.container.extension());
    if !ffprobe.is_installed() {
        error!("{:?} is not installed.", config.ffprobe);
        return ExitCode::FAILURE;
    }
    let ffmpeg = ffmpeg::FFmpeg::new(&config.ffmpeg, config.encode_timeout, Arc::clone(&stop));
    if !config.audit_only && !ffmpeg.is_installed() {
        error!("{:?} is not installed.", config.ffmpeg);
        return ExitCode::FAILURE;
    }

    let report = run(Arc::clone(&config), Arc::new(ffprobe), Arc::new(ffmpeg), Arc::clone(&stop));
    println!("{}", report.summary());

    match report.has_failures() || report.interrupted {
        true => ExitCode::FAILURE,
        false => ExitCode::SUCCESS,
    }
}

fn run(config: Arc<Config>, ffprobe: Arc<FFprobe>, ffmpeg: Arc<ffmpeg::FFmpeg>, stop: Arc<AtomicBool>) -> RunReport {
    info!(
        "{} {:?} against {} ({} mode, {} worker{})",
        if config.audit_only { "Auditing" } else { "Converting" },
        config.root,
        config.profile,
        if config.gpu { "GPU" } else { "CPU" },
        config.workers,
        if config.workers == 1 { "" } else { "s" });

    let pipeline = Pipeline::new(Arc::clone(&config), ffprobe, ffmpeg, Arc::new(GpuSlot::new()));
    let mut queue_processor = QueueProcessor::new(
        FilePathHandler::new(pipeline),
        config.workers,
        config.profile.container.extension(),
        Arc::clone(&stop));
    let rx = queue_processor.subscribe();
    let handles = queue_processor.start(FileScanner::new(&config.root, config.profile.container.extension(), config.retry));

    term::init(false);
    let mut pbar = tqdm!(
        desc = if config.audit_only { "auditing" } else { "converting" },
        unit = " files",
        position = 0,
        force_refresh = true
    );

    let mut report = RunReport::new();
    for msg in rx {
        match msg {
            QueueProcessorMessage::Start(path) => {
                pbar.set_postfix(format!("{}", path.file_name().unwrap_or_default().to_string_lossy()));
                let _ = pbar.refresh();
            },
            QueueProcessorMessage::Finished(path, outcome) => {
                match &outcome {
                    FileOutcome::Failed(_) => warn!("{:?}: {}", path, outcome),
                    FileOutcome::Conformant | FileOutcome::Skipped => debug!("{:?}: {}", path, outcome),
                    _ => info!("{:?}: {}", path, outcome),
                }
                report.record(path, outcome);
                let _ = pbar.update(1);
            },
        }
    }

    for handle in handles {
        if handle.join().is_err() {
            error!("A worker thread panicked");
        }
    }
    eprintln!();

    report.interrupted = stop.load(Ordering::SeqCst);
    report
}
