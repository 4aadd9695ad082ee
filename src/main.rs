use std::{io::Read, path::PathBuf, process::ExitCode};

use clap::{ArgAction, Parser, Subcommand};
use lnk_deobf::{
    BatchSession, Collector, Config, DeobfError, DeobfuscationResult, InfSession, LnkParseTool,
    UndefinedPolicy, read_text,
};

type DynError = Box<dyn std::error::Error>;
type DynResult<T> = core::result::Result<T, DynError>;

/// Recovers the commands hidden in shortcut payloads by resolving cmd.exe
/// variables and INF strings.
#[derive(Parser, Debug)]
#[command(name = "lnk-deobf", version, about)]
struct Cli {
    /// INI settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More output per occurrence (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Do not wrap long lines
    #[arg(long, global = true)]
    raw: bool,

    /// Keep assignment statements in the output
    #[arg(long, global = true)]
    keep_vars: bool,

    /// Seed typical Windows variables and INF directory ids
    #[arg(long, global = true)]
    well_known: bool,

    /// Leave references to undefined variables as they are
    #[arg(long, global = true)]
    keep_undefined: bool,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Deobfuscate a cmd.exe command line given as TEXT, read from FILE or
    /// from stdin
    Batch {
        text: Option<String>,

        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// Deobfuscate an INF file
    Inf { file: PathBuf },
    /// Extract and deobfuscate the command line of every shortcut in DIR
    Collect {
        dir: PathBuf,

        #[arg(short, long, default_value = "payloads")]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logger(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(1)
        }
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(cli: &Cli) -> DynResult<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.raw {
        config = config.with_raw(true);
    }
    if cli.keep_vars {
        config = config.with_keep_assignments(true);
    }
    if cli.well_known {
        config = config.with_well_known(true);
    }
    if cli.keep_undefined {
        config = config.with_undefined(UndefinedPolicy::Keep);
    }
    log::debug!("{:?}", config);
    Ok(config)
}

fn run(cli: Cli) -> DynResult<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Mode::Batch { text, file } => {
            let input = match (text, file) {
                (Some(text), _) => text,
                (None, Some(file)) => read_text(file)?,
                (None, None) => {
                    let mut input = String::new();
                    std::io::stdin().read_to_string(&mut input)?;
                    input
                }
            };
            let result = BatchSession::new()
                .with_config(config)
                .deobfuscate(input.trim_end_matches(['\r', '\n']));
            print_result(&result);
        }
        Mode::Inf { file } => {
            let input = read_text(&file)?;
            let result = InfSession::new().with_config(config).deobfuscate(&input);
            print_result(&result);
        }
        Mode::Collect { dir, output } => {
            let tool = LnkParseTool::from_config(&config);
            tool.ensure_available()?;
            let collector =
                Collector::new(tool, output).with_session(BatchSession::new().with_config(config));
            let report = collector.collect(&dir)?;
            log::info!(
                "{} samples deobfuscated, {} skipped",
                report.written.len(),
                report.skipped.len()
            );
        }
    }
    Ok(())
}

fn print_result(result: &DeobfuscationResult) {
    for err in result.errors() {
        match err {
            DeobfError::UnresolvedReference(_) => log::debug!("{err}"),
            _ => log::warn!("{err}"),
        }
    }
    println!("{}", result);
}
