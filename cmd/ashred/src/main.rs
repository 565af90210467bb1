//! ashred — overwrite a file or block device with random data.
//!
//! Usage:
//!   ashred [--buffer-size SIZE] [--buffer-count N] [--backend auto|uring|workers] <path>
//!
//! Defaults come from `ShredConfig::from_env()` (ASHRED_BUFFER_SIZE,
//! ASHRED_BUFFER_COUNT, ASHRED_BACKEND, ASHRED_WORKERS, ASHRED_SOURCE);
//! flags override them. Log level from ASHRED_LOG_LEVEL (default warn).
//!
//! Exit status is 0 on success, otherwise the errno of the failure.

use ashred_core::config::{BackendKind, ByteSize, ShredConfig};
use ashred_core::env::env_get_opt;
use ashred_executor::shred_path;

use nix::errno::Errno;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

const USAGE: &str = "usage: ashred [--buffer-size SIZE] [--buffer-count N] [--backend auto|uring|workers] <path>";

#[derive(Debug)]
struct CliArgs {
    path: PathBuf,
    config: ShredConfig,
}

#[derive(Debug, PartialEq, Eq)]
enum CliError {
    /// No target, or more than one.
    MissingPath,
    Help,
    Bad(String),
}

fn parse_args<I>(args: I, mut config: ShredConfig) -> Result<CliArgs, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut paths = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };

        match flag.as_str() {
            "-h" | "--help" => return Err(CliError::Help),
            "--buffer-size" => {
                let v = flag_value(&flag, inline, &mut args)?;
                let size: ByteSize = v
                    .parse()
                    .map_err(|e| CliError::Bad(format!("--buffer-size {}: {}", v, e)))?;
                config = config.buffer_size(size);
            }
            "--buffer-count" => {
                let v = flag_value(&flag, inline, &mut args)?;
                let n = v
                    .parse()
                    .map_err(|_| CliError::Bad(format!("--buffer-count {}: not a number", v)))?;
                config = config.buffer_count(n);
            }
            "--backend" => {
                let v = flag_value(&flag, inline, &mut args)?;
                let kind: BackendKind = v
                    .parse()
                    .map_err(|e| CliError::Bad(format!("--backend {}: {}", v, e)))?;
                config = config.backend(kind);
            }
            "--" => {
                paths.extend(args.by_ref());
                break;
            }
            f if f.starts_with("--") && f.len() > 2 => {
                return Err(CliError::Bad(format!("unknown option {}", f)));
            }
            _ => paths.push(arg),
        }
    }

    if paths.len() != 1 {
        return Err(CliError::MissingPath);
    }
    let path = PathBuf::from(paths.remove(0));
    Ok(CliArgs { path, config })
}

/// Value of `--flag=value` or `--flag value`.
fn flag_value<I>(flag: &str, inline: Option<String>, rest: &mut I) -> Result<String, CliError>
where
    I: Iterator<Item = String>,
{
    inline
        .or_else(|| rest.next())
        .ok_or_else(|| CliError::Bad(format!("{} requires a value", flag)))
}

fn init_logging() {
    let level = env_get_opt::<LevelFilter>("ASHRED_LOG_LEVEL").unwrap_or(LevelFilter::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = match parse_args(std::env::args().skip(1), ShredConfig::from_env()) {
        Ok(cli) => cli,
        Err(CliError::Help) => {
            println!("{}", USAGE);
            return;
        }
        Err(CliError::MissingPath) => {
            eprintln!("Please specify a file/device to shred");
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
        Err(CliError::Bad(msg)) => {
            eprintln!("ashred: {}", msg);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    init_logging();

    match shred_path(&cli.path, &cli.config) {
        Ok(report) => {
            println!(
                "{} bytes in {:.3} seconds = {:.0} bytes/s",
                report.bytes,
                report.elapsed.as_secs_f64(),
                report.throughput()
            );
        }
        Err(e) => {
            let errno = e.errno();
            tracing::debug!(error = %e, "shred failed");
            println!(
                "{} failed with error {}: {}. Exiting.",
                cli.path.display(),
                errno,
                Errno::from_raw(errno).desc()
            );
            std::process::exit(errno);
        }
    }
}
