// Generates a python package from the models and settings in a codegen.toml.
// Relative paths in the config are relative to the directory containing it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use shapegen::{config::CodegenConfig, Generator};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "codegen", version, about = "Generate a python client from a smithy model")]
struct Args {
    /// path to codegen.toml
    #[arg(default_value = "./codegen.toml")]
    config: PathBuf,

    /// write the package here instead of the output_dir in the config
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// don't run the formatter or type checker
    #[arg(long)]
    skip_post_process: bool,

    /// more logging; repeat for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::fs::canonicalize(&args.config)
        .with_context(|| format!("config file {} not found", args.config.display()))?;
    let config = load_config(&config_path)
        .with_context(|| format!("error loading config at {}", config_path.display()))?;

    let result = Generator::default()
        .gen_from_config(&config, args.output_dir.as_deref(), !args.skip_post_process)
        .with_context(|| format!("generating {}", config.python.service))?;
    for path in result.written.iter() {
        println!("{}", path.display());
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<CodegenConfig> {
    let cfile = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", &path.display()))?;
    let folder = path
        .parent()
        .with_context(|| format!("config path {} has no parent", path.display()))?;

    let mut config = cfile.parse::<CodegenConfig>()?;
    config.base_dir = folder.to_path_buf();
    Ok(config)
}
