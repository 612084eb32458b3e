use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{LevelFilter, debug, error, info};
use pyblob::{
    BlobError, BuildOrchestrator, BuildRequest, Encoder, EncodingOptions, SourceUnit, StoreMethod,
    config::Config,
    inspect::inspect,
    output::write_output,
    sources::SearchPathSources,
    transform::{TransformKind, create_transform},
};

/// Embed Python modules as self-decoding blobs and build single-file distributions
#[derive(Parser, Debug)]
#[command(name = "pyblob", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file merged over pyblob.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode one source file as a decoder stub
    Encode(EncodeArgs),
    /// Replace dependency imports in a host module with decoder stubs
    Build(BuildArgs),
    /// List the modules embedded in a file
    Inspect(InspectArgs),
}

/// Options shared by `encode` and `build`
#[derive(Args, Debug)]
struct EncodingArgs {
    /// Compress the source with zlib before base64 encoding
    #[arg(short, long)]
    compress: bool,

    /// Minify the source before encoding
    #[arg(short, long)]
    minify: bool,

    /// Ask the minifier to obfuscate as well. pyminifier's obfuscation is not
    /// reliable for every source (e.g. some identifier collisions).
    #[arg(short = 'O', long)]
    minify_obfuscate: bool,

    /// Maximum width of the payload lines [default: 79]
    #[arg(short = 'w', long, value_name = "WIDTH")]
    line_width: Option<usize>,

    /// Embed uncompressed source as an escaped string literal instead of base64
    #[arg(long)]
    literal: bool,

    /// Source transform used by --minify: identity, external or in-process
    #[arg(long, value_name = "KIND")]
    transform: Option<TransformKind>,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Python source file to encode
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output file [default: stdout]
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    encoding: EncodingArgs,

    /// How the decoded module is exposed to the executing scope: default or direct
    #[arg(short, long, value_name = "METHOD", conflicts_with = "export_symbol")]
    store_method: Option<StoreMethod>,

    /// Register the module and bind its attribute NAME in the executing scope
    #[arg(short, long, value_name = "NAME")]
    export_symbol: Option<String>,

    /// Module name [default: the file stem]
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Host module whose imports are replaced
    #[arg(value_name = "HOST")]
    host: PathBuf,

    /// Dependency to inline, in substitution order
    #[arg(short, long = "dep", value_name = "MODULE", required = true)]
    dependencies: Vec<String>,

    /// Directory searched for dependency sources, before configured ones
    #[arg(short = 'I', long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// Output file [default: stdout]
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    encoding: EncodingArgs,

    /// Also wrap the assembled distribution into one blob
    #[arg(short, long = "fullblob")]
    full_blob: bool,

    /// How dependency stubs expose their module: default or direct [default: direct]
    #[arg(short, long, value_name = "METHOD")]
    store_method: Option<StoreMethod>,

    /// Host module name [default: the file stem]
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// File containing decoder stubs
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let is_usage_error = err
                .downcast_ref::<BlobError>()
                .is_some_and(BlobError::is_usage_error);
            ExitCode::from(if is_usage_error { 2 } else { 1 })
        }
    }
}

/// Log level from the flags; `RUST_LOG` still takes precedence
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    debug!("Configuration: {config:?}");

    match cli.command {
        Command::Encode(args) => encode(&config, args),
        Command::Build(args) => build(&config, args),
        Command::Inspect(args) => inspect_file(&args.file),
    }
}

/// Config values overridden by the shared command-line flags
fn encoding_options(config: &Config, args: &EncodingArgs) -> EncodingOptions {
    let mut options = config.encoding_options();
    options.compress |= args.compress;
    options.minify |= args.minify;
    options.obfuscate |= args.minify_obfuscate;
    options.emit_as_literal |= args.literal;
    if let Some(line_width) = args.line_width {
        options.line_width = line_width;
    }
    options
}

fn transform_kind(config: &Config, args: &EncodingArgs) -> TransformKind {
    args.transform.unwrap_or(config.transform)
}

fn encode(config: &Config, args: EncodeArgs) -> Result<()> {
    let mut options = encoding_options(config, &args.encoding);
    if args.store_method.is_some() {
        options.store_method = args.store_method;
    }
    if args.export_symbol.is_some() {
        options.export_symbol = args.export_symbol;
        // An export symbol overrides a configured store method
        if options.store_method == Some(StoreMethod::Direct) && args.store_method.is_none() {
            options.store_method = None;
        }
    }

    let unit = SourceUnit::from_path(&args.file, args.name.as_deref())?;
    options.validate(&unit.name)?;

    let transform = create_transform(transform_kind(config, &args.encoding), &config.minifier);
    let stub = Encoder::new(transform.as_ref())
        .encode(&unit.name, &unit.text, &options)
        .with_context(|| format!("failed to encode {}", args.file.display()))?;

    info!("Encoded '{}' from {}", unit.name, unit.origin);
    write_output(args.output.as_deref(), &format!("{stub}\n"))?;
    Ok(())
}

fn build(config: &Config, args: BuildArgs) -> Result<()> {
    let mut options = encoding_options(config, &args.encoding);
    options.store_method = args
        .store_method
        .or(config.store_method)
        .or(Some(StoreMethod::Direct));

    let host = SourceUnit::from_path(&args.host, args.name.as_deref())?;

    let mut sources = SearchPathSources::new(args.search_paths);
    for dir in &config.search_paths {
        sources.add_search_dir(dir);
    }
    if let Some(host_dir) = args.host.parent() {
        let host_dir = if host_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            host_dir
        };
        sources.add_search_dir(host_dir);
    }

    let transform = create_transform(transform_kind(config, &args.encoding), &config.minifier);
    let orchestrator = BuildOrchestrator::new(Encoder::new(transform.as_ref()), &sources)
        .with_python_version(config.python_version);
    let distribution = orchestrator
        .build(
            &host,
            &BuildRequest {
                dependencies: &args.dependencies,
                options: &options,
                full_blob: args.full_blob,
            },
        )
        .with_context(|| format!("failed to build {}", args.host.display()))?;

    info!(
        "Built '{}' ({} bytes) with {}",
        distribution.name,
        distribution.text.len(),
        args.dependencies.join(", ")
    );
    write_output(args.output.as_deref(), &distribution.text)?;
    Ok(())
}

fn inspect_file(path: &Path) -> Result<()> {
    let unit = SourceUnit::from_path(path, None)?;
    let reports = inspect(&unit.text)
        .with_context(|| format!("failed to inspect {}", path.display()))?;

    let mut listing = String::new();
    for report in &reports {
        let _ = writeln!(listing, "{report}");
    }
    if reports.is_empty() {
        info!("No decoder stubs found in {}", path.display());
    }
    write_output(None, &listing)?;
    Ok(())
}
