use anyhow::{Context, Result};
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand, ValueEnum};
use pointscan::scanner::{MockCameraProvider, ScriptStep, ScriptedDecoder};
use pointscan::{
    ApiClient, AttributionDesk, AttributionError, CameraProvider, Facing, FrameDecoder, Kiosk,
    KioskOptions, PointscanConfig, RosterQuery, RosterStats, SortKey,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "pointscan")]
#[command(about = "Badge scanner and point attribution kiosk for student attendance")]
#[command(version)]
#[command(long_about = "Scans student badge QR codes with a camera and attributes \
attendance points through the school's REST backend. Also lists students and the \
catalogue of bonus/malus reasons.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pointscan.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FacingArg {
    Back,
    Front,
}

impl From<FacingArg> for Facing {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::Back => Facing::Back,
            FacingArg::Front => Facing::Front,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan badges and attribute a reason's points to each student
    Scan(ScanArgs),
    /// List students with their points and standing
    Students(StudentsArgs),
    /// List the bonus/malus reasons
    Reasons {
        #[arg(long)]
        json: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct ScanArgs {
    /// Reason id to attribute (see `pointscan reasons`)
    #[arg(short, long)]
    reason: Option<i64>,

    /// Camera to start with; defaults to the configured facing
    #[arg(long, value_enum)]
    facing: Option<FacingArg>,

    /// Decode this image file instead of a camera
    #[arg(long, value_name = "PATH", conflicts_with = "simulate")]
    image: Option<PathBuf>,

    /// Pretend the camera saw a badge carrying PAYLOAD
    #[arg(long, value_name = "PAYLOAD")]
    simulate: Option<String>,

    /// Keep scanning after each badge
    #[arg(long)]
    continuous: bool,

    /// Stop after this many scans
    #[arg(long, value_name = "N")]
    count: Option<usize>,

    /// Do not read single-key commands from the terminal
    #[arg(long)]
    no_keyboard: bool,
}

#[derive(ClapArgs, Debug)]
struct StudentsArgs {
    /// Match on last name or id
    #[arg(short, long)]
    search: Option<String>,

    /// Only this level, e.g. L1
    #[arg(long)]
    niveau: Option<String>,

    /// Only this status, e.g. active
    #[arg(long)]
    status: Option<String>,

    /// nom, points, niveau or last_activity
    #[arg(long, default_value = "nom")]
    sort: SortKey,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting pointscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = PointscanConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().context("Invalid configuration")?;

    match args.command {
        Some(Command::Scan(scan)) => run_scan(config, scan).await,
        Some(Command::Students(students)) => list_students(&config, students).await,
        Some(Command::Reasons { json }) => list_reasons(&config, json).await,
        None => {
            Args::command().print_help()?;
            Ok(())
        }
    }
}

async fn run_scan(mut config: PointscanConfig, scan: ScanArgs) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let mut desk = AttributionDesk::new(client, &config.attribution)?;
    desk.load()
        .await
        .context("Failed to load students and reasons")?;

    if scan.reason.is_none() {
        eprintln!("Choose a reason with --reason:");
        for reason in desk.reasons() {
            eprintln!("  {:>4}  {} ({})", reason.id, reason.label, reason.points_label());
        }
        return Err(AttributionError::NoReasonSelected.into());
    }

    if scan.image.is_some() {
        // A still image has whatever size it has
        config.camera.min_resolution = (1, 1);
    }
    let (provider, decoder) = select_provider(&config, &scan)?;

    let options = KioskOptions {
        reason: scan.reason,
        facing: scan.facing.map(Facing::from).unwrap_or(config.scanner.facing),
        continuous: scan.continuous,
        max_scans: scan.count,
        keyboard: !scan.no_keyboard && std::io::stdin().is_terminal(),
        announce: true,
    };

    let mut builder = Kiosk::builder()
        .config(config)
        .desk(desk)
        .provider(provider)
        .options(options);
    if let Some(decoder) = decoder {
        builder = builder.decoder(decoder);
    }

    let mut kiosk = builder.build()?;
    let summary = kiosk.run().await.map_err(|e| {
        error!("Scan failed: {}", e);
        e
    })?;

    println!(
        "{} attribution(s), {} rejected scan(s)",
        summary.attributions.len(),
        summary.rejected.len()
    );
    Ok(())
}

type ProviderChoice = (Arc<dyn CameraProvider>, Option<Box<dyn FrameDecoder>>);

fn select_provider(config: &PointscanConfig, scan: &ScanArgs) -> Result<ProviderChoice> {
    if let Some(payload) = &scan.simulate {
        info!("Simulating badge scans of '{}'", payload);
        let decoder = ScriptedDecoder::never().with_fallback(ScriptStep::Found(payload.clone()));
        let provider =
            MockCameraProvider::new().with_resolutions(vec![config.camera.ideal_resolution]);
        return Ok((Arc::new(provider), Some(Box::new(decoder))));
    }

    if let Some(path) = &scan.image {
        return image_provider(path);
    }

    camera_provider(config)
}

#[cfg(feature = "still-image")]
fn image_provider(path: &Path) -> Result<ProviderChoice> {
    Ok((
        Arc::new(pointscan::scanner::StillImageProvider::new(path)),
        None,
    ))
}

#[cfg(not(feature = "still-image"))]
fn image_provider(path: &Path) -> Result<ProviderChoice> {
    anyhow::bail!(
        "cannot read {}: built without the still-image feature",
        path.display()
    )
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn camera_provider(config: &PointscanConfig) -> Result<ProviderChoice> {
    Ok((
        Arc::new(pointscan::scanner::GstCameraProvider::new(
            config.camera.clone(),
        )),
        None,
    ))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn camera_provider(_config: &PointscanConfig) -> Result<ProviderChoice> {
    anyhow::bail!("built without camera support; use --image or --simulate")
}

async fn list_students(config: &PointscanConfig, args: StudentsArgs) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let students = client
        .students()
        .await
        .context("Failed to load students")?;

    let query = RosterQuery {
        search: args.search,
        niveau: args.niveau,
        status: args.status,
        sort: args.sort,
    };
    let selected = query.apply(&students);
    let stats = RosterStats::from_students(&selected);

    if args.json {
        let body = serde_json::json!({ "students": selected, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    print!("{}", pointscan::roster::render_table(&selected));
    println!();
    println!(
        "Total: {}  Excellent: {}  Attention: {}  Critique: {}",
        stats.total, stats.excellent, stats.attention, stats.critical
    );
    Ok(())
}

async fn list_reasons(config: &PointscanConfig, json: bool) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let reasons = client.reasons().await.context("Failed to load reasons")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reasons)?);
        return Ok(());
    }

    for reason in &reasons {
        println!(
            "{:>4}  {:<30} {:<6} {}",
            reason.id,
            reason.label,
            if reason.is_bonus() { "bonus" } else { "malus" },
            reason.points_label()
        );
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pointscan={}", log_level)));

    // Raw terminal mode garbles stderr output, so a log file gets its own writer
    let (writer, guard, ansi) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .context("--log-file must name a file")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let fmt_layer = match args.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Pointscan Configuration File");
    println!("# Defaults shown; every key is optional.");
    println!("# Environment overrides: POINTSCAN_<SECTION>__<KEY>, e.g. POINTSCAN_API__BASE_URL");
    println!();
    print!("{}", PointscanConfig::default().to_toml()?);
    Ok(())
}
