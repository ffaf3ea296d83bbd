use anyhow::Result;
use clap::Parser;
use cyanglasses::link::DiscoveredDevice;
use cyanglasses::settings::UploadSettings;
use cyanglasses::error::EventBusError;
use cyanglasses::{
    EventFilter, FileSettingsStore, GlassesConfig, GlassesSession, HttpPhotoUploader, KeyboardConsole,
    MediaCounts, SettingsStore, SimulatedTransport,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "cyanglasses")]
#[command(about = "Companion for networked smart glasses with photo auto-upload")]
#[command(version)]
#[command(long_about = "Connects to a pair of smart glasses, tracks link readiness, \
sends device commands from the keyboard console and uploads each new photo to a \
configured HTTP endpoint. Runs against an in-process simulated device.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cyanglasses.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without connecting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<String>,

    /// Print every bus event as a JSON line on stdout
    #[arg(long)]
    events_json: bool,

    /// Run without the keyboard console
    #[arg(long)]
    no_console: bool,

    /// Store a new upload endpoint and exit
    #[arg(long, value_name = "URL")]
    set_endpoint: Option<String>,

    /// Store an upload API key and exit (empty value clears it)
    #[arg(long, value_name = "KEY")]
    set_api_key: Option<String>,

    /// Post a test image to the stored endpoint and exit
    #[arg(long)]
    test_endpoint: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting cyanglasses v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match GlassesConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

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

    let store: Arc<dyn SettingsStore> =
        Arc::new(FileSettingsStore::open(&config.upload.settings_path)?);

    if args.set_endpoint.is_some() || args.set_api_key.is_some() {
        update_settings(&args, UploadSettings::new(Arc::clone(&store)))?;
        return Ok(());
    }

    let (transport, transport_events) = SimulatedTransport::new();
    let transport = Arc::new(transport);
    prepare_simulated_device(&transport, &config);

    let uploader = Arc::new(HttpPhotoUploader::new(&config.upload)?);
    let session = Arc::new(
        GlassesSession::new(config, transport, transport_events, store, uploader).map_err(
            |e| {
                error!("Failed to create session: {}", e);
                e
            },
        )?,
    );

    if args.test_endpoint {
        let settings = session.settings();
        let endpoint = settings.api_endpoint();
        return match session
            .uploads()
            .test_connection(&endpoint, settings.api_key().as_deref())
            .await
        {
            Ok(body) => {
                println!("✓ Endpoint {} accepted the test image", endpoint);
                println!("{}", body);
                Ok(())
            }
            Err(e) => {
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        };
    }

    if args.events_json {
        spawn_event_printer(&session);
    }

    let console = if args.no_console {
        None
    } else {
        let console = KeyboardConsole::new(Arc::clone(&session));
        console.start().await?;
        Some(console)
    };

    let exit_code = session.run().await.map_err(|e| {
        error!("Session error: {}", e);
        e
    })?;

    if let Some(console) = console {
        console.stop().await?;
    }

    info!("cyanglasses exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn update_settings(args: &Args, settings: UploadSettings) -> Result<()> {
    if let Some(endpoint) = &args.set_endpoint {
        settings.set_api_endpoint(endpoint)?;
        println!("✓ Upload endpoint set to {}", settings.api_endpoint());
    }
    if let Some(key) = &args.set_api_key {
        settings.set_api_key(Some(key.as_str()))?;
        if settings.api_key().is_some() {
            println!("✓ API key stored");
        } else {
            println!("✓ API key cleared");
        }
    }
    Ok(())
}

fn prepare_simulated_device(transport: &SimulatedTransport, config: &GlassesConfig) {
    transport.set_nearby(vec![DiscoveredDevice {
        name: "CyanGlasses-SIM".to_string(),
        address: "5A:17:00:00:00:01".to_string(),
        rssi: -48,
    }]);
    transport.set_auto_handshake(true);
    transport.set_media_counts(MediaCounts {
        photos: 3,
        videos: 1,
        audio: 0,
    });

    match config.upload.photo_dirs().into_iter().next() {
        Some(dir) => transport.set_photo_dir(Some(dir)),
        None => warn!("No photo directory configured; simulated photos are not written"),
    }
}

fn spawn_event_printer(session: &GlassesSession) {
    let mut events = session
        .event_bus()
        .subscribe_filtered(EventFilter::All, "events-json");
    let token = session.cancellation_token();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to encode event: {}", e),
                    },
                    Err(EventBusError::Lagged { .. }) => {}
                    Err(_) => break,
                },
                _ = token.cancelled() => break,
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("cyanglasses={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cyanglasses.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# cyanglasses configuration file");
    println!("# Every key is optional; CYANGLASSES_<SECTION>__<KEY> environment variables override it");
    println!();
    println!("{}", GlassesConfig::default().to_toml()?);
    Ok(())
}
