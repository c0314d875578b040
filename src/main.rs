use clap::Parser;
use std::io;
use std::path::PathBuf;
use telemetry_bridge::config::{Config, ConfigLoader};
use telemetry_bridge::logging::init_logging;
use telemetry_bridge::transport::available_ports;
use telemetry_bridge::{console, Bridge};
use tracing::info;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-bridge",
    version,
    about = "Bridge a serial distance/motion sensor to a console dashboard or a web client.",
    long_about = "Reads `D:<cm>,M:<0|1>` lines from a serial sensor board (or a built-in simulator), keeps a short history, and forwards servo commands back to the board. Runs an interactive console dashboard by default, or an HTTP/WebSocket server with --serve."
)]
struct Args {
    /// Configuration file (defaults to the standard lookup locations).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start the HTTP/WebSocket server instead of the console dashboard.
    #[arg(short, long)]
    serve: bool,

    /// Serial device, e.g. /dev/ttyACM0 or COM4.
    #[arg(short, long)]
    device: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Read from the simulator instead of the serial device.
    #[arg(long, conflicts_with = "device")]
    simulate: bool,

    /// Port for the HTTP server.
    #[arg(short, long)]
    port: Option<u16>,

    /// List serial devices and exit.
    #[arg(long)]
    list_ports: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Args {
    /// CLI flags win over file and environment values.
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.serial.port = device.clone();
            config.bridge.use_serial = true;
        }
        if let Some(baud) = self.baud {
            config.serial.baud = baud;
        }
        if self.simulate {
            config.bridge.use_serial = false;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    args.apply(&mut loader.config);
    loader.config.validate()?;

    if args.print_config {
        print!("{}", loader.to_toml()?);
        return Ok(());
    }
    if args.list_ports {
        for port in available_ports()? {
            println!("{port}");
        }
        return Ok(());
    }

    init_logging(&loader.config.logging)?;
    if let Some(path) = &loader.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let config = loader.into_config();
    if args.serve {
        serve(config).await
    } else {
        // Unless configured, the dashboard reports a lost device instead of switching sources.
        let bridge = Bridge::new(config.bridge_config_with_fallback(false));
        tokio::task::spawn_blocking(move || console::run(bridge, io::stdin().lock())).await??;
        Ok(())
    }
}

#[cfg(feature = "web")]
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    use telemetry_bridge::rest_api::{build_router, RestContext};
    use tokio::net::TcpListener;
    use tracing::warn;

    // Unless configured, the web deployment keeps clients fed when the device disappears.
    let bridge = Bridge::new(config.bridge_config_with_fallback(true));

    let starter = bridge.clone();
    match tokio::task::spawn_blocking(move || starter.open_or_fallback()).await? {
        Ok(descriptor) => info!("Ingesting from {}", descriptor),
        Err(e) => warn!("Starting without ingestion: {}", e),
    }

    let ctx = RestContext::new(bridge.clone());
    let app = build_router(ctx.clone());

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Telemetry bridge listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            ctx.shutdown();
        })
        .await?;

    tokio::task::spawn_blocking(move || bridge.close()).await?;
    info!("Bridge closed");
    Ok(())
}

#[cfg(not(feature = "web"))]
async fn serve(_config: Config) -> Result<(), Box<dyn std::error::Error>> {
    Err("this build does not include the web server; rebuild with --features web".into())
}

// --- Graceful Shutdown Handler ---
#[cfg(feature = "web")]
async fn shutdown_signal() {
    use tokio::signal;
    use tracing::error;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, starting graceful shutdown...");
}
