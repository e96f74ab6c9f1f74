mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use vf_core::config::GatewayConfig;
use vodforge::{server, service::Service};

async fn serve(host: String, port: u16, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = GatewayConfig::load_or_default(config_path);
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting vodforge gateway");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let service = Service::new(config).await?;
    tracing::info!(accel = %service.hw_accel(), "hardware acceleration resolved");

    server::start_server(service).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vodforge=trace,vf_av=trace,vf_core=debug,vf_media=debug,tower_http=debug".to_string()
        } else {
            "vodforge=debug,vf_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { config } => {
            let path = config.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vodforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(
    file: &std::path::Path,
    config_path: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = GatewayConfig::load_or_default(config_path);
    let rt = tokio::runtime::Runtime::new()?;
    let info = rt.block_on(async {
        let service = Service::new(config).await?;
        service.probe(file).await.map_err(anyhow::Error::from)
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", file.display());
        println!("Container: {}", info.format);
        println!("Duration: {:.3}s", info.duration);
        println!(
            "Video: {} {}x{} @ {:.3} fps",
            info.video_codec, info.width, info.height, info.frame_rate
        );
        if info.video_bitrate > 0 {
            println!("Video bitrate: {} b/s", info.video_bitrate);
        }
        println!("Audio: {}", info.audio_codec);
        for track in &info.audio_tracks {
            println!("  [{}] {}", track.index, track.codec);
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_path);
    let rt = tokio::runtime::Runtime::new()?;
    let service = rt.block_on(Service::new(config))?;

    println!("Checking external tools...\n");
    for tool in service.check_tools() {
        let status = if tool.available { "ok" } else { "missing" };
        print!("[{status}] {}", tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }
    println!("\nHardware acceleration: {}", service.hw_accel());

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let mut config = GatewayConfig::from_json(&std::fs::read_to_string(p)?)?;
            config.apply_defaults();
            config.validate()?;
            println!("Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Format: {}", config.streaming.format);
            println!(
                "  Chunks: {}s x [{}, {}]",
                config.streaming.chunk_duration,
                config.streaming.min_buffer,
                config.streaming.max_buffer
            );
            println!("  Specs: {}", config.specs.len());
        }
        None => {
            println!("No config file specified, using defaults");
            let config = GatewayConfig::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
