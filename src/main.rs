use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use station_voice::audio::AudioSource;
use station_voice::channel::{DuplexChannel, NatsChannel};
use station_voice::{
    create_router, AppState, AudioCaptureSession, Config, HostPlatform, VoiceInputCallbacks,
    VoiceInputOrchestrator, VoiceInputState,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "station-voice", version, about = "Speak a trip, get the stations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (without extension)
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value = station_voice::config::DEFAULT_CONFIG_PATH
    )]
    config: String,

    /// Replay this audio file instead of using the microphone
    #[arg(long, global = true, value_name = "FILE")]
    audio_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP bridge for a UI (default)
    Serve,

    /// Run one voice input cycle from the terminal
    Listen {
        /// Stop recording after this many seconds (the duration cap still applies)
        #[arg(long, short = 's', value_name = "SECONDS", default_value = "4")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let source = match cli.audio_file {
        Some(path) => AudioSource::File(path),
        None => cfg.audio_source()?,
    };
    match &source {
        AudioSource::Microphone => info!("Audio source: microphone"),
        AudioSource::File(path) => info!("Audio source: {}", path.display()),
    }

    let user_id = cfg.user_id();
    let channel = Arc::new(NatsChannel::new(cfg.channel.nats_url.clone(), cfg.subjects()));
    if let Err(e) = channel.connect(&user_id).await {
        // Voice input reports the connectivity error per cycle
        warn!("{}", e);
    }

    let capture = Arc::new(AudioCaptureSession::new(
        cfg.capture.clone(),
        Arc::new(HostPlatform::new(source)),
    ));

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&cfg, Arc::clone(&capture), Arc::clone(&channel)).await,
        Commands::Listen { seconds } => {
            listen(&cfg, Arc::clone(&capture), Arc::clone(&channel), seconds).await
        }
    };

    channel.close().await;
    result
}

async fn serve(
    cfg: &Config,
    capture: Arc<AudioCaptureSession>,
    channel: Arc<NatsChannel>,
) -> Result<()> {
    let last_routes = Arc::new(RwLock::new(None));

    let callbacks = VoiceInputCallbacks {
        on_stations_recognized: Some(Arc::new(|origin: &str, destination: &str| {
            info!("Recognized trip: {} -> {}", origin, destination);
        })),
        on_route_calculated: Some({
            let last_routes = Arc::clone(&last_routes);
            Arc::new(move |routes: &[station_voice::Route]| {
                info!("Received {} routes", routes.len());
                AppState::record_routes(&last_routes, routes);
            })
        }),
    };

    let orchestrator = Arc::new(VoiceInputOrchestrator::new(
        capture,
        channel,
        cfg.timings(),
        callbacks,
    ));

    if !orchestrator.check_support() {
        warn!("Voice input is not supported with the configured audio source");
    }

    let app = create_router(AppState::new(orchestrator, last_routes));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP bridge listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn listen(
    cfg: &Config,
    capture: Arc<AudioCaptureSession>,
    channel: Arc<NatsChannel>,
    seconds: u64,
) -> Result<()> {
    let callbacks = VoiceInputCallbacks {
        on_stations_recognized: None,
        on_route_calculated: Some(Arc::new(|routes: &[station_voice::Route]| {
            for route in routes {
                println!("route: {}", route);
            }
        })),
    };
    let orchestrator = VoiceInputOrchestrator::new(capture, channel, cfg.timings(), callbacks);
    let mut states = orchestrator.subscribe();

    let snapshot = orchestrator.start_recording().await;
    if snapshot.state == VoiceInputState::Requesting {
        info!("Speak now ({} s)", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        orchestrator.stop_recording().await;
    }

    let backend_wait = Duration::from_secs(30);
    let outcome = tokio::time::timeout(backend_wait, async {
        loop {
            let snapshot = states.borrow_and_update().clone();
            if snapshot.state.is_terminal() {
                return Some(snapshot);
            }
            if states.changed().await.is_err() {
                return None;
            }
        }
    })
    .await;

    match outcome {
        Ok(Some(snapshot)) => match snapshot.state {
            VoiceInputState::Success => {
                if let Some(text) = &snapshot.transcribed_text {
                    println!("heard: {}", text);
                }
                if let Some(stations) = &snapshot.recognized_stations {
                    println!("{} -> {}", stations.origin, stations.destination);
                }
                Ok(())
            }
            _ => anyhow::bail!(
                "{}",
                snapshot.error_message.unwrap_or_else(|| "voice input failed".to_string())
            ),
        },
        Ok(None) => anyhow::bail!("voice input stopped unexpectedly"),
        Err(_) => {
            orchestrator.cancel_recording().await;
            anyhow::bail!("no answer from the recognition backend within {:?}", backend_wait)
        }
    }
}
