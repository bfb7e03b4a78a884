use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gorec::{
    create_router, AppState, Config, FrameMuxerFactory, MemoryStore, OverlayPosition, OverlaySize,
    Recorder, RecorderEvent, SyntheticDevices, Uploader,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gorec", version, about = "Screen recorder with webcam overlay")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/gorec")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API
    Serve,

    /// Record for a fixed time and save the result to the downloads directory
    Record {
        /// Recording length
        #[arg(long, default_value_t = 5)]
        seconds: u64,

        /// Composite the webcam over the screen
        #[arg(long)]
        webcam: bool,

        /// Record the first microphone
        #[arg(long)]
        mic: bool,

        /// Record system audio from the screen capture
        #[arg(long)]
        system_audio: bool,

        #[arg(long, value_enum, default_value_t = OverlayPosition::BottomRight)]
        position: OverlayPosition,

        #[arg(long, value_enum, default_value_t = OverlaySize::Medium)]
        size: OverlaySize,

        /// Upload the recording afterwards and print its share link
        #[arg(long)]
        upload: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("GoRec v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let recorder = Recorder::new(
        Arc::new(SyntheticDevices::default()),
        Arc::new(FrameMuxerFactory::new()),
        cfg.recorder.clone(),
    );
    let uploader = uploader(&cfg);

    match cli.command {
        Command::Serve => serve(&cfg, recorder, uploader).await,
        Command::Record {
            seconds,
            webcam,
            mic,
            system_audio,
            position,
            size,
            upload,
        } => {
            recorder.set_position(position).await;
            recorder.set_size(size).await;
            if system_audio {
                recorder.toggle_system_audio().await?;
            }
            if mic && !recorder.toggle_microphone().await? {
                warn!("Recording without microphone");
            }
            if webcam && !recorder.toggle_webcam().await? {
                warn!("Recording without webcam");
            }
            let uploader = upload.then_some(uploader);
            record(&cfg, recorder, Duration::from_secs(seconds), uploader).await
        }
    }
}

/// Uploader over the in-process store, signed in as the configured user
fn uploader(cfg: &Config) -> Arc<Uploader> {
    let store = Arc::new(MemoryStore::new(cfg.upload.storage_url.clone()));
    match &cfg.upload.user_id {
        Some(user_id) => store.sign_in(user_id.clone()),
        None => info!("No upload account configured, uploads will be refused"),
    }
    Arc::new(Uploader::new(store, &cfg.upload))
}

async fn serve(cfg: &Config, recorder: Recorder, uploader: Arc<Uploader>) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::new(
        recorder.clone(),
        cfg.output.downloads_path.clone(),
        uploader,
    ));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    recorder.shutdown().await;
    Ok(())
}

async fn record(
    cfg: &Config,
    recorder: Recorder,
    length: Duration,
    uploader: Option<Arc<Uploader>>,
) -> Result<()> {
    let mut events = recorder.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecorderEvent::Notice(notice) | RecorderEvent::Failed(notice) => {
                    warn!("{}", notice.message)
                }
                RecorderEvent::StateChanged { state } => info!("State: {}", state),
                RecorderEvent::ArtifactReady { bytes, mime_type } => {
                    info!("Recording ready: {} bytes of {}", bytes, mime_type)
                }
            }
        }
    });

    recorder.start().await.context("Failed to start recording")?;

    tokio::select! {
        _ = tokio::time::sleep(length) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping early"),
    }

    recorder.stop().await.context("Failed to stop recording")?;
    info!("Recorded {}", recorder.formatted_time().await);

    let path = recorder
        .save_artifact(&cfg.output.downloads_path)
        .await
        .context("Failed to save recording")?;
    println!("{}", path.display());

    if let Some(uploader) = uploader {
        let receipt = recorder
            .upload(&uploader)
            .await
            .context("Failed to upload recording")?;
        info!("Uploaded to {}", receipt.public_url);
        println!("{}", receipt.share_url);
    }

    recorder.shutdown().await;
    Ok(())
}
