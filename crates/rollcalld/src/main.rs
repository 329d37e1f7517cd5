use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod ingest;
mod library;
mod media;
#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::load()?;
    tracing::info!(
        db = %config.db_path.display(),
        media = %config.media_dir.display(),
        models = %config.model_dir.display(),
        thumbnails = config.thumbnails,
        "configuration loaded"
    );

    let store = rollcall_store::Store::open(&config.db_path)
        .await
        .context("opening photo database")?;
    let media = media::MediaDir::create(&config.media_dir)?;

    let models = engine::Models::load(&config).context("loading face models")?;
    let gallery_size = models.gallery_size;
    let policy = engine::AnalyzePolicy {
        min_confidence: engine::MIN_FACE_CONFIDENCE,
        max_match_distance: config.max_match_distance,
    };
    let engine = engine::spawn_engine(models, policy)?;

    let ingestor = ingest::Ingestor::new(
        engine,
        store.clone(),
        media.clone(),
        ingest::IngestOptions {
            thumbnails: config.thumbnails,
            analyze_timeout: config.analyze_timeout(),
        },
    );
    let library = library::Library::new(store, media);
    let service = dbus_interface::RollcallService::new(ingestor, library, gallery_size);

    let _conn = zbus::connection::Builder::session()?
        .name(dbus_interface::BUS_NAME)?
        .serve_at(dbus_interface::OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(bus = dbus_interface::BUS_NAME, "rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
