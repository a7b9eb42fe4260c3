use std::sync::Arc;

use vocab_assist::api::{build_router, AppState};
use vocab_assist::collaborators::{AnkiConnectClient, AnthropicModel, GoogleTts, HttpFetcher};
use vocab_assist::config::Settings;
use vocab_assist::jobs::JobDeps;
use vocab_assist::store::{LexiconDb, ThemeRegistry, VocabStore};
use vocab_assist::tasks::{spawn_sweep_task, TaskOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;

    let api_key = settings
        .require_api_key()
        .map(|k| k.clone())
        .unwrap_or_else(|_| {
            eprintln!("Error: ANTHROPIC_API_KEY not set");
            eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
            std::process::exit(1);
        });

    eprintln!("📚 vocab-assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", settings.model);
    eprintln!("   API: http://0.0.0.0:{}", settings.port);
    eprintln!("   Database: {}", settings.db_path.display());
    eprintln!("   Audio: {}", settings.audio_dir.display());
    eprintln!(
        "   Languages: {} -> {}",
        settings.source_lang, settings.target_lang
    );
    eprintln!("   Workers: {}\n", settings.max_workers);

    let db = Arc::new(LexiconDb::open(&settings.db_path).await.unwrap_or_else(|e| {
        eprintln!(
            "Error: Failed to open database at {}: {}",
            settings.db_path.display(),
            e
        );
        std::process::exit(1);
    }));

    let vocab = Arc::new(VocabStore::new(Arc::clone(&db)));
    let themes = Arc::new(ThemeRegistry::new(Arc::clone(&db)));

    let deps = JobDeps {
        fetcher: Arc::new(HttpFetcher::new(settings.article_cookie.clone())?),
        model: Arc::new(AnthropicModel::new(api_key, settings.model.clone())),
        synthesizer: Arc::new(GoogleTts::new(
            settings.audio_dir.clone(),
            settings.source_lang.clone(),
        )),
        deck: Arc::new(AnkiConnectClient::new(
            settings.anki_url.clone(),
            settings.audio_dir.clone(),
        )),
        vocab,
        themes,
        source_lang: settings.source_lang.clone(),
        target_lang: settings.target_lang.clone(),
    };

    let orchestrator = Arc::new(TaskOrchestrator::new(settings.max_workers));
    spawn_sweep_task(Arc::clone(&orchestrator), settings.task_max_age);

    let state = AppState {
        deps,
        orchestrator: Arc::clone(&orchestrator),
        audio_dir: settings.audio_dir.clone(),
    };
    let app = build_router(state, &settings.cors_origins);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;
    tracing::info!(port = settings.port, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
