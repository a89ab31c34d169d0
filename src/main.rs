mod api;
mod fallback;
mod queue;
mod worker;

use clap::{Parser, Subcommand};
use sofia_core::{config, traits::Channel, traits::Provider};
use sofia_knowledge::KnowledgeStore;
use sofia_providers::{cache::ResponseCache, gemini::GeminiProvider, prompt};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "sofia",
    version,
    about = "SofIA — multi-platform retail AI attendant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook receiver and task worker.
    Start,
    /// Check configuration and provider availability.
    Status,
    /// Send a one-shot question to SofIA.
    Ask {
        /// The question to ask.
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    // Keep the appender guard alive for the life of the process.
    let _log_guard = init_tracing(&cfg);

    match cli.command {
        Commands::Start => {
            cfg.validate()?;

            let knowledge = Arc::new(KnowledgeStore::load(&cfg.knowledge.path));
            let cache = Arc::new(ResponseCache::new(cfg.cache.capacity));

            let provider: Arc<dyn Provider> =
                Arc::new(GeminiProvider::from_config(&cfg.provider.gemini)?);
            if !provider.is_available().await {
                anyhow::bail!("provider '{}' is not available", provider.name());
            }

            let channel: Arc<dyn Channel> =
                Arc::new(sofia_channels::MetaChannel::from_config(&cfg.channel)?);

            let (task_queue, queue_rx) = queue::InMemoryQueue::channel(cfg.broker.queue_capacity);

            let state = api::ApiState::new(
                &cfg,
                Arc::new(task_queue),
                cache.clone(),
                knowledge.clone(),
            );

            let task_worker = Arc::new(worker::TaskWorker::new(
                provider,
                channel,
                cache,
                knowledge,
                &cfg.worker,
            ));

            println!("SofIA — starting receiver and worker...");
            let worker_handle = tokio::spawn(task_worker.run(queue_rx, cfg.worker.concurrency));
            let api_handle = tokio::spawn(api::serve(
                state,
                cfg.webhook.host.clone(),
                cfg.webhook.port,
            ));

            tokio::signal::ctrl_c().await?;
            info!("Received shutdown signal");

            // Dropping the server drops the queue sender; the workers
            // drain what is already queued and stop.
            api_handle.abort();
            let _ = worker_handle.await;
            info!("Shutdown complete.");
        }
        Commands::Status => {
            println!("SofIA — Status Check\n");
            println!("Config: {}", cli.config);
            println!(
                "Mode: {}",
                if cfg.sofia.production {
                    "production"
                } else {
                    "development"
                }
            );
            println!();

            let provider = GeminiProvider::from_config(&cfg.provider.gemini)?;
            let available = provider.is_available().await;
            println!(
                "  gemini ({}): {}",
                cfg.provider.gemini.model,
                if available { "available" } else { "not available" }
            );

            let knowledge = KnowledgeStore::load(&cfg.knowledge.path);
            println!(
                "  knowledge ({}): {}",
                cfg.knowledge.path,
                if knowledge.is_degraded() {
                    "DEGRADED (missing or invalid)"
                } else {
                    "loaded"
                }
            );

            let whatsapp = cfg
                .channel
                .whatsapp
                .as_ref()
                .is_some_and(|wa| !wa.token.is_empty() && !wa.phone_id.is_empty());
            let messenger = cfg
                .channel
                .messenger
                .as_ref()
                .is_some_and(|fb| !fb.page_token.is_empty() && !fb.page_id.is_empty());
            println!(
                "  whatsapp: {}",
                if whatsapp { "configured" } else { "not configured" }
            );
            println!(
                "  messenger: {}",
                if messenger { "configured" } else { "not configured" }
            );
            println!(
                "  broker: {}",
                if cfg.broker.url.is_empty() {
                    "in-process"
                } else {
                    cfg.broker.url.as_str()
                }
            );
        }
        Commands::Ask { message } => {
            if message.is_empty() {
                anyhow::bail!("no message provided. Usage: sofia ask <message>");
            }
            if cfg.provider.gemini.api_key.is_empty() {
                anyhow::bail!("provider.gemini.api_key is required (or set GEMINI_API_KEY)");
            }

            let question = message.join(" ");
            let knowledge = KnowledgeStore::load(&cfg.knowledge.path);
            let provider = GeminiProvider::from_config(&cfg.provider.gemini)?;

            let full_prompt = prompt::build(&question, &knowledge.formatted());
            let reply = provider.generate(&full_prompt).await?;
            println!("{reply}");
        }
    }

    Ok(())
}

/// Initialize tracing: env filter with the configured level as default,
/// plus a daily-rolling file when `log_dir` is set.
fn init_tracing(cfg: &config::Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.sofia.log_level))
    };

    if cfg.sofia.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
        None
    } else {
        let appender = tracing_appender::rolling::daily(&cfg.sofia.log_dir, "sofia.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    }
}
