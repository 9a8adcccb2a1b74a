use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relaychat::config::{ChatArgs, Cli, Command, RelayConfig};
use relaychat::conversation::{
    Controller, Conversation, HistorySource, HttpRelayClient, SampleHistory,
};
use relaychat::llm::OpenAiClient;
use relaychat::relay::{self, RelayService};
use relaychat::security::CorsMiddleware;
use relaychat::server::Server;
use relaychat::terminal::{self, TerminalView};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(RelayConfig::try_from(args)?).await,
        Command::Chat(args) => chat(args).await,
    }
}

async fn serve(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = OpenAiClient::new(config.api_key.clone())?
        .with_endpoint(&config.upstream_url)
        .with_model(&config.model);
    info!(upstream = %provider.endpoint(), model = %provider.model(), "relay configured");

    let service = relay::router(
        Arc::new(RelayService::new(provider)),
        CorsMiddleware::new(config.allowed_origins.iter().cloned()),
    )
    .into_service();

    let server = Server::bind(config.bind_addr()).await?;
    eprintln!("relay listening on http://{}{}", server.local_addr(), relay::CHAT_PATH);
    server
        .run_until(move |ctx| service.call(ctx), async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let controller = Controller::new(
        Conversation::new(),
        HttpRelayClient::new(&args.endpoint),
        TerminalView::stdout(),
    )
    .with_typing_delay(args.typing_delay());

    let history: Option<Arc<dyn HistorySource>> = if args.no_history {
        None
    } else {
        Some(Arc::new(SampleHistory::default()))
    };
    terminal::run(Arc::new(controller), history).await?;
    Ok(())
}
