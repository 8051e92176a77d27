use anyhow::{Context, Result};
use chatmosaic::cli::{Cli, Commands};
use chatmosaic::service::{export, AskRequest, ClientInfo, ExportFormat};
use chatmosaic::{init, init_tracing, server, storage, utils, Settings};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load configuration")?;
    init_tracing(&settings);

    match cli.command {
        Commands::Serve { host, port } => handle_serve(settings, host, port).await,
        Commands::Ask { question } => handle_ask(settings, question).await,
        Commands::Export { format, output } => handle_export(settings, format, output).await,
    }
}

async fn handle_serve(mut settings: Settings, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let state = init(settings).await?;
    server::serve(state).await
}

async fn handle_ask(settings: Settings, question: String) -> Result<()> {
    let state = init(settings).await?;

    utils::print_header(&format!("ChatMosaic ({})", state.service.model_name()));
    utils::print_info("Asking...");
    let request = AskRequest {
        question,
        history: Vec::new(),
    };

    match state.service.ask(request, ClientInfo::default()).await {
        Ok(exchange) => {
            println!();
            utils::print_exchange(&exchange);
            Ok(())
        }
        Err(e) => {
            utils::print_error(&format!("Failed: {}", e));
            Err(e.into())
        }
    }
}

async fn handle_export(settings: Settings, format: String, output: Option<String>) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let store = storage::open_store(&settings.database).await?;
    let exchanges = store.export_all().await?;
    let body = export::render(&exchanges, format)?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, body)
                .await
                .with_context(|| format!("Failed to write {}", path))?;
            utils::print_success(&format!("Exported {} exchanges to {}", exchanges.len(), path));
        }
        None => print!("{}", body),
    }
    Ok(())
}
