pub mod auth;
pub mod cli;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod relay;
pub mod server;

use cli::Args;
use llm::gemini::GeminiClient;
use log::info;
use relay::StreamRelay;
use server::{ AppState, Server };
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Default Chat Model: {}", args.chat_model);
    info!("Gemini Base URL: {}", args.gemini_base_url);
    info!("API Key Configured: {}", args.google_ai_api_key
        .as_deref()
        .map(|key| !key.is_empty())
        .unwrap_or(false));
    if let Some(budget) = args.thinking_budget {
        info!("Thinking Budget: {}", budget);
    }
    info!("Secure Cookies: {}", args.secure_cookies);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let backend = Arc::new(
        GeminiClient::new(args.google_ai_api_key.clone(), args.gemini_base_url.clone())
    );
    let relay = StreamRelay::new(backend, args.chat_model.clone(), args.thinking_budget);
    let state = AppState { relay, args: args.clone() };

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    Server::new(addr, state).run().await?;

    Ok(())
}
