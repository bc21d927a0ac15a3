use clap::Parser;

use crate::llm::gemini::DEFAULT_BASE_URL;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Shared password that unlocks the chat. Every successful login receives
    /// the same session cookie.
    #[arg(long, env = "ADMIN_PASSWORD", default_value = "yusei")]
    pub admin_password: String,

    /// Mark the session cookie Secure so browsers only send it over HTTPS.
    #[arg(long, env = "SECURE_COOKIES", default_value = "false")]
    pub secure_cookies: bool,

    // --- Gemini Args ---
    /// API key for the Google Generative Language API. The server starts
    /// without one; chat requests fail until it is configured.
    #[arg(long, env = "GOOGLE_AI_API_KEY")]
    pub google_ai_api_key: Option<String>,

    /// Base URL of the Generative Language API.
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub gemini_base_url: String,

    /// Model used when a chat request does not name one.
    #[arg(long, env = "CHAT_MODEL", default_value = "gemini-2.5-flash")]
    pub chat_model: String,

    /// Optional token budget for the model's thinking trace. Unset lets the
    /// model decide.
    #[arg(long, env = "GEMINI_THINKING_BUDGET")]
    pub thinking_budget: Option<i32>,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
