//! HTTP API + Telegram webhook server

use anyhow::Result;
use std::sync::Arc;

use hybrid_qa_server::telegram::TelegramClient;
use hybrid_qa_server::{build_pipeline, init_tracing, load_config, start_server, AppState, ChatReplier};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config()?;
    let qa = build_pipeline(&config)?;

    if let Err(e) = qa.warm_up().await {
        tracing::warn!(error = %e, "Vector index unavailable at startup; document questions will retry on first use");
    }

    let replier: Option<Arc<dyn ChatReplier>> = match &config.telegram.bot_token {
        Some(token) => {
            let client = TelegramClient::new(token.clone(), config.telegram.api_base.clone())?;
            match &config.telegram.webhook_url {
                Some(url) => client.configure_webhook(url).await,
                None => tracing::warn!("TELEGRAM_BOT_TOKEN set without WEBHOOK_URL; webhook not registered"),
            }
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("TELEGRAM_BOT_TOKEN not set; Telegram replies disabled");
            None
        }
    };

    start_server(AppState { qa, replier }, &config.server.bind_addr).await
}
