pub mod bootstrap;
pub mod cli;
pub mod http_server;
pub mod telegram;

pub use bootstrap::{build_pipeline, init_tracing, load_config};
pub use http_server::{router, start_server, AppState};
pub use telegram::{ChatReplier, TelegramClient};
