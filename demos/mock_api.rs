//! Mock a small REST API on port 8001.
//!
//! Run with `cargo run --example mock_api`, then try:
//!
//! ```text
//! curl http://localhost:8001/ApiMocking/
//! curl http://localhost:8001/ApiMocking/json
//! curl http://localhost:8001/ApiMocking/api/authorize
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tinyrest::{ConsoleLogger, Response};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Greeting {
    #[serde(rename = "Text")]
    text: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let count = Arc::new(AtomicU64::new(0));
    let text_count = Arc::clone(&count);
    let json_count = Arc::clone(&count);

    tinyrest::server()
        .with_logger(ConsoleLogger)
        .with_http()
        .with_port(8001)
        .with_base_path("/ApiMocking")
        .on_get_path("/", move |_req| {
            let count = Arc::clone(&text_count);
            async move { format!("coucou {}", count.fetch_add(1, Ordering::SeqCst)) }
        })
        .on_get_path("/json", move |_req| {
            let count = Arc::clone(&json_count);
            async move {
                Response::json(&Greeting {
                    text: format!("coucou {}", count.fetch_add(1, Ordering::SeqCst)),
                })
            }
        })
        .on_get_path("/api/v1/accounts/forgot-passwords", |_req| async {
            "ça marche"
        })
        .on_get_path("/api/authorize", |_req| async { "ça log" })
        .create()?
        .listen()
        .await?;

    Ok(())
}
