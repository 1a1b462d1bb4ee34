//! sopa-client entry point.
//!
//! Connects to the scoring service, prints score broadcasts, and treats
//! each line on stdin as a word found in the puzzle.

use std::time::Instant;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use sopa_client::app_state::AppState;
use sopa_client::config::ClientConfig;
use sopa_client::domain::WordSearchGame;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ClientConfig::from_env().context("loading configuration")?;
    tracing::info!(url = %config.websocket_url(), "starting sopa-client");

    let state = AppState::build(&config)
        .await
        .context("wiring the score client")?;

    match state.ranking.fetch_ranking().await {
        Ok(ranking) => {
            println!("ranking:");
            for (position, entry) in ranking.iter().enumerate() {
                println!("  {:>2}. {}", position + 1, entry.message);
            }
        }
        Err(e) => tracing::warn!(code = e.error_code(), error = %e, "ranking unavailable"),
    }

    state.connection.connect().await.context("connecting to broker")?;

    // Print broadcasts until the connection goes away
    let mut feed = state.bridge.on_score_broadcast();
    let printer = tokio::spawn(async move {
        while let Some(score) = feed.next().await {
            println!("[{}] {}", score.topic, score.body.message);
        }
    });

    let mut game = WordSearchGame::default();
    println!("find: {}", game.words().join(", "));
    let started = Instant::now();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let events = game.mark_found(&line, started.elapsed());
                if events.is_empty() {
                    println!("not in the puzzle or already found: {}", line.trim());
                }
                for event in &events {
                    state.bridge.publish_event(event).await;
                }
                if game.is_solved() {
                    println!("solved in {}s", started.elapsed().as_secs());
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    state.connection.disconnect().await;
    printer.abort();
    tracing::info!("sopa-client stopped");

    Ok(())
}
