//! Long-running watch command: keeps the worker up and backfills summaries
//! whenever the user goes idle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use chatdeck::conversation::IndexStore;
use chatdeck::idle::{IdleMonitor, IdleTransition};
use chatdeck::tasks::TaskStatus;

use super::common::Deck;

/// Most recent access recorded in the index, across all conversations.
async fn latest_access(index: &IndexStore) -> Option<DateTime<Utc>> {
    match index.latest().await {
        Ok(records) => records.values().filter_map(|r| r.last_accessed).max(),
        Err(e) => {
            warn!(error = %e, "Failed to read conversation index");
            None
        }
    }
}

async fn on_idle(deck: &Deck) {
    deck.service.drain_events();
    match deck.service.schedule_missing_summaries().await {
        Ok(scheduled) if scheduled.is_empty() => debug!("Idle: every conversation has a summary"),
        Ok(scheduled) => info!(count = scheduled.len(), "Idle: scheduled summary refresh"),
        Err(e) => warn!(error = %e, "Idle: failed to schedule summaries"),
    }
}

/// Run until Ctrl+C.
///
/// Activity is any new access recorded in the conversation index, e.g. a
/// `chatdeck chat` from another terminal.
pub(crate) async fn cmd_watch(deck: Deck) -> Result<()> {
    let idle = &deck.settings.idle;
    let poll = Duration::from_secs(idle.poll_interval_secs.max(1));
    let monitor = Arc::new(IdleMonitor::new(Duration::from_secs(idle.timeout_secs)));

    let (edge_tx, mut edges) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = {
        let monitor = Arc::clone(&monitor);
        let idle_tx = edge_tx.clone();
        tokio::spawn(async move {
            monitor
                .run(
                    poll,
                    move || {
                        let _ = idle_tx.send(IdleTransition::BecameIdle);
                    },
                    move || {
                        let _ = edge_tx.send(IdleTransition::BecameActive);
                    },
                    shutdown_rx,
                )
                .await
        })
    };

    deck.service.start();
    println!(
        "Watching {} (idle after {}s). Press Ctrl+C to stop.",
        deck.settings.data_path().display(),
        monitor.timeout().as_secs()
    );

    let mut last_seen = latest_access(&deck.index).await;
    let mut ticker = tokio::time::interval(poll);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("Failed to listen for Ctrl+C")?;
                break;
            }
            Some(edge) = edges.recv() => match edge {
                IdleTransition::BecameIdle => on_idle(&deck).await,
                IdleTransition::BecameActive => info!("Activity resumed"),
            },
            _ = ticker.tick() => {
                for record in deck.service.drain_events() {
                    if record.status == TaskStatus::Failed {
                        warn!(task_id = %record.id, detail = ?record.detail, "Task failed");
                    } else if record.status.is_terminal() {
                        debug!(task_id = %record.id, detail = ?record.detail, "Task finished");
                    }
                }
                let seen = latest_access(&deck.index).await;
                if seen > last_seen {
                    monitor.touch();
                    last_seen = seen;
                }
            }
        }
    }

    println!("Shutting down...");
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), monitor_handle).await;
    deck.service.stop().await;
    Ok(())
}
