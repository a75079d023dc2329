/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::compose::{LogSurface, NotificationSurface};
use crate::config::ProviderConfig;
use crate::ledger::LifecycleSignal;
use crate::provider::DataProvider;
use crate::store::TableStore;
use anyhow::{Context, Result};
use roost_protocol::{ProviderRequest, ProviderResponse};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

static HANDLE_SEQ: AtomicU64 = AtomicU64::new(1);

struct RunningCore {
    provider: Arc<DataProvider>,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleSignal>,
    shutdown_tx: watch::Sender<bool>,
    join: Option<thread::JoinHandle<()>>,
}

static REGISTRY: Mutex<Vec<(u64, RunningCore)>> = Mutex::new(Vec::new());

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .ok();
}

pub fn start(cfg: ProviderConfig) -> Result<u64> {
    start_with_surface(cfg, Arc::new(LogSurface))
}

/// Opens the store and starts the background pump. Returns a handle for the other calls.
pub fn start_with_surface(cfg: ProviderConfig, surface: Arc<dyn NotificationSurface>) -> Result<u64> {
    init_tracing();

    let data_dir = cfg.data_dir()?;
    std::fs::create_dir_all(&data_dir).with_context(|| format!("create {}", data_dir.display()))?;
    let db_path = cfg.db_path()?;
    let store = TableStore::open(&db_path).with_context(|| format!("open {}", db_path.display()))?;
    store.health_check().context("store health check")?;
    info!("database: {}", db_path.display());

    let provider = Arc::new(DataProvider::from_config(&cfg, Arc::new(store), surface)?);
    let handle = HANDLE_SEQ.fetch_add(1, Ordering::Relaxed);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();

    let pump_provider = provider.clone();
    let join = thread::Builder::new()
        .name(format!("roost-core-{handle}"))
        .spawn(move || {
            if let Err(e) = run_core(pump_provider, lifecycle_rx, shutdown_rx) {
                error!("core runtime failed: {e:#}");
            }
        })
        .context("spawn core thread")?;

    let mut reg = REGISTRY.lock().unwrap();
    reg.push((
        handle,
        RunningCore {
            provider,
            lifecycle_tx,
            shutdown_tx,
            join: Some(join),
        },
    ));
    info!(handle, "core started");
    Ok(handle)
}

pub fn stop(handle: u64) -> Result<()> {
    let running = {
        let mut reg = REGISTRY.lock().unwrap();
        let idx = reg
            .iter()
            .position(|(h, _)| *h == handle)
            .context("invalid handle")?;
        let (_, mut running) = reg.swap_remove(idx);
        let _ = running.shutdown_tx.send(true);
        // Join in background to avoid blocking the caller's thread.
        running.join.take()
    };

    if let Some(j) = running {
        thread::spawn(move || {
            let _ = j.join();
        });
    }
    info!(handle, "core stopped");
    Ok(())
}

pub fn provider(handle: u64) -> Result<Arc<DataProvider>> {
    let reg = REGISTRY.lock().unwrap();
    reg.iter()
        .find(|(h, _)| *h == handle)
        .map(|(_, r)| r.provider.clone())
        .context("invalid handle")
}

/// Runs one JSON-encoded `ProviderRequest` and returns the JSON-encoded response.
pub fn call(handle: u64, request_json: &str) -> Result<String> {
    let provider = provider(handle)?;
    let response = match serde_json::from_str::<ProviderRequest>(request_json) {
        Ok(req) => provider.handle(req),
        Err(e) => ProviderResponse::Error {
            code: "invalid_request".to_string(),
            message: e.to_string(),
        },
    };
    serde_json::to_string(&response).context("encode response")
}

/// Queues a lifecycle signal; the pump applies it in arrival order.
pub fn lifecycle(handle: u64, signal: LifecycleSignal) -> Result<()> {
    let reg = REGISTRY.lock().unwrap();
    let (_, running) = reg
        .iter()
        .find(|(h, _)| *h == handle)
        .context("invalid handle")?;
    running
        .lifecycle_tx
        .send(signal)
        .map_err(|_| anyhow::anyhow!("core {handle} is shutting down"))
}

fn run_core(
    provider: Arc<DataProvider>,
    mut lifecycle_rx: mpsc::UnboundedReceiver<LifecycleSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    rt.block_on(async move {
        let mut events = provider.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                signal = lifecycle_rx.recv() => match signal {
                    Some(signal) => provider.apply(signal),
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(ev) => debug!(kind = ?ev.kind, resource = ?ev.resource, "change event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "change event listener lagged"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Parses the lifecycle names used at the C boundary.
pub fn parse_lifecycle(name: &str) -> Option<LifecycleSignal> {
    match name.trim().to_ascii_lowercase().as_str() {
        "home_started" | "home_start" => Some(LifecycleSignal::HomeStarted),
        "home_stopped" | "home_stop" => Some(LifecycleSignal::HomeStopped),
        _ => None,
    }
}
