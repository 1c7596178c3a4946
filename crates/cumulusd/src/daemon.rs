//! Daemon lifecycle: VFS construction, comm server, port file, shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{info, warn};

use cumulus_core::config::CumulusConfig;
use cumulus_core::proto::SignalNum;
use cumulus_core::VirtualFileMode;
use cumulus_comm::CommServer;
use cumulus_vfs::{create_vfs, is_provider_available, VfsHandle, VfsSetupParams};

use crate::dispatch::DaemonDispatcher;

pub async fn run(config: CumulusConfig) -> Result<()> {
    info!("daemon starting");

    // A leftover marker means the previous run did not shut down
    // cleanly; the client checks the same file when its connection
    // drops to decide whether to relaunch us.
    if config.daemon.crash_marker.exists() {
        warn!(
            marker = %config.daemon.crash_marker.display(),
            "previous run crashed"
        );
    }
    if config.daemon.restart_on_crash {
        write_marker(&config).await;
    }

    // Pick the placeholder mechanism. A configured mode the OS can't
    // run falls back to Off so the folder still syncs, just without
    // placeholders.
    let mut mode = config.vfs.mode;
    if !is_provider_available(mode) {
        warn!(%mode, "virtual file mode not available on this system, falling back to off");
        mode = VirtualFileMode::Off;
    }

    let setup = VfsSetupParams {
        sync_db_id: config.sync.sync_db_id,
        drive_id: config.sync.drive_id,
        user_id: config.sync.user_id,
        local_path: config.sync.local_path.clone(),
        target_path: config.sync.target_path.clone(),
        namespace_clsid: config.vfs.namespace_clsid.clone(),
        execute_command: None,
        extended_log: config.vfs.extended_log,
    };

    let provider = create_vfs(mode, setup).context("creating vfs provider")?;
    let vfs = VfsHandle::new(provider, config.vfs.workers_per_queue);
    info!(%mode, workers = config.vfs.workers_per_queue, "vfs provider ready");

    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<(SignalNum, Bytes)>();
    let (quit_tx, mut quit_rx) = mpsc::unbounded_channel::<()>();

    let dispatcher = Arc::new(DaemonDispatcher::new(
        config.sync.sync_db_id,
        vfs,
        signal_tx,
        quit_tx,
    ));

    let server = CommServer::bind(dispatcher.clone())
        .await
        .context("binding comm server")?;

    write_port_file(&config, server.port()).await?;
    info!(port = server.port(), "comm: listening");

    // Run until the GUI asks us to quit or the process is interrupted,
    // forwarding dispatcher signals to every connected client.
    loop {
        tokio::select! {
            Some((num, params)) = signal_rx.recv() => {
                server.broadcast_signal(num, params);
            }
            _ = quit_rx.recv() => {
                info!("shutting down on quit request");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down on interrupt");
                break;
            }
        }
    }

    server.broadcast_signal(SignalNum::UtilityQuit, Bytes::new());
    server.shutdown().await;

    if let Err(e) = tokio::fs::remove_file(&config.daemon.port_file).await {
        warn!("removing port file: {e}");
    }
    if config.daemon.restart_on_crash {
        remove_marker(&config).await;
    }

    info!("daemon stopped");
    Ok(())
}

async fn write_port_file(config: &CumulusConfig, port: u16) -> Result<()> {
    let path = &config.daemon.port_file;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(path, port.to_string())
        .await
        .with_context(|| format!("writing port file {}", path.display()))
}

async fn write_marker(config: &CumulusConfig) {
    let path = &config.daemon.crash_marker;
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    if let Err(e) = tokio::fs::write(path, b"").await {
        warn!("writing crash marker: {e}");
    }
}

async fn remove_marker(config: &CumulusConfig) {
    if let Err(e) = tokio::fs::remove_file(&config.daemon.crash_marker).await {
        warn!("removing crash marker: {e}");
    }
}
