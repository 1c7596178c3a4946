//! GUI request dispatch into the VFS layer.
//!
//! One handler instance serves every connection. Requests arrive as
//! decoded envelopes; parameters and results are JSON documents with
//! camelCase keys, and every result carries the `(exitCode, exitCause)`
//! pair so the GUI can branch on failure category without string
//! matching.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use cumulus_core::proto::{RequestNum, SignalNum};
use cumulus_core::{ExitCause, ExitCode, ExitInfo, PinState, VfsStatus, VirtualFileMode};
use cumulus_comm::RequestHandler;
use cumulus_vfs::{best_available_mode, OsProbe, StartReport, VfsHandle};

/// VFS start attempts before the sync is declared failed.
const VFS_START_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExitInfoDto {
    exit_code: ExitCode,
    exit_cause: ExitCause,
}

impl ExitInfoDto {
    fn ok() -> Self {
        Self {
            exit_code: ExitCode::Ok,
            exit_cause: ExitCause::Unknown,
        }
    }
}

impl From<ExitInfo> for ExitInfoDto {
    fn from(info: ExitInfo) -> Self {
        Self {
            exit_code: info.code(),
            exit_cause: info.cause(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncParams {
    sync_db_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetSupportsVirtualFilesParams {
    sync_db_id: i32,
    value: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetRootPinStateParams {
    sync_db_id: i32,
    pin_state: PinState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeParams {
    sync_db_id: i32,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeSetPinStateParams {
    sync_db_id: i32,
    path: PathBuf,
    pin_state: PinState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncStatusReply {
    #[serde(flatten)]
    exit: ExitInfoDto,
    is_running: bool,
    mode: VirtualFileMode,
    supports_virtual_files: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IsRunningReply {
    is_running: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinStateReply {
    #[serde(flatten)]
    exit: ExitInfoDto,
    pin_state: PinState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VfsStatusReply {
    #[serde(flatten)]
    exit: ExitInfoDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<VfsStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BestModeReply {
    mode: VirtualFileMode,
}

struct SyncState {
    vfs: VfsHandle,
    running: bool,
    supports_virtual_files: bool,
}

/// Server-side request dispatcher owning the sync folder's VFS.
pub struct DaemonDispatcher {
    sync_db_id: i32,
    state: Mutex<SyncState>,
    signal_tx: mpsc::UnboundedSender<(SignalNum, Bytes)>,
    quit_tx: mpsc::UnboundedSender<()>,
}

impl DaemonDispatcher {
    pub fn new(
        sync_db_id: i32,
        vfs: VfsHandle,
        signal_tx: mpsc::UnboundedSender<(SignalNum, Bytes)>,
        quit_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            sync_db_id,
            state: Mutex::new(SyncState {
                vfs,
                running: false,
                supports_virtual_files: false,
            }),
            quit_tx,
            signal_tx,
        }
    }

    fn check_sync_id(&self, sync_db_id: i32) -> Result<(), ExitInfo> {
        if sync_db_id == self.sync_db_id {
            Ok(())
        } else {
            warn!(sync_db_id, "request for unknown sync");
            Err(ExitCode::InvalidSync.into())
        }
    }

    fn push_signal(&self, num: SignalNum) {
        let params = encode(&SyncParams {
            sync_db_id: self.sync_db_id,
        });
        let _ = self.signal_tx.send((num, params));
    }

    fn sync_start(&self, params: SyncParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return exit_reply(Err(info));
        }
        let mut state = self.state.lock().unwrap();
        if state.running {
            return exit_reply(Ok(()));
        }

        // A transient provider failure (extension still loading, sync
        // root briefly busy) deserves a few tries before giving up.
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let mut report = StartReport::default();
            match state.vfs.start(&mut report) {
                Ok(()) => break Ok(()),
                Err(info) if attempt < VFS_START_MAX_ATTEMPTS => {
                    warn!(attempt, %info, ?report, "vfs start failed, retrying");
                }
                Err(info) => {
                    error!(%info, ?report, "vfs start failed");
                    break Err(info);
                }
            }
        };

        if result.is_ok() {
            state.running = true;
            info!(sync_db_id = self.sync_db_id, "sync started");
            drop(state);
            self.push_signal(SignalNum::SyncUpdated);
        }
        exit_reply(result)
    }

    fn sync_stop(&self, params: SyncParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return exit_reply(Err(info));
        }
        let mut state = self.state.lock().unwrap();
        if state.running {
            state.vfs.stop(false);
            state.running = false;
            info!(sync_db_id = self.sync_db_id, "sync stopped");
            drop(state);
            self.push_signal(SignalNum::SyncUpdated);
        }
        exit_reply(Ok(()))
    }

    fn sync_status(&self, params: SyncParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return exit_reply(Err(info));
        }
        let state = self.state.lock().unwrap();
        encode(&SyncStatusReply {
            exit: ExitInfoDto::ok(),
            is_running: state.running,
            mode: state.vfs.mode(),
            supports_virtual_files: state.supports_virtual_files,
        })
    }

    fn sync_is_running(&self) -> Bytes {
        let state = self.state.lock().unwrap();
        encode(&IsRunningReply {
            is_running: state.running,
        })
    }

    fn set_supports_virtual_files(&self, params: SetSupportsVirtualFilesParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return exit_reply(Err(info));
        }
        let mut state = self.state.lock().unwrap();
        state.supports_virtual_files = params.value;
        info!(value = params.value, "virtual file support updated");
        exit_reply(Ok(()))
    }

    fn set_root_pin_state(&self, params: SetRootPinStateParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return exit_reply(Err(info));
        }
        let state = self.state.lock().unwrap();
        let result = state.vfs.provider().set_pin_state(Path::new(""), params.pin_state);
        exit_reply(result)
    }

    fn node_pin_state(&self, params: NodeParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return encode(&PinStateReply {
                exit: info.into(),
                pin_state: PinState::Unknown,
            });
        }
        let state = self.state.lock().unwrap();
        let pin_state = state.vfs.provider().pin_state(&params.path);
        encode(&PinStateReply {
            exit: ExitInfoDto::ok(),
            pin_state,
        })
    }

    fn node_set_pin_state(&self, params: NodeSetPinStateParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return exit_reply(Err(info));
        }
        let state = self.state.lock().unwrap();
        let result = state.vfs.provider().set_pin_state(&params.path, params.pin_state);
        exit_reply(result)
    }

    fn node_vfs_status(&self, params: NodeParams) -> Bytes {
        if let Err(info) = self.check_sync_id(params.sync_db_id) {
            return encode(&VfsStatusReply {
                exit: info.into(),
                status: None,
            });
        }
        let state = self.state.lock().unwrap();
        match state.vfs.provider().status(&params.path) {
            Ok(status) => encode(&VfsStatusReply {
                exit: ExitInfoDto::ok(),
                status: Some(status),
            }),
            Err(info) => encode(&VfsStatusReply {
                exit: info.into(),
                status: None,
            }),
        }
    }

    fn best_vfs_available_mode(&self) -> Bytes {
        let mode = best_available_mode(&OsProbe::current());
        encode(&BestModeReply { mode })
    }

    fn quit(&self) -> Bytes {
        info!("quit requested over comm");
        let _ = self.quit_tx.send(());
        exit_reply(Ok(()))
    }
}

impl RequestHandler for DaemonDispatcher {
    fn handle(&self, num: RequestNum, params: &[u8]) -> Bytes {
        match num {
            RequestNum::SyncStart => match decode(params) {
                Ok(p) => self.sync_start(p),
                Err(reply) => reply,
            },
            RequestNum::SyncStop => match decode(params) {
                Ok(p) => self.sync_stop(p),
                Err(reply) => reply,
            },
            RequestNum::SyncStatus => match decode(params) {
                Ok(p) => self.sync_status(p),
                Err(reply) => reply,
            },
            RequestNum::SyncIsRunning => self.sync_is_running(),
            RequestNum::SyncSetSupportsVirtualFiles => match decode(params) {
                Ok(p) => self.set_supports_virtual_files(p),
                Err(reply) => reply,
            },
            RequestNum::SyncSetRootPinState => match decode(params) {
                Ok(p) => self.set_root_pin_state(p),
                Err(reply) => reply,
            },
            RequestNum::NodePinState => match decode(params) {
                Ok(p) => self.node_pin_state(p),
                Err(reply) => reply,
            },
            RequestNum::NodeSetPinState => match decode(params) {
                Ok(p) => self.node_set_pin_state(p),
                Err(reply) => reply,
            },
            RequestNum::NodeVfsStatus => match decode(params) {
                Ok(p) => self.node_vfs_status(p),
                Err(reply) => reply,
            },
            RequestNum::UtilityBestVfsAvailableMode => self.best_vfs_available_mode(),
            RequestNum::UtilityCheckCommStatus => exit_reply(Ok(())),
            RequestNum::UtilityQuit => self.quit(),
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(params: &'a [u8]) -> Result<T, Bytes> {
    serde_json::from_slice(params).map_err(|e| {
        warn!("malformed request parameters: {e}");
        exit_reply(Err(ExitInfo::logic(ExitCause::InvalidArgument)))
    })
}

fn exit_reply(result: Result<(), ExitInfo>) -> Bytes {
    let dto = match result {
        Ok(()) => ExitInfoDto::ok(),
        Err(info) => info.into(),
    };
    encode(&dto)
}

fn encode<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(buf) => Bytes::from(buf),
        Err(e) => {
            error!("reply serialization failed: {e}");
            Bytes::from_static(b"{}")
        }
    }
}
