//! cumulus-vfs: placeholder/hydration layer behind one polymorphic
//! interface.
//!
//! The sync engine never knows which placeholder mechanism a folder runs
//! on: Windows Cloud Files, the macOS file provider, the suffix
//! fallback, or nothing at all ([`off::VfsOff`]). A [`Vfs`] provider is
//! selected at startup by the [`registry`] from OS capability and build
//! metadata, and slow hydrate/dehydrate work runs on the [`worker`]
//! pool, off the filesystem-event path.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use cumulus_core::types::SyncTime;
use cumulus_core::{ExitCause, ExitCode, ExitInfo, ExitResult, NodeId, PinState, SyncFileItem,
    VfsStatus, VirtualFileMode};

pub mod off;
pub mod registry;
pub mod worker;

#[cfg(target_os = "windows")]
pub mod win;

#[cfg(target_os = "macos")]
pub mod mac;

pub use off::VfsOff;
pub use registry::{best_available_mode, create_vfs, is_provider_available, OsProbe, Platform};
pub use worker::{QueuePolicy, WorkerPool, WORKER_DEHYDRATION, WORKER_HYDRATION};

/// Separator between the command verb and its first argument on the
/// shell-extension channel (`STATUS:<...>`).
pub const COMMAND_SEPARATOR: char = ':';

/// Callback used to notify the shell-integration extension (Finder /
/// Explorer overlay) of status changes.
pub type ExecuteCommand = Arc<dyn Fn(&str) + Send + Sync>;

/// Immutable configuration snapshot for one sync folder's VFS instance,
/// created once at startup and owned by the provider.
#[derive(Clone, Default)]
pub struct VfsSetupParams {
    pub sync_db_id: i32,
    pub drive_id: i32,
    pub user_id: i32,
    /// Local sync folder root.
    pub local_path: PathBuf,
    /// Remote drive root.
    pub target_path: PathBuf,
    /// Shell-namespace identifier registered for the sync root (Windows).
    pub namespace_clsid: String,
    pub execute_command: Option<ExecuteCommand>,
    /// Log every placeholder operation.
    pub extended_log: bool,
}

impl fmt::Debug for VfsSetupParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsSetupParams")
            .field("sync_db_id", &self.sync_db_id)
            .field("drive_id", &self.drive_id)
            .field("user_id", &self.user_id)
            .field("local_path", &self.local_path)
            .field("target_path", &self.target_path)
            .field("namespace_clsid", &self.namespace_clsid)
            .field("extended_log", &self.extended_log)
            .finish_non_exhaustive()
    }
}

/// Independent outcomes of the provider start sequence, so a partial
/// failure (installed but not activated, activated but not connected)
/// can be diagnosed and remediated separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartReport {
    pub installation_done: bool,
    pub activation_done: bool,
    pub connection_done: bool,
}

/// Out-state of one `update_fetch_status` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// The user canceled the download from the OS file UI.
    pub canceled: bool,
    pub finished: bool,
}

/// Interface describing how to deal with virtual/placeholder files.
///
/// There are different ways of representing files locally that are only
/// filled with data (hydrated) on demand: suffixed files, Windows Cloud
/// Files placeholders, the macOS file provider. This trait decouples the
/// sync algorithm from how a particular solution works.
///
/// Every fallible operation returns an [`ExitResult`] so callers can
/// distinguish "not found" from "access denied" from "already a
/// placeholder" and pick the right remediation.
pub trait Vfs: Send + Sync {
    fn mode(&self) -> VirtualFileMode;

    fn params(&self) -> &VfsSetupParams;

    /// Provider-specific startup: OS registration of the sync root,
    /// activation, connection. Called once by [`VfsHandle::start`].
    fn start_impl(&self, report: &mut StartReport) -> ExitResult<()>;

    /// Provider-specific shutdown. `unregister` additionally asks the
    /// provider to forget the sync root (folder removed by the user);
    /// plain process shutdown keeps the registration.
    fn stop_impl(&self, unregister: bool);

    /// Refresh remote-derived metadata without touching content.
    fn update_metadata(
        &self,
        path: &Path,
        creation_time: SyncTime,
        modification_time: SyncTime,
        size: i64,
        file_id: &NodeId,
    ) -> ExitResult<()>;

    /// Materialize a dehydrated placeholder for a newly-discovered
    /// remote item.
    ///
    /// Fails with `InvalidArgument` if the path is empty or the item has
    /// no remote identifier, `NotFound` if the parent folder is absent,
    /// `FileAccessError` on permission failure, `FileExists` on a name
    /// collision.
    fn create_placeholder(&self, relative_path: &Path, item: &SyncFileItem) -> ExitResult<()>;

    /// Release local content, keeping metadata. Fails with
    /// `NotPlaceHolder` if the target isn't one, `FileAccessError` if
    /// it is locked.
    fn dehydrate_placeholder(&self, path: &Path) -> ExitResult<()>;

    /// Promote an ordinary hydrated file to placeholder bookkeeping.
    /// Must succeed as a no-op when the file already is a placeholder.
    fn convert_to_placeholder(&self, path: &Path, item: &SyncFileItem) -> ExitResult<()>;

    /// Report download progress to the OS file UI and learn whether the
    /// user canceled.
    fn update_fetch_status(
        &self,
        tmp_path: &Path,
        path: &Path,
        received: i64,
    ) -> ExitResult<FetchProgress>;

    /// Force the sync status shown for a file (syncing badge, progress).
    fn force_status(&self, path: &Path, status: &VfsStatus) -> ExitResult<()>;

    fn is_dehydrated_placeholder(&self, path: &Path) -> ExitResult<bool>;

    /// Set the pin state on the item and, for folders, everything below
    /// it. `Inherited` means "follow the parent".
    fn set_pin_state(&self, path: &Path, state: PinState) -> ExitResult<()>;

    /// Effective pin state with inheritance resolved; never returns
    /// `Inherited`, and `Unknown` on retrieval error.
    fn pin_state(&self, path: &Path) -> PinState;

    /// Single source of truth for "is this a placeholder / hydrated /
    /// syncing / how far along". Recomputed from provider metadata.
    fn status(&self, path: &Path) -> ExitResult<VfsStatus>;

    fn set_thumbnail(&self, path: &Path, picture: &[u8]) -> ExitResult<()>;

    /// Applications whose file accesses must not trigger hydration.
    fn set_app_exclude_list(&self, app_list: &str) -> ExitResult<()>;

    /// Applications currently blocked mid-fetch, keyed by process id.
    fn fetching_app_list(&self) -> ExitResult<HashMap<String, String>>;

    fn exclude(&self, path: &Path) -> ExitResult<()>;

    fn is_excluded(&self, path: &Path) -> bool;

    fn clear_file_attributes(&self, path: &Path);

    /// Download a placeholder's content. Must be idempotent: a second
    /// call for an already-hydrated path succeeds without re-download.
    fn hydrate(&self, path: &Path) -> ExitResult<()>;

    /// Evict local content of a hydrated placeholder. Idempotent.
    fn dehydrate(&self, path: &Path) -> ExitResult<()>;

    fn cancel_hydrate(&self, path: &Path);
}

/// Single policy point for filesystem-existence checks, reused by every
/// per-item operation so existence races are classified one way.
///
/// Outcomes are mutually exclusive and exhaustive:
/// - empty path → `SystemError`/`InvalidArgument`
/// - exists as expected → `Ok`
/// - should exist but doesn't → `SystemError`/`NotFound`
/// - shouldn't exist but does → `SystemError`/`FileExists`
/// - existence undeterminable (permissions) → `SystemError`/`FileAccessError`
pub fn check_if_path_is_valid(path: &Path, should_exist: bool) -> ExitResult<()> {
    if path.as_os_str().is_empty() {
        warn!("empty path provided to VFS call");
        return Err(ExitInfo::system(ExitCause::InvalidArgument));
    }

    match path.try_exists() {
        Ok(exists) if exists == should_exist => Ok(()),
        Ok(true) => {
            debug!(path = %path.display(), "file already exists");
            Err(ExitInfo::system(ExitCause::FileExists))
        }
        Ok(false) => {
            debug!(path = %path.display(), "file doesn't exist");
            Err(ExitInfo::system(ExitCause::NotFound))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(path = %path.display(), "file access error: {e}");
            Err(ExitInfo::system(ExitCause::FileAccessError))
        }
        Err(e) => {
            warn!(path = %path.display(), "existence check failed: {e}");
            Err(ExitCode::SystemError.into())
        }
    }
}

/// Classify a provider error by inspecting the path; falls back to the
/// default VFS error (access error, file blacklisted until touched)
/// when the path itself is fine.
pub fn handle_vfs_error(path: &Path) -> ExitInfo {
    match check_if_path_is_valid(path, true) {
        Err(info) => info,
        Ok(()) => ExitInfo::default_vfs_error(),
    }
}

/// One sync folder's VFS: the selected provider, its worker pool, and
/// the `NotStarted → Started → Stopped` lifecycle.
pub struct VfsHandle {
    provider: Arc<dyn Vfs>,
    pool: WorkerPool,
    started: bool,
}

impl VfsHandle {
    pub fn new(provider: Arc<dyn Vfs>, threads_per_queue: usize) -> Self {
        let pool = WorkerPool::start(provider.clone(), threads_per_queue, QueuePolicy::default());
        Self {
            provider,
            pool,
            started: false,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Vfs> {
        &self.provider
    }

    pub fn mode(&self) -> VirtualFileMode {
        self.provider.mode()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Idempotent: a second call on a started instance is a no-op `Ok`.
    pub fn start(&mut self, report: &mut StartReport) -> ExitResult<()> {
        if self.started {
            return Ok(());
        }
        let result = self.provider.start_impl(report);
        self.started = result.is_ok();
        result
    }

    /// Idempotent no-op when not started.
    pub fn stop(&mut self, unregister: bool) {
        if self.started {
            self.provider.stop_impl(unregister);
            self.started = false;
        }
    }

    /// Queue an asynchronous hydration; duplicates are not filtered
    /// here, `hydrate` itself must tolerate them.
    pub fn enqueue_hydration(&self, path: PathBuf) {
        self.pool.enqueue(WORKER_HYDRATION, path);
    }

    pub fn enqueue_dehydration(&self, path: PathBuf) {
        self.pool.enqueue(WORKER_DEHYDRATION, path);
    }

    /// Stop worker threads with a bounded join.
    pub fn shutdown_workers(&mut self) {
        self.pool.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // Outcomes of the existence policy are mutually exclusive and
    // exhaustive over {empty, present, absent, unreadable}.
    #[test]
    fn existing_path_matches_should_exist() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("present.txt");
        fs::write(&file, b"x").unwrap();

        assert!(check_if_path_is_valid(&file, true).is_ok());
        assert_eq!(
            check_if_path_is_valid(&file, false),
            Err(ExitInfo::system(ExitCause::FileExists))
        );
    }

    #[test]
    fn missing_path_matches_should_not_exist() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("absent.txt");

        assert!(check_if_path_is_valid(&file, false).is_ok());
        assert_eq!(
            check_if_path_is_valid(&file, true),
            Err(ExitInfo::system(ExitCause::NotFound))
        );
    }

    #[test]
    fn empty_path_is_invalid_argument() {
        assert_eq!(
            check_if_path_is_valid(Path::new(""), true),
            Err(ExitInfo::system(ExitCause::InvalidArgument))
        );
        assert_eq!(
            check_if_path_is_valid(Path::new(""), false),
            Err(ExitInfo::system(ExitCause::InvalidArgument))
        );
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_parent_is_file_access_error() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        let inner = locked.join("file.txt");
        fs::write(&inner, b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root bypasses permission checks; skip there.
        let result = check_if_path_is_valid(&inner, true);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if result != Ok(()) {
            assert_eq!(result, Err(ExitInfo::system(ExitCause::FileAccessError)));
        }
    }

    #[test]
    fn handle_vfs_error_prefers_path_diagnosis() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone.txt");
        assert_eq!(
            handle_vfs_error(&missing),
            ExitInfo::system(ExitCause::NotFound)
        );

        let present = tmp.path().join("here.txt");
        fs::write(&present, b"x").unwrap();
        assert_eq!(handle_vfs_error(&present), ExitInfo::default_vfs_error());
    }
}
