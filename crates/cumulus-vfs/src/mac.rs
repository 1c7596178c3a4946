//! macOS placeholder provider.
//!
//! Backed by the File Provider framework (macOS 10.15+):
//! - NSFileProviderManager add/removeDomain — start/stop sequence
//! - NSFileProviderExtension item enumeration — placeholder population
//! - materialization callbacks — hydration driven by Finder access
//!
//! Pin state rides on extended attributes; the Finder sync-status badge
//! is driven through the shell-extension command channel.

#![cfg(target_os = "macos")]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use cumulus_core::types::SyncTime;
use cumulus_core::{
    ExitCause, ExitInfo, ExitResult, NodeId, PinState, SyncFileItem, VfsStatus, VirtualFileMode,
};

use crate::registry::{OsProbe, Platform};
use crate::{check_if_path_is_valid, FetchProgress, StartReport, Vfs, VfsSetupParams};

pub fn create_provider(params: VfsSetupParams) -> Result<Arc<dyn Vfs>> {
    Ok(Arc::new(MacVfs::new(params)))
}

pub fn os_probe() -> OsProbe {
    // TODO: read the real version from ProcessInfo.operatingSystemVersion
    // via an objc2 shim.
    OsProbe {
        platform: Platform::MacOs,
        major: 10,
        minor: 0,
        build: 0,
    }
}

pub struct MacVfs {
    params: VfsSetupParams,
}

impl MacVfs {
    pub fn new(params: VfsSetupParams) -> Self {
        Self { params }
    }

    fn full_path(&self, relative: &Path) -> std::path::PathBuf {
        self.params.local_path.join(relative)
    }
}

impl Vfs for MacVfs {
    fn mode(&self) -> VirtualFileMode {
        VirtualFileMode::Mac
    }

    fn params(&self) -> &VfsSetupParams {
        &self.params
    }

    fn start_impl(&self, report: &mut StartReport) -> ExitResult<()> {
        info!(
            root = %self.params.local_path.display(),
            "activating file provider domain"
        );
        // TODO: install the extension bundle, NSFileProviderManager
        // addDomain, then hook the XPC connection; flip each report
        // flag as the corresponding phase completes.
        warn!("file provider activation not yet implemented");
        report.installation_done = false;
        report.activation_done = false;
        report.connection_done = false;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn stop_impl(&self, unregister: bool) {
        info!(unregister, "deactivating file provider domain");
        // TODO: tear down the XPC connection; removeDomain when
        // unregister is set.
    }

    fn update_metadata(
        &self,
        path: &Path,
        _creation_time: SyncTime,
        _modification_time: SyncTime,
        _size: i64,
        _file_id: &NodeId,
    ) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: signal the provider item for re-enumeration.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn create_placeholder(&self, relative_path: &Path, item: &SyncFileItem) -> ExitResult<()> {
        if relative_path.as_os_str().is_empty() || item.remote_node_id.is_none() {
            return Err(ExitInfo::system(ExitCause::InvalidArgument));
        }
        check_if_path_is_valid(&self.full_path(relative_path), false)?;
        // TODO: publish the item to the extension's enumerator.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn dehydrate_placeholder(&self, path: &Path) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: evict the materialized item through the manager.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn convert_to_placeholder(&self, path: &Path, _item: &SyncFileItem) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn update_fetch_status(
        &self,
        _tmp_path: &Path,
        path: &Path,
        _received: i64,
    ) -> ExitResult<FetchProgress> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: report progress on the NSProgress attached to the
        // materialization request; canceled maps from its state.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn force_status(&self, path: &Path, _status: &VfsStatus) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn is_dehydrated_placeholder(&self, path: &Path) -> ExitResult<bool> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: check the dataless flag on the inode.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn set_pin_state(&self, path: &Path, _state: PinState) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: write the pin xattr, recursing into folders.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn pin_state(&self, _path: &Path) -> PinState {
        // TODO: read the pin xattr, walking ancestors for inheritance.
        PinState::Unknown
    }

    fn status(&self, path: &Path) -> ExitResult<VfsStatus> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn set_thumbnail(&self, path: &Path, _picture: &[u8]) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn set_app_exclude_list(&self, _app_list: &str) -> ExitResult<()> {
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn fetching_app_list(&self) -> ExitResult<HashMap<String, String>> {
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn exclude(&self, path: &Path) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn is_excluded(&self, _path: &Path) -> bool {
        false
    }

    fn clear_file_attributes(&self, path: &Path) {
        let _ = path;
    }

    fn hydrate(&self, path: &Path) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: request materialization and block on its NSProgress.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn dehydrate(&self, path: &Path) -> ExitResult<()> {
        self.dehydrate_placeholder(path)
    }

    fn cancel_hydrate(&self, path: &Path) {
        let _ = path;
    }
}
