//! No-op provider used when virtual files are disabled.
//!
//! Every file is an ordinary, fully-local file. Placeholder mutations
//! succeed without doing anything so the sync engine can run the same
//! code path regardless of mode; status queries report "real, hydrated,
//! not syncing"; the only side effect is forwarding status changes to
//! the shell-integration extension.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use cumulus_core::types::SyncTime;
use cumulus_core::{ExitResult, NodeId, PinState, SyncFileItem, VfsStatus, VirtualFileMode};

use crate::{
    check_if_path_is_valid, FetchProgress, StartReport, Vfs, VfsSetupParams, COMMAND_SEPARATOR,
};

pub struct VfsOff {
    params: VfsSetupParams,
}

impl VfsOff {
    pub fn new(params: VfsSetupParams) -> Self {
        Self { params }
    }

    fn full_path(&self, relative: &Path) -> std::path::PathBuf {
        self.params.local_path.join(relative)
    }
}

impl Vfs for VfsOff {
    fn mode(&self) -> VirtualFileMode {
        VirtualFileMode::Off
    }

    fn params(&self) -> &VfsSetupParams {
        &self.params
    }

    fn start_impl(&self, report: &mut StartReport) -> ExitResult<()> {
        report.installation_done = true;
        report.activation_done = true;
        report.connection_done = true;
        Ok(())
    }

    fn stop_impl(&self, _unregister: bool) {}

    fn update_metadata(
        &self,
        _path: &Path,
        _creation_time: SyncTime,
        _modification_time: SyncTime,
        _size: i64,
        _file_id: &NodeId,
    ) -> ExitResult<()> {
        Ok(())
    }

    fn create_placeholder(&self, _relative_path: &Path, _item: &SyncFileItem) -> ExitResult<()> {
        Ok(())
    }

    fn dehydrate_placeholder(&self, _path: &Path) -> ExitResult<()> {
        Ok(())
    }

    fn convert_to_placeholder(&self, _path: &Path, _item: &SyncFileItem) -> ExitResult<()> {
        Ok(())
    }

    fn update_fetch_status(
        &self,
        _tmp_path: &Path,
        _path: &Path,
        _received: i64,
    ) -> ExitResult<FetchProgress> {
        Ok(FetchProgress {
            canceled: false,
            finished: true,
        })
    }

    /// The one operation with a real effect in this mode: relay the
    /// status to the shell extension so overlay icons stay current.
    fn force_status(&self, path: &Path, status: &VfsStatus) -> ExitResult<()> {
        let full_path = self.full_path(path);
        check_if_path_is_valid(&full_path, true)?;

        if let Some(execute) = &self.params.execute_command {
            let sep = COMMAND_SEPARATOR;
            let command = format!(
                "STATUS{sep}{}{sep}{}{sep}{}{sep}{}",
                u8::from(status.is_syncing),
                status.progress,
                u8::from(status.is_hydrated),
                full_path.display()
            );
            debug!(%command, "notifying shell extension");
            execute(&command);
        }
        Ok(())
    }

    fn is_dehydrated_placeholder(&self, _path: &Path) -> ExitResult<bool> {
        Ok(false)
    }

    fn set_pin_state(&self, _path: &Path, _state: PinState) -> ExitResult<()> {
        Ok(())
    }

    /// Without placeholders every file is local by definition.
    fn pin_state(&self, _path: &Path) -> PinState {
        PinState::AlwaysLocal
    }

    fn status(&self, _path: &Path) -> ExitResult<VfsStatus> {
        Ok(VfsStatus {
            is_placeholder: false,
            is_hydrated: true,
            is_syncing: false,
            progress: 0,
        })
    }

    fn set_thumbnail(&self, _path: &Path, _picture: &[u8]) -> ExitResult<()> {
        Ok(())
    }

    fn set_app_exclude_list(&self, _app_list: &str) -> ExitResult<()> {
        Ok(())
    }

    fn fetching_app_list(&self) -> ExitResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn exclude(&self, _path: &Path) -> ExitResult<()> {
        Ok(())
    }

    fn is_excluded(&self, _path: &Path) -> bool {
        false
    }

    fn clear_file_attributes(&self, _path: &Path) {}

    fn hydrate(&self, _path: &Path) -> ExitResult<()> {
        Ok(())
    }

    fn dehydrate(&self, _path: &Path) -> ExitResult<()> {
        Ok(())
    }

    fn cancel_hydrate(&self, _path: &Path) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    use cumulus_core::{ExitCause, ExitInfo};

    fn params_for(root: &Path) -> VfsSetupParams {
        VfsSetupParams {
            sync_db_id: 1,
            local_path: root.to_path_buf(),
            ..Default::default()
        }
    }

    // Disabled mode reports every file as a real, hydrated,
    // non-syncing file, and placeholder mutations are accepted no-ops.
    #[test]
    fn disabled_mode_reports_plain_hydrated_files() {
        let tmp = TempDir::new().unwrap();
        let vfs = VfsOff::new(params_for(tmp.path()));

        let status = vfs.status(Path::new("any/file.txt")).unwrap();
        assert!(!status.is_placeholder);
        assert!(status.is_hydrated);
        assert!(!status.is_syncing);

        assert_eq!(vfs.pin_state(Path::new("any/file.txt")), PinState::AlwaysLocal);
        assert!(!vfs.is_dehydrated_placeholder(Path::new("any")).unwrap());

        let item = SyncFileItem::default();
        assert!(vfs.create_placeholder(Path::new("a.txt"), &item).is_ok());
        assert!(vfs.dehydrate_placeholder(Path::new("a.txt")).is_ok());
        assert!(vfs.hydrate(Path::new("a.txt")).is_ok());
    }

    #[test]
    fn convert_to_placeholder_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("hydrated.txt");
        fs::write(&file, b"content").unwrap();
        let vfs = VfsOff::new(params_for(tmp.path()));

        let item = SyncFileItem::default();
        assert!(vfs.convert_to_placeholder(Path::new("hydrated.txt"), &item).is_ok());
        assert!(vfs.convert_to_placeholder(Path::new("hydrated.txt"), &item).is_ok());
        assert_eq!(fs::read(&file).unwrap(), b"content");
    }

    #[test]
    fn inherited_is_settable_but_never_returned() {
        let tmp = TempDir::new().unwrap();
        let vfs = VfsOff::new(params_for(tmp.path()));

        assert!(vfs.set_pin_state(Path::new("folder/child.txt"), PinState::Inherited).is_ok());
        let resolved = vfs.pin_state(Path::new("folder/child.txt"));
        assert_ne!(resolved, PinState::Inherited);
        assert_eq!(resolved, PinState::AlwaysLocal);
    }

    #[test]
    fn force_status_notifies_shell_extension() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("doc.txt");
        fs::write(&file, b"x").unwrap();

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut params = params_for(tmp.path());
        params.execute_command = Some(Arc::new(move |cmd: &str| {
            sink.lock().unwrap().push(cmd.to_owned());
        }));
        let vfs = VfsOff::new(params);

        vfs.force_status(
            Path::new("doc.txt"),
            &VfsStatus {
                is_placeholder: false,
                is_hydrated: true,
                is_syncing: true,
                progress: 55,
            },
        )
        .unwrap();

        let commands = seen.lock().unwrap();
        assert_eq!(commands.len(), 1);
        let expected = format!("STATUS:1:55:1:{}", file.display());
        assert_eq!(commands[0], expected);
    }

    #[test]
    fn force_status_rejects_missing_file() {
        let tmp = TempDir::new().unwrap();
        let vfs = VfsOff::new(params_for(tmp.path()));

        let result = vfs.force_status(Path::new("gone.txt"), &VfsStatus::default());
        assert_eq!(result, Err(ExitInfo::system(ExitCause::NotFound)));
    }
}
