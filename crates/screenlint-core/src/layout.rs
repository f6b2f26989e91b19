//! On-disk layout of exploration output
//!
//! `<base>/<userId>/<packageName>/<testRunId>/files/states/`

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Subdirectory the exploration tool writes to
pub const FILES_DIR: &str = "files";

/// Subdirectory holding `screen_<token>.png` / `state_<token>.json` pairs
pub const STATES_DIR: &str = "states";

/// Directory convention rooted at a storage base
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base: PathBuf,
}

impl StorageLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Output directory handed to the exploration tool
    pub fn run_output_dir(&self, user_id: &str, package_name: &str, test_run_id: Uuid) -> PathBuf {
        self.base
            .join(user_id)
            .join(package_name)
            .join(test_run_id.to_string())
            .join(FILES_DIR)
    }

    pub fn states_dir(&self, user_id: &str, package_name: &str, test_run_id: Uuid) -> PathBuf {
        self.run_output_dir(user_id, package_name, test_run_id)
            .join(STATES_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_dir_convention() {
        let layout = StorageLayout::new("/data");
        let run = Uuid::nil();
        let dir = layout.states_dir("user-1", "com.example.app", run);
        assert_eq!(
            dir,
            PathBuf::from(format!(
                "/data/user-1/com.example.app/{}/files/states",
                run
            ))
        );
    }

    #[test]
    fn test_output_dir_is_parent_of_states() {
        let layout = StorageLayout::new("base");
        let run = Uuid::new_v4();
        let out = layout.run_output_dir("u", "p", run);
        assert_eq!(layout.states_dir("u", "p", run).parent(), Some(out.as_path()));
    }
}
