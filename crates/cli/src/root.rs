//! Project root discovery.
//!
//! The backend directory is resolved relative to the project root, never
//! relative to the caller's current directory. Without `PROJECT_ROOT` the
//! root is the nearest ancestor of the executable holding a compose file.

use std::path::{Path, PathBuf};

/// File names compose looks for, in its own lookup order.
pub const COMPOSE_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Nearest ancestor of `exe`'s directory containing a compose file, or
/// the executable's own directory if none does.
pub fn locate_project_root(exe: &Path) -> PathBuf {
    let start = exe.parent().unwrap_or(exe);
    start
        .ancestors()
        .find(|dir| has_compose_file(dir))
        .unwrap_or(start)
        .to_path_buf()
}

pub fn has_compose_file(dir: &Path) -> bool {
    COMPOSE_FILE_NAMES
        .iter()
        .any(|name| dir.join(name).is_file())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn finds_compose_file_above_build_output() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").expect("write");
        let bin_dir = dir.path().join("target").join("release");
        fs::create_dir_all(&bin_dir).expect("mkdir");

        let root = locate_project_root(&bin_dir.join("testrig"));
        assert_eq!(root, dir.path());
    }

    #[test]
    fn falls_back_to_executable_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let bin_dir = dir.path().join("bin");
        fs::create_dir_all(&bin_dir).expect("mkdir");

        // Only the temp dir's own ancestors are searched; none of them is
        // expected to carry a compose file on a test machine.
        let root = locate_project_root(&bin_dir.join("testrig"));
        if !root.ancestors().any(has_compose_file) {
            assert_eq!(root, bin_dir);
        }
    }

    #[test]
    fn nearest_compose_file_wins() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("compose.yaml"), "").expect("write");
        let nested = dir.path().join("tools");
        fs::create_dir_all(nested.join("bin")).expect("mkdir");
        fs::write(nested.join("docker-compose.yaml"), "").expect("write");

        assert_eq!(locate_project_root(&nested.join("bin").join("testrig")), nested);
    }
}
