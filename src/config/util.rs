//! Site root discovery.

use std::path::{Path, PathBuf};

/// Files and directories that mark a Hugo site root, in Hugo's lookup order.
const HUGO_CONFIG_NAMES: &[&str] = &[
    "hugo.toml",
    "hugo.yaml",
    "hugo.yml",
    "hugo.json",
    "config.toml",
    "config.yaml",
    "config.yml",
    "config.json",
    "config/_default",
];

/// Whether `dir` looks like the root of a Hugo site.
pub fn is_site_root(dir: &Path) -> bool {
    HUGO_CONFIG_NAMES.iter().any(|name| dir.join(name).exists())
}

/// Find the site root by searching upward from `start`.
///
/// ```text
/// /home/user/site/content/posts/  ← start
/// /home/user/site/hugo.toml       ← found, root is /home/user/site
/// ```
pub fn find_site_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| is_site_root(dir))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_site_root_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("content/posts");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("hugo.toml"), "title = 'x'").unwrap();

        assert_eq!(find_site_root(&nested).as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_config_directory_marks_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("config/_default")).unwrap();
        assert!(is_site_root(dir.path()));
    }

    #[test]
    fn test_no_site_root() {
        let dir = TempDir::new().unwrap();
        assert!(!is_site_root(dir.path()));
    }
}
