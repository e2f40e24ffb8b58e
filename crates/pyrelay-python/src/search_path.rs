//! Module search order
//!
//! The embedded interpreter looks for modules in this order:
//! 1. the project-local `Python/site-packages` directory, if present
//! 2. the built-in package directory shipped with the host
//! 3. the user's extra site-packages from the settings
//! 4. the interpreter's own default path
//!
//! Earlier entries shadow later ones, so project and user overrides win over
//! built-ins. The worker gets entries 1-3 through `PYTHONPATH`.

use pyrelay_config::ExecutableResolver;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Project-local module directory, relative to the project root
pub const PROJECT_SITE_PACKAGES: &str = "Python/site-packages";

#[derive(Debug, Clone, Default)]
pub struct SearchPathLayout {
    pub project_root: Option<PathBuf>,
    pub builtin_site_packages: Option<PathBuf>,
    pub user_site_packages: Vec<String>,
}

impl SearchPathLayout {
    /// Directories placed ahead of the interpreter defaults, deduplicated
    pub fn extra_dirs(&self) -> Vec<String> {
        let base = self
            .project_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let resolver = ExecutableResolver::new(&base);

        let mut dirs = Vec::new();
        if let Some(root) = &self.project_root {
            let local = root.join(PROJECT_SITE_PACKAGES);
            if local.is_dir() {
                dirs.push(path_string(&resolver.absolutize(&local)));
            }
        }
        if let Some(builtin) = &self.builtin_site_packages {
            dirs.push(path_string(&resolver.absolutize(builtin)));
        }
        for user in &self.user_site_packages {
            let trimmed = user.trim();
            if !trimmed.is_empty() {
                dirs.push(path_string(&resolver.absolutize(Path::new(trimmed))));
            }
        }
        dedupe(dirs)
    }
}

/// `extra` followed by `defaults`, keeping the first occurrence of each entry
pub fn merge_search_path(extra: &[String], defaults: &[String]) -> Vec<String> {
    dedupe(extra.iter().chain(defaults).cloned().collect())
}

/// The file `module` would be imported from, given `search_path`
///
/// Follows the path finder: within one entry a package (`name/__init__.py`)
/// wins over a module (`name.py`), and a directory without `__init__.py` only
/// counts as a namespace package when no entry has anything better. Dotted
/// names resolve their first component, then search only inside that
/// package. A namespace package resolves to its first directory.
pub fn locate_module(search_path: &[String], module: &str) -> Option<PathBuf> {
    let mut parts = module.split('.');
    let top = parts.next().filter(|part| !part.is_empty())?;

    let roots: Vec<PathBuf> = search_path.iter().map(PathBuf::from).collect();
    let (mut origin, mut locations) = find_spec(&roots, top)?;
    for part in parts {
        // A plain module has no submodules
        if part.is_empty() || locations.is_empty() {
            return None;
        }
        (origin, locations) = find_spec(&locations, part)?;
    }
    Some(origin)
}

/// Origin of `name` in `dirs` and the locations its submodules are searched in
fn find_spec(dirs: &[PathBuf], name: &str) -> Option<(PathBuf, Vec<PathBuf>)> {
    let mut portions = Vec::new();
    for dir in dirs {
        let package = dir.join(name);
        let init = package.join("__init__.py");
        if init.is_file() {
            return Some((init, vec![package]));
        }
        let module = dir.join(format!("{}.py", name));
        if module.is_file() {
            return Some((module, Vec::new()));
        }
        if package.is_dir() {
            portions.push(package);
        }
    }
    let first = portions.first()?.clone();
    Some((first, portions))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn dedupe(entries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            assert!(fs::create_dir_all(parent).is_ok());
        }
        assert!(fs::write(path, "").is_ok());
    }

    #[test]
    fn test_extra_dirs_order_and_dedupe() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let root = temp_dir.path().to_path_buf();
        assert!(fs::create_dir_all(root.join(PROJECT_SITE_PACKAGES)).is_ok());

        let layout = SearchPathLayout {
            project_root: Some(root.clone()),
            builtin_site_packages: Some(root.join("builtin")),
            user_site_packages: vec![
                "libs".to_string(),
                "./libs".to_string(),
                "  ".to_string(),
                "/opt/shared".to_string(),
            ],
        };

        let dirs = layout.extra_dirs();
        assert_eq!(
            dirs,
            vec![
                path_string(&root.join("Python").join("site-packages")),
                path_string(&root.join("builtin")),
                path_string(&root.join("libs")),
                "/opt/shared".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_project_dir_is_skipped() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let layout = SearchPathLayout {
            project_root: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(layout.extra_dirs().is_empty());
    }

    #[test]
    fn test_merge_keeps_first_occurrence() {
        let extra = vec!["/a".to_string(), "/b".to_string()];
        let defaults = vec!["/b".to_string(), "/usr/lib/python3.12".to_string()];
        assert_eq!(
            merge_search_path(&extra, &defaults),
            vec!["/a", "/b", "/usr/lib/python3.12"]
        );
    }

    #[test]
    fn test_locate_module_prefers_earlier_entries() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        touch(&first.join("tools").join("__init__.py"));
        touch(&second.join("tools.py"));

        let path = vec![path_string(&first), path_string(&second)];
        assert_eq!(
            locate_module(&path, "tools"),
            Some(first.join("tools").join("__init__.py"))
        );
        assert_eq!(locate_module(&path, "absent"), None);
    }

    #[test]
    fn test_package_wins_over_module_in_same_dir() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let dir = temp_dir.path().join("d");
        touch(&dir.join("tools.py"));
        touch(&dir.join("tools").join("__init__.py"));

        let path = vec![path_string(&dir)];
        assert_eq!(
            locate_module(&path, "tools"),
            Some(dir.join("tools").join("__init__.py"))
        );
    }

    #[test]
    fn test_submodules_resolve_inside_the_found_package() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        touch(&first.join("tools").join("__init__.py"));
        touch(&first.join("tools").join("export").join("__init__.py"));
        touch(&second.join("tools").join("__init__.py"));
        touch(&second.join("tools").join("render.py"));
        touch(&second.join("tools").join("export").join("fbx.py"));

        let path = vec![path_string(&first), path_string(&second)];
        assert_eq!(locate_module(&path, "tools.render"), None);
        assert_eq!(locate_module(&path, "tools.export.fbx"), None);
        assert_eq!(
            locate_module(&path, "tools.export"),
            Some(first.join("tools").join("export").join("__init__.py"))
        );
    }

    #[test]
    fn test_plain_module_has_no_submodules() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let dir = temp_dir.path().join("d");
        touch(&dir.join("tools.py"));
        touch(&dir.join("tools").join("render.py"));

        let path = vec![path_string(&dir)];
        assert_eq!(locate_module(&path, "tools"), Some(dir.join("tools.py")));
        assert_eq!(locate_module(&path, "tools.render"), None);
    }

    #[test]
    fn test_namespace_package_spans_entries() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        touch(&first.join("plugins").join("scene.py"));
        touch(&second.join("plugins").join("assets.py"));

        let path = vec![path_string(&first), path_string(&second)];
        assert_eq!(locate_module(&path, "plugins"), Some(first.join("plugins")));
        assert_eq!(
            locate_module(&path, "plugins.assets"),
            Some(second.join("plugins").join("assets.py"))
        );
        assert_eq!(locate_module(&path, "plugins."), None);
        assert_eq!(locate_module(&path, ""), None);
    }
}
