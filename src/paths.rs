use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

const APP_DIR_NAME: &str = "clonehero-scores";

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the per-user data directory: `<local data>/clonehero-scores/`.
/// Falls back to the executable directory when the platform has none.
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| get_exe_dir().clone())
}

/// Returns the logs directory: `<data dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_data_dir().join("logs")
}

/// Returns the downloaded language data directory: `<data dir>/tessdata/`
pub fn get_tessdata_dir() -> PathBuf {
    get_data_dir().join("tessdata")
}

/// Returns the default score log: `<data dir>/scores.csv`
pub fn default_score_log() -> PathBuf {
    get_data_dir().join("scores.csv")
}

/// Returns where Clone Hero saves screenshots: `<Documents>/Clone Hero/Screenshots/`
pub fn default_screenshots_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Clone Hero")
        .join("Screenshots")
}

/// Candidate config files in lookup order: next to the executable, then
/// the working directory.
pub fn config_candidates() -> Vec<PathBuf> {
    vec![get_exe_dir().join("config.json"), PathBuf::from("config.json")]
}

/// Normalizes a configured path: backslashes become separators, then the
/// result is made absolute and lexically clean.
///
/// Only for paths typed by a user. Paths reported by the filesystem go
/// through [`clean_path`] so their bytes survive untouched.
pub fn normalize_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy().replace('\\', "/");
    clean_path(Path::new(&raw))
}

/// Makes a path absolute and lexically clean without reinterpreting any
/// bytes of its components.
///
/// `.` segments are dropped and `..` segments pop their parent. Symlinks
/// are not resolved and the path does not need to exist.
pub fn clean_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root keeps the root
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Resolves a file path to the key the watcher dedups on: the parent
/// directory with symlinks resolved, joined with the file name as given.
///
/// Falls back to [`clean_path`] when the parent cannot be resolved.
pub fn resolve_path(path: &Path) -> PathBuf {
    let cleaned = clean_path(path);
    let (Some(parent), Some(name)) = (cleaned.parent(), cleaned.file_name()) else {
        return cleaned;
    };
    match parent.canonicalize() {
        Ok(parent) => parent.join(name),
        Err(_) => cleaned,
    }
}
