use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub index_root: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::from_data_dir(discover_data_dir())
    }

    /// Lays out every directory under `data_dir`, honouring the
    /// `MEDIASSIST_DOCUMENTS_DIR` and `MEDIASSIST_PERSIST_DIR` overrides.
    pub fn from_data_dir(data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let documents_dir = env::var("MEDIASSIST_DOCUMENTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("documents"));
        let index_root = env::var("MEDIASSIST_PERSIST_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("vector_index"));
        let db_path = data_dir.join("mediassist.db");

        for dir in [&data_dir, &log_dir, &documents_dir, &index_root] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            documents_dir,
            index_root,
            db_path,
        }
    }

    /// On-disk location of one collection's index.
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.index_root.join(collection)
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("MEDIASSIST_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("MediAssist");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("MediAssist");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    Path::new(&xdg).join("mediassist")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
