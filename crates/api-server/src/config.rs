//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = ".task-tracker";
const DEFAULT_TASKS_FILE: &str = "task_list.json";
const DEFAULT_ADDR: &str = "0.0.0.0:8081";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub tasks_file: PathBuf,
    pub addr: SocketAddr,
}

impl ServerConfig {
    /// Read `TASK_TRACKER_DATA_DIR`, `TASK_TRACKER_FILE` and `TASK_TRACKER_ADDR`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env_string(&lookup, "TASK_TRACKER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let file = env_string(&lookup, "TASK_TRACKER_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TASKS_FILE));
        let tasks_file = data_dir.join(file);

        let addr = match env_string(&lookup, "TASK_TRACKER_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid TASK_TRACKER_ADDR {:?}, using {}", raw, DEFAULT_ADDR);
                default_addr()
            }),
            None => default_addr(),
        };

        Self {
            data_dir,
            tasks_file,
            addr,
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn env_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
