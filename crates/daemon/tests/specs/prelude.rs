//! Shared fixtures for keeld specs

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use predicates::str::contains;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A broker home: config file, data directory and backup store in a temp dir
pub struct Broker {
    dir: TempDir,
}

impl Broker {
    /// Single-node broker with two partitions and an ephemeral port
    pub fn empty() -> Self {
        let broker = Self {
            dir: TempDir::new().unwrap(),
        };
        broker.write_config(&format!(
            r#"
node_id = 1
data_dir = "{data}"
log_path = "{log}"
partitions = [1, 2]

[[cluster.members]]
id = 1
address = "127.0.0.1:0"

[raft]
heartbeat_interval = "20ms"
election_timeout = "100ms"

[backup]
store_dir = "{backups}"
"#,
            data = broker.data_dir().display(),
            log = broker.log_path().display(),
            backups = broker.backup_dir().display(),
        ));
        broker
    }

    pub fn write_config(&self, text: &str) {
        std::fs::write(self.config_path(), text).unwrap();
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("keel.toml")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("logs").join("keeld.log")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    /// keeld invocation with this broker's config
    pub fn keeld(&self) -> Keeld {
        let mut cmd = keeld();
        cmd.arg("--config").arg(self.config_path());
        Keeld { cmd }
    }
}

/// keeld without any config
pub fn keeld() -> Command {
    Command::cargo_bin("keeld").unwrap()
}

pub struct Keeld {
    cmd: Command,
}

impl Keeld {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> Assert {
        self.cmd.assert().success()
    }

    pub fn fails(mut self) -> Assert {
        self.cmd.assert().failure()
    }
}

pub trait AssertExt {
    fn stdout_has(self, text: &str) -> Self;
    fn stderr_has(self, text: &str) -> Self;
}

impl AssertExt for Assert {
    fn stdout_has(self, text: &str) -> Self {
        self.stdout(contains(text))
    }

    fn stderr_has(self, text: &str) -> Self {
        self.stderr(contains(text))
    }
}

/// Names of the entries directly inside `dir`
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
