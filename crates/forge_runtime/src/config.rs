//! Instance configuration types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Bind mount of a host directory into an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host path to mount
    pub source: PathBuf,
    /// Container path to mount to
    pub target: String,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    pub fn new(source: PathBuf, target: impl Into<String>) -> Self {
        Self {
            source,
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// How to create and expose one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Instance name
    pub name: String,
    /// Port the application listens on inside the instance
    pub container_port: u16,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Volume mounts
    pub mounts: Vec<MountConfig>,
    /// Working directory inside the instance
    pub workdir: Option<String>,
    /// Host address reported in endpoints
    pub host: String,
}

impl InstanceSpec {
    pub fn new(name: impl Into<String>, container_port: u16) -> Self {
        Self {
            name: name.into(),
            container_port,
            env: HashMap::new(),
            mounts: Vec::new(),
            workdir: None,
            host: "localhost".to_string(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Docker-style port key, e.g. `3000/tcp`.
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }

    /// Environment rendered as `KEY=value` pairs.
    pub fn env_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_spec_builder() {
        let spec = InstanceSpec::new("sandbox-1", 3000)
            .env("NODE_ENV", "development")
            .env("VITE_HOST", "0.0.0.0")
            .workdir("/app")
            .mount(MountConfig::new(PathBuf::from("/tmp/project"), "/app"));

        assert_eq!(spec.port_key(), "3000/tcp");
        assert_eq!(spec.workdir.as_deref(), Some("/app"));
        assert_eq!(
            spec.env_pairs(),
            vec!["NODE_ENV=development".to_string(), "VITE_HOST=0.0.0.0".to_string()]
        );
        assert_eq!(spec.mounts.len(), 1);
        assert!(!spec.mounts[0].read_only);
    }

    #[test]
    fn test_mount_config() {
        let mount = MountConfig::new(PathBuf::from("/host/path"), "/container/path").read_only();

        assert!(mount.read_only);
        assert_eq!(mount.target, "/container/path");
    }
}
