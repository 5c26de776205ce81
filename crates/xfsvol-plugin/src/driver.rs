//! Volume plugin driver.
//!
//! Maps each plugin endpoint onto the [`VolumeManager`]. The manager is not
//! safe for concurrent use, so every call that touches it runs under one
//! coarse lock; requests are therefore serialized.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use xfsvol_core::{ManagerConfig, Volume, VolumeManager, format_human_size, parse_human_size};

use crate::protocol::{
    ActivateResponse, CapabilitiesResponse, Capability, CreateRequest, EmptyResponse,
    ErrorResponse, GetResponse, ListResponse, MountRequest, MountpointResponse, NameRequest,
    VolumeInfo,
};

/// Driver settings, usually taken from the daemon's flags.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// XFS-mounted directory volumes live in.
    pub host_mountpoint: PathBuf,
    /// Human size applied when a create request has no `size` option.
    pub default_size: String,
    /// Lower bound for newly assigned project ids.
    pub starting_project_id: Option<u32>,
}

/// Encoded response: HTTP status plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value)
            .unwrap_or_else(|_| br#"{"Err":"couldn't encode response"}"#.to_vec());
        Self { status, body }
    }

    fn error(status: u16, message: String) -> Self {
        Self::json(status, &ErrorResponse { err: message })
    }
}

pub struct Driver {
    default_size: u64,
    manager: Mutex<VolumeManager>,
}

impl Driver {
    /// Validate the configuration and open the volume root on the kernel
    /// quota backend.
    pub fn new(config: DriverConfig) -> Result<Self> {
        if config.host_mountpoint.as_os_str().is_empty() {
            bail!("host mountpoint must be specified");
        }
        if config.default_size.trim().is_empty() {
            bail!("default size must be specified");
        }

        let default_size = parse_human_size(&config.default_size)
            .with_context(|| format!("couldn't parse default size {}", config.default_size))?;

        let mut manager_config = ManagerConfig::new(&config.host_mountpoint);
        manager_config.starting_project_id = config.starting_project_id;

        let manager = VolumeManager::new(manager_config).with_context(|| {
            format!(
                "couldn't initiate volume manager at {}",
                config.host_mountpoint.display()
            )
        })?;

        info!(
            root = %manager.root().display(),
            default_size,
            "driver initiated"
        );
        Ok(Self::with_manager(manager, default_size))
    }

    /// Wrap an already opened manager.
    pub fn with_manager(manager: VolumeManager, default_size: u64) -> Self {
        Self {
            default_size,
            manager: Mutex::new(manager),
        }
    }

    pub fn default_size(&self) -> u64 {
        self.default_size
    }

    pub fn create(&self, req: CreateRequest) -> Result<EmptyResponse> {
        let (size, inodes) = self.create_options(&req)?;

        let mut manager = self.manager.lock();
        debug!(name = %req.name, size, ?inodes, "starting creation");
        let path = manager
            .create(&req.name, size, inodes)
            .with_context(|| format!("manager failed to create volume {}", req.name))?;

        info!(name = %req.name, path = %path.display(), "finished creating volume");
        Ok(EmptyResponse::default())
    }

    pub fn remove(&self, req: NameRequest) -> Result<EmptyResponse> {
        let mut manager = self.manager.lock();
        manager
            .delete(&req.name)
            .with_context(|| format!("manager failed to delete volume named {}", req.name))?;

        info!(name = %req.name, "volume removed");
        Ok(EmptyResponse::default())
    }

    pub fn get(&self, req: NameRequest) -> Result<GetResponse> {
        let volume = self.find(&req.name)?;
        debug!(name = %req.name, "finished retrieving volume");

        let mut info = volume_info(&volume);
        info.status = Some(HashMap::from([
            ("size".to_string(), format_human_size(volume.size).into()),
            ("inodes".to_string(), volume.inodes.into()),
        ]));
        Ok(GetResponse { volume: info })
    }

    pub fn list(&self) -> Result<ListResponse> {
        let manager = self.manager.lock();
        let volumes = manager
            .list()
            .context("manager failed to list volumes")?;

        debug!(count = volumes.len(), "listed volumes");
        Ok(ListResponse {
            volumes: volumes.iter().map(volume_info).collect(),
        })
    }

    pub fn path(&self, req: NameRequest) -> Result<MountpointResponse> {
        let volume = self.find(&req.name)?;
        debug!(name = %req.name, path = %volume.path.display(), "path retrieved");
        Ok(MountpointResponse {
            mountpoint: volume.path.display().to_string(),
        })
    }

    /// Volumes are plain directories on an already mounted filesystem, so
    /// mounting only resolves the path.
    pub fn mount(&self, req: MountRequest) -> Result<MountpointResponse> {
        let volume = self.find(&req.name)?;
        info!(name = %req.name, id = %req.id, "finished mounting volume");
        Ok(MountpointResponse {
            mountpoint: volume.path.display().to_string(),
        })
    }

    pub fn unmount(&self, req: MountRequest) -> Result<EmptyResponse> {
        info!(name = %req.name, id = %req.id, "finished unmounting volume");
        Ok(EmptyResponse::default())
    }

    pub fn capabilities(&self) -> CapabilitiesResponse {
        CapabilitiesResponse {
            capabilities: Capability {
                scope: "global".to_string(),
            },
        }
    }

    /// Route one plugin request. Handler errors become 500 with the full
    /// cause chain; unknown endpoints become 404.
    pub fn handle(&self, endpoint: &str, body: &[u8]) -> Reply {
        let result = match endpoint {
            "/Plugin.Activate" => encode(ActivateResponse::volume_driver()),
            "/VolumeDriver.Create" => call(body, |req| self.create(req)),
            "/VolumeDriver.Remove" => call(body, |req| self.remove(req)),
            "/VolumeDriver.Get" => call(body, |req| self.get(req)),
            "/VolumeDriver.List" => self.list().and_then(encode),
            "/VolumeDriver.Path" => call(body, |req| self.path(req)),
            "/VolumeDriver.Mount" => call(body, |req| self.mount(req)),
            "/VolumeDriver.Unmount" => call(body, |req| self.unmount(req)),
            "/VolumeDriver.Capabilities" => encode(self.capabilities()),
            _ => {
                debug!(endpoint, "unknown endpoint");
                return Reply::error(404, format!("unknown endpoint {endpoint}"));
            }
        };

        match result {
            Ok(value) => Reply::json(200, &value),
            Err(e) => {
                let message = format!("{e:#}");
                warn!(endpoint, error = %message, "request failed");
                Reply::error(500, message)
            }
        }
    }

    fn find(&self, name: &str) -> Result<Volume> {
        let manager = self.manager.lock();
        match manager
            .get(name)
            .with_context(|| format!("manager failed to retrieve volume named {name}"))?
        {
            Some(volume) => Ok(volume),
            None => bail!("volume {name} not found"),
        }
    }

    fn create_options(&self, req: &CreateRequest) -> Result<(u64, Option<u64>)> {
        let mut size = self.default_size;
        let mut inodes = None;

        for (key, value) in req.opts.iter().flatten() {
            match key.as_str() {
                "size" => {
                    size = parse_human_size(value).with_context(|| {
                        format!("couldn't convert specified size [{value}] into bytes")
                    })?;
                }
                "inodes" => {
                    let count = value.trim().parse::<u64>().with_context(|| {
                        format!("couldn't convert specified inodes [{value}] into a count")
                    })?;
                    inodes = Some(count);
                }
                other => debug!(name = %req.name, option = other, "ignoring unknown option"),
            }
        }

        if !has_option(req, "size") {
            debug!(name = %req.name, "no size opt found, using default");
        }
        Ok((size, inodes))
    }
}

fn has_option(req: &CreateRequest, key: &str) -> bool {
    req.opts.as_ref().is_some_and(|opts| opts.contains_key(key))
}

fn volume_info(volume: &Volume) -> VolumeInfo {
    VolumeInfo {
        name: volume.name.clone(),
        mountpoint: volume.path.display().to_string(),
        status: None,
    }
}

fn encode<T: Serialize>(value: T) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("couldn't encode response")
}

/// Decode the request body, run the handler, encode its response.
/// An empty body decodes as `{}`.
fn call<Req, Resp>(body: &[u8], handler: impl FnOnce(Req) -> Result<Resp>) -> Result<serde_json::Value>
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    let req = serde_json::from_slice(body).context("couldn't decode request body")?;
    handler(req).and_then(encode)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tempfile::TempDir;
    use xfsvol_core::MemoryBackend;

    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn driver() -> (TempDir, Driver) {
        let dir = TempDir::new().unwrap();
        let manager = VolumeManager::with_backend(
            ManagerConfig::new(dir.path()),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap();
        (dir, Driver::with_manager(manager, 512 * MIB))
    }

    fn request(driver: &Driver, endpoint: &str, body: Value) -> (u16, Value) {
        let reply = driver.handle(endpoint, body.to_string().as_bytes());
        (reply.status, serde_json::from_slice(&reply.body).unwrap())
    }

    #[test]
    fn test_activate() {
        let (_dir, driver) = driver();
        let reply = driver.handle("/Plugin.Activate", b"");
        assert_eq!(reply.status, 200);
        let body: Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body, json!({"Implements": ["VolumeDriver"]}));
    }

    #[test]
    fn test_create_with_size_option() {
        let (_dir, driver) = driver();
        let (status, body) = request(
            &driver,
            "/VolumeDriver.Create",
            json!({"Name": "db", "Opts": {"size": "10M", "inodes": "100"}}),
        );
        assert_eq!(status, 200, "{body}");
        assert_eq!(body, json!({}));

        let (status, body) = request(&driver, "/VolumeDriver.Get", json!({"Name": "db"}));
        assert_eq!(status, 200);
        assert_eq!(body["Volume"]["Name"], "db");
        assert_eq!(body["Volume"]["Status"]["size"], "10M");
        assert_eq!(body["Volume"]["Status"]["inodes"], 100);
    }

    #[test]
    fn test_create_uses_default_size() {
        let (_dir, driver) = driver();
        let (status, _) = request(&driver, "/VolumeDriver.Create", json!({"Name": "plain"}));
        assert_eq!(status, 200);

        let manager = driver.manager.lock();
        let volume = manager.get("plain").unwrap().unwrap();
        assert_eq!(volume.size, 512 * MIB);
        assert_eq!(volume.inodes, 0);
    }

    #[test]
    fn test_create_rejects_bad_size() {
        let (_dir, driver) = driver();
        let (status, body) = request(
            &driver,
            "/VolumeDriver.Create",
            json!({"Name": "v", "Opts": {"size": "lots"}}),
        );
        assert_eq!(status, 500);
        let err = body["Err"].as_str().unwrap();
        assert!(err.contains("couldn't convert specified size [lots]"), "{err}");

        // nothing was created
        assert!(driver.list().unwrap().volumes.is_empty());
    }

    #[test]
    fn test_create_ignores_unknown_options() {
        let (_dir, driver) = driver();
        let (status, _) = request(
            &driver,
            "/VolumeDriver.Create",
            json!({"Name": "v", "Opts": {"o": "bind"}}),
        );
        assert_eq!(status, 200);
    }

    #[test]
    fn test_create_twice_conflicts() {
        let (_dir, driver) = driver();
        request(&driver, "/VolumeDriver.Create", json!({"Name": "v"}));
        let (status, body) = request(&driver, "/VolumeDriver.Create", json!({"Name": "v"}));
        assert_eq!(status, 500);
        let err = body["Err"].as_str().unwrap();
        assert!(err.contains("manager failed to create volume v"), "{err}");
        assert!(err.contains("already exists"), "{err}");
    }

    #[test]
    fn test_list_path_mount() {
        let (dir, driver) = driver();
        for name in ["a", "b"] {
            request(&driver, "/VolumeDriver.Create", json!({"Name": name}));
        }

        let (status, body) = request(&driver, "/VolumeDriver.List", json!({}));
        assert_eq!(status, 200);
        let mut names: Vec<&str> = body["Volumes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["Name"].as_str().unwrap())
            .collect();
        names.sort_unstable();
        assert_eq!(names, ["a", "b"]);

        let root = dir.path().canonicalize().unwrap();
        let expected = root.join("a").display().to_string();

        let (_, body) = request(&driver, "/VolumeDriver.Path", json!({"Name": "a"}));
        assert_eq!(body["Mountpoint"], expected.as_str());

        let (_, body) = request(
            &driver,
            "/VolumeDriver.Mount",
            json!({"Name": "a", "ID": "container-1"}),
        );
        assert_eq!(body["Mountpoint"], expected.as_str());

        let (status, body) = request(
            &driver,
            "/VolumeDriver.Unmount",
            json!({"Name": "a", "ID": "container-1"}),
        );
        assert_eq!(status, 200);
        assert_eq!(body, json!({}));
    }

    #[test]
    fn test_list_accepts_empty_body() {
        let (_dir, driver) = driver();
        let reply = driver.handle("/VolumeDriver.List", b"");
        assert_eq!(reply.status, 200);
        let body: Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body, json!({"Volumes": []}));
    }

    #[test]
    fn test_missing_volume_is_error() {
        let (_dir, driver) = driver();
        for endpoint in ["/VolumeDriver.Get", "/VolumeDriver.Path", "/VolumeDriver.Mount"] {
            let (status, body) = request(&driver, endpoint, json!({"Name": "ghost"}));
            assert_eq!(status, 500, "{endpoint}");
            assert_eq!(body["Err"], "volume ghost not found", "{endpoint}");
        }
    }

    #[test]
    fn test_remove() {
        let (dir, driver) = driver();
        request(&driver, "/VolumeDriver.Create", json!({"Name": "v"}));

        let (status, _) = request(&driver, "/VolumeDriver.Remove", json!({"Name": "v"}));
        assert_eq!(status, 200);
        assert!(!dir.path().join("v").exists());

        let (status, body) = request(&driver, "/VolumeDriver.Remove", json!({"Name": "v"}));
        assert_eq!(status, 500);
        assert!(body["Err"].as_str().unwrap().contains("not found"));
    }

    #[test]
    fn test_capabilities_global() {
        let (_dir, driver) = driver();
        let (status, body) = request(&driver, "/VolumeDriver.Capabilities", json!({}));
        assert_eq!(status, 200);
        assert_eq!(body, json!({"Capabilities": {"Scope": "global"}}));
    }

    #[test]
    fn test_unknown_endpoint() {
        let (_dir, driver) = driver();
        let (status, body) = request(&driver, "/VolumeDriver.Snapshot", json!({}));
        assert_eq!(status, 404);
        assert!(body["Err"].as_str().unwrap().contains("unknown endpoint"));
    }

    #[test]
    fn test_malformed_body() {
        let (_dir, driver) = driver();
        let reply = driver.handle("/VolumeDriver.Create", b"{not json");
        assert_eq!(reply.status, 500);
        let body: Value = serde_json::from_slice(&reply.body).unwrap();
        assert!(body["Err"].as_str().unwrap().contains("couldn't decode request body"));
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let err = Driver::new(DriverConfig {
            host_mountpoint: PathBuf::new(),
            default_size: "512M".into(),
            starting_project_id: None,
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("host mountpoint"));

        let dir = TempDir::new().unwrap();
        let err = Driver::new(DriverConfig {
            host_mountpoint: dir.path().to_path_buf(),
            default_size: "huge".into(),
            starting_project_id: None,
        })
        .err()
        .unwrap();
        assert!(format!("{err:#}").contains("couldn't parse default size huge"));
    }
}
