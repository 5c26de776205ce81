//! Docker volume plugin protocol messages.
//!
//! Field names follow the plugin API exactly (`Name`, `Opts`, `Mountpoint`,
//! `Err`, ...). Requests tolerate missing optional fields; responses omit
//! nothing the API requires.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `/VolumeDriver.Create` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Option<HashMap<String, String>>,
}

/// Request naming one volume (`Remove`, `Get`, `Path`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

/// `/VolumeDriver.Mount` and `/VolumeDriver.Unmount` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    /// Caller id; one volume can be mounted by several containers.
    #[serde(rename = "ID", default)]
    pub id: String,
}

/// A volume as reported to the runtime.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    pub volume: VolumeInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<VolumeInfo>,
}

/// `/VolumeDriver.Path` and `/VolumeDriver.Mount` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountpointResponse {
    pub mountpoint: String,
}

/// Response with no payload (`Create`, `Remove`, `Unmount`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmptyResponse {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capability {
    pub scope: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capability,
}

/// `/Plugin.Activate` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

impl ActivateResponse {
    pub fn volume_driver() -> Self {
        Self {
            implements: vec!["VolumeDriver".to_string()],
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub err: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_opts_optional() {
        let req: CreateRequest = serde_json::from_str(r#"{"Name":"v"}"#).unwrap();
        assert_eq!(req.name, "v");
        assert!(req.opts.is_none());

        let req: CreateRequest =
            serde_json::from_str(r#"{"Name":"v","Opts":null}"#).unwrap();
        assert!(req.opts.is_none());

        let req: CreateRequest =
            serde_json::from_str(r#"{"Name":"v","Opts":{"size":"10M"}}"#).unwrap();
        assert_eq!(req.opts.unwrap()["size"], "10M");
    }

    #[test]
    fn test_mount_request_id_field() {
        let req: MountRequest =
            serde_json::from_str(r#"{"Name":"v","ID":"abc123"}"#).unwrap();
        assert_eq!(req.id, "abc123");
    }

    #[test]
    fn test_response_field_names() {
        let json = serde_json::to_value(GetResponse {
            volume: VolumeInfo {
                name: "v".into(),
                mountpoint: "/mnt/v".into(),
                status: None,
            },
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Volume": {"Name": "v", "Mountpoint": "/mnt/v"}})
        );

        let json = serde_json::to_value(ErrorResponse { err: "boom".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"Err": "boom"}));

        let json = serde_json::to_value(ActivateResponse::volume_driver()).unwrap();
        assert_eq!(json, serde_json::json!({"Implements": ["VolumeDriver"]}));
    }
}
