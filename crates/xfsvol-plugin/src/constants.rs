//! Plugin configuration constants.

/// Socket the Docker daemon discovers the plugin through.
pub const DEFAULT_SOCKET_ADDRESS: &str = "/run/docker/plugins/xfsvol.sock";

/// XFS-mounted directory volumes are created in.
pub const DEFAULT_HOST_MOUNTPOINT: &str = "/mnt/xfs/volumes";

/// Quota applied when a create request carries no `size` option.
pub const DEFAULT_SIZE: &str = "512M";

/// Content type of every plugin API response.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";

/// Largest request body accepted on the plugin socket.
pub const MAX_REQUEST_BODY: usize = 1024 * 1024;

/// Largest request line or header line accepted.
pub const MAX_HEADER_LINE: usize = 8 * 1024;
