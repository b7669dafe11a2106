use std::time::Duration;

/// Remote accepts the operation (probe) or applied it (upload).
pub const STATUS_NO_CONTENT: u16 = 204;

/// Scan results are available in the response body.
pub const STATUS_OK: u16 = 200;

/// Upload rejected: malformed request or mismatched OTA protocol.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Insufficient permission.
pub const STATUS_FORBIDDEN: u16 = 403;

/// Bad or misconfigured remote location.
pub const STATUS_NOT_FOUND: u16 = 404;

/// Another operation is already in progress on the device.
pub const STATUS_CONFLICT: u16 = 409;

/// Remote operational failure; the body carries the device's detail.
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Multipart field name carrying the firmware image.
pub const UPLOAD_FIELD: &str = "upload";

/// Interval between OTA capability probes.
pub const OTA_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// AP scan polling interval while a scan is running on the device.
pub const SCAN_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// AP scan polling interval once results are in (or the device misbehaves).
pub const SCAN_IDLE_INTERVAL: Duration = Duration::from_secs(10);

/// Builds the OTA upload URL: `<base>?length=<bytes>&md5=<hex>`.
pub fn upload_url(base: &str, length: u64, md5: &str) -> String {
    format!("{base}?length={length}&md5={md5}")
}

/// Builds the URL that asks the device to start a fresh AP scan.
pub fn force_scan_url(base: &str) -> String {
    format!("{base}?force")
}
