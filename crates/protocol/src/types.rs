use serde::{Deserialize, Serialize};

/// Upload progress as reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    /// Total body size, when the transport can compute it.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Fraction complete in `[0.0, 1.0]`, or `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.sent as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Failure of an asynchronous operation.
///
/// Cancellation is a regular failure variant so every completion handler
/// has one path instead of separate load/error/abort callbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpFailure {
    #[error("cancelled")]
    Cancelled,

    /// The operation failed; the detail may be empty when nothing useful
    /// was reported.
    #[error("{0}")]
    Failed(String),
}

impl OpFailure {
    /// Builds the `Error - <detail>` reason string, using `fallback` when the
    /// failure carried no detail.
    pub fn error_reason(detail: &str, fallback: &str) -> String {
        if detail.is_empty() {
            format!("Error - {fallback}")
        } else {
            format!("Error - {detail}")
        }
    }
}

/// Radio parameters of a scanned access point: `[channel, rssi, phy]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioInfo(pub u8, pub i8, pub String);

impl RadioInfo {
    pub fn channel(&self) -> u8 {
        self.0
    }

    /// Signal strength in dBm.
    pub fn rssi(&self) -> i8 {
        self.1
    }

    /// Supported PHY modes, e.g. `"bgn"`.
    pub fn phy(&self) -> &str {
        &self.2
    }
}

/// One access point from a device scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    /// Absent for hidden networks.
    #[serde(rename = "SSID", default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// Upper-case hex BSSID without separators.
    #[serde(rename = "MAC")]
    pub mac: String,
    #[serde(rename = "RF")]
    pub rf: RadioInfo,
    /// Auth mode first, then `"WPS"` when supported.
    #[serde(rename = "Auth", default)]
    pub auth: Vec<String>,
}

impl AccessPoint {
    pub fn supports_wps(&self) -> bool {
        self.auth.iter().any(|a| a == "WPS")
    }
}

/// Body of a `200` AP scan response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Device timestamp of the last completed scan.
    #[serde(default)]
    pub update: i64,
    #[serde(rename = "APs", default)]
    pub aps: Vec<AccessPoint>,
}
