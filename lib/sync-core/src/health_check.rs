//! Health check synthesis for derived endpoints

use crate::endpoint::HealthCheck;
use crate::metadata::ServiceMetadata;

/// Interval used when `check_interval` is unset
pub const DEFAULT_CHECK_INTERVAL: &str = "15s";
/// Timeout used when `check_timeout` is unset
pub const DEFAULT_CHECK_TIMEOUT: &str = "15s";

/// Build the health check for `address:port`, if the metadata asks for one.
///
/// `check_https` takes precedence over `check_http`. Their value is appended
/// to `address:port/` as the check path; a leading `/` in the value is not
/// doubled.
pub fn synthesize(metadata: &ServiceMetadata, address: &str, port: &str) -> Option<HealthCheck> {
    let base_url = format!("{}:{}/", address, port);

    let url = if let Some(path) = metadata.get("check_https") {
        format!("https://{}{}", base_url, path.trim_start_matches('/'))
    } else if let Some(path) = metadata.get("check_http") {
        format!("http://{}{}", base_url, path.trim_start_matches('/'))
    } else {
        return None;
    };

    Some(HealthCheck {
        url,
        interval: metadata.get_or("check_interval", DEFAULT_CHECK_INTERVAL).to_string(),
        timeout: metadata.get_or("check_timeout", DEFAULT_CHECK_TIMEOUT).to_string(),
    })
}
