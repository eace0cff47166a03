//! Handshake for kiosk sessions.
//!
//! The client identifies itself through the connection URL: the device
//! identity is appended to the endpoint as a `device_id` query parameter. The
//! server answers with a `connected` welcome, after which the session counts
//! as live.

use kiosk_wire::Welcome;
use url::Url;

use crate::error::TransportError;

/// Query parameter carrying the device identity
pub const IDENTITY_PARAM: &str = "device_id";

/// Build the URL for one connection attempt
pub fn connection_url(endpoint: &str, identity: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(endpoint).map_err(|e| TransportError::InvalidAddress {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(TransportError::InvalidAddress {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme {:?}", other),
            })
        }
    }

    url.query_pairs_mut().append_pair(IDENTITY_PARAM, identity);
    Ok(url)
}

/// Whether the welcome names the identity we connected with.
///
/// A welcome without a device id matches any identity.
pub fn welcome_matches(welcome: &Welcome, identity: &str) -> bool {
    welcome
        .device_id
        .as_deref()
        .map_or(true, |id| id == identity)
}
