//! Network reachability probe.
//!
//! The worker checks connectivity once per loop iteration before touching
//! the pending-upload queue or attempting a fresh upload. The probe is a
//! short-timeout HEAD request; any failure means "offline" and the work
//! is deferred rather than retried synchronously.

use std::time::Duration;

/// Default probe target: a well-known no-content endpoint.
pub const DEFAULT_PROBE_URL: &str = "https://connectivitycheck.gstatic.com/generate_204";

/// Default probe timeout before declaring the appliance offline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Whether the network is reachable right now.
pub async fn is_online(probe_url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build connectivity probe client");
            return false;
        }
    };

    match client.head(probe_url).send().await {
        Ok(response) => {
            let online = response.status().is_success();
            if !online {
                tracing::warn!(status = %response.status(), "Connectivity probe got unexpected status");
            }
            online
        }
        Err(e) => {
            tracing::debug!(error = %e, "Connectivity probe failed; treating as offline");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unroutable_host_is_offline() {
        // Reserved TEST-NET-1 address: never routable.
        let online = is_online("http://192.0.2.1/generate_204", Duration::from_millis(300)).await;
        assert!(!online);
    }

    #[tokio::test]
    async fn malformed_url_is_offline() {
        assert!(!is_online("not a url", Duration::from_millis(300)).await);
    }
}
