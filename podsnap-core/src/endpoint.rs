/*!
Discovery of the URL callers use to reach a sandbox.
*/

use crate::client::{Api, ResourceClient};
use crate::config::ConnectionConfig;
use crate::resources::Gateway;
use crate::{Result, SnapshotError};
use podsnap_poll::{poll_until, Clock, PollError, PollPolicy, PollStatus};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// How a sandbox is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Explicit router URL
    Direct { url: String },
    /// Router behind a Gateway's external address
    Gateway { gateway: String, url: String },
    /// No routable address; the caller port-forwards to the sandbox
    PortForward { port: u16 },
}

impl Endpoint {
    /// Base URL, absent in port-forward mode
    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::Direct { url } | Self::Gateway { url, .. } => Some(url),
            Self::PortForward { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { url } => write!(f, "{url}"),
            Self::Gateway { gateway, url } => write!(f, "{url} (gateway {gateway})"),
            Self::PortForward { port } => write!(f, "port-forward to :{port}"),
        }
    }
}

/// Resolve the endpoint: `api_url`, else the gateway's first address, else
/// port-forward mode
///
/// A named gateway is re-read until it reports an address or `deadline`
/// elapses.
pub fn resolve_endpoint<C, K>(
    client: &C,
    clock: &K,
    connection: &ConnectionConfig,
    session_namespace: &str,
    poll_interval: Duration,
    deadline: Duration,
) -> Result<Endpoint>
where
    C: ResourceClient + ?Sized,
    K: Clock + ?Sized,
{
    if let Some(url) = connection.api_url.as_deref().filter(|u| !u.trim().is_empty()) {
        return Ok(Endpoint::Direct {
            url: url.trim_end_matches('/').to_string(),
        });
    }

    let Some(gateway) = connection.gateway_name.as_deref() else {
        return Ok(Endpoint::PortForward {
            port: connection.server_port,
        });
    };
    let namespace = connection
        .gateway_namespace
        .as_deref()
        .unwrap_or(session_namespace);
    let api = Api::<Gateway, C>::namespaced(client, namespace);

    let check = |_attempt: usize| -> Result<PollStatus<String>> {
        let found = api.get(gateway)?;
        Ok(match found.first_address() {
            Some(address) => PollStatus::Done(address.to_string()),
            None => PollStatus::Pending,
        })
    };
    let address = match poll_until(
        "gateway_address",
        clock,
        PollPolicy::new(poll_interval, deadline),
        check,
    ) {
        Ok(address) => address,
        Err(PollError::DeadlineExceeded { .. }) => {
            return Err(SnapshotError::sandbox(format!(
                "Gateway '{gateway}' in namespace '{namespace}' has no address after {deadline:?}"
            )))
        }
        Err(PollError::Check { error, .. }) => return Err(error),
    };

    let url = format!("http://{address}");
    info!(gateway, namespace, url = %url, "Resolved gateway endpoint");
    Ok(Endpoint::Gateway {
        gateway: gateway.to_string(),
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryResourceClient;
    use crate::resources::GATEWAY;
    use podsnap_poll::ManualClock;
    use serde_json::json;

    const SECOND: Duration = Duration::from_secs(1);

    fn connection() -> ConnectionConfig {
        ConnectionConfig::default()
    }

    #[test]
    fn test_api_url_wins() {
        let client = MemoryResourceClient::new();
        let clock = ManualClock::new();
        let conn = ConnectionConfig {
            api_url: Some("http://router.local:8080/".into()),
            gateway_name: Some("ignored".into()),
            ..connection()
        };
        let endpoint = resolve_endpoint(&client, &clock, &conn, "ns", SECOND, SECOND).unwrap();
        assert_eq!(endpoint.base_url(), Some("http://router.local:8080"));
    }

    #[test]
    fn test_port_forward_without_gateway() {
        let client = MemoryResourceClient::new();
        let clock = ManualClock::new();
        let endpoint =
            resolve_endpoint(&client, &clock, &connection(), "ns", SECOND, SECOND).unwrap();
        assert_eq!(endpoint, Endpoint::PortForward { port: 8888 });
        assert!(endpoint.base_url().is_none());
    }

    #[test]
    fn test_gateway_address_after_provisioning() {
        let client = MemoryResourceClient::new();
        let clock = ManualClock::new();
        client
            .insert(&GATEWAY, "infra", json!({"metadata": {"name": "external"}}))
            .unwrap();
        client.schedule_status(
            &GATEWAY,
            "infra",
            "external",
            2,
            json!({"addresses": [{"value": "34.1.2.3"}]}),
        );
        let conn = ConnectionConfig {
            gateway_name: Some("external".into()),
            gateway_namespace: Some("infra".into()),
            ..connection()
        };

        let endpoint =
            resolve_endpoint(&client, &clock, &conn, "ns", SECOND, Duration::from_secs(30))
                .unwrap();
        assert_eq!(endpoint.base_url(), Some("http://34.1.2.3"));
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_gateway_without_address_times_out() {
        let client = MemoryResourceClient::new();
        let clock = ManualClock::new();
        client
            .insert(&GATEWAY, "ns", json!({"metadata": {"name": "external"}}))
            .unwrap();
        let conn = ConnectionConfig {
            gateway_name: Some("external".into()),
            ..connection()
        };

        let err = resolve_endpoint(&client, &clock, &conn, "ns", SECOND, Duration::from_secs(3))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Sandbox(_)));
    }

    #[test]
    fn test_missing_gateway_is_not_found() {
        let client = MemoryResourceClient::new();
        let clock = ManualClock::new();
        let conn = ConnectionConfig {
            gateway_name: Some("external".into()),
            ..connection()
        };
        let err = resolve_endpoint(&client, &clock, &conn, "ns", SECOND, SECOND).unwrap_err();
        assert!(err.is_not_found());
    }
}
