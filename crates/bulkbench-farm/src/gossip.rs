use std::time::Duration;

use serde_json::Value;
use url::Url;

const GOSSIP_PATH: &str = "_status/gossip/local";

/// Number of distinct nodes a gossip status document knows about.
///
/// Node descriptors are published under `node:<id>` keys of `infos`.
pub fn count_gossip_nodes(status: &Value) -> usize {
    status
        .get("infos")
        .and_then(Value::as_object)
        .map(|infos| infos.keys().filter(|k| k.starts_with("node:")).count())
        .unwrap_or(0)
}

/// Reads a node's gossip view over its HTTP status endpoint.
#[derive(Clone)]
pub struct GossipProbe {
    client: reqwest::Client,
}

impl GossipProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Peers seen by the node serving HTTP at `host:port`.
    pub async fn peer_count(&self, host: &str, port: u16) -> anyhow::Result<usize> {
        let url = Url::parse(&format!("http://{host}:{port}/"))?.join(GOSSIP_PATH)?;
        let status: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(count_gossip_nodes(&status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_only_node_descriptors() {
        let status = json!({
            "infos": {
                "node:1": {},
                "node:2": {},
                "node:3": {},
                "store:1": {},
                "liveness:1": {},
                "cluster-id": {}
            }
        });
        assert_eq!(count_gossip_nodes(&status), 3);
    }

    #[test]
    fn missing_infos_means_no_peers() {
        assert_eq!(count_gossip_nodes(&json!({})), 0);
        assert_eq!(count_gossip_nodes(&json!({ "infos": [] })), 0);
    }

    #[tokio::test]
    async fn unreachable_node_is_an_error() {
        let probe = GossipProbe::new(Duration::from_millis(200)).unwrap();
        // Port 9 (discard) is not serving HTTP on a test host.
        assert!(probe.peer_count("127.0.0.1", 9).await.is_err());
    }
}
