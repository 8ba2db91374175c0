use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EndpointKey;

/// A proxy node as it travels through the selection pipeline.
///
/// Only `name`, `server`, `port` and `type` are interpreted; every other
/// field is carried through untouched so the node can be written back out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<u16>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(name: &str, server: &str, port: u16, protocol: &str) -> Self {
        Node {
            name: name.to_string(),
            server: Some(server.to_string()),
            port: Some(port),
            protocol: Some(protocol.to_string()),
            extra: Map::new(),
        }
    }

    /// Server address with surrounding whitespace removed, if non-empty
    pub fn server_address(&self) -> Option<&str> {
        self.server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Port, treating 0 as absent
    pub fn usable_port(&self) -> Option<u16> {
        self.port.filter(|&p| p != 0)
    }

    /// Statistics key for this node; `None` when server or port is missing
    pub fn endpoint_key(&self) -> Option<EndpointKey> {
        let server = self.server_address()?;
        let port = self.usable_port()?;
        Some(EndpointKey::new(server, port, self.protocol.as_deref()))
    }
}

/// Parse a JSON node list.
pub fn parse_nodes(raw: &str) -> serde_json::Result<Vec<Node>> {
    serde_json::from_str(raw)
}

fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u64),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("port {} is out of range", n))),
        Some(RawPort::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<u16>()
                    .map(Some)
                    .map_err(|_| de::Error::custom(format!("invalid port: {}", s)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_parses_numeric_and_string_ports() {
        let nodes = parse_nodes(
            r#"[
                {"name": "a", "server": "1.1.1.1", "port": 443, "type": "ss"},
                {"name": "b", "server": "2.2.2.2", "port": "8388", "type": "ss"},
                {"name": "c", "server": "3.3.3.3", "port": ""}
            ]"#,
        )
        .unwrap();

        assert_eq!(nodes[0].port, Some(443));
        assert_eq!(nodes[1].port, Some(8388));
        assert_eq!(nodes[2].port, None);
        assert_eq!(nodes[2].protocol, None);
    }

    #[test]
    fn test_node_rejects_out_of_range_port() {
        let err = parse_nodes(r#"[{"name": "a", "server": "1.1.1.1", "port": 70000}]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_node_preserves_unknown_fields() {
        let raw = r#"{"name":"a","server":"1.1.1.1","port":80,"type":"vmess","uuid":"abc","tls":true}"#;
        let node: Node = serde_json::from_str(raw).unwrap();
        assert_eq!(node.extra.get("uuid").and_then(|v| v.as_str()), Some("abc"));

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("vmess"));
        assert_eq!(value.get("tls").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn test_node_endpoint_key_requires_server_and_port() {
        let node = Node::new("a", " Example.COM ", 443, "Trojan");
        let key = node.endpoint_key().unwrap();
        assert_eq!(key.to_string(), "example.com,443,trojan");

        let mut no_port = node.clone();
        no_port.port = Some(0);
        assert!(no_port.endpoint_key().is_none());

        let mut no_server = node;
        no_server.server = Some("   ".to_string());
        assert!(no_server.endpoint_key().is_none());
        assert!(no_server.server_address().is_none());
    }

    #[test]
    fn test_node_missing_type_uses_unknown_protocol() {
        let mut node = Node::new("a", "1.1.1.1", 80, "ss");
        node.protocol = None;
        assert_eq!(node.endpoint_key().unwrap().protocol(), "unknown");
    }
}
