//! Reduction of cluster node events into display rows.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Buffer that node rows are written to.
pub const NODES_BUFFER: &str = "nodes";
/// Buffer holding the time of the last node update.
pub const TIME_BUFFER: &str = "time";
/// Buffer holding the address of this host.
pub const IP_BUFFER: &str = "ip";
/// Longest identity prefix used when a node has no address.
const MAX_IDENTITY_NAME_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    /// `"True"`, `"False"` or `"Unknown"`.
    pub status: String,
}

/// A node as reported by the watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub identity: String,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

/// What the display needs to know about a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub identity: String,
    pub display_name: String,
    pub status: String,
}

impl NodeStatus {
    /// Row key in the nodes buffer.
    pub fn row(&self) -> &str {
        &self.display_name
    }

    /// Row text, `"<display_name>: <status>"`.
    pub fn content(&self) -> String {
        format!("{}: {}", self.display_name, self.status)
    }
}

impl From<&NodeEvent> for NodeStatus {
    fn from(event: &NodeEvent) -> Self {
        Self {
            identity: event.identity.clone(),
            display_name: display_name(event),
            status: status(event),
        }
    }
}

/// Hostname address first, then any address, then a prefix of the identity.
fn display_name(event: &NodeEvent) -> String {
    event
        .addresses
        .iter()
        .find(|address| address.kind == "Hostname")
        .or_else(|| event.addresses.first())
        .map_or_else(
            || event.identity.chars().take(MAX_IDENTITY_NAME_LEN).collect(),
            |address| address.address.clone(),
        )
}

/// `Ready`/`NotReady` first, then every other condition that is currently true.
fn status(event: &NodeEvent) -> String {
    let mut readiness = Vec::new();
    let mut raised = Vec::new();
    for condition in &event.conditions {
        if condition.kind == "Ready" {
            readiness.push(if condition.status == "True" {
                "Ready"
            } else {
                "NotReady"
            });
        } else if condition.status == "True" {
            raised.push(condition.kind.as_str());
        }
    }
    readiness.reverse();
    readiness.extend(raised);
    readiness.join("|")
}

/// Decides which node updates are worth a round trip to the display.
///
/// An update goes through when the node's row text changed, or when nothing
/// has been sent for `refresh_after`.
#[derive(Debug)]
pub struct NodeRowTracker {
    last_content: HashMap<String, String>,
    last_sent: Option<Instant>,
    refresh_after: Duration,
}

impl NodeRowTracker {
    pub fn new(refresh_after: Duration) -> Self {
        Self {
            last_content: HashMap::new(),
            last_sent: None,
            refresh_after,
        }
    }

    /// Records `status` and returns whether it should be sent.
    pub fn should_send(&mut self, status: &NodeStatus, now: Instant) -> bool {
        let content = status.content();
        let changed = self.last_content.get(status.row()) != Some(&content);
        let stale = self
            .last_sent
            .is_none_or(|sent| now.duration_since(sent) > self.refresh_after);
        self.last_content.insert(status.row().to_string(), content);
        if changed || stale {
            self.last_sent = Some(now);
            true
        } else {
            false
        }
    }
}
