//! Events emitted while crawling

use std::sync::Arc;

use serde::Serialize;

use crate::{Identity, NodeData, Reference};

/// Discovery events pushed to the crawl's event channel
///
/// Events from different workers interleave freely. A single worker emits
/// `NodeFound` before the `ReferenceFound` events derived from that node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// A node was fetched
    NodeFound {
        identity: Identity,
        depth: u32,
        node: Arc<NodeData>,
    },

    /// A node could not be fetched; it will not be retried in this crawl
    NodeError {
        identity: Identity,
        depth: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Identity>,
        error: String,
    },

    /// A typed edge was found in a body or comment
    ReferenceFound { reference: Reference },

    /// A shorter path was found to a node that was already reported
    DepthLowered { identity: Identity, depth: u32 },
}

impl CrawlEvent {
    /// Identity the event is about (the edge source for references)
    pub fn identity(&self) -> &Identity {
        match self {
            CrawlEvent::NodeFound { identity, .. }
            | CrawlEvent::NodeError { identity, .. }
            | CrawlEvent::DepthLowered { identity, .. } => identity,
            CrawlEvent::ReferenceFound { reference } => &reference.source,
        }
    }
}
