//! Mission tree: an arena of nodes recording how an objective was pursued.
//!
//! Nodes are addressed by index. A node owns the indices of its children and
//! knows only its parent's index, so there are no reference cycles. Each edge
//! says why the child exists: a retry of its parent, a sub-task, or a
//! capability branch (forging a tool the parent needed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Retry,
    SubTask,
    CapabilityBranch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    CircuitBroken,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::CircuitBroken)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionNode {
    pub objective: String,
    /// `None` for roots.
    pub parent: Option<usize>,
    /// How this node hangs off its parent; `None` for roots.
    pub edge: Option<EdgeKind>,
    pub children: Vec<usize>,
    pub status: NodeStatus,
    pub attempt: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionTree {
    nodes: Vec<MissionNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mission node {0} does not exist")]
pub struct UnknownNode(pub usize);

impl MissionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, objective: impl Into<String>) -> usize {
        self.push(objective.into(), None, None)
    }

    pub fn add_child(
        &mut self,
        parent: usize,
        edge: EdgeKind,
        objective: impl Into<String>,
    ) -> Result<usize, UnknownNode> {
        if parent >= self.nodes.len() {
            return Err(UnknownNode(parent));
        }
        let index = self.push(objective.into(), Some(parent), Some(edge));
        self.nodes[parent].children.push(index);
        Ok(index)
    }

    fn push(&mut self, objective: String, parent: Option<usize>, edge: Option<EdgeKind>) -> usize {
        self.nodes.push(MissionNode {
            objective,
            parent,
            edge,
            children: Vec::new(),
            status: NodeStatus::Pending,
            attempt: 0,
            error_count: 0,
            last_error: None,
            created_at: Utc::now(),
        });
        self.nodes.len() - 1
    }

    pub fn node(&self, index: usize) -> Option<&MissionNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[MissionNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn start(&mut self, index: usize, attempt: u32) -> Result<(), UnknownNode> {
        let node = self.nodes.get_mut(index).ok_or(UnknownNode(index))?;
        node.status = NodeStatus::Running;
        node.attempt = attempt;
        Ok(())
    }

    pub fn succeed(&mut self, index: usize) -> Result<(), UnknownNode> {
        self.set_status(index, NodeStatus::Succeeded)
    }

    /// Mark the node failed and count the error on it.
    pub fn fail(&mut self, index: usize, error: impl Into<String>) -> Result<(), UnknownNode> {
        let node = self.nodes.get_mut(index).ok_or(UnknownNode(index))?;
        node.status = NodeStatus::Failed;
        node.error_count += 1;
        node.last_error = Some(error.into());
        Ok(())
    }

    pub fn set_status(&mut self, index: usize, status: NodeStatus) -> Result<(), UnknownNode> {
        self.nodes.get_mut(index).ok_or(UnknownNode(index))?.status = status;
        Ok(())
    }

    /// Indices from `index` up to its root, inclusive.
    pub fn path_to_root(&self, index: usize) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(index).map(|_| index);
        while let Some(i) = current {
            path.push(i);
            current = self.nodes[i].parent;
        }
        path
    }

    pub fn depth(&self, index: usize) -> usize {
        self.path_to_root(index).len().saturating_sub(1)
    }

    /// Children of `index` reached through `edge`, in creation order.
    pub fn children_by_edge(&self, index: usize, edge: EdgeKind) -> Vec<usize> {
        self.nodes
            .get(index)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| self.nodes[*c].edge == Some(edge))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Errors recorded on `index` and every node below it.
    pub fn total_errors(&self, index: usize) -> u32 {
        let Some(node) = self.nodes.get(index) else {
            return 0;
        };
        node.error_count + node.children.iter().map(|c| self.total_errors(*c)).sum::<u32>()
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
    }
}
