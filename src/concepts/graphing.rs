//! Similarity graph over webapps.
//!
//! Every webapp has one node; an edge means the two webapps share a tag. Edges are stored on
//! both endpoints and every operation here writes both sides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::db::{CollectionRegistry, DocCollection, Filter, Order, Stored};
use crate::errors::{AppError, ConceptError};

pub const GRAPH_NODE_COLLECTION: &str = "graph_nodes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDoc {
    /// The webapp this node stands for
    pub item: String,
    pub owner: String,
    #[serde(default)]
    pub neighbors: Vec<String>,
}

pub type GraphNode = Stored<NodeDoc>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// One user's graph: node items and each undirected edge once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<String>,
    pub edges: Vec<GraphEdge>,
}

pub struct Graphing {
    nodes: DocCollection<NodeDoc>,
}

impl Graphing {
    pub async fn new(registry: &CollectionRegistry, pool: SqlitePool) -> Result<Self, AppError> {
        Ok(Self {
            nodes: DocCollection::new(registry, pool, GRAPH_NODE_COLLECTION).await?,
        })
    }

    pub async fn add_node(&self, owner: &str, item: &str) -> Result<GraphNode, AppError> {
        let doc = NodeDoc {
            item: item.to_string(),
            owner: owner.to_string(),
            neighbors: Vec::new(),
        };
        self.nodes
            .create_one_unless(&doc, &Filter::eq("item", item))
            .await?
            .ok_or_else(|| ConceptError::not_allowed("Node for {0} already exists!").arg(item))?;
        self.get_node(item).await
    }

    /// Delete the item's node and every edge pointing at it.
    pub async fn delete_node(&self, item: &str) -> Result<(), AppError> {
        self.nodes.delete_many(&Filter::eq("item", item)).await?;
        self.nodes
            .pull_all(
                &Filter::contains("neighbors", item),
                "neighbors",
                &[Value::from(item)],
            )
            .await?;
        Ok(())
    }

    pub async fn get_node(&self, item: &str) -> Result<GraphNode, AppError> {
        self.nodes
            .read_one(&Filter::eq("item", item))
            .await?
            .ok_or_else(|| ConceptError::not_found("Node for {0} does not exist!").arg(item).into())
    }

    pub async fn get_nodes_for_user(&self, owner: &str) -> Result<Vec<GraphNode>, AppError> {
        self.nodes
            .read_many(&Filter::eq("owner", owner), Order::Inserted)
            .await
    }

    pub async fn get_neighbors(&self, item: &str) -> Result<Vec<String>, AppError> {
        Ok(self.get_node(item).await?.fields.neighbors)
    }

    pub async fn add_edge(&self, a: &str, b: &str) -> Result<(), AppError> {
        self.assert_edge_endpoints(a, b).await?;
        self.link(a, &[b.to_string()]).await
    }

    pub async fn delete_edge(&self, a: &str, b: &str) -> Result<(), AppError> {
        self.assert_edge_endpoints(a, b).await?;
        self.unlink(a, &[b.to_string()]).await
    }

    /// Recompute every edge between `item` and the other nodes owned by `user`.
    ///
    /// Each sibling is connected when its item is in `connected` and disconnected
    /// otherwise. Nodes of other owners are left alone.
    pub async fn update_edges_for_user_node(
        &self,
        user: &str,
        item: &str,
        connected: &[String],
    ) -> Result<(), AppError> {
        self.get_node(item).await?;

        let siblings = self
            .nodes
            .read_many(
                &Filter::eq("owner", user).and(Filter::ne("item", item)),
                Order::Inserted,
            )
            .await?;
        let (linked, unlinked): (Vec<String>, Vec<String>) = siblings
            .into_iter()
            .map(|node| node.fields.item)
            .partition(|sibling| connected.contains(sibling));

        self.link(item, &linked).await?;
        self.unlink(item, &unlinked).await?;

        tracing::debug!(
            "Recomputed edges for {}: {} linked, {} unlinked",
            item,
            linked.len(),
            unlinked.len()
        );
        Ok(())
    }

    /// The user's nodes and edges; an edge is listed once, from its lower item id.
    pub async fn get_graph(&self, owner: &str) -> Result<Graph, AppError> {
        let nodes = self.get_nodes_for_user(owner).await?;
        let items: Vec<String> = nodes.iter().map(|node| node.fields.item.clone()).collect();

        let mut edges = Vec::new();
        for node in &nodes {
            for neighbor in &node.fields.neighbors {
                if node.fields.item < *neighbor && items.contains(neighbor) {
                    edges.push(GraphEdge {
                        source: node.fields.item.clone(),
                        target: neighbor.clone(),
                    });
                }
            }
        }

        Ok(Graph {
            nodes: items,
            edges,
        })
    }

    async fn assert_edge_endpoints(&self, a: &str, b: &str) -> Result<(), AppError> {
        if a == b {
            return Err(ConceptError::bad_values("Cannot connect {0} to itself!")
                .arg(a)
                .into());
        }
        self.get_node(a).await?;
        self.get_node(b).await?;
        Ok(())
    }

    /// Add symmetric edges between `item` and each of `others`.
    async fn link(&self, item: &str, others: &[String]) -> Result<(), AppError> {
        if others.is_empty() {
            return Ok(());
        }
        let values: Vec<Value> = others.iter().cloned().map(Value::from).collect();
        self.nodes
            .add_to_set(&Filter::eq("item", item), "neighbors", &values)
            .await?;
        self.nodes
            .add_to_set(
                &Filter::one_of("item", others.iter().cloned()),
                "neighbors",
                &[Value::from(item)],
            )
            .await?;
        Ok(())
    }

    /// Remove symmetric edges between `item` and each of `others`.
    async fn unlink(&self, item: &str, others: &[String]) -> Result<(), AppError> {
        if others.is_empty() {
            return Ok(());
        }
        let values: Vec<Value> = others.iter().cloned().map(Value::from).collect();
        self.nodes
            .pull_all(&Filter::eq("item", item), "neighbors", &values)
            .await?;
        self.nodes
            .pull_all(
                &Filter::one_of("item", others.iter().cloned()),
                "neighbors",
                &[Value::from(item)],
            )
            .await?;
        Ok(())
    }
}
