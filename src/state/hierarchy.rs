//! Hierarchy builder
//!
//! Records every successfully fetched page as a node whose parent is the page
//! that first linked to it. Nodes never change after insertion apart from
//! their `children` list, which only grows.

use crate::classify::PageClassification;
use crate::url::NormalizedUrl;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised while recording pages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("Page {url} was already recorded")]
    Duplicate { url: NormalizedUrl },

    #[error("Parent {parent} of {url} has not been recorded")]
    UnknownParent {
        url: NormalizedUrl,
        parent: NormalizedUrl,
    },

    #[error("Root already recorded as {root}, cannot add second root {url}")]
    SecondRoot {
        url: NormalizedUrl,
        root: NormalizedUrl,
    },

    #[error("Depth {depth} of {url} does not follow its parent's depth {parent_depth}")]
    DepthMismatch {
        url: NormalizedUrl,
        depth: u32,
        parent_depth: u32,
    },
}

/// A recorded page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    pub url: NormalizedUrl,

    /// Page that first linked here; `None` only for the seed
    pub parent: Option<NormalizedUrl>,

    /// Link distance from the seed
    pub depth: u32,

    pub classification: PageClassification,

    /// Ordinal of this page among recorded pages, starting at 0
    pub discovered_at: u64,

    /// Child pages in discovery order
    pub children: Vec<NormalizedUrl>,
}

/// Nested export of the hierarchy, starting at the seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyTree {
    pub url: NormalizedUrl,
    pub depth: u32,
    pub classification: PageClassification,
    pub children: Vec<HierarchyTree>,
}

impl HierarchyTree {
    /// Number of nodes in this subtree
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Recorded page URLs grouped by classification, in discovery order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageListings(BTreeMap<PageClassification, Vec<NormalizedUrl>>);

impl Default for PageListings {
    fn default() -> Self {
        Self(
            PageClassification::ALL
                .iter()
                .map(|c| (*c, Vec::new()))
                .collect(),
        )
    }
}

impl PageListings {
    pub fn get(&self, classification: PageClassification) -> &[NormalizedUrl] {
        self.0
            .get(&classification)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn count(&self, classification: PageClassification) -> usize {
        self.get(classification).len()
    }

    /// Total pages across all classifications
    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    fn push(&mut self, classification: PageClassification, url: NormalizedUrl) {
        self.0.entry(classification).or_default().push(url);
    }
}

/// Builds the parent/child tree of recorded pages
///
/// Serializes as the flat list of nodes in discovery order; the URL index is
/// rebuilt on load.
#[derive(Debug, Clone, Default)]
pub struct HierarchyBuilder {
    nodes: Vec<PageNode>,
    index: HashMap<NormalizedUrl, usize>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fetched page
    ///
    /// The parent must already be recorded and `depth` must be one more than
    /// the parent's. A second record for the same URL keeps the first node and
    /// returns [`HierarchyError::Duplicate`].
    pub fn record(
        &mut self,
        url: NormalizedUrl,
        parent: Option<NormalizedUrl>,
        depth: u32,
        classification: PageClassification,
    ) -> Result<&PageNode, HierarchyError> {
        if self.index.contains_key(&url) {
            tracing::warn!("Ignoring duplicate record for {}", url);
            return Err(HierarchyError::Duplicate { url });
        }

        let parent_idx = match &parent {
            Some(parent_url) => {
                let idx = *self.index.get(parent_url).ok_or_else(|| {
                    HierarchyError::UnknownParent {
                        url: url.clone(),
                        parent: parent_url.clone(),
                    }
                })?;
                let parent_depth = self.nodes[idx].depth;
                if depth != parent_depth + 1 {
                    return Err(HierarchyError::DepthMismatch {
                        url,
                        depth,
                        parent_depth,
                    });
                }
                Some(idx)
            }
            None => {
                if let Some(root) = self.nodes.first() {
                    return Err(HierarchyError::SecondRoot {
                        url,
                        root: root.url.clone(),
                    });
                }
                None
            }
        };

        let idx = self.nodes.len();
        if let Some(parent_idx) = parent_idx {
            self.nodes[parent_idx].children.push(url.clone());
        }
        self.index.insert(url.clone(), idx);
        self.nodes.push(PageNode {
            url,
            parent,
            depth,
            classification,
            discovered_at: idx as u64,
            children: Vec::new(),
        });

        Ok(&self.nodes[idx])
    }

    pub fn get(&self, url: &NormalizedUrl) -> Option<&PageNode> {
        self.index.get(url).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, url: &NormalizedUrl) -> bool {
        self.index.contains_key(url)
    }

    pub fn root(&self) -> Option<&PageNode> {
        self.nodes.first()
    }

    /// Recorded nodes in discovery order
    pub fn nodes(&self) -> &[PageNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Exports the nested tree rooted at the seed, or `None` if nothing was
    /// recorded
    ///
    /// Built bottom-up in reverse discovery order, so arbitrarily deep
    /// hierarchies need no recursion.
    pub fn tree(&self) -> Option<HierarchyTree> {
        let mut built: Vec<Option<HierarchyTree>> = vec![None; self.nodes.len()];

        // Children are always recorded after their parent
        for (idx, node) in self.nodes.iter().enumerate().rev() {
            let children = node
                .children
                .iter()
                .filter_map(|child| self.index.get(child))
                .filter_map(|&child_idx| built[child_idx].take())
                .collect();

            built[idx] = Some(HierarchyTree {
                url: node.url.clone(),
                depth: node.depth,
                classification: node.classification,
                children,
            });
        }

        built.into_iter().next().flatten()
    }

    /// Groups recorded pages by classification
    pub fn listings(&self) -> PageListings {
        let mut listings = PageListings::default();
        for node in &self.nodes {
            listings.push(node.classification, node.url.clone());
        }
        listings
    }

    fn from_nodes(nodes: Vec<PageNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.url.clone(), idx))
            .collect();
        Self { nodes, index }
    }
}

impl Serialize for HierarchyBuilder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.nodes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HierarchyBuilder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nodes = Vec::<PageNode>::deserialize(deserializer)?;
        Ok(Self::from_nodes(nodes))
    }
}
