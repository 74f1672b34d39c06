//! Menu tree construction from the flat node list.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{FullMenuNode, MenuNode};

pub const EMPTY_MENU_NAME: &str = "Empty Menu";
pub const EMPTY_MENU_TEXT: &str = "No menu items available";

/// Placeholder returned when the store holds no nodes at all.
pub fn empty_menu() -> FullMenuNode {
    FullMenuNode {
        node: MenuNode {
            id: Uuid::nil(),
            parent_id: None,
            name: EMPTY_MENU_NAME.to_string(),
            text: Some(EMPTY_MENU_TEXT.to_string()),
            subscription_type: None,
            content: Vec::new(),
            children_names: Vec::new(),
        },
        children: Vec::new(),
    }
}

/// Build the nested menu from flat nodes.
///
/// Children keep the order of `nodes`. A node whose parent is missing from the
/// input becomes a root candidate; with several candidates the first one wins
/// and the rest are reported, never merged.
pub fn build_menu_tree(nodes: Vec<MenuNode>) -> FullMenuNode {
    if nodes.is_empty() {
        return empty_menu();
    }

    let index: HashMap<Uuid, usize> = nodes
        .iter()
        .enumerate()
        .map(|(slot, node)| (node.id, slot))
        .collect();

    // Arena pass: resolve each node's parent slot once
    let mut child_slots: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (slot, node) in nodes.iter().enumerate() {
        match node.parent_id.and_then(|p| index.get(&p).copied()) {
            Some(parent_slot) if parent_slot != slot => child_slots[parent_slot].push(slot),
            _ => roots.push(slot),
        }
    }

    if roots.is_empty() {
        // Every node hangs off another one: the parent links form a cycle
        tracing::warn!(
            "Menu tree has no root among {} nodes; parent links are cyclic",
            nodes.len()
        );
        return empty_menu();
    }

    if roots.len() > 1 {
        let orphans: Vec<&str> = roots[1..]
            .iter()
            .map(|&slot| nodes[slot].name.as_str())
            .collect();
        tracing::warn!(
            "Menu tree has {} root candidates; using {:?}, detached: {:?}",
            roots.len(),
            nodes[roots[0]].name,
            orphans
        );
    }

    let mut arena: Vec<Option<MenuNode>> = nodes.into_iter().map(Some).collect();
    assemble(roots[0], &mut arena, &child_slots)
}

/// Move the node at `slot` and its subtree out of the arena.
fn assemble(slot: usize, arena: &mut [Option<MenuNode>], child_slots: &[Vec<usize>]) -> FullMenuNode {
    // Iterative post-order so deep menus cannot blow the stack
    let mut finished: HashMap<usize, FullMenuNode> = HashMap::new();
    let mut stack: Vec<(usize, bool)> = vec![(slot, false)];

    while let Some((current, expanded)) = stack.pop() {
        if expanded {
            let children = child_slots[current]
                .iter()
                .filter_map(|child| finished.remove(child))
                .collect();
            if let Some(node) = arena[current].take() {
                finished.insert(current, FullMenuNode { node, children });
            }
        } else {
            stack.push((current, true));
            for &child in child_slots[current].iter().rev() {
                if arena[child].is_some() && !finished.contains_key(&child) {
                    stack.push((child, false));
                }
            }
        }
    }

    finished.remove(&slot).unwrap_or_else(empty_menu)
}

/// Outcome of a [`TreeCache`] lookup.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(FullMenuNode),
    /// Carries the generation to hand back to [`TreeCache::put`].
    Miss(u64),
}

#[derive(Default)]
struct CacheSlot {
    generation: u64,
    entry: Option<(Instant, FullMenuNode)>,
}

/// Short-lived copy of the assembled tree for the read-heavy full-menu endpoint.
///
/// Every invalidation bumps a generation counter. A tree built from data read
/// before an invalidation is refused by `put`.
pub struct TreeCache {
    ttl: Duration,
    slot: RwLock<CacheSlot>,
}

impl TreeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(CacheSlot::default()),
        }
    }

    pub async fn get(&self) -> CacheLookup {
        let slot = self.slot.read().await;
        match slot.entry.as_ref() {
            Some((stored_at, tree)) if stored_at.elapsed() < self.ttl => {
                CacheLookup::Hit(tree.clone())
            }
            _ => CacheLookup::Miss(slot.generation),
        }
    }

    /// Store `tree` unless the cache was invalidated since `generation` was observed.
    pub async fn put(&self, generation: u64, tree: FullMenuNode) -> bool {
        let mut slot = self.slot.write().await;
        if slot.generation != generation {
            tracing::debug!(
                "Discarding menu tree from generation {} (now {})",
                generation,
                slot.generation
            );
            return false;
        }
        slot.entry = Some((Instant::now(), tree));
        true
    }

    /// Drop the cached tree after any node or content change.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        slot.generation = slot.generation.wrapping_add(1);
        slot.entry = None;
    }
}
