//! Sector-membership nodes: one node per (entity, sector) overlap, threaded
//! on two chains at once (the entity's sectors and the sector's entities).
//! Freed nodes go back on a free stack and are reused with a new generation.

use crate::types::{EntityId, SectorId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
struct Node {
    sector: SectorId,
    /// `None` while a membership update has the node marked for deletion.
    thing: Option<EntityId>,
    thing_prev: Option<NodeId>,
    thing_next: Option<NodeId>,
    sector_prev: Option<NodeId>,
    sector_next: Option<NodeId>,
    visited: bool,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub struct SecNodes {
    slots: Vec<Slot>,
    free: Vec<u32>,
    sector_heads: Vec<Option<NodeId>>,
    live: usize,
}

impl SecNodes {
    pub fn new(sector_count: usize) -> Self {
        Self { slots: Vec::new(), free: Vec::new(), sector_heads: vec![None; sector_count], live: 0 }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, node: Some(node) });
        NodeId { index, generation: 0 }
    }

    /// Adds `thing` to `sector` unless the entity's chain starting at `head`
    /// already holds that sector, in which case the existing node is re-owned.
    /// Returns the new head of the entity's chain.
    pub fn add(&mut self, sector: SectorId, thing: EntityId, head: Option<NodeId>) -> NodeId {
        let mut cur = head;
        while let Some(id) = cur {
            let Some(node) = self.node_mut(id) else { break };
            if node.sector == sector {
                node.thing = Some(thing);
                return head.unwrap_or(id);
            }
            cur = node.thing_next;
        }

        let sector_head = self.sector_heads[sector.idx()];
        let id = self.alloc(Node {
            sector,
            thing: Some(thing),
            thing_prev: None,
            thing_next: head,
            sector_prev: None,
            sector_next: sector_head,
            visited: false,
        });
        if let Some(h) = head.and_then(|h| self.node_mut(h)) {
            h.thing_prev = Some(id);
        }
        if let Some(h) = sector_head.and_then(|h| self.node_mut(h)) {
            h.sector_prev = Some(id);
        }
        self.sector_heads[sector.idx()] = Some(id);
        id
    }

    /// Unlinks `id` from both chains and frees it. Returns the next node of
    /// the entity's chain and, when `id` was the head, that becomes the head.
    pub fn delete(&mut self, id: NodeId, head: &mut Option<NodeId>) -> Option<NodeId> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        match node.thing_prev.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.thing_next = node.thing_next,
            None => *head = node.thing_next,
        }
        if let Some(next) = node.thing_next.and_then(|n| self.node_mut(n)) {
            next.thing_prev = node.thing_prev;
        }

        match node.sector_prev.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.sector_next = node.sector_next,
            None => self.sector_heads[node.sector.idx()] = node.sector_next,
        }
        if let Some(next) = node.sector_next.and_then(|n| self.node_mut(n)) {
            next.sector_prev = node.sector_prev;
        }
        node.thing_next
    }

    pub fn delete_list(&mut self, head: &mut Option<NodeId>) {
        while let Some(id) = *head {
            if self.delete(id, head).is_none() && *head == Some(id) {
                *head = None;
            }
        }
    }

    /// Marks every node on the entity's chain for deletion.
    pub fn disown_all(&mut self, head: Option<NodeId>) {
        let mut cur = head;
        while let Some(node) = cur.and_then(|id| self.node_mut(id)) {
            node.thing = None;
            cur = node.thing_next;
        }
    }

    /// Frees nodes still marked for deletion after a membership update.
    pub fn sweep_disowned(&mut self, head: &mut Option<NodeId>) {
        let mut cur = *head;
        while let Some(id) = cur {
            let Some(node) = self.node(id) else { break };
            let next = node.thing_next;
            if node.thing.is_none() {
                self.delete(id, head);
            }
            cur = next;
        }
    }

    /// Sectors on the entity's chain, head first.
    pub fn sectors_of(&self, head: Option<NodeId>) -> Vec<SectorId> {
        let mut out = Vec::new();
        let mut cur = head;
        while let Some(node) = cur.and_then(|id| self.node(id)) {
            out.push(node.sector);
            cur = node.thing_next;
        }
        out
    }

    /// Entities touching `sector`, head first.
    pub fn things_in(&self, sector: SectorId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut cur = self.sector_heads.get(sector.idx()).copied().flatten();
        while let Some(node) = cur.and_then(|id| self.node(id)) {
            out.extend(node.thing);
            cur = node.sector_next;
        }
        out
    }

    // --- Crusher scan --------------------------------------------------------

    pub fn clear_visited(&mut self, sector: SectorId) {
        let mut cur = self.sector_heads.get(sector.idx()).copied().flatten();
        while let Some(node) = cur.and_then(|id| self.node_mut(id)) {
            node.visited = false;
            cur = node.sector_next;
        }
    }

    /// Finds the first unvisited node of `sector` from the head, marks it and
    /// returns its entity. Rescanning from the head each time tolerates the
    /// chain changing between calls.
    pub fn next_unvisited(&mut self, sector: SectorId) -> Option<Option<EntityId>> {
        let mut cur = self.sector_heads.get(sector.idx()).copied().flatten();
        while let Some(id) = cur {
            let node = self.node_mut(id)?;
            if !node.visited {
                node.visited = true;
                return Some(node.thing);
            }
            cur = node.sector_next;
        }
        None
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[inline]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }
}
