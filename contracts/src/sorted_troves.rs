//! Sorted Troves Contract
//!
//! Doubly linked list of active troves ordered by ascending nominal ICR
//! (`coll * 1e20 / debt`). The first node is the riskiest trove, which is
//! where sequential liquidation starts walking.
//!
//! Nodes hold no key. Neighbours are compared by their live NICR as reported
//! by the trove manager (pending rewards included), so redistributions never
//! leave stale keys behind.
//!
//! Insertion accepts a `(prev, next)` hint pair. A valid hint is used as is;
//! otherwise the position is found by walking from the hint (or the head).
//! Equal NICRs keep insertion order. Only the trove manager may mutate.

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractRef;
use crate::errors::CdpError;
use crate::events::{NodeAdded, NodeRemoved};
use crate::trove_manager::TroveManagerContractRef;

/// List node
#[odra::odra_type]
pub struct Node {
    /// Neighbour with lower or equal NICR
    pub prev: Option<Address>,
    /// Neighbour with higher or equal NICR
    pub next: Option<Address>,
}

/// Sorted Troves Contract
#[odra::module(events = [NodeAdded, NodeRemoved])]
pub struct SortedTroves {
    /// Admin (deployer)
    admin: Var<Address>,
    /// Only caller allowed to mutate the list
    trove_manager: Var<Address>,
    /// Capacity
    max_size: Var<u64>,
    /// Current node count
    size: Var<u64>,
    /// Lowest NICR
    head: Var<Option<Address>>,
    /// Highest NICR
    tail: Var<Option<Address>>,
    /// Nodes by trove owner, `None` once removed
    nodes: Mapping<Address, Option<Node>>,
}

#[odra::module]
impl SortedTroves {
    pub fn init(&mut self, max_size: u64) {
        if max_size == 0 {
            self.env().revert(CdpError::InvalidConfig);
        }
        self.admin.set(self.env().caller());
        self.max_size.set(max_size);
        self.size.set(0);
        self.head.set(None);
        self.tail.set(None);
    }

    /// Wire the trove manager (admin only, once)
    pub fn set_trove_manager(&mut self, trove_manager: Address) {
        if self.admin.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::Unauthorized);
        }
        if self.trove_manager.get().is_some() {
            self.env().revert(CdpError::AddressesAlreadySet);
        }
        self.trove_manager.set(trove_manager);
    }

    // ========== Mutations (trove manager only) ==========

    pub fn insert(&mut self, id: Address, nicr: U256, prev_hint: Option<Address>, next_hint: Option<Address>) {
        self.require_trove_manager();
        if self.is_full() {
            self.env().revert(CdpError::ListFull);
        }
        if self.contains(id) {
            self.env().revert(CdpError::ListContainsNode);
        }
        if nicr.is_zero() {
            self.env().revert(CdpError::ZeroNicr);
        }

        let (prev, next) = self.find_insert_position(nicr, prev_hint, next_hint);
        self.link(id, prev, next);
        self.env().emit_event(NodeAdded { id, nicr });
    }

    pub fn remove(&mut self, id: Address) {
        self.require_trove_manager();
        self.unlink(id);
        self.env().emit_event(NodeRemoved { id });
    }

    /// Move a node to the position of its new NICR
    pub fn re_insert(&mut self, id: Address, new_nicr: U256, prev_hint: Option<Address>, next_hint: Option<Address>) {
        self.require_trove_manager();
        if new_nicr.is_zero() {
            self.env().revert(CdpError::ZeroNicr);
        }
        self.unlink(id);
        let (prev, next) = self.find_insert_position(new_nicr, prev_hint, next_hint);
        self.link(id, prev, next);
        self.env().emit_event(NodeAdded { id, nicr: new_nicr });
    }

    // ========== Query Functions ==========

    pub fn contains(&self, id: Address) -> bool {
        self.node(id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.get_size() >= self.get_max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.get_size() == 0
    }

    pub fn get_size(&self) -> u64 {
        self.size.get_or_default()
    }

    pub fn get_max_size(&self) -> u64 {
        self.max_size.get_or_default()
    }

    /// Trove with the lowest NICR
    pub fn get_first(&self) -> Option<Address> {
        self.head.get().flatten()
    }

    /// Trove with the highest NICR
    pub fn get_last(&self) -> Option<Address> {
        self.tail.get().flatten()
    }

    pub fn get_next(&self, id: Address) -> Option<Address> {
        self.node(id).and_then(|node| node.next)
    }

    pub fn get_prev(&self, id: Address) -> Option<Address> {
        self.node(id).and_then(|node| node.prev)
    }

    /// Live NICR of a listed trove
    pub fn get_nicr(&self, id: Address) -> Option<U256> {
        if !self.contains(id) {
            return None;
        }
        Some(self.live_nicr(id))
    }

    /// Whether `(prev, next)` is an exact slot for `nicr`
    pub fn valid_insert_position(&self, nicr: U256, prev: Option<Address>, next: Option<Address>) -> bool {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(next)) => self.get_first() == Some(next) && nicr < self.live_nicr(next),
            (Some(prev), None) => self.get_last() == Some(prev) && self.live_nicr(prev) <= nicr,
            (Some(prev), Some(next)) => {
                self.get_next(prev) == Some(next)
                    && self.live_nicr(prev) <= nicr
                    && nicr < self.live_nicr(next)
            }
        }
    }

    // ========== Internal Functions ==========

    /// Resolves the `(prev, next)` slot for `nicr` starting from the hints
    fn find_insert_position(
        &self,
        nicr: U256,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> (Option<Address>, Option<Address>) {
        if self.valid_insert_position(nicr, prev_hint, next_hint) {
            return (prev_hint, next_hint);
        }

        // Walk forward from the prev hint when it still sits before nicr,
        // otherwise from the head
        let mut prev = prev_hint.filter(|hint| self.contains(*hint) && self.live_nicr(*hint) <= nicr);
        let mut next = match prev {
            Some(hint) => self.get_next(hint),
            None => self.get_first(),
        };

        while let Some(current) = next {
            let node = match self.node(current) {
                Some(node) => node,
                None => break,
            };
            if nicr < self.live_nicr(current) {
                break;
            }
            prev = Some(current);
            next = node.next;
        }

        (prev, next)
    }

    fn link(&mut self, id: Address, prev: Option<Address>, next: Option<Address>) {
        self.nodes.set(&id, Some(Node { prev, next }));

        match prev {
            Some(prev_id) => {
                if let Some(mut prev_node) = self.node(prev_id) {
                    prev_node.next = Some(id);
                    self.nodes.set(&prev_id, Some(prev_node));
                }
            }
            None => self.head.set(Some(id)),
        }

        match next {
            Some(next_id) => {
                if let Some(mut next_node) = self.node(next_id) {
                    next_node.prev = Some(id);
                    self.nodes.set(&next_id, Some(next_node));
                }
            }
            None => self.tail.set(Some(id)),
        }

        self.size.set(self.get_size() + 1);
    }

    fn unlink(&mut self, id: Address) {
        let node = match self.node(id) {
            Some(node) => node,
            None => self.env().revert(CdpError::ListMissingNode),
        };

        match node.prev {
            Some(prev_id) => {
                if let Some(mut prev_node) = self.node(prev_id) {
                    prev_node.next = node.next;
                    self.nodes.set(&prev_id, Some(prev_node));
                }
            }
            None => self.head.set(node.next),
        }

        match node.next {
            Some(next_id) => {
                if let Some(mut next_node) = self.node(next_id) {
                    next_node.prev = node.prev;
                    self.nodes.set(&next_id, Some(next_node));
                }
            }
            None => self.tail.set(node.prev),
        }

        self.nodes.set(&id, None);
        self.size.set(self.get_size() - 1);
    }

    fn node(&self, id: Address) -> Option<Node> {
        self.nodes.get(&id).flatten()
    }

    fn live_nicr(&self, id: Address) -> U256 {
        let trove_manager = match self.trove_manager.get() {
            Some(address) => address,
            None => self.env().revert(CdpError::AddressesNotSet),
        };
        TroveManagerContractRef::new(self.env().clone(), trove_manager).get_nominal_icr(id)
    }

    fn require_trove_manager(&self) {
        if self.trove_manager.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::UnauthorizedProtocol);
        }
    }
}
