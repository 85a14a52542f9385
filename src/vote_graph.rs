//! The compressed-ancestry vote graph: the data structure GHOST fork-choice
//! and the round's estimate/completability checks are built on top of.
//!
//! Ported from the original's `VoteGraphImpl`. Block numbers between two
//! graph entries are never stored as individual nodes — only the hashes
//! needed to answer ancestry queries are kept, in each entry's `ancestors`
//! list, ordered nearest-first. Hashing and chain-ancestry lookups are
//! delegated to the caller: this type stays synchronous and has no
//! collaborator dependency of its own, which is a deliberate divergence
//! from the original's `Chain`-holding `VoteGraphImpl` (documented in
//! `DESIGN.md`) so that a type driving an `async` `Chain` trait
//! (`crate::interfaces::Chain`) never has to make the graph itself `async`.

use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::vote::{BlockInfo, Hash, VoteType};
use crate::vote_weight::VoteWeight;
use crate::voter_set::VoterSet;

/// One node of the vote graph: a block that either received a direct vote
/// or is a branch point between two voted-for blocks.
#[derive(Debug, Clone)]
pub struct Entry {
  pub number: u64,
  /// Hashes from this entry's direct parent back to (and including) the
  /// nearest entry above it, nearest first. The last element is always
  /// itself a key of `entries` (`DESIGN.md`'s Open Question resolution).
  pub ancestors: Vec<Hash>,
  pub descendants: Vec<Hash>,
  pub cumulative_vote: VoteWeight,
}

impl Entry {
  /// The ancestor hash at exactly `number`, if it falls within this
  /// entry's compressed ancestry span.
  fn ancestor_block_by(&self, number: u64) -> Option<Hash> {
    if number >= self.number {
      return None;
    }
    let offset = self.number - 1 - number;
    self.ancestors.get(offset as usize).copied()
  }
}

fn in_direct_ancestry(entry: &Entry, hash: Hash, number: u64) -> bool {
  entry.ancestor_block_by(number) == Some(hash)
}

/// The full chain of merge-point hashes walked while resolving a GHOST
/// query, from the starting node to the returned block. Exposed only for
/// diagnostics (`SPEC_FULL.md` §B.4); `find_ghost` itself returns just the
/// final block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subchain {
  pub hashes: Vec<Hash>,
  pub best_number: u64,
}

pub struct VoteGraph {
  base: BlockInfo,
  /// The voter set this graph's `cumulative_vote`s are indexed and weighed
  /// against. Carried here (rather than a bare voter count) so internal
  /// merges of sibling `cumulative_vote`s can translate newly-OR'd bits into
  /// weight per `spec.md` §4.3's `merge(other, voter_set)`.
  voter_set: VoterSet,
  entries: HashMap<Hash, Entry>,
  heads: HashSet<Hash>,
}

impl VoteGraph {
  pub fn new(base: BlockInfo, voter_set: VoterSet) -> Self {
    let mut entries = HashMap::new();
    entries.insert(
      base.hash,
      Entry {
        number: base.number,
        ancestors: Vec::new(),
        descendants: Vec::new(),
        cumulative_vote: VoteWeight::new(voter_set.len()),
      },
    );
    let mut heads = HashSet::new();
    heads.insert(base.hash);
    Self { base, voter_set, entries, heads }
  }

  pub fn base(&self) -> BlockInfo {
    self.base
  }

  pub fn heads(&self) -> impl Iterator<Item = &Hash> {
    self.heads.iter()
  }

  pub fn contains(&self, hash: &Hash) -> bool {
    self.entries.contains_key(hash)
  }

  pub fn entry(&self, hash: &Hash) -> Option<&Entry> {
    self.entries.get(hash)
  }

  /// Finds which heads' ancestry-chains pass through `block`.
  ///
  /// Returns `None` if `block` is already a graph entry. Otherwise returns
  /// the (possibly empty) list of head hashes whose ancestor-edge contains
  /// `block`.
  pub fn find_containing_nodes(&self, block: BlockInfo) -> Option<Vec<Hash>> {
    if self.entries.contains_key(&block.hash) {
      return None;
    }

    let mut containing = Vec::new();
    let mut visited = HashSet::new();

    for &start in &self.heads {
      let mut head = start;
      loop {
        let active_entry = match self.entries.get(&head) {
          Some(entry) => entry,
          None => break,
        };
        if !visited.insert(head) {
          break;
        }

        match active_entry.ancestor_block_by(block.number) {
          Some(hash) => {
            if hash == block.hash {
              containing.push(head);
            }
          }
          None => {
            if let Some(&next) = active_entry.ancestors.last() {
              head = next;
              continue;
            }
          }
        }
        break;
      }
    }

    Some(containing)
  }

  /// Appends a new vote-node for `block`, given the ancestry proof from
  /// the graph base to `block` (nearest-first, terminating with the base
  /// hash). Only called when no existing entry's ancestry already covers
  /// `block`.
  pub fn append(&mut self, block: BlockInfo, ancestry: &[Hash]) -> Result<(), GraphError> {
    if self.base.hash == block.hash {
      return Ok(());
    }
    if self.base.number > block.number {
      return Err(GraphError::ReceivedBlockLessThanBase(block));
    }

    debug_assert!(!ancestry.is_empty());
    debug_assert_eq!(ancestry[0], block.hash);
    debug_assert_eq!(*ancestry.last().unwrap(), self.base.hash);

    let found_index = ancestry[1..]
      .iter()
      .position(|hash| self.entries.contains_key(hash))
      .map(|i| i + 1)
      .ok_or(GraphError::UnknownAncestry(block))?;

    if let Some(entry) = self.entries.get_mut(&ancestry[found_index]) {
      entry.descendants.push(block.hash);
    }

    let ancestors: Vec<Hash> = ancestry[1..=found_index].to_vec();

    if let Some(&oldest_ancestor) = ancestors.last() {
      self.heads.remove(&oldest_ancestor);
      self.heads.insert(block.hash);
    }

    self.entries.insert(
      block.hash,
      Entry {
        number: block.number,
        ancestors,
        descendants: Vec::new(),
        cumulative_vote: VoteWeight::new(self.voter_set.len()),
      },
    );

    Ok(())
  }

  /// Splits an existing ancestor edge to introduce a branch point at
  /// `ancestor`, which every hash in `descendants` has in its
  /// ancestor-edge. `ancestor` must not already be a known entry.
  pub fn introduce_branch(&mut self, descendants: Vec<Hash>, ancestor: BlockInfo) {
    let mut new_ancestors: Vec<Hash> = Vec::new();
    let mut prev_ancestor: Option<Hash> = None;
    let mut filled = false;
    let mut new_descendants = Vec::new();
    let mut new_cumulative = VoteWeight::new(self.voter_set.len());

    for descendant in &descendants {
      let offset = match self.entries.get(descendant) {
        Some(entry) => (entry.number - ancestor.number) as usize,
        None => continue,
      };

      if !filled {
        if let Some(entry) = self.entries.get(descendant) {
          new_ancestors = entry.ancestors[offset..].to_vec();
          prev_ancestor = entry.ancestors.last().copied();
        }
        filled = true;
      }

      if let Some(entry) = self.entries.get_mut(descendant) {
        let cumulative_copy = entry.cumulative_vote.clone();
        entry.ancestors.truncate(offset);
        new_descendants.push(*descendant);
        new_cumulative.merge(&cumulative_copy, &self.voter_set);
      }
    }

    if let Some(prev_hash) = prev_ancestor {
      let descendant_set: HashSet<Hash> = new_descendants.iter().copied().collect();
      if let Some(prev_entry) = self.entries.get_mut(&prev_hash) {
        prev_entry.descendants.retain(|hash| !descendant_set.contains(hash));
        prev_entry.descendants.push(ancestor.hash);
      }
    }

    self.entries.insert(
      ancestor.hash,
      Entry {
        number: ancestor.number,
        ancestors: new_ancestors,
        descendants: new_descendants,
        cumulative_vote: new_cumulative,
      },
    );
  }

  /// Records a vote of `vote_type` from `voter_index` (weight `weight`)
  /// targeting `block`, creating whatever graph structure is needed first.
  /// `ancestry` is consulted only when `block` needs to be appended as a
  /// brand-new entry; pass the base-to-block ancestry proof the same as
  /// for [`VoteGraph::append`].
  pub fn insert(
    &mut self,
    vote_type: VoteType,
    block: BlockInfo,
    voter_index: usize,
    weight: u64,
    ancestry: &[Hash],
  ) -> Result<(), GraphError> {
    if let Some(containing) = self.find_containing_nodes(block) {
      if containing.is_empty() {
        self.append(block, ancestry)?;
      } else {
        self.introduce_branch(containing, block);
      }
    }

    let mut inspecting_hash = block.hash;
    let mut applied = Vec::new();
    loop {
      let active_entry = match self.entries.get_mut(&inspecting_hash) {
        Some(entry) => entry,
        None => {
          // Never leave a vote partially attributed: unset the bit at every
          // entry already credited in this walk before surfacing the error
          // (`spec.md` §7 requires insert to fail without corrupting state).
          for hash in applied {
            if let Some(entry) = self.entries.get_mut(&hash) {
              entry.cumulative_vote.unset(vote_type, voter_index, weight);
            }
          }
          return Err(GraphError::UnknownBlock(block));
        }
      };
      active_entry.cumulative_vote.set(vote_type, voter_index, weight);
      applied.push(inspecting_hash);
      match active_entry.ancestors.last() {
        Some(&parent) => inspecting_hash = parent,
        None => break,
      }
    }

    Ok(())
  }

  /// Moves the graph base backward to an ancestor, given the ancestry
  /// proof from the old base's parent down to (and including) the new
  /// base, nearest-first. The old base's `heads` membership is untouched
  /// (`DESIGN.md`'s Open Question resolution). Returns
  /// [`GraphError::NewerBaseThanOld`] if `ancestry_proof` would place the
  /// new base at or after the current one, per `spec.md` §7's requirement
  /// that `adjust_base` return explicit errors rather than silently no-op
  /// on invariant violations.
  pub fn adjust_base(&mut self, ancestry_proof: &[Hash]) -> Result<(), GraphError> {
    let new_hash = match ancestry_proof.last() {
      Some(&hash) => hash,
      None => return Ok(()),
    };
    if ancestry_proof.len() as u64 > self.base.number {
      return Err(GraphError::NewerBaseThanOld {
        old: self.base,
        new: BlockInfo::new(self.base.number.saturating_sub(ancestry_proof.len() as u64), new_hash),
      });
    }

    let old_cumulative = match self.entries.get_mut(&self.base.hash) {
      Some(old_entry) => {
        old_entry.ancestors.extend_from_slice(ancestry_proof);
        old_entry.cumulative_vote.clone()
      }
      None => return Ok(()),
    };

    let new_number = self.base.number - ancestry_proof.len() as u64;
    self.entries.insert(
      new_hash,
      Entry {
        number: new_number,
        ancestors: Vec::new(),
        descendants: vec![self.base.hash],
        cumulative_vote: old_cumulative,
      },
    );
    self.base = BlockInfo::new(new_number, new_hash);
    Ok(())
  }

  /// The hash of the ancestor of `block` at `number`, if the graph's
  /// compressed ancestry covers that far back. `block` need not itself be a
  /// graph entry. Used to answer "is X an ancestor of (or equal to) Y"
  /// without walking the chain collaborator again (`spec.md` §4.6.7's
  /// catch-up response assembly).
  pub fn ancestor_hash_at(&self, block: BlockInfo, number: u64) -> Option<Hash> {
    if number == block.number {
      return Some(block.hash);
    }
    if number > block.number {
      return None;
    }
    match self.find_containing_nodes(block) {
      None => self.entries.get(&block.hash)?.ancestor_block_by(number),
      Some(children) => children
        .iter()
        .find_map(|child| self.entries.get(child)?.ancestor_block_by(number)),
    }
  }

  /// True if `ancestor` is `of` itself or a known ancestor of `of`.
  pub fn is_equal_or_ancestor(&self, ancestor: BlockInfo, of: BlockInfo) -> bool {
    self.ancestor_hash_at(of, ancestor.number) == Some(ancestor.hash)
  }

  /// Walks from `block` toward the base until `condition` holds, returning
  /// the highest block at or below `block` that satisfies it.
  pub fn find_ancestor(
    &self,
    vote_type: VoteType,
    mut block: BlockInfo,
    condition: impl Fn(&VoteWeight) -> bool,
  ) -> Option<BlockInfo> {
    let _ = vote_type;
    loop {
      match self.find_containing_nodes(block) {
        None => {
          let node = self.entries.get(&block.hash)?;
          if condition(&node.cumulative_vote) {
            return Some(block);
          }
          if node.ancestors.is_empty() {
            return None;
          }
          block = BlockInfo::new(node.number - 1, node.ancestors[0]);
        }
        Some(children) => {
          if children.is_empty() {
            return None;
          }

          let mut cumulative = VoteWeight::new(self.voter_set.len());
          for child in &children {
            if let Some(child_node) = self.entries.get(child) {
              cumulative.merge(&child_node.cumulative_vote, &self.voter_set);
            }
          }

          if condition(&cumulative) {
            return Some(block);
          }

          let last_child = children.last()?;
          let child_node = self.entries.get(last_child)?;
          let offset = child_node.number - block.number;
          if (offset as usize) < child_node.ancestors.len() {
            block = BlockInfo::new(child_node.number - offset - 1, child_node.ancestors[offset as usize]);
          } else {
            return None;
          }
        }
      }
    }
  }

  /// Finds the best GHOST descendant of `current_best` (or of the graph
  /// base, if `None`) that still satisfies `condition`.
  pub fn find_ghost(
    &self,
    vote_type: VoteType,
    current_best: Option<BlockInfo>,
    condition: impl Fn(&VoteWeight) -> bool,
  ) -> Option<BlockInfo> {
    let subchain = self.find_ghost_subchain(vote_type, current_best, condition)?;
    subchain.hashes.last().map(|&hash| BlockInfo::new(subchain.best_number, hash))
  }

  /// Same search as [`VoteGraph::find_ghost`], but returns the full chain of
  /// merge-point hashes walked rather than just the final block. Exposed for
  /// diagnostics and scenario-replay tests (`SPEC_FULL.md` §B.4); callers
  /// that only need the result block should use `find_ghost`.
  pub fn ghost_path(
    &self,
    vote_type: VoteType,
    current_best: Option<BlockInfo>,
    condition: impl Fn(&VoteWeight) -> bool,
  ) -> Option<Subchain> {
    self.find_ghost_subchain(vote_type, current_best, condition)
  }

  fn find_ghost_subchain(
    &self,
    vote_type: VoteType,
    current_best: Option<BlockInfo>,
    condition: impl Fn(&VoteWeight) -> bool,
  ) -> Option<Subchain> {
    let mut force_constrain = false;
    let mut node_key = self.base.hash;

    if let Some(best) = current_best {
      match self.find_containing_nodes(best) {
        Some(containing) => {
          if containing.is_empty() {
            return None;
          }
          let entry = self.entries.get(&containing[0])?;
          node_key = *entry.ancestors.last()?;
          force_constrain = true;
        }
        None => {
          node_key = best.hash;
          force_constrain = false;
        }
      }
    }

    let mut active_node = self.entries.get(&node_key)?.clone();
    if !condition(&active_node.cumulative_vote) {
      return None;
    }

    let mut stack = vec![node_key];
    let mut force = force_constrain;
    while let Some(current_key) = stack.pop() {
      let current = match self.entries.get(&current_key) {
        Some(e) => e.clone(),
        None => continue,
      };

      for descendant_hash in &current.descendants {
        let descendant = match self.entries.get(descendant_hash) {
          Some(e) => e,
          None => continue,
        };

        if force {
          if let Some(best) = current_best {
            if !in_direct_ancestry(descendant, best.hash, best.number) {
              continue;
            }
          }
        }
        if !condition(&descendant.cumulative_vote) {
          continue;
        }

        if descendant.number > active_node.number
          || (descendant.number == active_node.number
            && active_node.cumulative_vote.sum(vote_type) < descendant.cumulative_vote.sum(vote_type))
        {
          node_key = *descendant_hash;
          active_node = descendant.clone();
          stack.push(*descendant_hash);
        }
      }
      force = false;
    }

    let force_info = if force_constrain { current_best } else { None };
    Some(self.ghost_find_merge_point(vote_type, node_key, &active_node, force_info, &condition))
  }

  /// Given a node known to satisfy `condition`, finds the highest point at
  /// which its descendants' weight still unambiguously agrees, returning
  /// the full chain of merge points walked.
  pub fn ghost_find_merge_point(
    &self,
    vote_type: VoteType,
    active_node_hash: Hash,
    active_node: &Entry,
    force_constrain: Option<BlockInfo>,
    condition: &impl Fn(&VoteWeight) -> bool,
  ) -> Subchain {
    let mut descendants: Vec<Hash> = active_node
      .descendants
      .iter()
      .copied()
      .filter(|hash| match force_constrain {
        None => true,
        Some(constraint) => self
          .entries
          .get(hash)
          .map(|e| in_direct_ancestry(e, constraint.hash, constraint.number))
          .unwrap_or(false),
      })
      .collect();

    let base_number = active_node.number;
    let mut best_number = active_node.number;
    let mut hashes = vec![active_node_hash];

    let mut offset: u64 = 0;
    loop {
      let mut new_best: Option<Hash> = None;
      let mut new_best_weight: Option<VoteWeight> = None;
      let mut descendant_blocks: HashMap<Hash, VoteWeight> = HashMap::new();

      offset += 1;
      for d_node in &descendants {
        let entry = match self.entries.get(d_node) {
          Some(e) => e,
          None => continue,
        };
        let ancestor_hash = match entry.ancestor_block_by(base_number + offset) {
          Some(h) => h,
          None => continue,
        };

        match descendant_blocks.get(&ancestor_hash) {
          None => {
            descendant_blocks.insert(ancestor_hash, entry.cumulative_vote.clone());
          }
          Some(_) => {
            let merged = {
              let slot = descendant_blocks.get_mut(&ancestor_hash).unwrap();
              slot.merge(&entry.cumulative_vote, &self.voter_set);
              slot.clone()
            };
            if condition(&merged) {
              let better = match &new_best_weight {
                None => true,
                Some(current_best) => current_best.sum(vote_type) < merged.sum(vote_type),
              };
              if better {
                new_best = Some(ancestor_hash);
                new_best_weight = Some(merged);
              }
            }
          }
        }
      }

      let best = match new_best {
        Some(hash) => hash,
        None => break,
      };

      best_number += 1;
      descendants.retain(|hash| {
        self
          .entries
          .get(hash)
          .map(|e| in_direct_ancestry(e, best, best_number))
          .unwrap_or(false)
      });
      hashes.push(best);
    }

    Subchain { hashes, best_number }
  }
}
