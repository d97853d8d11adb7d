// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Node references valid in either tree representation, and the context that resolves them.

use alloc::vec::Vec;
use core::ffi::{c_void, CStr};

use crate::fdt::Fdt;
use crate::live::{LiveTree, NodeId};
use crate::offset::{OffsetCodec, RawOffset, TreeId};
use crate::registry::TreeRegistry;
use crate::safe_types::{NodeOffset, Phandle};
use crate::{FdtError, Result};
use log::debug;

/// Reference to a node of a flattened or live device tree.
///
/// Which variant is in use is fixed by the mode of the `OfContext` that produced the value; a
/// reference of the other variant is treated as invalid by that context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ofnode {
    /// Node of the live tree.
    Live(NodeId),
    /// Node of a flattened tree, packed by the context's `OffsetCodec`.
    Flat(RawOffset),
}

impl Ofnode {
    /// The invalid node, returned by every failed lookup.
    pub const NULL: Self = Self::Flat(RawOffset::INVALID);

    pub(crate) fn from_live(id: Option<NodeId>) -> Self {
        id.map_or(Self::NULL, Self::Live)
    }

    /// Returns whether this refers to a node, as opposed to being `NULL`.
    pub fn is_valid(self) -> bool {
        match self {
            Self::Live(_) => true,
            Self::Flat(raw) => raw.is_valid(),
        }
    }
}

impl Default for Ofnode {
    fn default() -> Self {
        Self::NULL
    }
}

/// Handle on one whole device tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Oftree<'a> {
    /// No tree, e.g. because the registry is full.
    Null,
    /// Live tree, identified by its root.
    Live(NodeId),
    /// Flattened tree.
    Flat(&'a Fdt),
}

impl Oftree<'_> {
    /// Returns whether this refers to a tree.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Node resolved into the primitives of the backend holding it.
#[derive(Clone, Copy, Debug)]
pub enum Backend<'t> {
    /// Node of the live tree.
    Live(&'t LiveTree, NodeId),
    /// Node of a flattened tree.
    Flat(&'t Fdt, NodeOffset),
}

/// Settings fixed for the lifetime of an `OfContext`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Allow `build_live_tree` to switch to the live representation.
    pub live_tree: bool,
    /// Allow flat nodes of trees other than the control tree.
    pub multi_tree: bool,
    /// Translate `reg` addresses through the `ranges` of parent buses.
    pub translate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { live_tree: false, multi_tree: true, translate: true }
    }
}

/// Device tree state of the boot stage: the control tree, the other flattened trees that nodes
/// may refer to and, once built, the live tree.
#[derive(Debug)]
pub struct OfContext<'a> {
    config: Config,
    codec: OffsetCodec,
    registry: TreeRegistry<'a>,
    live: Option<LiveTree>,
    // Root of the copy of each flattened tree in the live arena; the control tree comes first.
    live_roots: Vec<(*const c_void, NodeId)>,
}

impl<'a> OfContext<'a> {
    /// Creates the pre-relocation context, in flat mode.
    pub fn new(control: &'a Fdt, config: Config) -> Self {
        let codec = if config.multi_tree { OffsetCodec::Multi } else { OffsetCodec::Single };
        Self { config, codec, registry: TreeRegistry::new(control), live: None, live_roots: Vec::new() }
    }

    /// Returns the configuration.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Returns the encoding used for flat nodes.
    pub fn codec(&self) -> OffsetCodec {
        self.codec
    }

    /// Returns the control tree blob.
    pub fn control(&self) -> &'a Fdt {
        self.registry.control()
    }

    /// Returns whether nodes refer to the live tree.
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Returns whether `oftree_reset` has been called.
    pub fn is_relocated(&self) -> bool {
        self.registry.is_relocated()
    }

    /// Returns the registry of flattened trees.
    pub fn registry(&self) -> &TreeRegistry<'a> {
        &self.registry
    }

    /// Returns the live tree, once built.
    pub fn live_tree(&self) -> Option<&LiveTree> {
        self.live.as_ref()
    }

    /// Starts the post-relocation stage: the tree registry is emptied then seeded with the
    /// control tree.
    ///
    /// Flat nodes of any other tree obtained before this call no longer resolve.
    pub fn oftree_reset(&mut self) {
        self.registry.reset();
        debug!("Device tree registry reset, control tree at {:?}", self.control().as_ptr());
    }

    /// Records that the control tree now lives at `fdt`, e.g. after being relocated.
    pub fn set_control_fdt(&mut self, fdt: &'a Fdt) {
        self.registry.set_control(fdt);
    }

    /// Builds the live tree from the control tree, switching the context to live mode.
    pub fn build_live_tree(&mut self) -> Result<()> {
        if !self.config.live_tree || !self.is_relocated() || self.is_live() {
            return Err(FdtError::BadState);
        }
        let control = self.control();
        let mut tree = LiveTree::new();
        let root = tree.unflatten(control)?;
        self.live_roots.push((control.as_ptr(), root));
        self.live = Some(tree);
        Ok(())
    }

    /// Resolves a node into its backend. Invalid nodes, nodes of the other mode and nodes of
    /// trees no longer registered all give `NotFound`.
    pub fn backend(&self, node: Ofnode) -> Result<Backend<'_>> {
        match (node, &self.live) {
            (Ofnode::Live(id), Some(tree)) if tree.contains(id) => Ok(Backend::Live(tree, id)),
            (Ofnode::Flat(raw), None) if raw.is_valid() => {
                let (id, offset) = self.codec.unpack(raw).map_err(|e| {
                    debug!("Malformed flat node {raw:?}: {e}");
                    FdtError::NotFound
                })?;
                let fdt = self.registry.lookup(id).ok_or_else(|| {
                    debug!("Flat node {raw:?} refers to unregistered or stale tree {}", id.get());
                    FdtError::NotFound
                })?;
                Ok(Backend::Flat(fdt, offset))
            }
            _ => Err(FdtError::NotFound),
        }
    }

    /// Resolves a node for modification. Flattened trees are read-only, so this fails with
    /// `BadState` until the live tree is built.
    pub(crate) fn live_mut(&mut self, node: Ofnode) -> Result<(&mut LiveTree, NodeId)> {
        match (&mut self.live, node) {
            (None, _) => Err(FdtError::BadState),
            (Some(tree), Ofnode::Live(id)) if tree.contains(id) => Ok((tree, id)),
            _ => Err(FdtError::NotFound),
        }
    }

    /// Returns the blob holding a flat node.
    pub fn node_to_fdt(&self, node: Ofnode) -> Result<&Fdt> {
        match self.backend(node)? {
            Backend::Flat(fdt, _) => Ok(fdt),
            Backend::Live(..) => Err(FdtError::BadState),
        }
    }

    /// Returns the structure block offset of a flat node.
    pub fn node_to_offset(&self, node: Ofnode) -> Result<NodeOffset> {
        match self.backend(node)? {
            Backend::Flat(_, offset) => Ok(offset),
            Backend::Live(..) => Err(FdtError::BadState),
        }
    }

    pub(crate) fn node_from_live(&self, id: Option<NodeId>) -> Ofnode {
        if self.is_live() {
            Ofnode::from_live(id)
        } else {
            Ofnode::NULL
        }
    }

    pub(crate) fn node_from_flat(&self, tree: TreeId, offset: Option<NodeOffset>) -> Ofnode {
        match offset {
            Some(offset) if !self.is_live() => Ofnode::Flat(self.codec.pack_offset(tree, offset)),
            _ => Ofnode::NULL,
        }
    }

    /// Builds the node at `offset` in the same flattened tree as `node`.
    pub(crate) fn rebase(&self, node: Ofnode, offset: Option<NodeOffset>) -> Ofnode {
        match (node, offset) {
            (Ofnode::Flat(raw), Some(offset)) if !self.is_live() => {
                Ofnode::Flat(self.codec.rebase(raw, offset))
            }
            _ => Ofnode::NULL,
        }
    }

    /// Returns a handle on `fdt`, registering it if needed.
    ///
    /// In live mode the blob is unflattened into the live arena on first use. Returns
    /// `Oftree::Null` if the tree cannot be addressed, e.g. because the registry is full. Only the
    /// control tree is accepted before relocation and in single-tree mode.
    pub fn oftree_from_fdt(&mut self, fdt: &'a Fdt) -> Oftree<'a> {
        if let Some(tree) = self.live.as_mut() {
            if let Some((_, root)) = self.live_roots.iter().find(|(p, _)| *p == fdt.as_ptr()) {
                return Oftree::Live(*root);
            }
            if !self.config.multi_tree {
                debug!("Single-tree mode, ignoring device tree at {:?}", fdt.as_ptr());
                return Oftree::Null;
            }
            return match tree.unflatten(fdt) {
                Ok(root) => {
                    self.live_roots.push((fdt.as_ptr(), root));
                    Oftree::Live(root)
                }
                Err(e) => {
                    debug!("Failed to unflatten device tree at {:?}: {e}", fdt.as_ptr());
                    Oftree::Null
                }
            };
        }
        let registered = if self.config.multi_tree {
            self.registry.ensure(fdt).is_ok()
        } else {
            self.registry.find(fdt) == Some(TreeId::CONTROL)
        };
        if registered {
            Oftree::Flat(fdt)
        } else {
            Oftree::Null
        }
    }

    /// Returns the tree used by the boot stage itself.
    pub fn oftree_default(&self) -> Oftree<'a> {
        match self.live_roots.first() {
            Some((_, root)) if self.is_live() => Oftree::Live(*root),
            _ => Oftree::Flat(self.control()),
        }
    }

    fn is_default(&self, tree: Oftree<'a>) -> bool {
        tree == self.oftree_default()
    }

    /// Returns the root node of a tree.
    pub fn oftree_root(&self, tree: Oftree<'a>) -> Ofnode {
        match tree {
            Oftree::Null => Ofnode::NULL,
            Oftree::Live(root) => self.node_from_live(Some(root)),
            Oftree::Flat(fdt) => match self.registry.find(fdt) {
                Some(id) => self.node_from_flat(id, Some(NodeOffset::ROOT)),
                None => Ofnode::NULL,
            },
        }
    }

    /// Finds a node of `tree` by absolute path. Paths starting with an alias are only resolved
    /// in the default tree.
    pub fn oftree_path(&self, tree: Oftree<'a>, path: &CStr) -> Ofnode {
        let path = path.to_bytes();
        if path.first() != Some(&b'/') && !self.is_default(tree) {
            return Ofnode::NULL;
        }
        let root = self.oftree_root(tree);
        let found = match self.backend(root) {
            Ok(Backend::Live(live, id)) => live.find_by_path(id, path).map(|n| self.node_from_live(n)),
            Ok(Backend::Flat(fdt, _)) => fdt.path_offset(path).map(|o| self.rebase(root, o)),
            Err(e) => Err(e),
        };
        found.unwrap_or_else(|e| {
            debug!("Path lookup failed: {e}");
            Ofnode::NULL
        })
    }

    /// Finds the node of `tree` with the given phandle.
    pub fn oftree_get_by_phandle(&self, tree: Oftree<'a>, phandle: u32) -> Ofnode {
        let Ok(phandle) = Phandle::try_from(phandle) else {
            return Ofnode::NULL;
        };
        let root = self.oftree_root(tree);
        let found = match self.backend(root) {
            Ok(Backend::Live(live, id)) => {
                live.find_by_phandle(id, phandle).map(|n| self.node_from_live(n))
            }
            Ok(Backend::Flat(fdt, _)) => {
                fdt.node_offset_by_phandle(phandle).map(|o| self.rebase(root, o))
            }
            Err(e) => Err(e),
        };
        found.unwrap_or(Ofnode::NULL)
    }
}
