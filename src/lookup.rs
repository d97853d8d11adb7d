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

//! Node lookup and traversal.
//!
//! Every function returns `Ofnode::NULL` when the node cannot be found, including when it is
//! given an invalid node.

use alloc::string::String;
use alloc::vec::Vec;
use core::ffi::CStr;

use crate::fdt::Fdt;
use crate::iterators::SubnodeIterator;
use crate::ofnode::{Backend, OfContext, Ofnode};
use crate::safe_types::NodeOffset;
use crate::{FdtError, Result};
use cstr::cstr;
use log::debug;

impl<'a> OfContext<'a> {
    /// Returns the root node of the default tree.
    pub fn root(&self) -> Ofnode {
        self.oftree_root(self.oftree_default())
    }

    /// Finds a node of the default tree by path, either absolute or starting with an alias.
    pub fn path(&self, path: &CStr) -> Ofnode {
        self.oftree_path(self.oftree_default(), path)
    }

    /// Returns the child of `parent` named `name`. A name without a unit address matches the
    /// first child with that name and any unit address.
    pub fn find_subnode(&self, parent: Ofnode, name: &CStr) -> Ofnode {
        let name = name.to_bytes();
        match self.backend(parent) {
            Ok(Backend::Live(tree, id)) => {
                self.node_from_live(tree.find_subnode(id, name).ok().flatten())
            }
            Ok(Backend::Flat(fdt, offset)) => {
                self.rebase(parent, fdt.subnode_offset(offset, name).ok().flatten())
            }
            Err(_) => Ofnode::NULL,
        }
    }

    /// Returns the first child of a node.
    pub fn first_subnode(&self, node: Ofnode) -> Ofnode {
        match self.backend(node) {
            Ok(Backend::Live(tree, id)) => self.node_from_live(tree.first_child(id).ok().flatten()),
            Ok(Backend::Flat(fdt, offset)) => {
                self.rebase(node, fdt.first_subnode(offset).ok().flatten())
            }
            Err(_) => Ofnode::NULL,
        }
    }

    /// Returns the next sibling of a node.
    pub fn next_subnode(&self, node: Ofnode) -> Ofnode {
        match self.backend(node) {
            Ok(Backend::Live(tree, id)) => {
                self.node_from_live(tree.next_sibling(id).ok().flatten())
            }
            Ok(Backend::Flat(fdt, offset)) => {
                self.rebase(node, fdt.next_subnode(offset).ok().flatten())
            }
            Err(_) => Ofnode::NULL,
        }
    }

    /// Returns an iterator over the children of `parent`.
    pub fn subnodes(&self, parent: Ofnode) -> SubnodeIterator<'_, 'a> {
        SubnodeIterator::new(self, self.first_subnode(parent))
    }

    /// Returns the parent of a node, or `Ofnode::NULL` for a root.
    pub fn get_parent(&self, node: Ofnode) -> Ofnode {
        match self.backend(node) {
            Ok(Backend::Live(tree, id)) => self.node_from_live(tree.parent(id).ok().flatten()),
            Ok(Backend::Flat(fdt, offset)) => {
                self.rebase(node, fdt.parent_offset(offset).ok().flatten())
            }
            Err(_) => Ofnode::NULL,
        }
    }

    /// Returns the name of a node, including its unit address. The root is named "".
    pub fn get_name(&self, node: Ofnode) -> Result<&CStr> {
        match self.backend(node)? {
            Backend::Live(tree, id) => tree.name(id),
            Backend::Flat(fdt, offset) => fdt.node_name(offset),
        }
    }

    /// Returns the absolute path of a node.
    pub fn get_path(&self, node: Ofnode) -> Result<String> {
        let mut names = Vec::new();
        let mut cur = node;
        self.backend(cur)?;
        while self.get_parent(cur).is_valid() {
            names.push(self.get_name(cur)?);
            cur = self.get_parent(cur);
        }
        if names.is_empty() {
            return Ok(String::from("/"));
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name.to_str().map_err(|_| FdtError::BadValue)?);
        }
        Ok(path)
    }

    /// Finds the node of the default tree with the given phandle.
    pub fn get_by_phandle(&self, phandle: u32) -> Ofnode {
        self.oftree_get_by_phandle(self.oftree_default(), phandle)
    }

    /// Returns the first node after `from` in its tree that matches. Flat trees are searched by
    /// `flat`, given the offset to start after; live nodes are tested one by one with `live`.
    /// When `from` is `Ofnode::NULL` the search covers the whole default tree, root included.
    fn search(
        &self,
        from: Ofnode,
        flat: impl FnOnce(&Fdt, Option<NodeOffset>) -> Result<Option<NodeOffset>>,
        live: impl Fn(Ofnode) -> Result<bool>,
    ) -> Ofnode {
        let base = if from.is_valid() { from } else { self.root() };
        match self.backend(base) {
            Ok(Backend::Flat(fdt, offset)) => match flat(fdt, from.is_valid().then_some(offset)) {
                Ok(found) => self.rebase(base, found),
                Err(e) => {
                    debug!("Search stopped at a malformed node: {e}");
                    Ofnode::NULL
                }
            },
            Ok(Backend::Live(tree, id)) => {
                let mut next =
                    if from.is_valid() { tree.next_node(id).ok().flatten() } else { Some(id) };
                while let Some(id) = next {
                    let node = Ofnode::Live(id);
                    match live(node) {
                        Ok(true) => return node,
                        Ok(false) => {}
                        Err(e) => debug!("Skipping node during search: {e}"),
                    }
                    next = tree.next_node(id).ok().flatten();
                }
                Ofnode::NULL
            }
            Err(_) => Ofnode::NULL,
        }
    }

    /// Returns the next node after `from` compatible with `compatible`.
    pub fn by_compatible(&self, from: Ofnode, compatible: &CStr) -> Ofnode {
        self.search(
            from,
            |fdt, start| fdt.node_offset_by_compatible(start, compatible),
            |node| Ok(self.device_is_compatible(node, compatible)),
        )
    }

    /// Returns the next node after `from` whose property `name` has exactly the value `value`.
    pub fn by_prop_value(&self, from: Ofnode, name: &CStr, value: &[u8]) -> Ofnode {
        self.search(
            from,
            |fdt, start| fdt.node_offset_by_prop_value(start, name, value),
            |node| match self.get_property(node, name) {
                Ok(v) => Ok(v == value),
                Err(FdtError::NotFound) => Ok(false),
                Err(e) => Err(e),
            },
        )
    }

    /// Returns the `/chosen` node of the default tree.
    pub fn chosen(&self) -> Ofnode {
        self.path(cstr!("/chosen"))
    }

    /// Reads a string property of `/chosen`.
    pub fn read_chosen_string(&self, name: &CStr) -> Result<&CStr> {
        self.read_string(self.chosen(), name)
    }

    /// Returns the node whose path is the value of the `/chosen` property `name`.
    pub fn get_chosen_node(&self, name: &CStr) -> Ofnode {
        match self.read_chosen_string(name) {
            Ok(path) => self.path(path),
            Err(_) => Ofnode::NULL,
        }
    }

    /// Returns the node named by the `/aliases` property `name`.
    pub fn get_aliases_node(&self, name: &CStr) -> Ofnode {
        match self.read_string(self.path(cstr!("/aliases")), name) {
            Ok(path) => self.path(path),
            Err(_) => Ofnode::NULL,
        }
    }
}
