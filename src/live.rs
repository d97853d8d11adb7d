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

//! Mutable, fully linked device tree.
//!
//! Nodes live in a single arena and are linked through `NodeId`s. Several trees may share one
//! arena; each has its own root, and ids are never reused, so a `NodeId` names one node across
//! all of them.

use alloc::ffi::CString;
use alloc::vec::Vec;
use core::ffi::CStr;

use crate::fdt::{nodename_eq, Fdt};
use crate::safe_types::{NodeOffset, Phandle};
use crate::writer::FdtWriter;
use crate::{FdtError, Result};
use cstr::cstr;
use log::debug;

/// Index of a node in a `LiveTree` arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named property value.
#[derive(Clone, Debug)]
pub struct Property {
    name: CString,
    value: Vec<u8>,
}

impl Property {
    /// Returns the property name.
    pub fn name(&self) -> &CStr {
        &self.name
    }

    /// Returns the raw, big-endian property value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// One node of a live tree.
#[derive(Clone, Debug)]
pub struct DeviceNode {
    name: CString,
    parent: Option<NodeId>,
    child: Option<NodeId>,
    sibling: Option<NodeId>,
    properties: Vec<Property>,
}

/// Arena holding every live node.
#[derive(Clone, Debug, Default)]
pub struct LiveTree {
    nodes: Vec<DeviceNode>,
}

impl LiveTree {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: NodeId) -> Result<&DeviceNode> {
        self.nodes.get(id.index()).ok_or(FdtError::NotFound)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut DeviceNode> {
        self.nodes.get_mut(id.index()).ok_or(FdtError::NotFound)
    }

    /// Returns whether `id` names a node of this arena.
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    fn alloc(&mut self, name: CString, parent: Option<NodeId>) -> Result<NodeId> {
        let id = NodeId(self.nodes.len().try_into().map_err(|_| FdtError::Overflow)?);
        self.nodes.push(DeviceNode { name, parent, child: None, sibling: None, properties: Vec::new() });
        if let Some(parent) = parent {
            match self.last_child(parent)? {
                Some(last) => self.node_mut(last)?.sibling = Some(id),
                None => self.node_mut(parent)?.child = Some(id),
            }
        }
        Ok(id)
    }

    fn last_child(&self, parent: NodeId) -> Result<Option<NodeId>> {
        let mut last = None;
        let mut child = self.first_child(parent)?;
        while let Some(id) = child {
            last = Some(id);
            child = self.next_sibling(id)?;
        }
        Ok(last)
    }

    /// Copies a flattened tree into the arena and returns its new root.
    pub fn unflatten(&mut self, fdt: &Fdt) -> Result<NodeId> {
        let root = self.unflatten_node(fdt, NodeOffset::ROOT, None)?;
        debug!("Unflattened device tree at {:?} into {} live nodes", fdt.as_ptr(), self.nodes.len());
        Ok(root)
    }

    fn unflatten_node(&mut self, fdt: &Fdt, offset: NodeOffset, parent: Option<NodeId>) -> Result<NodeId> {
        let id = self.alloc(fdt.node_name(offset)?.into(), parent)?;
        let mut prop = fdt.first_property(offset)?;
        while let Some(prop_offset) = prop {
            let (name, value) = fdt.property(prop_offset)?;
            self.node_mut(id)?.properties.push(Property { name: name.into(), value: value.to_vec() });
            prop = fdt.next_property(prop_offset)?;
        }
        let mut child = fdt.first_subnode(offset)?;
        while let Some(child_offset) = child {
            self.unflatten_node(fdt, child_offset, Some(id))?;
            child = fdt.next_subnode(child_offset)?;
        }
        Ok(id)
    }

    /// Serializes the tree rooted at `root` into a new blob.
    pub fn flatten(&self, root: NodeId) -> Result<Vec<u8>> {
        if self.parent(root)?.is_some() {
            return Err(FdtError::BadOffset);
        }
        let mut writer = FdtWriter::new();
        self.flatten_node(root, &mut writer)?;
        writer.finish()
    }

    fn flatten_node(&self, id: NodeId, writer: &mut FdtWriter) -> Result<()> {
        let node = self.node(id)?;
        writer.begin_node(&node.name)?;
        for prop in &node.properties {
            writer.property(&prop.name, &prop.value)?;
        }
        let mut child = node.child;
        while let Some(child_id) = child {
            self.flatten_node(child_id, writer)?;
            child = self.node(child_id)?.sibling;
        }
        writer.end_node()
    }

    /// Returns the value of the property `name` of a node.
    pub fn get_property(&self, id: NodeId, name: &CStr) -> Result<Option<&[u8]>> {
        Ok(self.node(id)?.properties.iter().find(|p| p.name() == name).map(Property::value))
    }

    /// Returns every property of a node, in insertion order.
    pub fn properties(&self, id: NodeId) -> Result<&[Property]> {
        Ok(&self.node(id)?.properties)
    }

    /// Returns the first child of a node.
    pub fn first_child(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.child)
    }

    /// Returns the next sibling of a node.
    pub fn next_sibling(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.sibling)
    }

    /// Returns the parent of a node, or `None` for a root.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Returns the name of a node, including its unit address.
    pub fn name(&self, id: NodeId) -> Result<&CStr> {
        Ok(&self.node(id)?.name)
    }

    /// Returns the root of the tree containing `id`.
    pub fn root_of(&self, mut id: NodeId) -> Result<NodeId> {
        while let Some(parent) = self.parent(id)? {
            id = parent;
        }
        Ok(id)
    }

    /// Returns the node following `id` in depth-first order, staying within its tree.
    pub fn next_node(&self, id: NodeId) -> Result<Option<NodeId>> {
        if let Some(child) = self.first_child(id)? {
            return Ok(Some(child));
        }
        let mut cur = id;
        loop {
            if let Some(sibling) = self.next_sibling(cur)? {
                return Ok(Some(sibling));
            }
            match self.parent(cur)? {
                Some(parent) => cur = parent,
                None => return Ok(None),
            }
        }
    }

    /// Returns the child of `parent` named `name`.
    pub fn find_subnode(&self, parent: NodeId, name: &[u8]) -> Result<Option<NodeId>> {
        let mut child = self.first_child(parent)?;
        while let Some(id) = child {
            if nodename_eq(self.name(id)?.to_bytes(), name) {
                return Ok(Some(id));
            }
            child = self.next_sibling(id)?;
        }
        Ok(None)
    }

    /// Resolves an absolute path, or a path starting with an alias, in the tree rooted at `root`.
    pub fn find_by_path(&self, root: NodeId, path: &[u8]) -> Result<Option<NodeId>> {
        let (mut node, rest) = match path {
            [] => return Err(FdtError::BadPath),
            [b'/', rest @ ..] => (root, rest),
            _ => {
                let split = path.iter().position(|&c| c == b'/').unwrap_or(path.len());
                let (alias, rest) = path.split_at(split);
                let Some(node) = self.find_alias(root, alias)? else {
                    return Ok(None);
                };
                (node, rest)
            }
        };
        for component in rest.split(|&c| c == b'/').filter(|c| !c.is_empty()) {
            match self.find_subnode(node, component)? {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn find_alias(&self, root: NodeId, alias: &[u8]) -> Result<Option<NodeId>> {
        let Some(aliases) = self.find_subnode(root, b"aliases")? else {
            return Ok(None);
        };
        let Some(prop) = self.properties(aliases)?.iter().find(|p| p.name().to_bytes() == alias) else {
            return Ok(None);
        };
        let target = CStr::from_bytes_until_nul(prop.value()).map_err(|_| FdtError::BadValue)?;
        match target.to_bytes() {
            path @ [b'/', ..] => self.find_by_path(root, path),
            _ => Err(FdtError::BadPath),
        }
    }

    /// Returns the phandle of a node, if it has one.
    pub fn get_phandle(&self, id: NodeId) -> Result<Option<Phandle>> {
        for name in [cstr!("phandle"), cstr!("linux,phandle")] {
            if let Some(value) = self.get_property(id, name)? {
                let value = u32::from_be_bytes(value.try_into().map_err(|_| FdtError::BadValue)?);
                return Ok(Some(value.try_into()?));
            }
        }
        Ok(None)
    }

    /// Returns the node of the tree rooted at `root` whose phandle is `phandle`.
    pub fn find_by_phandle(&self, root: NodeId, phandle: Phandle) -> Result<Option<NodeId>> {
        let mut node = Some(root);
        while let Some(id) = node {
            if self.get_phandle(id)? == Some(phandle) {
                return Ok(Some(id));
            }
            node = self.next_node(id)?;
        }
        Ok(None)
    }

    /// Sets a property, replacing any previous value.
    pub fn set_property(&mut self, id: NodeId, name: &CStr, value: &[u8]) -> Result<()> {
        let node = self.node_mut(id)?;
        if let Some(prop) = node.properties.iter_mut().find(|p| p.name.as_c_str() == name) {
            prop.value = value.to_vec();
        } else {
            node.properties.push(Property { name: name.into(), value: value.to_vec() });
        }
        Ok(())
    }

    /// Removes a property.
    pub fn remove_property(&mut self, id: NodeId, name: &CStr) -> Result<()> {
        let node = self.node_mut(id)?;
        let index = node.properties.iter().position(|p| p.name.as_c_str() == name);
        node.properties.remove(index.ok_or(FdtError::NotFound)?);
        Ok(())
    }

    /// Appends a child named `name` to `parent`.
    pub fn add_subnode(&mut self, parent: NodeId, name: &CStr) -> Result<NodeId> {
        let bytes = name.to_bytes();
        if bytes.is_empty() || bytes.contains(&b'/') {
            return Err(FdtError::BadPath);
        }
        let mut child = self.first_child(parent)?;
        while let Some(id) = child {
            if self.name(id)? == name {
                return Err(FdtError::Exists);
            }
            child = self.next_sibling(id)?;
        }
        self.alloc(name.into(), Some(parent))
    }
}
