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

//! Read-only walker over a Flattened Device Tree blob.
//!
//! Nodes are addressed by the offset of their FDT_BEGIN_NODE tag within the structure block, the
//! same addressing libfdt uses, so that offsets can be stored in packed node references.

use alloc::vec::Vec;
use core::ffi::{c_void, CStr};

use crate::safe_types::{FdtHeader, NodeOffset, Phandle, PropOffset};
use crate::{FdtError, Result};
use cstr::cstr;
use zerocopy::FromBytes;

pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

const TAG_SIZE: usize = 4;
const PROP_HEADER_SIZE: usize = 3 * TAG_SIZE;

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

fn be_u32_at(bytes: &[u8], offset: usize) -> Result<u32> {
    let end = offset.checked_add(TAG_SIZE).ok_or(FdtError::Truncated)?;
    let word = bytes.get(offset..end).ok_or(FdtError::Truncated)?;
    Ok(u32::from_be_bytes(word.try_into().map_err(|_| FdtError::Internal)?))
}

/// Matches a node name against a lookup name; a lookup name without a unit address also matches
/// `name@unit-address`.
pub(crate) fn nodename_eq(node_name: &[u8], name: &[u8]) -> bool {
    match node_name.strip_prefix(name) {
        Some([]) => true,
        Some([b'@', ..]) => !name.contains(&b'@'),
        _ => false,
    }
}

/// One item of the structure block.
#[derive(Clone, Copy, Debug)]
struct Tag {
    kind: u32,
    next: usize,
}

/// Wrapper around a validated Flattened Device Tree.
#[derive(Debug)]
#[repr(transparent)]
pub struct Fdt {
    buffer: [u8],
}

impl Fdt {
    /// Wraps a slice containing a Flattened Device Tree.
    ///
    /// Fails if the FDT does not pass validation.
    pub fn from_slice(fdt: &[u8]) -> Result<&Self> {
        check_header(fdt)?;
        // SAFETY: The header was validated, which is all the wrapper relies on.
        let fdt = unsafe { Self::unchecked_from_slice(fdt) };
        fdt.check_structure()?;

        Ok(fdt)
    }

    /// Wraps a slice containing a Flattened Device Tree.
    ///
    /// # Safety
    ///
    /// The slice must start with a complete header whose blocks lie within the slice.
    pub unsafe fn unchecked_from_slice(fdt: &[u8]) -> &Self {
        let self_ptr = fdt as *const _ as *const _;
        // SAFETY: The pointer is non-null, dereferenceable, and points to allocated memory.
        unsafe { &*self_ptr }
    }

    /// Returns a shared pointer to the device tree, its identity in a tree registry.
    pub fn as_ptr(&self) -> *const c_void {
        self.buffer.as_ptr().cast()
    }

    /// Returns the device tree as a slice (may be smaller than the containing buffer).
    pub fn as_slice(&self) -> &[u8] {
        let size = self.totalsize().unwrap_or(self.buffer.len());
        self.buffer.get(..size).unwrap_or(&self.buffer)
    }

    pub(crate) fn totalsize(&self) -> Result<usize> {
        Ok(self.header()?.totalsize.get() as usize)
    }

    fn header(&self) -> Result<&FdtHeader> {
        // A valid FDT (verified by constructor) starts with a complete header.
        FdtHeader::ref_from_prefix(&self.buffer).ok_or(FdtError::Internal)
    }

    fn struct_block(&self) -> Result<&[u8]> {
        let header = self.header()?;
        let start = header.off_dt_struct.get() as usize;
        let size = if header.version.get() >= 17 {
            header.size_dt_struct.get() as usize
        } else {
            self.totalsize()?.saturating_sub(start)
        };
        let end = start.checked_add(size).ok_or(FdtError::Internal)?;
        self.buffer.get(start..end).ok_or(FdtError::Internal)
    }

    fn strings_block(&self) -> Result<&[u8]> {
        let header = self.header()?;
        let start = header.off_dt_strings.get() as usize;
        let size = header.size_dt_strings.get() as usize;
        let end = start.checked_add(size).ok_or(FdtError::Internal)?;
        self.buffer.get(start..end).ok_or(FdtError::Internal)
    }

    /// Returns the nul-terminated string at `offset` in the strings block.
    pub fn string(&self, offset: usize) -> Result<&CStr> {
        let bytes = self.strings_block()?.get(offset..).ok_or(FdtError::BadOffset)?;
        CStr::from_bytes_until_nul(bytes).map_err(|_| FdtError::Truncated)
    }

    fn tag(&self, offset: usize) -> Result<Tag> {
        let block = self.struct_block()?;
        let kind = be_u32_at(block, offset)?;
        let body = offset + TAG_SIZE;
        let next = match kind {
            FDT_BEGIN_NODE => {
                let name = block.get(body..).ok_or(FdtError::Truncated)?;
                let name = CStr::from_bytes_until_nul(name).map_err(|_| FdtError::Truncated)?;
                align4(body + name.to_bytes_with_nul().len())
            }
            FDT_PROP => {
                let len = be_u32_at(block, body)? as usize;
                let end = (offset + PROP_HEADER_SIZE).checked_add(len).ok_or(FdtError::Truncated)?;
                if end > block.len() {
                    return Err(FdtError::Truncated);
                }
                align4(end)
            }
            FDT_END_NODE | FDT_NOP | FDT_END => body,
            _ => return Err(FdtError::BadStructure),
        };
        Ok(Tag { kind, next })
    }

    /// Returns the offset following the FDT_BEGIN_NODE tag and name of `node`.
    fn node_body(&self, node: NodeOffset) -> Result<usize> {
        let offset = node.as_usize();
        if offset % TAG_SIZE != 0 {
            return Err(FdtError::BadOffset);
        }
        match self.tag(offset) {
            Ok(Tag { kind: FDT_BEGIN_NODE, next }) => Ok(next),
            Ok(_) | Err(FdtError::Truncated) => Err(FdtError::BadOffset),
            Err(e) => Err(e),
        }
    }

    fn check_structure(&self) -> Result<()> {
        let mut offset = 0;
        let mut depth = 0usize;
        let mut seen_root = false;
        loop {
            let tag = self.tag(offset)?;
            match tag.kind {
                FDT_BEGIN_NODE => {
                    if depth == 0 {
                        if seen_root {
                            return Err(FdtError::BadStructure);
                        }
                        seen_root = true;
                    }
                    depth += 1;
                }
                FDT_END_NODE => {
                    depth = depth.checked_sub(1).ok_or(FdtError::BadStructure)?;
                }
                FDT_PROP => {
                    if depth == 0 {
                        return Err(FdtError::BadStructure);
                    }
                    let nameoff = be_u32_at(self.struct_block()?, offset + 2 * TAG_SIZE)?;
                    self.string(nameoff as usize).map_err(|_| FdtError::BadStructure)?;
                }
                FDT_NOP => {}
                _ => {
                    // FDT_END
                    return if depth == 0 && seen_root { Ok(()) } else { Err(FdtError::Truncated) };
                }
            }
            offset = tag.next;
        }
    }

    /// Returns the name of a node, including its unit address.
    pub fn node_name(&self, node: NodeOffset) -> Result<&CStr> {
        self.node_body(node)?;
        let start = node.as_usize() + TAG_SIZE;
        let name = self.struct_block()?.get(start..).ok_or(FdtError::BadOffset)?;
        CStr::from_bytes_until_nul(name).map_err(|_| FdtError::Truncated)
    }

    /// Returns the first property of a node.
    pub fn first_property(&self, node: NodeOffset) -> Result<Option<PropOffset>> {
        self.property_from(self.node_body(node)?)
    }

    /// Returns the property following `prop` in the same node.
    pub fn next_property(&self, prop: PropOffset) -> Result<Option<PropOffset>> {
        let tag = self.tag(prop.0)?;
        if tag.kind != FDT_PROP {
            return Err(FdtError::BadOffset);
        }
        self.property_from(tag.next)
    }

    fn property_from(&self, mut offset: usize) -> Result<Option<PropOffset>> {
        loop {
            let tag = self.tag(offset)?;
            match tag.kind {
                FDT_PROP => return Ok(Some(PropOffset(offset))),
                FDT_NOP => offset = tag.next,
                _ => return Ok(None),
            }
        }
    }

    /// Returns the name and value of the property at `prop`.
    pub fn property(&self, prop: PropOffset) -> Result<(&CStr, &[u8])> {
        let block = self.struct_block()?;
        if be_u32_at(block, prop.0)? != FDT_PROP {
            return Err(FdtError::BadOffset);
        }
        let len = be_u32_at(block, prop.0 + TAG_SIZE)? as usize;
        let nameoff = be_u32_at(block, prop.0 + 2 * TAG_SIZE)? as usize;
        let start = prop.0 + PROP_HEADER_SIZE;
        let value = block.get(start..start + len).ok_or(FdtError::Truncated)?;
        Ok((self.string(nameoff)?, value))
    }

    /// Returns the value of the property named `name` of a node.
    pub fn getprop(&self, node: NodeOffset, name: &CStr) -> Result<Option<&[u8]>> {
        let mut prop = self.first_property(node)?;
        while let Some(offset) = prop {
            let (prop_name, value) = self.property(offset)?;
            if prop_name == name {
                return Ok(Some(value));
            }
            prop = self.next_property(offset)?;
        }
        Ok(None)
    }

    /// Returns the value of a <u32> property.
    pub fn getprop_u32(&self, node: NodeOffset, name: &CStr) -> Result<Option<u32>> {
        if let Some(bytes) = self.getprop(node, name)? {
            Ok(Some(u32::from_be_bytes(bytes.try_into().map_err(|_| FdtError::BadValue)?)))
        } else {
            Ok(None)
        }
    }

    /// Returns the next node in document order and its depth relative to `node`, which is taken
    /// to be at `depth`. Returns `None` once the walk leaves the subtree at depth 0.
    pub fn next_node(&self, node: NodeOffset, depth: usize) -> Result<Option<(NodeOffset, usize)>> {
        let mut offset = self.node_body(node)?;
        let mut depth = depth;
        loop {
            let tag = self.tag(offset)?;
            match tag.kind {
                FDT_BEGIN_NODE => return Ok(Some((NodeOffset::new(offset)?, depth + 1))),
                FDT_END_NODE => {
                    if depth == 0 {
                        return Ok(None);
                    }
                    depth -= 1;
                }
                FDT_END => return Ok(None),
                _ => {}
            }
            offset = tag.next;
        }
    }

    /// Returns the next node in document order, regardless of depth.
    pub(crate) fn next_node_in_tree(&self, node: NodeOffset) -> Result<Option<NodeOffset>> {
        let mut offset = self.node_body(node)?;
        loop {
            let tag = self.tag(offset)?;
            match tag.kind {
                FDT_BEGIN_NODE => return Ok(Some(NodeOffset::new(offset)?)),
                FDT_END => return Ok(None),
                _ => offset = tag.next,
            }
        }
    }

    /// Returns the first child of a node.
    pub fn first_subnode(&self, node: NodeOffset) -> Result<Option<NodeOffset>> {
        Ok(self.next_node(node, 0)?.map(|(offset, _)| offset))
    }

    /// Returns the next sibling of a node.
    pub fn next_subnode(&self, node: NodeOffset) -> Result<Option<NodeOffset>> {
        let mut cur = (node, 1);
        loop {
            match self.next_node(cur.0, cur.1)? {
                Some((offset, 1)) => return Ok(Some(offset)),
                Some(next) => cur = next,
                None => return Ok(None),
            }
        }
    }

    /// Returns the child of `parent` named `name`.
    pub fn subnode_offset(&self, parent: NodeOffset, name: &[u8]) -> Result<Option<NodeOffset>> {
        let mut child = self.first_subnode(parent)?;
        while let Some(offset) = child {
            if nodename_eq(self.node_name(offset)?.to_bytes(), name) {
                return Ok(Some(offset));
            }
            child = self.next_subnode(offset)?;
        }
        Ok(None)
    }

    /// Resolves an absolute path, or a path starting with an alias from `/aliases`.
    pub fn path_offset(&self, path: &[u8]) -> Result<Option<NodeOffset>> {
        let (mut node, rest) = match path {
            [] => return Err(FdtError::BadPath),
            [b'/', rest @ ..] => (NodeOffset::ROOT, rest),
            _ => {
                let split = path.iter().position(|&c| c == b'/').unwrap_or(path.len());
                let (alias, rest) = path.split_at(split);
                let Some(node) = self.alias_offset(alias)? else {
                    return Ok(None);
                };
                (node, rest)
            }
        };
        for component in rest.split(|&c| c == b'/').filter(|c| !c.is_empty()) {
            match self.subnode_offset(node, component)? {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn alias_offset(&self, alias: &[u8]) -> Result<Option<NodeOffset>> {
        let Some(aliases) = self.subnode_offset(NodeOffset::ROOT, b"aliases")? else {
            return Ok(None);
        };
        let mut prop = self.first_property(aliases)?;
        while let Some(offset) = prop {
            let (name, value) = self.property(offset)?;
            if name.to_bytes() == alias {
                let target = CStr::from_bytes_until_nul(value).map_err(|_| FdtError::BadValue)?;
                let target = target.to_bytes();
                if target.first() != Some(&b'/') {
                    return Err(FdtError::BadPath);
                }
                return self.path_offset(target);
            }
            prop = self.next_property(offset)?;
        }
        Ok(None)
    }

    /// Returns the parent of a node, or `None` for the root.
    pub fn parent_offset(&self, node: NodeOffset) -> Result<Option<NodeOffset>> {
        self.node_body(node)?;
        if node == NodeOffset::ROOT {
            return Ok(None);
        }
        // Entry `d` holds the most recent node seen at depth `d`.
        let mut ancestors = Vec::from([NodeOffset::ROOT]);
        let mut cur = (NodeOffset::ROOT, 0);
        while let Some((offset, depth)) = self.next_node(cur.0, cur.1)? {
            ancestors.truncate(depth);
            if offset == node {
                return Ok(ancestors.last().copied());
            }
            ancestors.push(offset);
            cur = (offset, depth);
        }
        Err(FdtError::BadOffset)
    }

    /// Returns the phandle of a node, if it has one.
    pub fn get_phandle(&self, node: NodeOffset) -> Result<Option<Phandle>> {
        if let Some(value) = self.getprop_u32(node, cstr!("phandle"))? {
            Ok(Some(value.try_into()?))
        } else if let Some(value) = self.getprop_u32(node, cstr!("linux,phandle"))? {
            Ok(Some(value.try_into()?))
        } else {
            Ok(None)
        }
    }

    /// Returns the node whose phandle is `phandle`.
    pub fn node_offset_by_phandle(&self, phandle: Phandle) -> Result<Option<NodeOffset>> {
        let mut node = Some(NodeOffset::ROOT);
        while let Some(offset) = node {
            if self.get_phandle(offset)? == Some(phandle) {
                return Ok(Some(offset));
            }
            node = self.next_node_in_tree(offset)?;
        }
        Ok(None)
    }

    /// Returns whether `compatible` is one of the strings of the node's `compatible` property.
    pub fn node_check_compatible(&self, node: NodeOffset, compatible: &CStr) -> Result<bool> {
        let Some(value) = self.getprop(node, cstr!("compatible"))? else {
            return Ok(false);
        };
        Ok(value.split(|&c| c == 0).any(|s| s == compatible.to_bytes()))
    }

    /// Returns the first node after `start` (or the root itself, when `start` is `None`) for
    /// which `pred` holds.
    fn find_node_after(
        &self,
        start: Option<NodeOffset>,
        mut pred: impl FnMut(NodeOffset) -> Result<bool>,
    ) -> Result<Option<NodeOffset>> {
        let mut node = match start {
            None => Some(NodeOffset::ROOT),
            Some(offset) => self.next_node_in_tree(offset)?,
        };
        while let Some(offset) = node {
            if pred(offset)? {
                return Ok(Some(offset));
            }
            node = self.next_node_in_tree(offset)?;
        }
        Ok(None)
    }

    /// Returns the next node after `start` that is compatible with `compatible`.
    pub fn node_offset_by_compatible(
        &self,
        start: Option<NodeOffset>,
        compatible: &CStr,
    ) -> Result<Option<NodeOffset>> {
        self.find_node_after(start, |node| self.node_check_compatible(node, compatible))
    }

    /// Returns the next node after `start` with a property `name` equal to `value`.
    pub fn node_offset_by_prop_value(
        &self,
        start: Option<NodeOffset>,
        name: &CStr,
        value: &[u8],
    ) -> Result<Option<NodeOffset>> {
        self.find_node_after(start, |node| Ok(self.getprop(node, name)? == Some(value)))
    }
}

impl PartialEq for Fdt {
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

fn check_header(fdt: &[u8]) -> Result<()> {
    let header = FdtHeader::ref_from_prefix(fdt).ok_or(FdtError::Truncated)?;
    if header.magic.get() != FdtHeader::MAGIC {
        return Err(FdtError::BadMagic);
    }
    if header.version.get() < FdtHeader::LAST_COMP_VERSION
        || header.last_comp_version.get() > FdtHeader::VERSION
    {
        return Err(FdtError::BadVersion);
    }
    let totalsize = header.totalsize.get() as usize;
    if totalsize < FdtHeader::SIZE || totalsize > fdt.len() {
        return Err(FdtError::Truncated);
    }
    if i32::try_from(totalsize).is_err() {
        return Err(FdtError::BadOffset);
    }
    let struct_start = header.off_dt_struct.get() as usize;
    let struct_size = if header.version.get() >= 17 {
        header.size_dt_struct.get() as usize
    } else {
        totalsize.saturating_sub(struct_start)
    };
    let strings_start = header.off_dt_strings.get() as usize;
    let strings_size = header.size_dt_strings.get() as usize;
    if struct_start % TAG_SIZE != 0 {
        return Err(FdtError::BadStructure);
    }
    for (start, size) in [(struct_start, struct_size), (strings_start, strings_size)] {
        if start < FdtHeader::SIZE || start.checked_add(size).map_or(true, |end| end > totalsize) {
            return Err(FdtError::Truncated);
        }
    }
    Ok(())
}
