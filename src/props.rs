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

//! Typed property accessors.

use alloc::vec::Vec;
use core::ffi::CStr;

use crate::iterators::{CellIterator, PropertyIterator, StringListIterator};
use crate::ofnode::{Backend, OfContext, Ofnode};
use crate::safe_types::Phandle;
use crate::{FdtError, Result};
use cstr::cstr;
use log::debug;
use tinyvec::ArrayVec;

/// Maximum number of argument cells following a phandle in a phandle list.
pub const MAX_PHANDLE_ARGS: usize = 16;

/// One entry of a phandle list such as `clocks` or `gpios`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhandleArgs {
    /// Node the phandle refers to.
    pub node: Ofnode,
    /// Argument cells following the phandle.
    pub args: ArrayVec<[u32; MAX_PHANDLE_ARGS]>,
}

impl<'a> OfContext<'a> {
    /// Returns the raw value of a property.
    pub fn get_property(&self, node: Ofnode, name: &CStr) -> Result<&[u8]> {
        let value = match self.backend(node)? {
            Backend::Live(tree, id) => tree.get_property(id, name)?,
            Backend::Flat(fdt, offset) => fdt.getprop(offset, name)?,
        };
        value.ok_or(FdtError::NotFound)
    }

    /// Returns whether a node has the property `name`.
    pub fn has_property(&self, node: Ofnode, name: &CStr) -> bool {
        self.get_property(node, name).is_ok()
    }

    /// Returns an iterator over the properties of a node.
    pub fn properties(&self, node: Ofnode) -> Result<PropertyIterator<'_>> {
        match self.backend(node)? {
            Backend::Live(tree, id) => Ok(PropertyIterator::live(tree.properties(id)?)),
            Backend::Flat(fdt, offset) => Ok(PropertyIterator::flat(fdt, fdt.first_property(offset)?)),
        }
    }

    fn read_be<const N: usize>(&self, node: Ofnode, name: &CStr, index: usize) -> Result<[u8; N]> {
        let value = self.get_property(node, name)?;
        let start = index.checked_mul(N).ok_or(FdtError::BadValue)?;
        let bytes = value.get(start..).and_then(|v| v.get(..N)).ok_or(FdtError::BadValue)?;
        bytes.try_into().map_err(|_| FdtError::Internal)
    }

    /// Reads the first byte of a property.
    pub fn read_u8(&self, node: Ofnode, name: &CStr) -> Result<u8> {
        Ok(u8::from_be_bytes(self.read_be(node, name, 0)?))
    }

    /// Reads a 16-bit property.
    pub fn read_u16(&self, node: Ofnode, name: &CStr) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_be(node, name, 0)?))
    }

    /// Reads a <u32> property.
    pub fn read_u32(&self, node: Ofnode, name: &CStr) -> Result<u32> {
        self.read_u32_index(node, name, 0)
    }

    /// Reads the `index`-th cell of a property. Fails with `BadValue` if the property is too
    /// short.
    pub fn read_u32_index(&self, node: Ofnode, name: &CStr, index: usize) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_be(node, name, index)?))
    }

    /// Reads a <u64> property.
    pub fn read_u64(&self, node: Ofnode, name: &CStr) -> Result<u64> {
        self.read_u64_index(node, name, 0)
    }

    /// Reads the `index`-th 64-bit value of a property.
    pub fn read_u64_index(&self, node: Ofnode, name: &CStr, index: usize) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_be(node, name, index)?))
    }

    /// Reads a <u8> property, or returns `default` if it cannot be read.
    pub fn read_u8_default(&self, node: Ofnode, name: &CStr, default: u8) -> u8 {
        self.read_u8(node, name).unwrap_or(default)
    }

    /// Reads a <u16> property, or returns `default` if it cannot be read.
    pub fn read_u16_default(&self, node: Ofnode, name: &CStr, default: u16) -> u16 {
        self.read_u16(node, name).unwrap_or(default)
    }

    /// Reads a <u32> property, or returns `default` if it cannot be read.
    pub fn read_u32_default(&self, node: Ofnode, name: &CStr, default: u32) -> u32 {
        self.read_u32(node, name).unwrap_or(default)
    }

    /// Reads the `index`-th cell of a property, or returns `default` if it cannot be read.
    pub fn read_u32_index_default(&self, node: Ofnode, name: &CStr, index: usize, default: u32) -> u32 {
        self.read_u32_index(node, name, index).unwrap_or(default)
    }

    /// Reads a <u64> property, or returns `default` if it cannot be read.
    pub fn read_u64_default(&self, node: Ofnode, name: &CStr, default: u64) -> u64 {
        self.read_u64(node, name).unwrap_or(default)
    }

    /// Reads a <u32> property as a signed value.
    pub fn read_s32_default(&self, node: Ofnode, name: &CStr, default: i32) -> i32 {
        self.read_u32(node, name).map(|v| v as i32).unwrap_or(default)
    }

    /// Returns whether a boolean property is set, i.e. present.
    pub fn read_bool(&self, node: Ofnode, name: &CStr) -> bool {
        self.has_property(node, name)
    }

    /// Reads a <string> property.
    pub fn read_string(&self, node: Ofnode, name: &CStr) -> Result<&CStr> {
        let value = self.get_property(node, name)?;
        CStr::from_bytes_until_nul(value).map_err(|_| FdtError::BadValue)
    }

    /// Copies a <string> property into `buf`, failing with `Overflow` if it does not fit.
    pub fn read_string_into<'b>(&self, node: Ofnode, name: &CStr, buf: &'b mut [u8]) -> Result<&'b CStr> {
        let value = self.read_string(node, name)?.to_bytes_with_nul();
        let dest = buf.get_mut(..value.len()).ok_or(FdtError::Overflow)?;
        dest.copy_from_slice(value);
        CStr::from_bytes_with_nul(dest).map_err(|_| FdtError::Internal)
    }

    /// Copies the cells of a property into `out` and returns how many were copied.
    ///
    /// Fails with `Overflow` if `out` cannot hold every cell.
    pub fn read_u32_array(&self, node: Ofnode, name: &CStr, out: &mut [u32]) -> Result<usize> {
        let cells = CellIterator::new(self.get_property(node, name)?);
        let count = cells.remaining();
        if count > out.len() {
            return Err(FdtError::Overflow);
        }
        for (dest, cell) in out.iter_mut().zip(cells) {
            *dest = cell;
        }
        Ok(count)
    }

    /// Returns an iterator over the strings of a <stringlist> property.
    pub fn read_string_list_iter(&self, node: Ofnode, name: &CStr) -> Result<StringListIterator<'_>> {
        let value = self.get_property(node, name)?;
        if value.last().is_some_and(|&c| c != 0) {
            return Err(FdtError::BadValue);
        }
        Ok(StringListIterator::new(value))
    }

    /// Returns the strings of a <stringlist> property.
    pub fn read_string_list(&self, node: Ofnode, name: &CStr) -> Result<Vec<&CStr>> {
        Ok(self.read_string_list_iter(node, name)?.collect())
    }

    /// Returns the number of strings in a <stringlist> property.
    pub fn read_string_count(&self, node: Ofnode, name: &CStr) -> Result<usize> {
        Ok(self.read_string_list_iter(node, name)?.count())
    }

    /// Returns the `index`-th string of a <stringlist> property.
    pub fn read_string_index(&self, node: Ofnode, name: &CStr, index: usize) -> Result<&CStr> {
        self.read_string_list_iter(node, name)?.nth(index).ok_or(FdtError::NotFound)
    }

    /// Returns the position of `value` in a <stringlist> property.
    pub fn stringlist_search(&self, node: Ofnode, name: &CStr, value: &CStr) -> Result<usize> {
        self.read_string_list_iter(node, name)?.position(|s| s == value).ok_or(FdtError::NotFound)
    }

    /// Returns the phandle of a node.
    pub fn get_phandle(&self, node: Ofnode) -> Result<Phandle> {
        let phandle = match self.backend(node)? {
            Backend::Live(tree, id) => tree.get_phandle(id)?,
            Backend::Flat(fdt, offset) => fdt.get_phandle(offset)?,
        };
        phandle.ok_or(FdtError::NotFound)
    }

    /// Returns whether a node is enabled: its `status` is absent, "okay" or "ok".
    pub fn is_enabled(&self, node: Ofnode) -> bool {
        match self.read_string(node, cstr!("status")) {
            Ok(status) => matches!(status.to_bytes(), b"okay" | b"ok"),
            Err(FdtError::NotFound) => self.backend(node).is_ok(),
            Err(_) => false,
        }
    }

    /// Returns whether `compatible` is one of the strings of the node's `compatible` property.
    pub fn device_is_compatible(&self, node: Ofnode, compatible: &CStr) -> bool {
        self.stringlist_search(node, cstr!("compatible"), compatible).is_ok()
    }

    /// Finds the node with `phandle` in the tree that holds `node`.
    fn phandle_target(&self, node: Ofnode, phandle: u32) -> Result<Ofnode> {
        let phandle = Phandle::try_from(phandle)?;
        let target = match self.backend(node)? {
            Backend::Live(tree, id) => {
                let root = tree.root_of(id)?;
                self.node_from_live(tree.find_by_phandle(root, phandle)?)
            }
            Backend::Flat(fdt, _) => self.rebase(node, fdt.node_offset_by_phandle(phandle)?),
        };
        if target.is_valid() {
            Ok(target)
        } else {
            debug!("Unresolved phandle {phandle:?}");
            Err(FdtError::NotFound)
        }
    }

    /// Splits a phandle list into its (phandle, target, arguments) entries. Null phandles are
    /// kept as entries with no arguments and an invalid target.
    fn phandle_entries(
        &self,
        node: Ofnode,
        list_name: &CStr,
        cells_name: Option<&CStr>,
        cell_count: usize,
    ) -> Result<Vec<(Ofnode, ArrayVec<[u32; MAX_PHANDLE_ARGS]>)>> {
        let mut cells = CellIterator::new(self.get_property(node, list_name)?);
        let mut entries = Vec::new();
        while let Some(phandle) = cells.next() {
            if phandle == 0 {
                entries.push((Ofnode::NULL, ArrayVec::new()));
                continue;
            }
            let target = self.phandle_target(node, phandle)?;
            let count = match cells_name {
                Some(name) => self.read_u32(target, name)? as usize,
                None => cell_count,
            };
            if count > MAX_PHANDLE_ARGS || count > cells.remaining() {
                debug!("Phandle list {list_name:?} too short for {count} arguments");
                return Err(FdtError::BadValue);
            }
            entries.push((target, cells.by_ref().take(count).collect()));
        }
        Ok(entries)
    }

    /// Resolves entry `index` of a phandle list. The number of arguments of each entry is read
    /// from the target's `cells_name` property, or is `cell_count` if `cells_name` is `None`.
    pub fn parse_phandle_with_args(
        &self,
        node: Ofnode,
        list_name: &CStr,
        cells_name: Option<&CStr>,
        cell_count: usize,
        index: usize,
    ) -> Result<PhandleArgs> {
        let entries = self.phandle_entries(node, list_name, cells_name, cell_count)?;
        match entries.get(index) {
            Some((node, args)) if node.is_valid() => Ok(PhandleArgs { node: *node, args: args.clone() }),
            _ => Err(FdtError::NotFound),
        }
    }

    /// Returns the number of entries of a phandle list.
    pub fn count_phandle_with_args(
        &self,
        node: Ofnode,
        list_name: &CStr,
        cells_name: Option<&CStr>,
        cell_count: usize,
    ) -> Result<usize> {
        Ok(self.phandle_entries(node, list_name, cells_name, cell_count)?.len())
    }

    /// Sets a property of a live node.
    pub fn write_prop(&mut self, node: Ofnode, name: &CStr, value: &[u8]) -> Result<()> {
        let (tree, id) = self.live_mut(node)?;
        tree.set_property(id, name, value)
    }

    /// Sets a <string> property of a live node.
    pub fn write_string(&mut self, node: Ofnode, name: &CStr, value: &CStr) -> Result<()> {
        self.write_prop(node, name, value.to_bytes_with_nul())
    }

    /// Sets a <u32> property of a live node.
    pub fn write_u32(&mut self, node: Ofnode, name: &CStr, value: u32) -> Result<()> {
        self.write_prop(node, name, &value.to_be_bytes())
    }

    /// Sets a <u64> property of a live node.
    pub fn write_u64(&mut self, node: Ofnode, name: &CStr, value: u64) -> Result<()> {
        self.write_prop(node, name, &value.to_be_bytes())
    }

    /// Adds or removes a boolean property of a live node.
    pub fn write_bool(&mut self, node: Ofnode, name: &CStr, value: bool) -> Result<()> {
        if value {
            return self.write_prop(node, name, &[]);
        }
        let (tree, id) = self.live_mut(node)?;
        match tree.remove_property(id, name) {
            Ok(()) | Err(FdtError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Sets the `status` of a live node to "okay" or "disabled".
    pub fn set_enabled(&mut self, node: Ofnode, enabled: bool) -> Result<()> {
        let status = if enabled { cstr!("okay") } else { cstr!("disabled") };
        self.write_string(node, cstr!("status"), status)
    }

    /// Adds a child to a live node.
    pub fn add_subnode(&mut self, parent: Ofnode, name: &CStr) -> Result<Ofnode> {
        let (tree, id) = self.live_mut(parent)?;
        Ok(Ofnode::Live(tree.add_subnode(id, name)?))
    }
}
