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

//! Address and size properties, whose encoding depends on the cell counts of the parent bus.

use alloc::vec::Vec;
use core::ffi::CStr;
use core::ops::Range;

use crate::cells::{
    read_cells, translate_through_ranges, write_cells, Cells, RangesCells, DEFAULT_ADDRESS_CELLS,
    DEFAULT_SIZE_CELLS,
};
use crate::ofnode::{OfContext, Ofnode};
use crate::{FdtError, Result};
use cstr::cstr;
use log::debug;

impl<'a> OfContext<'a> {
    fn read_cell_count(&self, node: Ofnode, name: &CStr, default: u32) -> Result<Cells> {
        let count = match self.read_u32(node, name) {
            Ok(count) => count,
            Err(FdtError::NotFound) => default,
            Err(e) => return Err(e),
        };
        Cells::try_from(count).map_err(|e| {
            debug!("Unsupported {name:?} = {count}");
            e
        })
    }

    /// Returns the `#address-cells` declared by a node for its children.
    pub fn read_simple_addr_cells(&self, node: Ofnode) -> Result<Cells> {
        self.read_cell_count(node, cstr!("#address-cells"), DEFAULT_ADDRESS_CELLS)
    }

    /// Returns the `#size-cells` declared by a node for its children.
    pub fn read_simple_size_cells(&self, node: Ofnode) -> Result<Cells> {
        self.read_cell_count(node, cstr!("#size-cells"), DEFAULT_SIZE_CELLS)
    }

    /// Returns the number of cells of the addresses in the `reg` of a node, as declared by its
    /// parent.
    pub fn read_addr_cells(&self, node: Ofnode) -> Result<Cells> {
        self.backend(node)?;
        self.read_simple_addr_cells(self.get_parent(node))
    }

    /// Returns the number of cells of the sizes in the `reg` of a node, as declared by its
    /// parent.
    pub fn read_size_cells(&self, node: Ofnode) -> Result<Cells> {
        self.backend(node)?;
        self.read_simple_size_cells(self.get_parent(node))
    }

    /// Returns entry `index` of the `reg` of a node, as an (address, size) pair.
    ///
    /// The address is translated to the CPU address space if the context is configured to.
    pub fn get_addr_size_index(&self, node: Ofnode, index: usize) -> Result<(u64, u64)> {
        let addr_cells = self.read_addr_cells(node)?;
        let size_cells = self.read_size_cells(node)?;
        let reg = self.get_property(node, cstr!("reg"))?;
        let entry_len = addr_cells.bytes() + size_cells.bytes();
        let entry = reg.chunks_exact(entry_len).nth(index).ok_or(FdtError::NotFound)?;
        let (addr, size) = entry.split_at(addr_cells.bytes());
        let addr = read_cells(addr, addr_cells)?;
        let size = read_cells(size, size_cells)?;
        let addr = if self.config().translate { self.translate_address(node, addr)? } else { addr };
        Ok((addr, size))
    }

    /// Returns the address of entry `index` of the `reg` of a node.
    pub fn get_addr_index(&self, node: Ofnode, index: usize) -> Result<u64> {
        Ok(self.get_addr_size_index(node, index)?.0)
    }

    /// Returns the address of the first entry of the `reg` of a node.
    pub fn get_addr(&self, node: Ofnode) -> Result<u64> {
        self.get_addr_index(node, 0)
    }

    /// Returns the size of the first entry of the `reg` of a node.
    pub fn get_size(&self, node: Ofnode) -> Result<u64> {
        Ok(self.get_addr_size_index(node, 0)?.1)
    }

    /// Returns entry `index` of the `reg` of a node as a range of CPU addresses.
    pub fn read_resource(&self, node: Ofnode, index: usize) -> Result<Range<u64>> {
        let (start, size) = self.get_addr_size_index(node, index)?;
        Ok(start..start.checked_add(size).ok_or(FdtError::Overflow)?)
    }

    /// Returns the `reg` entry of a node named `name` in its `reg-names`.
    pub fn read_resource_byname(&self, node: Ofnode, name: &CStr) -> Result<Range<u64>> {
        let index = self.stringlist_search(node, cstr!("reg-names"), name)?;
        self.read_resource(node, index)
    }

    /// Translates an address from the bus space of `node`'s parent to the CPU address space,
    /// through the `ranges` of each bus up to the root.
    ///
    /// Fails with `BadValue` if a bus has no `ranges`, and with `NotFound` if no window of a
    /// bus contains the address.
    pub fn translate_address(&self, node: Ofnode, addr: u64) -> Result<u64> {
        self.backend(node)?;
        let mut addr = addr;
        let mut bus = self.get_parent(node);
        loop {
            let parent = self.get_parent(bus);
            if !parent.is_valid() {
                return Ok(addr);
            }
            let ranges = match self.get_property(bus, cstr!("ranges")) {
                Err(FdtError::NotFound) => {
                    debug!("No ranges in {:?}, cannot translate {addr:#x}", self.get_name(bus));
                    return Err(FdtError::BadValue);
                }
                ranges => ranges?,
            };
            let cells = RangesCells {
                child_addr: self.read_simple_addr_cells(bus)?,
                parent_addr: self.read_simple_addr_cells(parent)?,
                size: self.read_simple_size_cells(bus)?,
            };
            addr = translate_through_ranges(ranges, cells, addr)?.ok_or(FdtError::NotFound)?;
            bus = parent;
        }
    }

    /// Replaces the `reg` of a live node, encoding each (address, size) pair with the cell
    /// counts of its parent.
    pub fn write_reg(&mut self, node: Ofnode, regs: &[(u64, u64)]) -> Result<()> {
        let addr_cells = self.read_addr_cells(node)?;
        let size_cells = self.read_size_cells(node)?;
        let mut value = Vec::with_capacity(regs.len() * (addr_cells.bytes() + size_cells.bytes()));
        for &(addr, size) in regs {
            value.extend_from_slice(&write_cells(addr, addr_cells)?);
            value.extend_from_slice(&write_cells(size, size_cells)?);
        }
        self.write_prop(node, cstr!("reg"), &value)
    }
}
