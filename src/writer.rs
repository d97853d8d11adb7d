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

//! Sequential writer producing Flattened Device Tree blobs.

use alloc::collections::BTreeMap;
use alloc::ffi::CString;
use alloc::vec::Vec;
use core::ffi::CStr;
use core::mem::size_of;

use crate::fdt::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_PROP};
use crate::safe_types::FdtHeader;
use crate::{FdtError, Result};
use zerocopy::byteorder::big_endian;
use zerocopy::AsBytes;

// Pad a byte vector to the given alignment.
fn align_data(data: &mut Vec<u8>, alignment: usize) {
    let pad = (alignment - data.len() % alignment) % alignment;
    data.resize(data.len() + pad, 0u8);
}

fn be32(value: usize) -> Result<big_endian::U32> {
    Ok(big_endian::U32::new(value.try_into().map_err(|_| FdtError::Overflow)?))
}

// Property names, stored once each.
#[derive(Default)]
struct FdtStrings {
    strings: Vec<u8>,
    string_offsets: BTreeMap<CString, u32>,
}

impl FdtStrings {
    // Find an existing instance of `s`, or add it to the strings block.
    fn intern_string(&mut self, s: &CStr) -> Result<u32> {
        if let Some(off) = self.string_offsets.get(s) {
            return Ok(*off);
        }
        let off = self.strings.len().try_into().map_err(|_| FdtError::Overflow)?;
        self.strings.extend_from_slice(s.to_bytes_with_nul());
        self.string_offsets.insert(s.into(), off);
        Ok(off)
    }
}

/// Builds a blob one node at a time, in document order.
///
/// ```ignore
/// let mut fdt = FdtWriter::new();
/// fdt.begin_node(cstr!(""))?;
/// fdt.property_u32(cstr!("#address-cells"), 2)?;
/// fdt.begin_node(cstr!("memory@80000000"))?;
/// fdt.end_node()?;
/// fdt.end_node()?;
/// let blob = fdt.finish()?;
/// ```
#[derive(Default)]
pub struct FdtWriter {
    data: Vec<u8>,
    strings: FdtStrings,
    depth: usize,
    props_allowed: bool,
    root_done: bool,
}

impl FdtWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a node. The first node must be the root, named "".
    pub fn begin_node(&mut self, name: &CStr) -> Result<()> {
        if self.root_done || (self.depth == 0 && !name.to_bytes().is_empty()) {
            return Err(FdtError::BadState);
        }
        if self.depth > 0 && name.to_bytes().is_empty() {
            return Err(FdtError::BadPath);
        }
        self.data.extend(FDT_BEGIN_NODE.to_be_bytes());
        self.data.extend_from_slice(name.to_bytes_with_nul());
        align_data(&mut self.data, size_of::<u32>());
        self.depth += 1;
        self.props_allowed = true;
        Ok(())
    }

    /// Closes the most recently opened node.
    pub fn end_node(&mut self) -> Result<()> {
        self.depth = self.depth.checked_sub(1).ok_or(FdtError::BadState)?;
        self.data.extend(FDT_END_NODE.to_be_bytes());
        self.props_allowed = false;
        self.root_done = self.depth == 0;
        Ok(())
    }

    /// Adds a property to the open node. Properties must precede the node's children.
    pub fn property(&mut self, name: &CStr, value: &[u8]) -> Result<()> {
        if self.depth == 0 || !self.props_allowed {
            return Err(FdtError::BadState);
        }
        let nameoff = self.strings.intern_string(name)?;
        let len: u32 = value.len().try_into().map_err(|_| FdtError::Overflow)?;
        self.data.extend(FDT_PROP.to_be_bytes());
        self.data.extend(len.to_be_bytes());
        self.data.extend(nameoff.to_be_bytes());
        self.data.extend_from_slice(value);
        align_data(&mut self.data, size_of::<u32>());
        Ok(())
    }

    /// Adds an empty property.
    pub fn property_null(&mut self, name: &CStr) -> Result<()> {
        self.property(name, &[])
    }

    /// Adds a <u32> property.
    pub fn property_u32(&mut self, name: &CStr, value: u32) -> Result<()> {
        self.property(name, &value.to_be_bytes())
    }

    /// Adds a <u64> property.
    pub fn property_u64(&mut self, name: &CStr, value: u64) -> Result<()> {
        self.property(name, &value.to_be_bytes())
    }

    /// Adds a <string> property.
    pub fn property_string(&mut self, name: &CStr, value: &CStr) -> Result<()> {
        self.property(name, value.to_bytes_with_nul())
    }

    /// Adds a <stringlist> property.
    pub fn property_string_list(&mut self, name: &CStr, values: &[&CStr]) -> Result<()> {
        let value: Vec<u8> = values.iter().flat_map(|s| s.to_bytes_with_nul()).copied().collect();
        self.property(name, &value)
    }

    /// Adds a <prop-encoded-array> of u32 cells.
    pub fn property_array_u32(&mut self, name: &CStr, values: &[u32]) -> Result<()> {
        let value: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.property(name, &value)
    }

    /// Finishes the blob, which must contain a closed root node.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if !self.root_done {
            return Err(FdtError::BadState);
        }
        self.data.extend(FDT_END.to_be_bytes());

        // Memory reservation block holding only its terminating entry.
        let rsvmap = [0u8; 2 * size_of::<u64>()];
        let off_mem_rsvmap = FdtHeader::SIZE;
        let off_dt_struct = off_mem_rsvmap + rsvmap.len();
        let off_dt_strings = off_dt_struct + self.data.len();
        let totalsize = off_dt_strings + self.strings.strings.len();

        let header = FdtHeader {
            magic: FdtHeader::MAGIC.into(),
            totalsize: be32(totalsize)?,
            off_dt_struct: be32(off_dt_struct)?,
            off_dt_strings: be32(off_dt_strings)?,
            off_mem_rsvmap: be32(off_mem_rsvmap)?,
            version: FdtHeader::VERSION.into(),
            last_comp_version: FdtHeader::LAST_COMP_VERSION.into(),
            boot_cpuid_phys: 0u32.into(),
            size_dt_strings: be32(self.strings.strings.len())?,
            size_dt_struct: be32(self.data.len())?,
        };

        let mut blob = Vec::with_capacity(totalsize);
        blob.extend_from_slice(header.as_bytes());
        blob.extend_from_slice(&rsvmap);
        blob.extend(self.data);
        blob.extend(self.strings.strings);
        Ok(blob)
    }
}
