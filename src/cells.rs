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

//! Conversion between addresses or sizes and their encoding as 32-bit cells.

use core::mem::size_of;

use crate::{FdtError, Result};
use log::warn;
use tinyvec::ArrayVec;

/// Value of `#address-cells` assumed when a node does not declare one.
pub const DEFAULT_ADDRESS_CELLS: u32 = 2;
/// Value of `#size-cells` assumed when a node does not declare one.
pub const DEFAULT_SIZE_CELLS: u32 = 1;

/// Encoded form of one address or size.
pub type CellBuf = ArrayVec<[u8; size_of::<u64>()]>;

/// Number of 32-bit cells encoding one address or size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cells {
    /// One cell
    Single = 1,
    /// Two cells, most significant first
    Double = 2,
}

impl Cells {
    /// Size in bytes of a value encoded with these cells.
    pub const fn bytes(self) -> usize {
        self as usize * size_of::<u32>()
    }
}

impl TryFrom<u32> for Cells {
    type Error = FdtError;

    fn try_from(count: u32) -> Result<Self> {
        match count {
            1 => Ok(Self::Single),
            2 => Ok(Self::Double),
            _ => Err(FdtError::BadNCells),
        }
    }
}

/// Decodes the big-endian value of `bytes`, which must hold exactly `cells` cells.
pub fn read_cells(bytes: &[u8], cells: Cells) -> Result<u64> {
    match cells {
        Cells::Single => {
            let bytes = bytes.try_into().map_err(|_| FdtError::BadValue)?;
            Ok(u32::from_be_bytes(bytes).into())
        }
        Cells::Double => {
            let bytes = bytes.try_into().map_err(|_| FdtError::BadValue)?;
            Ok(u64::from_be_bytes(bytes))
        }
    }
}

/// Encodes `value` as `cells` big-endian cells.
///
/// Fails with `Overflow` if the value would be truncated.
pub fn write_cells(value: u64, cells: Cells) -> Result<CellBuf> {
    let mut buf = CellBuf::new();
    match cells {
        Cells::Single => {
            let Ok(value) = u32::try_from(value) else {
                warn!("{value:#x} does not fit in a single cell");
                return Err(FdtError::Overflow);
            };
            buf.extend_from_slice(&value.to_be_bytes());
        }
        Cells::Double => buf.extend_from_slice(&value.to_be_bytes()),
    }
    Ok(buf)
}

/// Cell widths needed to decode the `ranges` property of a bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangesCells {
    /// `#address-cells` of the bus, for child addresses.
    pub child_addr: Cells,
    /// `#address-cells` of the bus parent, for parent addresses.
    pub parent_addr: Cells,
    /// `#size-cells` of the bus.
    pub size: Cells,
}

/// Maps `addr` from a bus address space to its parent's through the bus `ranges`.
///
/// An empty `ranges` is an identity mapping. Returns `None` when no window contains `addr`.
pub fn translate_through_ranges(ranges: &[u8], cells: RangesCells, addr: u64) -> Result<Option<u64>> {
    if ranges.is_empty() {
        return Ok(Some(addr));
    }
    let child_len = cells.child_addr.bytes();
    let parent_len = cells.parent_addr.bytes();
    let entry_len = child_len + parent_len + cells.size.bytes();
    if ranges.len() % entry_len != 0 {
        return Err(FdtError::BadValue);
    }
    for entry in ranges.chunks_exact(entry_len) {
        let (child, rest) = entry.split_at(child_len);
        let (parent, size) = rest.split_at(parent_len);
        let child = read_cells(child, cells.child_addr)?;
        let size = read_cells(size, cells.size)?;
        if addr >= child && addr - child < size {
            let parent = read_cells(parent, cells.parent_addr)?;
            return Ok(Some(parent.checked_add(addr - child).ok_or(FdtError::Overflow)?));
        }
    }
    Ok(None)
}
