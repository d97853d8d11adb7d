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

//! Safe zero-cost wrappers around integer values used by the flattened format.

use core::mem::size_of;

use crate::{FdtError, Result};

use static_assertions::const_assert_eq;
use zerocopy::byteorder::big_endian;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Flattened device tree header, stored big-endian at the start of the blob.
#[repr(C)]
#[derive(Debug, AsBytes, FromZeroes, FromBytes)]
pub struct FdtHeader {
    /// magic word FDT_MAGIC
    pub magic: big_endian::U32,
    /// total size of DT block
    pub totalsize: big_endian::U32,
    /// offset to structure
    pub off_dt_struct: big_endian::U32,
    /// offset to strings
    pub off_dt_strings: big_endian::U32,
    /// offset to memory reserve map
    pub off_mem_rsvmap: big_endian::U32,
    /// format version
    pub version: big_endian::U32,
    /// last compatible version
    pub last_comp_version: big_endian::U32,
    /* version 2 fields below */
    /// Which physical CPU id we're booting on
    pub boot_cpuid_phys: big_endian::U32,
    /* version 3 fields below */
    /// size of the strings block
    pub size_dt_strings: big_endian::U32,
    /* version 17 fields below */
    /// size of the structure block
    pub size_dt_struct: big_endian::U32,
}
const_assert_eq!(size_of::<FdtHeader>(), FdtHeader::SIZE);

impl FdtHeader {
    /// Size of a version 17 header.
    pub const SIZE: usize = 40;
    /// Value of `magic` in a valid blob.
    pub const MAGIC: u32 = 0xd00d_feed;
    /// Version written by this crate.
    pub const VERSION: u32 = 17;
    /// Oldest version this crate reads.
    pub const LAST_COMP_VERSION: u32 = 16;
}

/// Wrapper guaranteed to contain a valid phandle.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Phandle(u32);

impl Phandle {
    /// Minimum valid value for device tree phandles.
    pub const MIN: Self = Self(1);
    /// Maximum valid value for device tree phandles.
    pub const MAX: Self = Self(0xffff_fffe);

    /// Creates a new Phandle
    pub const fn new(value: u32) -> Option<Self> {
        if Self::MIN.0 <= value && value <= Self::MAX.0 {
            Some(Self(value))
        } else {
            None
        }
    }
}

impl From<Phandle> for u32 {
    fn from(phandle: Phandle) -> u32 {
        phandle.0
    }
}

impl TryFrom<u32> for Phandle {
    type Error = FdtError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value).ok_or(FdtError::BadPhandle)
    }
}

/// Offset of a node's FDT_BEGIN_NODE tag within the structure block.
///
/// This type should only be obtained from the flat backend; it is always non-negative.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeOffset(i32);

impl NodeOffset {
    /// Offset of the root node; 0, by definition.
    pub const ROOT: Self = Self(0);

    pub(crate) fn new(offset: usize) -> Result<Self> {
        Ok(Self(offset.try_into().map_err(|_| FdtError::BadOffset)?))
    }

    /// Returns the offset as a plain integer.
    pub const fn get(self) -> i32 {
        self.0
    }

    pub(crate) fn as_usize(self) -> usize {
        // Non-negative by construction.
        self.0 as usize
    }
}

impl TryFrom<i32> for NodeOffset {
    type Error = FdtError;

    fn try_from(offset: i32) -> Result<Self> {
        if offset < 0 {
            Err(FdtError::BadOffset)
        } else {
            Ok(Self(offset))
        }
    }
}

impl From<NodeOffset> for i32 {
    fn from(offset: NodeOffset) -> Self {
        offset.0
    }
}

/// Offset of a property's FDT_PROP tag within the structure block.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct PropOffset(pub(crate) usize);
