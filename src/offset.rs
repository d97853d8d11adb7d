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

//! Packing of (tree id, structure block offset) pairs into a single flat node value.
//!
//! In multi-tree mode a raw value is laid out as:
//!
//! ```text
//!  31 30    28 27     24 23                      0
//! +--+--------+---------+-------------------------+
//! |0 | gen    | tree id |      local offset       |
//! +--+--------+---------+-------------------------+
//! ```
//!
//! so that a negative raw value is invalid under both encodings, and a value from tree 0 is
//! numerically equal to its local offset.
//!
//! The generation counts registry resets modulo `GENERATIONS`. It is always 0 for the control
//! tree, whose nodes survive a reset.

use crate::safe_types::NodeOffset;
use crate::{FdtError, Result};
use static_assertions::const_assert;

/// Number of flattened trees that can be addressed at once, including the control tree.
pub const MULTI_TREE_MAX: usize = 4;

const TREE_ID_SHIFT: u32 = 24;
const TREE_ID_MASK: i32 = 0xf;
const OFFSET_MASK: i32 = (1 << TREE_ID_SHIFT) - 1;
const GENERATION_SHIFT: u32 = 28;
const GENERATION_MASK: i32 = 0x7;

/// Number of distinct registry generations a raw value can tell apart.
pub const GENERATIONS: u8 = GENERATION_MASK as u8 + 1;

const_assert!(MULTI_TREE_MAX <= TREE_ID_MASK as usize + 1);
const_assert!(TREE_ID_SHIFT + 4 == GENERATION_SHIFT);

/// Index of a flattened tree in the tree registry, tagged with the registry generation it was
/// handed out in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TreeId {
    index: u8,
    generation: u8,
}

impl TreeId {
    /// The control tree, used by the boot stage itself.
    pub const CONTROL: Self = Self { index: 0, generation: 0 };

    /// Returns the id for registry slot `index` in generation 0, if it is within capacity.
    pub const fn new(index: usize) -> Option<Self> {
        if index < MULTI_TREE_MAX {
            Some(Self { index: index as u8, generation: 0 })
        } else {
            None
        }
    }

    /// Returns the same slot tagged with `generation`. The control tree only has generation 0.
    pub const fn with_generation(self, generation: u8) -> Option<Self> {
        if generation >= GENERATIONS || (self.index == 0 && generation != 0) {
            None
        } else {
            Some(Self { index: self.index, generation })
        }
    }

    /// Returns the registry slot of this id.
    pub const fn get(self) -> usize {
        self.index as usize
    }

    /// Returns the registry generation of this id.
    pub const fn generation(self) -> u8 {
        self.generation
    }
}

/// Raw value carried by a flat node reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RawOffset(i32);

impl RawOffset {
    /// Value of every invalid flat reference.
    pub const INVALID: Self = Self(-1);

    /// Returns false for any negative value.
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Returns the raw integer.
    pub const fn get(self) -> i32 {
        self.0
    }
}

/// Encoding of flat node references.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OffsetCodec {
    /// Only the control tree is addressable; the raw value is the offset.
    Single,
    /// The raw value also carries a tree id.
    Multi,
}

impl OffsetCodec {
    /// Packs a tree id and a local offset. Negative offsets, offsets too large for the encoding
    /// and tree ids it cannot carry all give `RawOffset::INVALID`.
    pub fn pack(self, tree: TreeId, local: i32) -> RawOffset {
        if local < 0 || tree.get() >= MULTI_TREE_MAX {
            return RawOffset::INVALID;
        }
        match self {
            Self::Single if tree == TreeId::CONTROL => RawOffset(local),
            Self::Single => RawOffset::INVALID,
            Self::Multi if local > OFFSET_MASK => RawOffset::INVALID,
            Self::Multi => RawOffset(
                (i32::from(tree.generation) << GENERATION_SHIFT)
                    | (i32::from(tree.index) << TREE_ID_SHIFT)
                    | local,
            ),
        }
    }

    /// Packs a node offset obtained from the flat backend.
    pub fn pack_offset(self, tree: TreeId, local: NodeOffset) -> RawOffset {
        self.pack(tree, local.get())
    }

    /// Splits a raw value into its tree id and local offset.
    ///
    /// Returns `NotFound` for invalid values and `BadOffset` for values this encoding cannot
    /// have produced.
    pub fn unpack(self, raw: RawOffset) -> Result<(TreeId, NodeOffset)> {
        if !raw.is_valid() {
            return Err(FdtError::NotFound);
        }
        match self {
            Self::Single => Ok((TreeId::CONTROL, raw.0.try_into()?)),
            Self::Multi => {
                let id = (raw.0 >> TREE_ID_SHIFT) & TREE_ID_MASK;
                let generation = (raw.0 >> GENERATION_SHIFT) & GENERATION_MASK;
                let tree = TreeId::new(id as usize)
                    .and_then(|tree| tree.with_generation(generation as u8))
                    .ok_or(FdtError::BadOffset)?;
                Ok((tree, (raw.0 & OFFSET_MASK).try_into()?))
            }
        }
    }

    /// Packs `local` as an offset in the same tree as `other`.
    pub fn rebase(self, other: RawOffset, local: NodeOffset) -> RawOffset {
        match self.unpack(other) {
            Ok((tree, _)) => self.pack_offset(tree, local),
            Err(_) => RawOffset::INVALID,
        }
    }
}
