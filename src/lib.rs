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

//! Device tree node references for a bare-metal boot stage.
//!
//! A boot stage first reads its device trees as flattened blobs and may later unflatten the
//! control tree into a mutable live tree. `Ofnode` refers to a node in either representation,
//! and the accessors of `OfContext` dispatch to whichever one is active, so that callers never
//! need to know which it is. Several flattened trees can be addressed at once after relocation,
//! each through a small id recorded in the `TreeRegistry`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod addr;
pub mod cells;
mod fdt;
mod iterators;
mod live;
mod lookup;
mod ofnode;
pub mod offset;
mod props;
mod registry;
mod result;
mod safe_types;
mod writer;

pub use fdt::Fdt;
pub use iterators::{CellIterator, PropertyIterator, StringListIterator, SubnodeIterator};
pub use live::{DeviceNode, LiveTree, NodeId, Property};
pub use ofnode::{Backend, Config, OfContext, Ofnode, Oftree};
pub use offset::{OffsetCodec, RawOffset, TreeId, MULTI_TREE_MAX};
pub use props::{PhandleArgs, MAX_PHANDLE_ARGS};
pub use registry::TreeRegistry;
pub use result::{FdtError, Result};
pub use safe_types::{FdtHeader, NodeOffset, Phandle, PropOffset};
pub use writer::FdtWriter;
