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

//! Iterators over cells, strings, properties and nodes.

use core::ffi::CStr;
use core::{mem::size_of, slice, slice::ChunksExact};

use crate::fdt::Fdt;
use crate::live::Property;
use crate::ofnode::{OfContext, Ofnode};
use crate::safe_types::PropOffset;

/// Iterator over cells of a DT property.
#[derive(Debug)]
pub struct CellIterator<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl<'a> CellIterator<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        const CHUNK_SIZE: usize = size_of::<<CellIterator as Iterator>::Item>();

        Self { chunks: bytes.chunks_exact(CHUNK_SIZE) }
    }

    /// Returns the number of cells left.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl<'a> Iterator for CellIterator<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        Some(Self::Item::from_be_bytes(self.chunks.next()?.try_into().ok()?))
    }
}

/// Iterator over the strings of a <stringlist> property.
#[derive(Debug)]
pub struct StringListIterator<'a> {
    bytes: &'a [u8],
}

impl<'a> StringListIterator<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Iterator for StringListIterator<'a> {
    type Item = &'a CStr;

    fn next(&mut self) -> Option<Self::Item> {
        let s = CStr::from_bytes_until_nul(self.bytes).ok()?;
        self.bytes = &self.bytes[s.to_bytes_with_nul().len()..];
        Some(s)
    }
}

/// Iterator over the children of a node.
pub struct SubnodeIterator<'c, 'a> {
    ctx: &'c OfContext<'a>,
    next: Ofnode,
}

impl<'c, 'a> SubnodeIterator<'c, 'a> {
    pub(crate) fn new(ctx: &'c OfContext<'a>, first: Ofnode) -> Self {
        Self { ctx, next: first }
    }
}

impl<'c, 'a> Iterator for SubnodeIterator<'c, 'a> {
    type Item = Ofnode;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next;
        if !cur.is_valid() {
            return None;
        }
        self.next = self.ctx.next_subnode(cur);
        Some(cur)
    }
}

#[derive(Debug)]
enum PropertySource<'t> {
    Live(slice::Iter<'t, Property>),
    Flat(&'t Fdt, Option<PropOffset>),
}

/// Iterator over the (name, value) pairs of a node's properties.
#[derive(Debug)]
pub struct PropertyIterator<'t> {
    source: PropertySource<'t>,
}

impl<'t> PropertyIterator<'t> {
    pub(crate) fn live(properties: &'t [Property]) -> Self {
        Self { source: PropertySource::Live(properties.iter()) }
    }

    pub(crate) fn flat(fdt: &'t Fdt, first: Option<PropOffset>) -> Self {
        Self { source: PropertySource::Flat(fdt, first) }
    }
}

impl<'t> Iterator for PropertyIterator<'t> {
    type Item = (&'t CStr, &'t [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            PropertySource::Live(iter) => iter.next().map(|p| (p.name(), p.value())),
            PropertySource::Flat(fdt, next) => {
                let fdt: &'t Fdt = *fdt;
                let cur = next.take()?;
                let item = fdt.property(cur).ok()?;
                *next = fdt.next_property(cur).ok().flatten();
                Some(item)
            }
        }
    }
}
