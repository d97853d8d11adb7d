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

//! Table of the flattened trees that flat node references may point into.

use crate::fdt::Fdt;
use crate::offset::{TreeId, GENERATIONS, MULTI_TREE_MAX};
use crate::{FdtError, Result};
use log::{debug, warn};
use tinyvec::ArrayVec;

fn same_blob(a: &Fdt, b: &Fdt) -> bool {
    a.as_ptr() == b.as_ptr()
}

/// Maps blob base pointers to small tree ids.
///
/// Until `reset` is called at relocation the table is empty and only the control tree, as id 0,
/// can be addressed. Afterwards, blobs are appended on first sight and are only removed by the
/// next `reset`. Ids of other trees carry the generation of the reset they were handed out
/// after, so an id from before a reset does not resolve to the blob now in its slot.
#[derive(Debug)]
pub struct TreeRegistry<'a> {
    control: &'a Fdt,
    trees: ArrayVec<[Option<&'a Fdt>; MULTI_TREE_MAX]>,
    relocated: bool,
    generation: u8,
}

impl<'a> TreeRegistry<'a> {
    /// Creates the registry of the pre-relocation boot stage.
    pub fn new(control: &'a Fdt) -> Self {
        Self { control, trees: ArrayVec::new(), relocated: false, generation: 0 }
    }

    /// Drops every entry and reinstalls the control tree as id 0.
    pub fn reset(&mut self) {
        self.trees.clear();
        self.trees.push(Some(self.control));
        self.relocated = true;
        self.generation = (self.generation + 1) % GENERATIONS;
    }

    /// Returns the generation of the ids handed out since the last `reset`.
    pub fn generation(&self) -> u8 {
        self.generation
    }

    /// Returns the current id of registry slot `index`.
    fn slot_id(&self, index: usize) -> Option<TreeId> {
        let id = TreeId::new(index)?;
        if index == 0 {
            Some(id)
        } else {
            id.with_generation(self.generation)
        }
    }

    /// Returns whether `reset` has been called.
    pub fn is_relocated(&self) -> bool {
        self.relocated
    }

    /// Returns the control tree.
    pub fn control(&self) -> &'a Fdt {
        self.control
    }

    /// Replaces the control tree, which keeps id 0.
    pub fn set_control(&mut self, fdt: &'a Fdt) {
        self.control = fdt;
        if let Some(slot) = self.trees.first_mut() {
            *slot = Some(fdt);
        }
    }

    /// Returns the number of registered trees.
    pub fn len(&self) -> usize {
        if self.relocated {
            self.trees.len()
        } else {
            1
        }
    }

    /// Returns the id of `fdt`, registering it if needed.
    pub fn ensure(&mut self, fdt: &'a Fdt) -> Result<TreeId> {
        if let Some(id) = self.find(fdt) {
            return Ok(id);
        }
        if !self.relocated {
            debug!("Device tree at {:?} is not the control tree before relocation", fdt.as_ptr());
            return Err(FdtError::BadState);
        }
        let Some(id) = self.slot_id(self.trees.len()) else {
            warn!("Too many registered device trees (max {MULTI_TREE_MAX})");
            return Err(FdtError::RegistryExhausted);
        };
        self.trees.push(Some(fdt));
        debug!("Registered device tree at {:?} as tree {}", fdt.as_ptr(), id.get());
        Ok(id)
    }

    /// Returns the id of `fdt` without registering it.
    pub fn find(&self, fdt: &Fdt) -> Option<TreeId> {
        if !self.relocated {
            return same_blob(fdt, self.control).then_some(TreeId::CONTROL);
        }
        let index = self.trees.iter().position(|t| t.is_some_and(|t| same_blob(t, fdt)))?;
        self.slot_id(index)
    }

    /// Returns the tree registered as `id`.
    pub fn lookup(&self, id: TreeId) -> Option<&'a Fdt> {
        if !self.relocated {
            return (id == TreeId::CONTROL).then_some(self.control);
        }
        if self.slot_id(id.get()) != Some(id) {
            debug!("Tree {} of generation {} is stale", id.get(), id.generation());
            return None;
        }
        self.trees.get(id.get()).copied().flatten()
    }
}
