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

//! Error type shared by the node-reference layer and both tree backends.

use core::fmt;
use core::result;

/// Error type for device tree accesses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FdtError {
    /// The requested node or property does not exist, or the node reference is invalid.
    NotFound,
    /// Attempted to create an existing node or property.
    Exists,
    /// Destination buffer too small, or value too wide for the declared cell count.
    Overflow,
    /// All tree registry slots are in use.
    RegistryExhausted,
    /// Structure block offset or packed node reference is out-of-bounds or invalid.
    BadOffset,
    /// Badly formatted path.
    BadPath,
    /// Invalid phandle length or value.
    BadPhandle,
    /// Operation not permitted in the current boot phase or tree representation.
    BadState,
    /// Device tree or sub-block is improperly terminated.
    Truncated,
    /// Device tree header missing its magic number.
    BadMagic,
    /// Device tree has a version which can't be handled.
    BadVersion,
    /// Device tree has a corrupt structure block.
    BadStructure,
    /// Internal assertion failed.
    Internal,
    /// Bad format or value of #address-cells or #size-cells.
    BadNCells,
    /// Unexpected property value.
    BadValue,
}

impl fmt::Display for FdtError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "The requested node or property does not exist"),
            Self::Exists => write!(f, "Attempted to create an existing node or property"),
            Self::Overflow => write!(f, "Value does not fit in the destination"),
            Self::RegistryExhausted => write!(f, "Too many registered device trees"),
            Self::BadOffset => write!(f, "Structure block offset is out-of-bounds or invalid"),
            Self::BadPath => write!(f, "Badly formatted path"),
            Self::BadPhandle => write!(f, "Invalid phandle length or value"),
            Self::BadState => write!(f, "Operation not permitted in the current state"),
            Self::Truncated => write!(f, "Device tree or sub-block is improperly terminated"),
            Self::BadMagic => write!(f, "Device tree header missing its magic number"),
            Self::BadVersion => write!(f, "Device tree has a version which can't be handled"),
            Self::BadStructure => write!(f, "Device tree has a corrupt structure block"),
            Self::Internal => write!(f, "Internal assertion failed"),
            Self::BadNCells => write!(f, "Bad format or value of #address-cells or #size-cells"),
            Self::BadValue => write!(f, "Unexpected property value"),
        }
    }
}

/// Result type with FdtError enum.
pub type Result<T> = result::Result<T, FdtError>;
