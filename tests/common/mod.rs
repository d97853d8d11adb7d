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

//! Device tree fixtures shared by the integration tests.

#![allow(dead_code)]

use cstr::cstr;
use ofnode::{FdtWriter, Result};

/// Builds the board tree used by most tests:
///
/// ```text
/// / {
///     #address-cells = <1>; #size-cells = <1>;
///     model = "test-board"; compatible = "vendor,board";
///     aliases { serial0 = "/soc/uart@1000"; };
///     chosen { stdout-path = "serial0"; bootargs = "console=ttyS0"; };
///     memory@80000000 { device_type = "memory"; reg = <0x80000000 0x10000000>; };
///     soc {
///         compatible = "simple-bus"; #address-cells = <1>; #size-cells = <1>;
///         ranges = <0x0 0x10000000 0x100000>;
///         uart@1000 { ... phandle = <1>; };
///         uart@2000 { ... status = "disabled"; };
///         clock-controller@3000 { reg-names = "ctrl", "status"; #clock-cells = <1>; phandle = <2>; };
///         dev@5000 { clocks = <2 7 0 2 9>; ... };
///     };
///     nobus { #address-cells = <1>; #size-cells = <1>; sensor@10 { reg = <0x10 0x4>; }; };
/// };
/// ```
pub fn board_tree() -> Result<Vec<u8>> {
    let mut fdt = FdtWriter::new();
    fdt.begin_node(cstr!(""))?;
    fdt.property_u32(cstr!("#address-cells"), 1)?;
    fdt.property_u32(cstr!("#size-cells"), 1)?;
    fdt.property_string(cstr!("model"), cstr!("test-board"))?;
    fdt.property_string(cstr!("compatible"), cstr!("vendor,board"))?;

    fdt.begin_node(cstr!("aliases"))?;
    fdt.property_string(cstr!("serial0"), cstr!("/soc/uart@1000"))?;
    fdt.end_node()?;

    fdt.begin_node(cstr!("chosen"))?;
    fdt.property_string(cstr!("stdout-path"), cstr!("serial0"))?;
    fdt.property_string(cstr!("bootargs"), cstr!("console=ttyS0"))?;
    fdt.end_node()?;

    fdt.begin_node(cstr!("memory@80000000"))?;
    fdt.property_string(cstr!("device_type"), cstr!("memory"))?;
    fdt.property_array_u32(cstr!("reg"), &[0x8000_0000, 0x1000_0000])?;
    fdt.end_node()?;

    fdt.begin_node(cstr!("soc"))?;
    fdt.property_string(cstr!("compatible"), cstr!("simple-bus"))?;
    fdt.property_u32(cstr!("#address-cells"), 1)?;
    fdt.property_u32(cstr!("#size-cells"), 1)?;
    fdt.property_array_u32(cstr!("ranges"), &[0x0, 0x1000_0000, 0x10_0000])?;

    fdt.begin_node(cstr!("uart@1000"))?;
    fdt.property_string(cstr!("compatible"), cstr!("ns16550a"))?;
    fdt.property_array_u32(cstr!("reg"), &[0x1000, 0x100])?;
    fdt.property_u32(cstr!("clock-frequency"), 24_000_000)?;
    fdt.property_string(cstr!("status"), cstr!("okay"))?;
    fdt.property_u32(cstr!("phandle"), 1)?;
    fdt.end_node()?;

    fdt.begin_node(cstr!("uart@2000"))?;
    fdt.property_string(cstr!("compatible"), cstr!("ns16550a"))?;
    fdt.property_array_u32(cstr!("reg"), &[0x2000, 0x100])?;
    fdt.property_string(cstr!("status"), cstr!("disabled"))?;
    fdt.end_node()?;

    fdt.begin_node(cstr!("clock-controller@3000"))?;
    fdt.property_string(cstr!("compatible"), cstr!("vendor,clk"))?;
    fdt.property_array_u32(cstr!("reg"), &[0x3000, 0x100, 0x4000, 0x10])?;
    fdt.property_string_list(cstr!("reg-names"), &[cstr!("ctrl"), cstr!("status")])?;
    fdt.property_u32(cstr!("#clock-cells"), 1)?;
    fdt.property_u32(cstr!("phandle"), 2)?;
    fdt.end_node()?;

    fdt.begin_node(cstr!("dev@5000"))?;
    fdt.property_array_u32(cstr!("reg"), &[0x5000, 0x10])?;
    fdt.property_array_u32(cstr!("clocks"), &[2, 7, 0, 2, 9])?;
    fdt.property_string(cstr!("label"), cstr!("a-label"))?;
    fdt.property_array_u32(cstr!("values"), &[1, 2, 3])?;
    fdt.property(cstr!("byte"), &[0x42])?;
    fdt.property(cstr!("short"), &0x1234u16.to_be_bytes())?;
    fdt.property_u64(cstr!("big"), 0x1122_3344_5566_7788)?;
    fdt.property_string_list(cstr!("names"), &[cstr!("a"), cstr!("bb"), cstr!("ccc")])?;
    fdt.property_u32(cstr!("signed"), 0xffff_ffff)?;
    fdt.property_null(cstr!("bool-prop"))?;
    fdt.end_node()?;

    fdt.end_node()?; // soc

    fdt.begin_node(cstr!("nobus"))?;
    fdt.property_u32(cstr!("#address-cells"), 1)?;
    fdt.property_u32(cstr!("#size-cells"), 1)?;
    fdt.begin_node(cstr!("sensor@10"))?;
    fdt.property_array_u32(cstr!("reg"), &[0x10, 0x4])?;
    fdt.end_node()?;
    fdt.end_node()?;

    fdt.end_node()?;
    fdt.finish()
}

/// Builds a tree with 2-cell addresses and sizes at the root.
pub fn wide_tree() -> Result<Vec<u8>> {
    let mut fdt = FdtWriter::new();
    fdt.begin_node(cstr!(""))?;
    fdt.property_u32(cstr!("#address-cells"), 2)?;
    fdt.property_u32(cstr!("#size-cells"), 2)?;
    fdt.begin_node(cstr!("memory@100000000"))?;
    fdt.property(cstr!("reg"), &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0x40, 0, 0, 0])?;
    fdt.end_node()?;
    fdt.begin_node(cstr!("pci"))?;
    fdt.property_u32(cstr!("#address-cells"), 3)?;
    fdt.property_u32(cstr!("#size-cells"), 2)?;
    fdt.begin_node(cstr!("ethernet@0"))?;
    fdt.property_array_u32(cstr!("reg"), &[0, 0, 0, 0, 0])?;
    fdt.end_node()?;
    fdt.end_node()?;
    fdt.end_node()?;
    fdt.finish()
}

/// Builds a small tree whose UART runs at `clock_frequency`; `padding` bytes of an extra root
/// property make node offsets differ between instances.
pub fn uart_tree(clock_frequency: u32, padding: usize) -> Result<Vec<u8>> {
    let mut fdt = FdtWriter::new();
    fdt.begin_node(cstr!(""))?;
    fdt.property(cstr!("padding"), &vec![0u8; padding])?;
    fdt.property_u32(cstr!("phandle"), 0x10)?;
    fdt.begin_node(cstr!("soc"))?;
    fdt.begin_node(cstr!("uart@1000"))?;
    fdt.property_u32(cstr!("clock-frequency"), clock_frequency)?;
    fdt.end_node()?;
    fdt.end_node()?;
    fdt.end_node()?;
    fdt.finish()
}
