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

//! Integration tests of the flat-mode node and property accessors.

mod common;

use cstr::cstr;
use ofnode::cells::Cells;
use ofnode::{Config, Fdt, FdtError, NodeOffset, OfContext, Ofnode, Phandle};

fn board() -> Vec<u8> {
    common::board_tree().unwrap()
}

#[test]
fn retrieving_root_and_paths() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());

    let root = ctx.root();
    assert!(root.is_valid());
    assert_eq!(ctx.get_name(root), Ok(cstr!("")));
    assert_eq!(ctx.node_to_offset(root), Ok(NodeOffset::ROOT));
    assert_eq!(ctx.read_string(root, cstr!("model")), Ok(cstr!("test-board")));

    let uart = ctx.path(cstr!("/soc/uart@1000"));
    assert!(uart.is_valid());
    assert_eq!(ctx.get_name(uart), Ok(cstr!("uart@1000")));
    assert_eq!(ctx.get_path(uart).unwrap(), "/soc/uart@1000");
    assert_eq!(ctx.get_path(root).unwrap(), "/");
    assert_eq!(ctx.path(cstr!("/soc/")), ctx.path(cstr!("/soc")));
    assert_eq!(ctx.path(cstr!("/soc/spi@0")), Ofnode::NULL);
}

#[test]
fn subnode_lookup() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let soc = ctx.path(cstr!("/soc"));

    assert_eq!(ctx.find_subnode(soc, cstr!("uart")), ctx.path(cstr!("/soc/uart@1000")));
    assert_eq!(ctx.find_subnode(soc, cstr!("uart@2000")), ctx.path(cstr!("/soc/uart@2000")));
    assert_eq!(ctx.find_subnode(soc, cstr!("uart@3000")), Ofnode::NULL);
    assert_eq!(ctx.get_parent(ctx.path(cstr!("/soc/uart@2000"))), soc);
    assert_eq!(ctx.get_parent(ctx.root()), Ofnode::NULL);

    let names: Vec<_> = ctx.subnodes(soc).map(|n| ctx.get_name(n).unwrap()).collect();
    assert_eq!(
        names,
        [cstr!("uart@1000"), cstr!("uart@2000"), cstr!("clock-controller@3000"), cstr!("dev@5000")]
    );
    let uart = ctx.path(cstr!("/soc/uart@1000"));
    assert_eq!(ctx.first_subnode(uart), Ofnode::NULL);
    assert_eq!(ctx.subnodes(uart).count(), 0);
}

#[test]
fn single_tree_path_matches_blob_offset() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config { multi_tree: false, ..Default::default() });

    let uart = ctx.path(cstr!("/soc/uart@1000"));
    let expected = fdt.path_offset(b"/soc/uart@1000").unwrap().unwrap();
    let Ofnode::Flat(raw) = uart else { panic!("flat mode returned {uart:?}") };
    assert_eq!(raw.get(), expected.get());
    assert_eq!(ctx.node_to_offset(uart), Ok(expected));
}

#[test]
fn aliases_and_chosen() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let uart = ctx.path(cstr!("/soc/uart@1000"));

    assert_eq!(ctx.path(cstr!("serial0")), uart);
    assert_eq!(ctx.get_aliases_node(cstr!("serial0")), uart);
    assert_eq!(ctx.get_aliases_node(cstr!("serial1")), Ofnode::NULL);
    assert_eq!(ctx.read_chosen_string(cstr!("bootargs")), Ok(cstr!("console=ttyS0")));
    assert_eq!(ctx.get_chosen_node(cstr!("stdout-path")), uart);
    assert_eq!(ctx.read_chosen_string(cstr!("kaslr-seed")), Err(FdtError::NotFound));
}

#[test]
fn integer_properties() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let dev = ctx.path(cstr!("/soc/dev@5000"));

    assert_eq!(ctx.read_u8(dev, cstr!("byte")), Ok(0x42));
    assert_eq!(ctx.read_u16(dev, cstr!("short")), Ok(0x1234));
    assert_eq!(ctx.read_u32(dev, cstr!("values")), Ok(1));
    assert_eq!(ctx.read_u32_index(dev, cstr!("values"), 2), Ok(3));
    assert_eq!(ctx.read_u32_index(dev, cstr!("values"), 3), Err(FdtError::BadValue));
    assert_eq!(ctx.read_u64(dev, cstr!("big")), Ok(0x1122_3344_5566_7788));
    assert_eq!(ctx.read_u64(dev, cstr!("byte")), Err(FdtError::BadValue));
    assert_eq!(ctx.read_u32(dev, cstr!("missing")), Err(FdtError::NotFound));
    assert_eq!(ctx.read_u32_default(dev, cstr!("missing"), 5), 5);
    assert_eq!(ctx.read_u32_index_default(dev, cstr!("values"), 1, 5), 2);
    assert_eq!(ctx.read_u64_default(dev, cstr!("byte"), 9), 9);
    assert_eq!(ctx.read_u64_default(dev, cstr!("big"), 9), 0x1122_3344_5566_7788);
    assert_eq!(ctx.read_u8_default(dev, cstr!("byte"), 0), 0x42);
    assert_eq!(ctx.read_u8_default(dev, cstr!("missing"), 7), 7);
    assert_eq!(ctx.read_u16_default(dev, cstr!("short"), 0), 0x1234);
    assert_eq!(ctx.read_u16_default(dev, cstr!("missing"), 7), 7);
    assert_eq!(ctx.read_s32_default(dev, cstr!("signed"), 0), -1);
    assert!(ctx.read_bool(dev, cstr!("bool-prop")));
    assert!(!ctx.read_bool(dev, cstr!("other-bool")));
}

#[test]
fn arrays_and_buffers() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let dev = ctx.path(cstr!("/soc/dev@5000"));

    let mut values = [0u32; 4];
    assert_eq!(ctx.read_u32_array(dev, cstr!("values"), &mut values), Ok(3));
    assert_eq!(values, [1, 2, 3, 0]);
    let mut small = [0u32; 2];
    assert_eq!(ctx.read_u32_array(dev, cstr!("values"), &mut small), Err(FdtError::Overflow));

    let mut buf = [0u8; 16];
    assert_eq!(ctx.read_string_into(dev, cstr!("label"), &mut buf), Ok(cstr!("a-label")));
    let mut buf = [0u8; 7];
    assert_eq!(ctx.read_string_into(dev, cstr!("label"), &mut buf), Err(FdtError::Overflow));
}

#[test]
fn string_lists() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let dev = ctx.path(cstr!("/soc/dev@5000"));

    assert_eq!(ctx.read_string_count(dev, cstr!("names")), Ok(3));
    assert_eq!(ctx.read_string_index(dev, cstr!("names"), 1), Ok(cstr!("bb")));
    assert_eq!(ctx.read_string_index(dev, cstr!("names"), 3), Err(FdtError::NotFound));
    assert_eq!(ctx.stringlist_search(dev, cstr!("names"), cstr!("ccc")), Ok(2));
    assert_eq!(ctx.stringlist_search(dev, cstr!("names"), cstr!("d")), Err(FdtError::NotFound));
    assert_eq!(
        ctx.read_string_list(dev, cstr!("names")),
        Ok(vec![cstr!("a"), cstr!("bb"), cstr!("ccc")])
    );
    assert_eq!(ctx.read_string_count(dev, cstr!("values")), Err(FdtError::BadValue));
}

#[test]
fn property_iteration() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let uart = ctx.path(cstr!("/soc/uart@2000"));

    let names: Vec<_> = ctx.properties(uart).unwrap().map(|(name, _)| name).collect();
    assert_eq!(names, [cstr!("compatible"), cstr!("reg"), cstr!("status")]);
    assert_eq!(ctx.properties(Ofnode::NULL).err(), Some(FdtError::NotFound));
}

#[test]
fn compatible_and_prop_value_search() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());

    let first = ctx.by_compatible(Ofnode::NULL, cstr!("ns16550a"));
    assert_eq!(first, ctx.path(cstr!("/soc/uart@1000")));
    let second = ctx.by_compatible(first, cstr!("ns16550a"));
    assert_eq!(second, ctx.path(cstr!("/soc/uart@2000")));
    assert_eq!(ctx.by_compatible(second, cstr!("ns16550a")), Ofnode::NULL);
    assert_eq!(ctx.by_compatible(Ofnode::NULL, cstr!("vendor,board")), ctx.root());
    let offset = ctx.node_to_offset(first).unwrap();
    assert_eq!(fdt.node_offset_by_compatible(None, cstr!("ns16550a")), Ok(Some(offset)));
    assert!(fdt.node_check_compatible(offset, cstr!("ns16550a")).unwrap());

    let memory = ctx.by_prop_value(Ofnode::NULL, cstr!("device_type"), b"memory\0");
    assert_eq!(memory, ctx.path(cstr!("/memory")));
    assert_eq!(ctx.by_prop_value(memory, cstr!("device_type"), b"memory\0"), Ofnode::NULL);
    let offset = fdt.node_offset_by_prop_value(None, cstr!("device_type"), b"memory\0").unwrap();
    assert_eq!(offset.map(|o| ctx.node_to_offset(memory) == Ok(o)), Some(true));
    assert!(ctx.device_is_compatible(ctx.path(cstr!("/soc")), cstr!("simple-bus")));
    assert!(!ctx.device_is_compatible(ctx.path(cstr!("/soc")), cstr!("vendor,clk")));
}

#[test]
fn phandles() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let clk = ctx.path(cstr!("/soc/clock-controller@3000"));
    let dev = ctx.path(cstr!("/soc/dev@5000"));

    assert_eq!(ctx.get_by_phandle(2), clk);
    assert_eq!(ctx.get_by_phandle(3), Ofnode::NULL);
    assert_eq!(ctx.get_by_phandle(0), Ofnode::NULL);
    assert_eq!(ctx.get_phandle(clk), Ok(Phandle::new(2).unwrap()));
    assert_eq!(ctx.get_phandle(dev), Err(FdtError::NotFound));

    let clocks = cstr!("clocks");
    let cells = Some(cstr!("#clock-cells"));
    assert_eq!(ctx.count_phandle_with_args(dev, clocks, cells, 0), Ok(3));
    let args = ctx.parse_phandle_with_args(dev, clocks, cells, 0, 0).unwrap();
    assert_eq!(args.node, clk);
    assert_eq!(args.args.as_slice(), [7]);
    assert_eq!(ctx.parse_phandle_with_args(dev, clocks, cells, 0, 1), Err(FdtError::NotFound));
    let args = ctx.parse_phandle_with_args(dev, clocks, cells, 0, 2).unwrap();
    assert_eq!(args.args.as_slice(), [9]);
    assert_eq!(ctx.parse_phandle_with_args(dev, clocks, cells, 0, 3), Err(FdtError::NotFound));
    // A fixed argument count stands in for the target's cells property.
    assert_eq!(ctx.count_phandle_with_args(dev, clocks, None, 1), Ok(3));
    assert_eq!(ctx.count_phandle_with_args(dev, clocks, None, 5), Err(FdtError::BadValue));
}

#[test]
fn status() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());

    assert!(ctx.is_enabled(ctx.path(cstr!("/soc/uart@1000"))));
    assert!(!ctx.is_enabled(ctx.path(cstr!("/soc/uart@2000"))));
    assert!(ctx.is_enabled(ctx.path(cstr!("/soc/dev@5000"))));
    assert!(!ctx.is_enabled(Ofnode::NULL));
}

#[test]
fn addresses_are_translated_through_ranges() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let uart = ctx.path(cstr!("/soc/uart@1000"));
    let clk = ctx.path(cstr!("/soc/clock-controller@3000"));

    assert_eq!(ctx.read_addr_cells(uart), Ok(Cells::Single));
    assert_eq!(ctx.read_size_cells(uart), Ok(Cells::Single));
    assert_eq!(ctx.get_addr(uart), Ok(0x1000_1000));
    assert_eq!(ctx.get_size(uart), Ok(0x100));
    assert_eq!(ctx.get_addr_size_index(clk, 1), Ok((0x1000_4000, 0x10)));
    assert_eq!(ctx.get_addr_index(clk, 2), Err(FdtError::NotFound));
    assert_eq!(ctx.read_resource(clk, 0), Ok(0x1000_3000..0x1000_3100));
    assert_eq!(ctx.read_resource_byname(clk, cstr!("status")), Ok(0x1000_4000..0x1000_4010));
    assert_eq!(ctx.read_resource_byname(clk, cstr!("irq")), Err(FdtError::NotFound));
    assert_eq!(ctx.get_addr(ctx.path(cstr!("/memory@80000000"))), Ok(0x8000_0000));
    assert_eq!(ctx.translate_address(uart, 0x20_0000), Err(FdtError::NotFound));

    let sensor = ctx.path(cstr!("/nobus/sensor@10"));
    assert_eq!(ctx.get_addr(sensor), Err(FdtError::BadValue));

    let raw = OfContext::new(fdt, Config { translate: false, ..Default::default() });
    assert_eq!(raw.get_addr(raw.path(cstr!("/nobus/sensor@10"))), Ok(0x10));
    assert_eq!(raw.get_addr(raw.path(cstr!("/soc/uart@1000"))), Ok(0x1000));
}

#[test]
fn two_cell_addresses() {
    let data = common::wide_tree().unwrap();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());
    let memory = ctx.path(cstr!("/memory@100000000"));

    assert_eq!(ctx.read_addr_cells(memory), Ok(Cells::Double));
    assert_eq!(ctx.get_addr_size_index(memory, 0), Ok((0x1_0000_0000, 0x4000_0000)));
    assert_eq!(ctx.read_simple_addr_cells(ctx.path(cstr!("/pci"))), Err(FdtError::BadNCells));
    assert_eq!(ctx.get_addr(ctx.path(cstr!("/pci/ethernet@0"))), Err(FdtError::BadNCells));
    // Default of a node without #size-cells.
    assert_eq!(ctx.read_simple_size_cells(memory), Ok(Cells::Single));
}

#[test]
fn invalid_node_is_not_found() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let ctx = OfContext::new(fdt, Config::default());

    assert_eq!(ctx.get_property(Ofnode::NULL, cstr!("model")), Err(FdtError::NotFound));
    assert_eq!(ctx.get_name(Ofnode::NULL), Err(FdtError::NotFound));
    assert_eq!(ctx.read_u32_default(Ofnode::NULL, cstr!("model"), 3), 3);
    assert_eq!(ctx.find_subnode(Ofnode::NULL, cstr!("soc")), Ofnode::NULL);
    assert_eq!(ctx.get_parent(Ofnode::NULL), Ofnode::NULL);
    assert_eq!(ctx.get_addr(Ofnode::NULL), Err(FdtError::NotFound));
    assert!(!ctx.has_property(Ofnode::NULL, cstr!("model")));
}

#[test]
fn flat_trees_are_read_only() {
    let data = board();
    let fdt = Fdt::from_slice(&data).unwrap();
    let mut ctx = OfContext::new(fdt, Config::default());
    let uart = ctx.path(cstr!("/soc/uart@1000"));

    assert_eq!(ctx.write_u32(uart, cstr!("clock-frequency"), 1), Err(FdtError::BadState));
    assert_eq!(ctx.set_enabled(uart, false), Err(FdtError::BadState));
    assert_eq!(ctx.add_subnode(uart, cstr!("child")), Err(FdtError::BadState));
    assert_eq!(ctx.read_u32(uart, cstr!("clock-frequency")), Ok(24_000_000));
}

#[test]
fn rejecting_malformed_blobs() {
    let data = board();
    assert_eq!(Fdt::from_slice(&data[..20]).err(), Some(FdtError::Truncated));
    assert_eq!(Fdt::from_slice(&data[..data.len() - 1]).err(), Some(FdtError::Truncated));

    let mut bad_magic = data.clone();
    bad_magic[0] = 0;
    assert_eq!(Fdt::from_slice(&bad_magic).err(), Some(FdtError::BadMagic));

    let mut bad_version = data.clone();
    bad_version[0x14..0x18].copy_from_slice(&2u32.to_be_bytes());
    assert_eq!(Fdt::from_slice(&bad_version).err(), Some(FdtError::BadVersion));

    // First structure block tag turned into an unknown one.
    let mut bad_tag = data.clone();
    bad_tag[0x38..0x3c].copy_from_slice(&7u32.to_be_bytes());
    assert_eq!(Fdt::from_slice(&bad_tag).err(), Some(FdtError::BadStructure));

    let mut larger = data.clone();
    larger.extend_from_slice(&[0; 64]);
    let fdt = Fdt::from_slice(&larger).unwrap();
    assert_eq!(fdt.as_slice(), &data[..]);
    let ctx = OfContext::new(fdt, Config::default());
    assert_eq!(ctx.read_string(ctx.root(), cstr!("model")), Ok(cstr!("test-board")));
    assert_eq!(ctx.get_name(ctx.path(cstr!("/soc/uart@1000"))), Ok(cstr!("uart@1000")));
}
