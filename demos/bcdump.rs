//! Dump the block/record tree of a bitstream file, resolving BLOCKINFO
//! names where present.
//!
//! Usage: `cargo run --example bcdump -- <file>`

use llvm_bitstream::bitcode::{Block, Value};
use llvm_bitstream::{BitStreamReader, Bitcode};

fn main() {
    tracing_subscriber::fmt().init();

    let path = std::env::args()
        .nth(1)
        .expect("provide a path to a bitstream file");
    let data = std::fs::read(&path).unwrap();
    let bitcode = BitStreamReader::from_bytes(&data).read().unwrap();

    println!("magic: 0x{:08x}", bitcode.magic);
    for block in &bitcode.top_blocks {
        dump_block(&bitcode, block, 0);
    }
}

fn dump_block(bitcode: &Bitcode, block: &Block, depth: usize) {
    let indent = depth * 2;
    let name = bitcode.block_name(block.id).unwrap_or("block");
    println!(
        "{:indent$}<{name} id={} len={} abbrevwidth={}>",
        "", block.id, block.length_bytes, block.abbrev_id_width
    );
    for record in &block.records {
        let name = bitcode
            .record_name(block.id, record.code)
            .unwrap_or("record");
        println!(
            "{:indent$}  {name} code={} abbrev={} [{}]",
            "",
            record.code,
            record.abbrev_id,
            summarize(&record.values)
        );
    }
    for sub in &block.sub_blocks {
        dump_block(bitcode, sub, depth + 1);
    }
    println!("{:indent$}</{name}>", "");
}

fn summarize(values: &[Value]) -> String {
    values
        .iter()
        .map(|value| match value {
            Value::Scalar(v) => v.to_string(),
            Value::Array(elements) => format!("array({} elements)", elements.len()),
            Value::Blob(bytes) => format!("blob({} bytes)", bytes.len()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
