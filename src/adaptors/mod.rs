// file: src/adaptors/mod.rs
// description: storage adaptors
// reference: internal module structure

pub mod elasticsearch;
