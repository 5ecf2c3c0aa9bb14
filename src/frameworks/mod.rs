// file: src/frameworks/mod.rs
// description: external service integrations
// reference: internal module structure

pub mod genai;
pub mod telegram;
