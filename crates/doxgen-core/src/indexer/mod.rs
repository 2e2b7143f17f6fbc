pub mod filesystem;
pub mod languages;
pub mod parser;
pub mod pipeline;
pub mod symbols;
