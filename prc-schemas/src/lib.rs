pub mod band;
pub mod environment;
pub mod execution;
pub mod file_formats;
pub mod material;
pub mod template;
pub mod tree;
