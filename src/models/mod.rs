pub mod archive;
pub mod errors;
