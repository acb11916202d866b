// HTTP request handlers

pub mod archive;
pub mod health;
pub mod index;
