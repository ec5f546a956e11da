pub mod atomic;
pub mod json;
