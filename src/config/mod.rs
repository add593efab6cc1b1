pub mod global;

pub use global::*;
