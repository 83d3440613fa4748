pub mod pools;

pub use pools::*;
