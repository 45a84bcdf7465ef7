pub mod dsa;
pub mod macros;
