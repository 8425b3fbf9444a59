//! Helpers shared by the unit tests: throwaway chains at a low difficulty and
//! chain integrity checks.

pub mod test_utils;

pub use test_utils::*;
