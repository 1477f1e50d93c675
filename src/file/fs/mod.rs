//! This module implements filesystem drivers.

pub mod ext2;
