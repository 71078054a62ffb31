/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

pub mod arrays;
pub mod bits;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codes;
pub mod error;
pub mod graph;
pub mod kmer;
pub mod rank_sel;
pub mod sets;
pub mod sort;
pub mod utils;

/// Prelude module to import everything from this crate.
pub mod prelude {
    pub use crate::arrays::*;
    pub use crate::bits::{CompactDynamicBitVector, WordyBitVector};
    pub use crate::codes::*;
    pub use crate::error::Error;
    pub use crate::graph::*;
    pub use crate::kmer::*;
    pub use crate::rank_sel::*;
    pub use crate::sets::*;
    pub use crate::sort::*;
    pub use crate::utils::*;
}
