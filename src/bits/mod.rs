/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bit vectors, static and dynamic.

pub mod word;

mod wordy;
pub use wordy::{LazyOnesIter, OnesIter, WordyBitVector, WordyBitVectorBuilder, WORD_BITS};

mod fixed_width;
pub use fixed_width::{FixedWidthBitArray, FixedWidthBitArrayBuilder, FixedWidthLazyIter};

mod var_width;
pub use var_width::{VariableWidthBitArray, VariableWidthBitArrayBuilder, VariableWidthLazyIter};

mod dynamic;
pub use dynamic::CompactDynamicBitVector;
