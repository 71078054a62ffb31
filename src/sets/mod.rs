/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Dynamic set containers layered over the compressed bit vectors.

mod bit_vec_set;
pub use bit_vec_set::{BitVecSet, EntrySets};

mod range_set;
pub use range_set::SimpleRangeSet;
