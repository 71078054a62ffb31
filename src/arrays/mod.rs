/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Disk-backed arrays: flat, packed, sparse, and tiered.

mod mapped;
pub use mapped::{LazyIterator, MappedArray, MappedArrayBuilder, Word};

mod integer;
pub use integer::{round_up_bits, IntegerArray, IntegerArrayBuilder, IntegerLazyIter};

mod sparse;
pub use sparse::{
    Rank, SparseArray, SparseArrayBuilder, SparseArrayIter, SparseArrayLazyIter,
};

mod sparse_view;
pub use sparse_view::SparseArrayView;

mod var_byte;
pub use var_byte::{
    VariableByteArray, VariableByteArrayBuilder, VariableByteLazyIter, MAX_COUNT,
};
