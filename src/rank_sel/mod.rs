/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Rank/select indexes over bitmaps, dense and compressed.

mod dense_rank;
pub use dense_rank::{DenseRank, DenseRankBuilder};

mod dense_select;
pub use dense_select::{DenseSelect, DenseSelectBuilder};

mod dense_array;
pub use dense_array::{DenseArray, DenseArrayBuilder};

mod rrr;
pub use rrr::{RRRArray, RRRArrayBuilder, RRRRank, RRRRankBuilder};
