/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External-memory sorting and merging.

mod external;
pub use external::{
    merge_tree, Cursor, ExternalSort, ExternalVarPushSorter, Merger, Record, SortDest,
};

mod buffer;
pub use buffer::{ExternalBufferSort, PacketSorter};

pub mod edge_count;
pub use edge_count::{EdgeAndCount, EdgeAndCountReader, EdgeAndCountWriter};

mod async_merge;
pub use async_merge::AsyncMerge;
