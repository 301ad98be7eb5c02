// Copyright 2025 The Ember Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! All the rules required for a block header to be valid, plus a few
//! constants shared by the acceptance pipeline and its callers. Values
//! here are consensus-critical unless noted otherwise.

use chrono::Utc;

/// Number of ancestors (inclusive) the median-time-past is computed over.
/// Must stay odd so the median is a single block's timestamp.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// How far into the future a header timestamp may run ahead of our
/// adjusted time, in seconds (2 hours).
pub const MAX_FUTURE_BLOCK_TIME: i64 = 2 * 60 * 60;

/// Current header version.
pub const HEADER_VERSION: i32 = 1;

/// Total cap on headers parked in the orphan pool. DoS bound, not
/// consensus.
pub const MAX_ORPHAN_HEADERS: usize = 100;

/// Per-peer cap on headers parked in the orphan pool. DoS bound, not
/// consensus.
pub const MAX_ORPHAN_HEADERS_PER_PEER: usize = 10;

/// A tip older than this (seconds) keeps the node in initial block
/// download. Not consensus.
pub const STALE_TIP_AGE: i64 = 12 * 3600;

/// Current time as seen by validation. A network time adjustment layer
/// would hook in here; for now the local clock is authoritative.
pub fn adjusted_time() -> i64 {
	Utc::now().timestamp()
}
