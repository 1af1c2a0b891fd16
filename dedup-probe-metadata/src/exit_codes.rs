// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `dedup-probe` failures.
///
/// `dedup-probe` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum DedupProbeExitCode {}

impl DedupProbeExitCode {
    /// No errors occurred and dedup-probe exited normally.
    pub const OK: i32 = 0;

    /// The case source contained no cases, but no other errors occurred.
    pub const NO_CASES: i32 = 4;

    /// A user issue happened while setting up a probe run: bad config, unreadable case file,
    /// missing base URL and the like.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more cases failed their verdict, or the aggregate counts did not match the totals
    /// declared by the case source.
    pub const RUN_FAILED: i32 = 100;

    /// The run did not complete within its global timeout.
    pub const GLOBAL_TIMEOUT: i32 = 106;

    /// Writing data to stdout, stderr or a report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
