//! Shared boundary contract between the native host and the managed runtime.
//!
//! Everything in this crate is layout the two sides agree on at build time:
//! `#[repr(C)]` value descriptors, callback signatures, enum arithmetic, and
//! the schema/version strings that appear in machine-readable output. There is
//! no runtime negotiation; a mismatch here is a build defect, not a
//! recoverable error.

#![allow(clippy::missing_safety_doc)]

use std::os::raw::c_void;

mod record;
mod tagged;
mod weekday;

pub use record::{
    ExtendedRecord, NarrowRecord, PlainRecord, PrintFn, RecordHeader, DATA_ARRAY_LEN,
    TYPE_NAME_LEN,
};
pub use tagged::{IntVariant, LongVariant, TaggedUnion, UNION_KIND_INT, UNION_KIND_LONG};
pub use weekday::{ParseWeekDayError, WeekDay, WEEK_LEN};

pub const TRESTLE_RUN_REPORT_SCHEMA_VERSION: &str = "trestle.run.report@0.1.0";

/// Per-attached-thread identifier. Every boundary call takes one of these as
/// its first argument so the managed side can tell which logical thread and
/// stack is active, including when managed code re-enters a native callback.
///
/// Tokens are opaque to the native side. A token is valid from the attach that
/// produced it until the thread detaches or the context is destroyed, and must
/// not be used from any other thread.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExecutionToken(*mut c_void);

impl ExecutionToken {
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub const fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}
