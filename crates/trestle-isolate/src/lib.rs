//! Managed side of the trestle boundary.
//!
//! Hosts create one execution context per process, attach threads to obtain
//! execution tokens, and then call the `extern "C"` entry points in
//! [`entry`] — either through a static reference or through the by-name
//! registry in [`registry`]. The native side owns every value it passes in;
//! entry points read and occasionally mutate, never free.

#![allow(clippy::missing_safety_doc)]

mod context;
mod entry;
mod registry;

pub use context::{
    create_context, current_execution_token, destroy_context, detach_thread, ContextError,
    ContextHandle,
};
pub use entry::{
    trestle_dump_extended, trestle_dump_narrow, trestle_dump_record, trestle_dump_unions,
    trestle_narrow_masked, trestle_narrow_raw, trestle_narrow_unsigned, trestle_print_day,
    trestle_release_record,
};
pub use registry::{registered_symbols, resolve_symbol, EntryPointRef, SymbolError};
