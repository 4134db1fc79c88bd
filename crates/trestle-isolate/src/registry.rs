//! By-name lookup of managed entry points, for hosts that do not want a
//! link-time dependency on any particular symbol.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use trestle_abi::{
    ExecutionToken, ExtendedRecord, IntVariant, LongVariant, NarrowRecord, PlainRecord,
    RecordHeader, TaggedUnion,
};

use crate::entry;

/// A resolved entry point. The variant is the calling convention: the typed
/// function pointer travels with the name it was resolved under, so a caller
/// cannot invoke a symbol with the wrong signature without saying so in the
/// match.
#[derive(Copy, Clone, Debug)]
pub enum EntryPointRef {
    DumpRecord(unsafe extern "C" fn(ExecutionToken, *mut PlainRecord)),
    ReleaseRecord(unsafe extern "C" fn(ExecutionToken, *mut PlainRecord)),
    PrintDay(unsafe extern "C" fn(ExecutionToken, i32)),
    DumpExtended(unsafe extern "C" fn(ExecutionToken, *mut ExtendedRecord, *mut RecordHeader)),
    DumpUnions(
        unsafe extern "C" fn(
            ExecutionToken,
            *mut TaggedUnion,
            *mut TaggedUnion,
            *mut IntVariant,
            *mut LongVariant,
        ),
    ),
    DumpNarrow(unsafe extern "C" fn(ExecutionToken, *mut NarrowRecord)),
    NarrowRaw(unsafe extern "C" fn(ExecutionToken, *const NarrowRecord) -> i64),
    NarrowMasked(unsafe extern "C" fn(ExecutionToken, *const NarrowRecord) -> i64),
    NarrowUnsigned(unsafe extern "C" fn(ExecutionToken, *const NarrowRecord) -> i64),
}

#[derive(Debug)]
pub enum SymbolError {
    NotFound { name: String },
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolError::NotFound { name } => {
                write!(f, "no managed entry point is registered as {name:?}")
            }
        }
    }
}

impl std::error::Error for SymbolError {}

static REGISTRY: Lazy<BTreeMap<&'static str, EntryPointRef>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "dump_record",
            EntryPointRef::DumpRecord(entry::trestle_dump_record as _),
        ),
        (
            "release_record",
            EntryPointRef::ReleaseRecord(entry::trestle_release_record as _),
        ),
        (
            "print_day",
            EntryPointRef::PrintDay(entry::trestle_print_day as _),
        ),
        (
            "dump_extended",
            EntryPointRef::DumpExtended(entry::trestle_dump_extended as _),
        ),
        (
            "dump_unions",
            EntryPointRef::DumpUnions(entry::trestle_dump_unions as _),
        ),
        (
            "dump_narrow",
            EntryPointRef::DumpNarrow(entry::trestle_dump_narrow as _),
        ),
        (
            "narrow_raw",
            EntryPointRef::NarrowRaw(entry::trestle_narrow_raw as _),
        ),
        (
            "narrow_masked",
            EntryPointRef::NarrowMasked(entry::trestle_narrow_masked as _),
        ),
        (
            "narrow_unsigned",
            EntryPointRef::NarrowUnsigned(entry::trestle_narrow_unsigned as _),
        ),
    ])
});

/// Late lookup of a managed entry point by name.
pub fn resolve_symbol(name: &str) -> Result<EntryPointRef, SymbolError> {
    REGISTRY
        .get(name)
        .copied()
        .ok_or_else(|| SymbolError::NotFound {
            name: name.to_string(),
        })
}

/// Every name [`resolve_symbol`] answers to, in sorted order.
pub fn registered_symbols() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_symbols_with_their_signatures() {
        assert!(matches!(
            resolve_symbol("release_record"),
            Ok(EntryPointRef::ReleaseRecord(_))
        ));
        assert!(matches!(
            resolve_symbol("dump_unions"),
            Ok(EntryPointRef::DumpUnions(_))
        ));
        assert!(matches!(
            resolve_symbol("narrow_masked"),
            Ok(EntryPointRef::NarrowMasked(_))
        ));
    }

    #[test]
    fn unknown_symbol_reports_its_name() {
        let err = resolve_symbol("frobnicate").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn registry_covers_the_whole_surface() {
        let names: Vec<&str> = registered_symbols().collect();
        assert_eq!(names.len(), 9);
        assert!(names.contains(&"dump_record"));
        assert!(names.contains(&"narrow_unsigned"));
    }
}
