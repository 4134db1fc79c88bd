//! Drives the boundary the way a native host does: one context, records
//! allocated on this side, entry points reached through the registry.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Mutex;

use trestle_abi::{
    ExecutionToken, NarrowRecord, PlainRecord, TaggedUnion, DATA_ARRAY_LEN, UNION_KIND_INT,
};
use trestle_isolate::{
    create_context, current_execution_token, destroy_context, detach_thread, resolve_symbol,
    trestle_dump_record, trestle_narrow_raw, ContextHandle, EntryPointRef, SymbolError,
};

// One execution context per process; serialize the tests that need one.
static CONTEXT_TESTS: Mutex<()> = Mutex::new(());

struct ContextGuard(Option<ContextHandle>);

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            let _ = destroy_context(handle);
        }
    }
}

fn with_context(f: impl FnOnce(ContextHandle, ExecutionToken)) {
    let _serial = CONTEXT_TESTS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (handle, token) = create_context().expect("create context");
    let guard = ContextGuard(Some(handle));
    f(handle, token);
    drop(guard);
}

static CALLBACK_HITS: AtomicUsize = AtomicUsize::new(0);
static EXPECTED_TOKEN: AtomicPtr<c_void> = AtomicPtr::new(ptr::null_mut());
static CALLBACK_SAW_EXPECTED: AtomicBool = AtomicBool::new(false);

// No assertions in here: a panic may not unwind out of an extern "C" frame.
unsafe extern "C" fn recording_print(token: ExecutionToken, text: *const c_char) {
    CALLBACK_HITS.fetch_add(1, Ordering::SeqCst);
    let token_ok = token.as_raw() == EXPECTED_TOKEN.load(Ordering::SeqCst);
    let text_ok = !text.is_null() && CStr::from_ptr(text).to_bytes() == b"Hello World";
    CALLBACK_SAW_EXPECTED.store(token_ok && text_ok, Ordering::SeqCst);
}

#[test]
fn record_dump_reenters_the_native_callback_and_release_clears() {
    with_context(|_handle, token| {
        let text: &CStr = c"Hello World";
        let mut data = PlainRecord::empty();
        data.primitive = 42;
        for (i, slot) in data.array.iter_mut().enumerate() {
            *slot = (i as i32) * 2;
        }
        data.text = text.as_ptr();
        data.print_fn = Some(recording_print);

        CALLBACK_HITS.store(0, Ordering::SeqCst);
        EXPECTED_TOKEN.store(token.as_raw(), Ordering::SeqCst);
        unsafe { trestle_dump_record(token, &mut data) };
        assert_eq!(CALLBACK_HITS.load(Ordering::SeqCst), 1);
        assert!(CALLBACK_SAW_EXPECTED.load(Ordering::SeqCst));

        // The dump itself never mutates.
        assert_eq!(data.primitive, 42);
        assert_eq!(data.array, [0, 2, 4, 6, 8, 10, 12, 14]);

        let Ok(EntryPointRef::ReleaseRecord(release)) = resolve_symbol("release_record") else {
            panic!("release_record must resolve with its own signature");
        };
        unsafe { release(token, &mut data) };
        assert_eq!(data.primitive, 0);
        assert_eq!(data.array, [0; DATA_ARRAY_LEN]);
        assert!(data.text.is_null());
        assert!(data.print_fn.is_none());
    });
}

#[test]
fn narrow_accessors_resolved_by_name_disagree_by_design() {
    with_context(|_handle, token| {
        let record = NarrowRecord::from_pattern(0xF0);

        let Ok(EntryPointRef::NarrowRaw(raw)) = resolve_symbol("narrow_raw") else {
            panic!("narrow_raw must resolve");
        };
        let Ok(EntryPointRef::NarrowMasked(masked)) = resolve_symbol("narrow_masked") else {
            panic!("narrow_masked must resolve");
        };
        let Ok(EntryPointRef::NarrowUnsigned(unsigned)) = resolve_symbol("narrow_unsigned") else {
            panic!("narrow_unsigned must resolve");
        };

        unsafe {
            assert_eq!(raw(token, &record), -16);
            assert_eq!(masked(token, &record), 240);
            assert_eq!(unsigned(token, &record), 240);
        }
    });
}

#[test]
fn union_payloads_stay_self_referential_across_the_call() {
    with_context(|_handle, token| {
        let du = TaggedUnion::alloc_int(55);
        unsafe {
            assert_eq!((*du).header.kind, UNION_KIND_INT);
            let Ok(EntryPointRef::DumpUnions(dump)) = resolve_symbol("dump_unions") else {
                panic!("dump_unions must resolve");
            };
            let payload = TaggedUnion::int_variant_ptr(du);
            dump(token, du, ptr::null_mut(), payload, ptr::null_mut());
            assert_eq!((*payload).value_ptr, ptr::addr_of_mut!((*payload).value));
            TaggedUnion::free(du);
        }
    });
}

#[test]
fn detached_tokens_are_inert_but_the_thread_can_reattach() {
    with_context(|handle, token| {
        let record = NarrowRecord::from_pattern(0xF0);
        detach_thread(token).expect("detach");

        // Rejected call: the accessor answers 0 instead of touching the record.
        assert_eq!(unsafe { trestle_narrow_raw(token, &record) }, 0);

        let fresh = current_execution_token(handle).expect("re-attach");
        assert_eq!(unsafe { trestle_narrow_raw(fresh, &record) }, -16);
    });
}

#[test]
fn unknown_symbols_fail_resolution() {
    match resolve_symbol("java_entry_point") {
        Err(SymbolError::NotFound { name }) => assert_eq!(name, "java_entry_point"),
        other => panic!("expected a resolution failure, got {other:?}"),
    }
}
