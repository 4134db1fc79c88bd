//! The `extern "C"` entry points the native side calls.
//!
//! Every entry point takes the execution token first, runs inside a call
//! scope, and never lets a panic unwind across the boundary. Pointer
//! arguments are owned by the caller for the whole call.

use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::catch_unwind;
use std::ptr;

use trestle_abi::{
    ExecutionToken, ExtendedRecord, IntVariant, LongVariant, NarrowRecord, PlainRecord,
    RecordHeader, TaggedUnion, WeekDay, DATA_ARRAY_LEN, UNION_KIND_INT, UNION_KIND_LONG,
};

use crate::context::CallScope;

fn rejected(entry: &str) {
    eprintln!("managed: {entry}: rejected call, token has no live attachment");
}

unsafe fn text_or_empty<'a>(text: *const c_char) -> Cow<'a, str> {
    if text.is_null() {
        return Cow::Borrowed("");
    }
    CStr::from_ptr(text).to_string_lossy()
}

/// Dumps a plain record, then re-enters native code through the record's
/// callback with the same token.
#[no_mangle]
pub unsafe extern "C" fn trestle_dump_record(token: ExecutionToken, data: *mut PlainRecord) {
    let Some(_scope) = CallScope::enter(token) else {
        return rejected("dump_record");
    };
    if catch_unwind(|| unsafe { dump_record_body(token, data) }).is_err() {
        eprintln!("managed: dump_record panicked");
    }
}

unsafe fn dump_record_body(token: ExecutionToken, data: *mut PlainRecord) {
    if data.is_null() {
        return;
    }
    let data = &*data;
    println!("managed: **** record dump ****");
    println!("managed: primitive: {}", data.primitive);
    println!("managed: array length: {DATA_ARRAY_LEN}");
    let rendered: Vec<String> = data.array.iter().map(|v| v.to_string()).collect();
    println!("managed: {}", rendered.join(" "));
    println!("managed: text: {}", text_or_empty(data.text));
    if let Some(print_fn) = data.print_fn {
        print_fn(token, data.text);
    }
}

/// Cleanup half of the record exchange: zeroes the payload and drops the
/// record's references so the native side can observe the release.
#[no_mangle]
pub unsafe extern "C" fn trestle_release_record(token: ExecutionToken, data: *mut PlainRecord) {
    let Some(_scope) = CallScope::enter(token) else {
        return rejected("release_record");
    };
    if catch_unwind(|| unsafe { release_record_body(data) }).is_err() {
        eprintln!("managed: release_record panicked");
    }
}

unsafe fn release_record_body(data: *mut PlainRecord) {
    if data.is_null() {
        return;
    }
    let data = &mut *data;
    data.primitive = 0;
    data.array = [0; DATA_ARRAY_LEN];
    data.text = ptr::null();
    data.print_fn = None;
    println!("managed: record released");
}

#[no_mangle]
pub unsafe extern "C" fn trestle_print_day(token: ExecutionToken, raw_day: i32) {
    let Some(_scope) = CallScope::enter(token) else {
        return rejected("print_day");
    };
    let body = || match WeekDay::from_raw(raw_day) {
        Some(day) => println!("managed: day: {day}, next: {}", day.add(1)),
        None => eprintln!("managed: print_day: {raw_day} is not a day"),
    };
    if catch_unwind(body).is_err() {
        eprintln!("managed: print_day panicked");
    }
}

/// The second argument is the base-typed alias of the first: same allocation,
/// read through the header shape only.
#[no_mangle]
pub unsafe extern "C" fn trestle_dump_extended(
    token: ExecutionToken,
    data: *mut ExtendedRecord,
    header: *mut RecordHeader,
) {
    let Some(_scope) = CallScope::enter(token) else {
        return rejected("dump_extended");
    };
    if catch_unwind(|| unsafe { dump_extended_body(data, header) }).is_err() {
        eprintln!("managed: dump_extended panicked");
    }
}

unsafe fn dump_extended_body(data: *mut ExtendedRecord, header: *mut RecordHeader) {
    if data.is_null() || header.is_null() {
        return;
    }
    println!("managed: extended f1: {:#x}", (*data).f1);
    let header = &*header;
    println!(
        "managed: header kind: {}, name: {}",
        header.kind,
        header.type_name_str()
    );
}

#[no_mangle]
pub unsafe extern "C" fn trestle_dump_unions(
    token: ExecutionToken,
    first: *mut TaggedUnion,
    second: *mut TaggedUnion,
    int_payload: *mut IntVariant,
    long_payload: *mut LongVariant,
) {
    let Some(_scope) = CallScope::enter(token) else {
        return rejected("dump_unions");
    };
    let body = || unsafe { dump_unions_body(first, second, int_payload, long_payload) };
    if catch_unwind(body).is_err() {
        eprintln!("managed: dump_unions panicked");
    }
}

unsafe fn dump_unions_body(
    first: *mut TaggedUnion,
    second: *mut TaggedUnion,
    int_payload: *mut IntVariant,
    long_payload: *mut LongVariant,
) {
    describe_union("first", first);
    describe_union("second", second);
    if !int_payload.is_null() {
        let payload = &*int_payload;
        let self_ok = payload.value_ptr == ptr::addr_of!(payload.value).cast_mut();
        println!(
            "managed: int payload value {} self-pointer {}",
            payload.value,
            if self_ok { "intact" } else { "BROKEN" }
        );
    }
    if !long_payload.is_null() {
        let payload = &*long_payload;
        let self_ok = payload.value_ptr == ptr::addr_of!(payload.value).cast_mut();
        println!(
            "managed: long payload value {} self-pointer {}",
            payload.value,
            if self_ok { "intact" } else { "BROKEN" }
        );
    }
}

unsafe fn describe_union(which: &str, union_ptr: *mut TaggedUnion) {
    if union_ptr.is_null() {
        return;
    }
    let header = &(*union_ptr).header;
    match header.kind {
        UNION_KIND_INT => {
            let variant = &(*union_ptr).int_variant;
            println!(
                "managed: {which} union [{}] int value: {}",
                header.type_name_str(),
                variant.value
            );
        }
        UNION_KIND_LONG => {
            let variant = &(*union_ptr).long_variant;
            println!(
                "managed: {which} union [{}] long value: {}",
                header.type_name_str(),
                variant.value
            );
        }
        other => eprintln!("managed: {which} union has unknown discriminant {other}"),
    }
}

#[no_mangle]
pub unsafe extern "C" fn trestle_dump_narrow(token: ExecutionToken, data: *mut NarrowRecord) {
    let Some(_scope) = CallScope::enter(token) else {
        return rejected("dump_narrow");
    };
    if catch_unwind(|| unsafe { dump_narrow_body(data) }).is_err() {
        eprintln!("managed: dump_narrow panicked");
    }
}

unsafe fn dump_narrow_body(data: *mut NarrowRecord) {
    if data.is_null() {
        return;
    }
    let record = &*data;
    println!(
        "managed: narrow raw: {} masked: {} unsigned: {} signed field: {}",
        record.raw_value(),
        record.masked_value(),
        record.unsigned_value(),
        record.sb1
    );
}

#[no_mangle]
pub unsafe extern "C" fn trestle_narrow_raw(
    token: ExecutionToken,
    data: *const NarrowRecord,
) -> i64 {
    let Some(_scope) = CallScope::enter(token) else {
        rejected("narrow_raw");
        return 0;
    };
    if data.is_null() {
        return 0;
    }
    (*data).raw_value()
}

#[no_mangle]
pub unsafe extern "C" fn trestle_narrow_masked(
    token: ExecutionToken,
    data: *const NarrowRecord,
) -> i64 {
    let Some(_scope) = CallScope::enter(token) else {
        rejected("narrow_masked");
        return 0;
    };
    if data.is_null() {
        return 0;
    }
    (*data).masked_value()
}

#[no_mangle]
pub unsafe extern "C" fn trestle_narrow_unsigned(
    token: ExecutionToken,
    data: *const NarrowRecord,
) -> i64 {
    let Some(_scope) = CallScope::enter(token) else {
        rejected("narrow_unsigned");
        return 0;
    };
    if data.is_null() {
        return 0;
    }
    (*data).unsigned_value()
}
