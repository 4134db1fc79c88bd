//! Native host for the trestle boundary demo.
//!
//! This side owns every allocation it passes across: records are built here,
//! handed to managed entry points by reference, and freed here after the call
//! returns. One thread, one context, one pass over every exchange shape.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use trestle_abi::{
    ExecutionToken, ExtendedRecord, IntVariant, LongVariant, NarrowRecord, PlainRecord,
    RecordHeader, TaggedUnion, WeekDay, DATA_ARRAY_LEN, TRESTLE_RUN_REPORT_SCHEMA_VERSION,
};
use trestle_isolate::{
    create_context, destroy_context, resolve_symbol, trestle_dump_extended, trestle_dump_narrow,
    trestle_dump_record, trestle_dump_unions, trestle_narrow_masked, trestle_narrow_raw,
    trestle_narrow_unsigned, trestle_print_day, EntryPointRef,
};

const GREETING: &CStr = c"Hello World";
const NARROW_PATTERN: u8 = 0xF0;

#[derive(Parser)]
#[command(name = "trestle-host")]
#[command(about = "One-shot demo driving the trestle interop boundary.", long_about = None)]
struct Cli {
    /// Day fed to the managed print entry point.
    #[arg(long, default_value = "sunday")]
    day: WeekDay,

    /// Offset for the day-arithmetic demo; negative values wrap.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    offset: i32,

    /// Emit a machine-readable run report after the demo output.
    #[arg(long)]
    report: bool,
}

/// Function pointer handed to the managed side inside the plain record.
unsafe extern "C" fn host_print(_token: ExecutionToken, text: *const c_char) {
    if text.is_null() {
        return;
    }
    println!("host: {}", CStr::from_ptr(text).to_string_lossy());
}

fn fill(data: &mut PlainRecord) {
    data.primitive = 42;
    for (i, slot) in data.array.iter_mut().enumerate() {
        *slot = (i as i32) * 2;
    }
    data.text = GREETING.as_ptr();
    data.print_fn = Some(host_print);
}

fn dump(token: ExecutionToken, data: &PlainRecord) {
    println!("host: **** record dump ****");
    println!("host: primitive: {}", data.primitive);
    println!("host: array length: {DATA_ARRAY_LEN}");
    let rendered: Vec<String> = data.array.iter().map(|v| v.to_string()).collect();
    println!("host: {}", rendered.join(" "));
    // Same pointer the managed side calls; set to a managed function it would
    // transparently cross the boundary the other way.
    if let Some(print_fn) = data.print_fn {
        unsafe { print_fn(token, data.text) };
    }
}

#[derive(Serialize)]
struct PayloadReport {
    value: i64,
    self_pointer_ok: bool,
}

#[derive(Serialize)]
struct NarrowReport {
    raw: i64,
    masked: i64,
    unsigned: i64,
}

#[derive(Serialize)]
struct RunReport {
    schema_version: &'static str,
    primitive: i32,
    array: Vec<i32>,
    text: String,
    released: bool,
    day: String,
    landed_day: String,
    extended_kind: u8,
    extended_name: String,
    extended_f1: i32,
    int_union: PayloadReport,
    long_union: PayloadReport,
    narrow: NarrowReport,
}

fn run(cli: &Cli) -> Result<()> {
    let (ctx, token) = create_context().context("create execution context")?;

    // Plain record: statically-linked call, then the native-side dump, then
    // the dynamically-resolved release.
    let mut data = PlainRecord::empty();
    fill(&mut data);
    let sent_text = GREETING.to_string_lossy().into_owned();
    unsafe { trestle_dump_record(token, &mut data) };
    dump(token, &data);

    let release = match resolve_symbol("release_record")? {
        EntryPointRef::ReleaseRecord(release) => release,
        other => bail!("release_record resolved with an unexpected signature: {other:?}"),
    };
    unsafe { release(token, &mut data) };
    let released = data.primitive == 0 && data.text.is_null() && data.print_fn.is_none();

    // Enum demo.
    unsafe { trestle_print_day(token, cli.day as i32) };
    let landed = cli.day.add(cli.offset);
    println!(
        "host: {} shifted by {} day(s) is {landed}",
        cli.day, cli.offset
    );

    // Structural extension: one heap value, two views of it.
    let mut extended = Box::new(ExtendedRecord {
        header: RecordHeader::new(7, b"s1"),
        f1: 0x800_000f,
    });
    let extended_ptr: *mut ExtendedRecord = &mut *extended;
    unsafe {
        trestle_dump_extended(token, extended_ptr, ExtendedRecord::as_header_ptr(extended_ptr));
    }

    // Tagged unions, one per variant, plus direct payload pointers.
    let du1 = TaggedUnion::alloc_int(55);
    let du2 = TaggedUnion::alloc_long(5_555_555_555_555_555);
    let (int_union, long_union) = unsafe {
        let int_payload = TaggedUnion::int_variant_ptr(du1);
        let long_payload = TaggedUnion::long_variant_ptr(du2);
        trestle_dump_unions(token, du1, du2, int_payload, long_payload);
        (
            report_int_payload(&*int_payload),
            report_long_payload(&*long_payload),
        )
    };
    unsafe {
        TaggedUnion::free(du1);
        TaggedUnion::free(du2);
    }

    // Narrow-width storage: three managed reads of one bit pattern, plus the
    // direct native read for comparison.
    let narrow = Box::new(NarrowRecord::from_pattern(NARROW_PATTERN));
    let narrow_ptr: *const NarrowRecord = &*narrow;
    unsafe { trestle_dump_narrow(token, narrow_ptr.cast_mut()) };
    let raw = unsafe { trestle_narrow_raw(token, narrow_ptr) };
    let masked = unsafe { trestle_narrow_masked(token, narrow_ptr) };
    let unsigned = unsafe { trestle_narrow_unsigned(token, narrow_ptr) };
    let direct = narrow.raw_value();
    println!("host: narrow raw       {raw} (as byte {:#04x})", raw as u8);
    println!("host: narrow masked    {masked} (as byte {:#04x})", masked as u8);
    println!("host: narrow unsigned  {unsigned} (as byte {:#04x})", unsigned as u8);
    println!("host: narrow direct    {direct} (as byte {:#04x})", direct as u8);

    if cli.report {
        let report = RunReport {
            schema_version: TRESTLE_RUN_REPORT_SCHEMA_VERSION,
            primitive: 42,
            array: (0..DATA_ARRAY_LEN as i32).map(|i| i * 2).collect(),
            text: sent_text,
            released,
            day: cli.day.to_string(),
            landed_day: landed.to_string(),
            extended_kind: extended.header.kind,
            extended_name: extended.header.type_name_str().to_string(),
            extended_f1: extended.f1,
            int_union,
            long_union,
            narrow: NarrowReport {
                raw,
                masked,
                unsigned,
            },
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    destroy_context(ctx).context("tear down execution context")?;
    Ok(())
}

fn report_int_payload(payload: &IntVariant) -> PayloadReport {
    PayloadReport {
        value: payload.value as i64,
        self_pointer_ok: payload.value_ptr == ptr::addr_of!(payload.value).cast_mut(),
    }
}

fn report_long_payload(payload: &LongVariant) -> PayloadReport {
    PayloadReport {
        value: payload.value,
        self_pointer_ok: payload.value_ptr == ptr::addr_of!(payload.value).cast_mut(),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("trestle-host: {err:#}");
        std::process::exit(1);
    }
}
