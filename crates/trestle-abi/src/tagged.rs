//! Discriminated unions with a shared header and self-referential payloads.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr;

use crate::record::{RecordHeader, TYPE_NAME_LEN};

pub const UNION_KIND_INT: u8 = 1;
pub const UNION_KIND_LONG: u8 = 2;

/// Payload for discriminant [`UNION_KIND_INT`]: one 32-bit value plus a
/// pointer back at that same value.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct IntVariant {
    pub header: RecordHeader,
    pub value: i32,
    pub value_ptr: *mut i32,
}

/// Payload for discriminant [`UNION_KIND_LONG`]: one 64-bit value plus a
/// pointer back at that same value.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct LongVariant {
    pub header: RecordHeader,
    pub value: i64,
    pub value_ptr: *mut i64,
}

/// Tagged union: the header is at offset zero of every variant, so
/// `header.kind` is readable no matter which payload was materialized. Only
/// the payload matching the discriminant is valid to read.
#[repr(C)]
#[derive(Copy, Clone)]
pub union TaggedUnion {
    pub header: RecordHeader,
    pub int_variant: IntVariant,
    pub long_variant: LongVariant,
}

const _: () = assert!(mem::offset_of!(IntVariant, header) == 0);
const _: () = assert!(mem::offset_of!(LongVariant, header) == 0);

const fn variant_layout(size: usize) -> Layout {
    match Layout::from_size_align(size, mem::align_of::<TaggedUnion>()) {
        Ok(layout) => layout,
        Err(_) => panic!("variant layout"),
    }
}

// Allocations are sized for the variant actually materialized, not for the
// widest member. The discriminant is written right after the payload and only
// that payload is read afterwards.
const INT_LAYOUT: Layout = variant_layout(mem::size_of::<IntVariant>());
const LONG_LAYOUT: Layout = variant_layout(mem::size_of::<LongVariant>());

impl TaggedUnion {
    /// Heap-allocates an int-variant union: payload, self-pointer, then the
    /// discriminant and name.
    pub fn alloc_int(value: i32) -> *mut TaggedUnion {
        unsafe {
            let raw = alloc::alloc(INT_LAYOUT);
            if raw.is_null() {
                alloc::handle_alloc_error(INT_LAYOUT);
            }
            let variant = raw.cast::<IntVariant>();
            ptr::addr_of_mut!((*variant).value).write(value);
            ptr::addr_of_mut!((*variant).value_ptr).write(ptr::addr_of_mut!((*variant).value));
            ptr::addr_of_mut!((*variant).header).write(kind_header(UNION_KIND_INT));
            raw.cast()
        }
    }

    /// Heap-allocates a long-variant union.
    pub fn alloc_long(value: i64) -> *mut TaggedUnion {
        unsafe {
            let raw = alloc::alloc(LONG_LAYOUT);
            if raw.is_null() {
                alloc::handle_alloc_error(LONG_LAYOUT);
            }
            let variant = raw.cast::<LongVariant>();
            ptr::addr_of_mut!((*variant).value).write(value);
            ptr::addr_of_mut!((*variant).value_ptr).write(ptr::addr_of_mut!((*variant).value));
            ptr::addr_of_mut!((*variant).header).write(kind_header(UNION_KIND_LONG));
            raw.cast()
        }
    }

    /// Frees a union produced by [`TaggedUnion::alloc_int`] or
    /// [`TaggedUnion::alloc_long`], picking the layout from the discriminant.
    /// A corrupt discriminant leaks the allocation rather than guess a size.
    ///
    /// # Safety
    ///
    /// `this` must come from one of the constructors above and must not have
    /// been freed already.
    pub unsafe fn free(this: *mut TaggedUnion) {
        if this.is_null() {
            return;
        }
        let layout = match (*this).header.kind {
            UNION_KIND_INT => INT_LAYOUT,
            UNION_KIND_LONG => LONG_LAYOUT,
            _ => return,
        };
        alloc::dealloc(this.cast::<u8>(), layout);
    }

    /// Views the union as its int variant.
    ///
    /// # Safety
    ///
    /// The stored discriminant must be [`UNION_KIND_INT`].
    pub unsafe fn int_variant_ptr(this: *mut TaggedUnion) -> *mut IntVariant {
        this.cast()
    }

    /// Views the union as its long variant.
    ///
    /// # Safety
    ///
    /// The stored discriminant must be [`UNION_KIND_LONG`].
    pub unsafe fn long_variant_ptr(this: *mut TaggedUnion) -> *mut LongVariant {
        this.cast()
    }
}

fn kind_header(kind: u8) -> RecordHeader {
    let mut type_name = [0u8; TYPE_NAME_LEN];
    type_name[0] = b'd';
    type_name[1] = b'0' + kind;
    RecordHeader { kind, type_name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_union_is_tagged_named_and_self_referential() {
        let du = TaggedUnion::alloc_int(55);
        unsafe {
            assert_eq!((*du).header.kind, UNION_KIND_INT);
            assert_eq!((*du).header.type_name_str(), "d1");

            let variant = TaggedUnion::int_variant_ptr(du);
            assert_eq!((*variant).value, 55);
            assert_eq!((*variant).value_ptr, ptr::addr_of_mut!((*variant).value));

            TaggedUnion::free(du);
        }
    }

    #[test]
    fn long_union_is_tagged_named_and_self_referential() {
        let du = TaggedUnion::alloc_long(5_555_555_555_555_555);
        unsafe {
            assert_eq!((*du).header.kind, UNION_KIND_LONG);
            assert_eq!((*du).header.type_name_str(), "d2");

            let variant = TaggedUnion::long_variant_ptr(du);
            assert_eq!((*variant).value, 5_555_555_555_555_555);
            assert_eq!((*variant).value_ptr, ptr::addr_of_mut!((*variant).value));

            TaggedUnion::free(du);
        }
    }

    #[test]
    fn free_tolerates_null() {
        unsafe { TaggedUnion::free(ptr::null_mut()) };
    }
}
