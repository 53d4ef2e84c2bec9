//! NativeValue: the word that crosses the native boundary
//!
//! Glue code passes every virtual-call argument and result as one `u64`, so
//! a single trampoline signature (`ferrule_dispatch`) serves all slots. A
//! word is either a plain `f64` or a quiet NaN carrying a 3-bit tag and a
//! 48-bit payload.
//!
//! Tags in use:
//! - `000` object address. Payload is the low 48 bits of a `NativePtr`; the
//!   bridge looks it up in the identity registry, it never dereferences it.
//! - `001` `i32`, `010` `bool`, `101` `i64` (sign-extended from 48 bits)
//! - `110` null. Also the encoding of a null object pointer and of `void`.
//! - `111` refcount-table handle. Payload is the token native code passes to
//!   `ferrule_adjust_refcount`.
//!
//! Tags `011` and `100` are unused. NaN doubles are canonicalised on the
//! way in so they never read back as a tagged word.

use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;

/// NaN-boxed 64-bit native word
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct NativeValue(u64);

const NAN_BOX_BASE: u64 = 0xFFF8_0000_0000_0000;
const TAG_SHIFT: u64 = 48;
const TAG_MASK: u64 = 0x7 << TAG_SHIFT;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const PAYLOAD_MASK_32: u64 = 0x0000_0000_FFFF_FFFF;

const TAG_PTR: u64 = 0x0 << TAG_SHIFT;
const TAG_I32: u64 = 0x1 << TAG_SHIFT;
const TAG_BOOL: u64 = 0x2 << TAG_SHIFT;
const TAG_I64: u64 = 0x5 << TAG_SHIFT;
const TAG_NULL: u64 = 0x6 << TAG_SHIFT;
const TAG_HANDLE: u64 = 0x7 << TAG_SHIFT;

const NULL_BITS: u64 = NAN_BOX_BASE | TAG_NULL;
const TRUE_BITS: u64 = NAN_BOX_BASE | TAG_BOOL | 1;
const FALSE_BITS: u64 = NAN_BOX_BASE | TAG_BOOL;

// Canonical quiet NaN outside the boxed range
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

impl NativeValue {
    /// Create from raw bits
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Null / void
    #[inline]
    pub const fn null() -> Self {
        Self(NULL_BITS)
    }

    /// Boolean
    #[inline]
    pub const fn bool(b: bool) -> Self {
        Self(if b { TRUE_BITS } else { FALSE_BITS })
    }

    /// 32-bit integer
    #[inline]
    pub const fn i32(i: i32) -> Self {
        Self(NAN_BOX_BASE | TAG_I32 | (i as u32 as u64))
    }

    /// 64-bit integer, truncated to the 48-bit payload
    #[inline]
    pub const fn i64(i: i64) -> Self {
        Self(NAN_BOX_BASE | TAG_I64 | (i as u64 & PAYLOAD_MASK))
    }

    /// Double; NaNs are canonicalised so they never alias a tagged value
    #[inline]
    pub fn f64(f: f64) -> Self {
        if f.is_nan() {
            Self(CANONICAL_NAN)
        } else {
            Self(f.to_bits())
        }
    }

    /// Native object address (null pointer encodes as `null()`)
    #[inline]
    pub fn ptr(ptr: Option<NativePtr>) -> Self {
        match ptr {
            Some(p) => Self(NAN_BOX_BASE | TAG_PTR | (p.addr() as u64 & PAYLOAD_MASK)),
            None => Self::null(),
        }
    }

    /// Refcounted handle token
    #[inline]
    pub const fn handle(raw: usize) -> Self {
        Self(NAN_BOX_BASE | TAG_HANDLE | (raw as u64 & PAYLOAD_MASK))
    }

    #[inline]
    const fn is_nan_boxed(&self) -> bool {
        (self.0 & NAN_BOX_BASE) == NAN_BOX_BASE
    }

    #[inline]
    const fn tag(&self) -> u64 {
        self.0 & TAG_MASK
    }

    /// Check for null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == NULL_BITS
    }

    /// Check for a raw double
    #[inline]
    pub const fn is_f64(&self) -> bool {
        !self.is_nan_boxed()
    }

    /// Extract a boolean
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        if self.is_nan_boxed() && self.tag() == TAG_BOOL {
            Some((self.0 & PAYLOAD_MASK) != 0)
        } else {
            None
        }
    }

    /// Extract a 32-bit integer
    #[inline]
    pub const fn as_i32(&self) -> Option<i32> {
        if self.is_nan_boxed() && self.tag() == TAG_I32 {
            Some((self.0 & PAYLOAD_MASK_32) as u32 as i32)
        } else {
            None
        }
    }

    /// Extract an integer of either width, sign-extending the 48-bit payload
    #[inline]
    pub const fn as_i64(&self) -> Option<i64> {
        if !self.is_nan_boxed() {
            return None;
        }
        match self.tag() {
            TAG_I32 => Some((self.0 & PAYLOAD_MASK_32) as u32 as i32 as i64),
            TAG_I64 => Some((((self.0 & PAYLOAD_MASK) << 16) as i64) >> 16),
            _ => None,
        }
    }

    /// Extract a double
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        if self.is_f64() {
            Some(f64::from_bits(self.0))
        } else {
            None
        }
    }

    /// Extract an object address; `Some(None)` for an encoded null pointer
    #[inline]
    pub fn as_ptr(&self) -> Option<Option<NativePtr>> {
        if self.is_null() {
            return Some(None);
        }
        if self.is_nan_boxed() && self.tag() == TAG_PTR {
            Some(NativePtr::new((self.0 & PAYLOAD_MASK) as usize))
        } else {
            None
        }
    }

    /// Extract a handle token
    #[inline]
    pub const fn as_handle(&self) -> Option<usize> {
        if self.is_nan_boxed() && self.tag() == TAG_HANDLE {
            Some((self.0 & PAYLOAD_MASK) as usize)
        } else {
            None
        }
    }
}

impl Default for NativeValue {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NativeValue(null)")
        } else if let Some(b) = self.as_bool() {
            write!(f, "NativeValue({})", b)
        } else if let Some(i) = self.as_i64() {
            write!(f, "NativeValue({})", i)
        } else if let Some(d) = self.as_f64() {
            write!(f, "NativeValue({:?})", d)
        } else if let Some(h) = self.as_handle() {
            write!(f, "NativeValue(handle {:#x})", h)
        } else if let Some(Some(p)) = self.as_ptr() {
            write!(f, "NativeValue({:?})", p)
        } else {
            write!(f, "NativeValue({:#018x})", self.0)
        }
    }
}

/// Non-null address of a native object
///
/// The bridge never dereferences it; it is an identity key and the argument
/// handed back to native entry points.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativePtr(NonZeroUsize);

impl NativePtr {
    /// Wrap an address; `None` for zero
    #[inline]
    pub fn new(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    /// Wrap a raw C pointer
    #[inline]
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        Self::new(ptr as usize)
    }

    /// The address
    #[inline]
    pub fn addr(self) -> usize {
        self.0.get()
    }

    /// The address as a C pointer
    #[inline]
    pub fn as_raw(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    /// Address of a base-class sub-object at `offset` bytes
    #[inline]
    pub fn offset(self, offset: isize) -> Option<Self> {
        Self::new(self.addr().wrapping_add_signed(offset))
    }
}

impl fmt::Debug for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePtr({:#x})", self.addr())
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}
