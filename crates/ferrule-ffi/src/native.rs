//! Adapters from C function pointers to engine callables
//!
//! Glue registers its native implementations as plain C functions; these
//! wrap them as [`NativeMethod`]s and [`NativeOps`] hooks.

use crate::install::lend;
use ferrule_engine::{native_method, Bridge, NativeMethod, NativeOps, OverrideFlags};
use ferrule_sdk::{BridgeError, NativePtr, NativeValue};
use libc::{c_char, c_int, c_void, size_t};
use std::ffi::CStr;
use std::rc::Rc;

/// Native implementation of a virtual slot
///
/// Receives `this`, the NaN-boxed arguments and an out-parameter for the
/// NaN-boxed result. Returns 0 on success. On failure, report the cause
/// with `ferrule_set_exception` before returning.
pub type FerruleNativeFn =
    unsafe extern "C" fn(this: *mut c_void, args: *const u64, nargs: size_t, out: *mut u64) -> c_int;

/// Native destructor (`delete this`)
pub type FerruleDestroyFn = unsafe extern "C" fn(this: *mut c_void);

/// Most-derived native class name of `this`, or null
pub type FerruleTypeNameFn = unsafe extern "C" fn(this: *mut c_void) -> *const c_char;

/// Stores one flag byte per slot into the native object
pub type FerruleSyncFlagsFn = unsafe extern "C" fn(this: *mut c_void, flags: *const u8, len: size_t);

/// Wrap a C implementation as a [`NativeMethod`]
///
/// The bridge is lent for the duration of the call, so the C code may call
/// back into `ferrule_dispatch`.
pub fn c_native_method(f: FerruleNativeFn) -> NativeMethod {
    native_method(move |bridge, this, args| {
        let raw: Vec<u64> = args.iter().map(|v| v.to_bits()).collect();
        let mut out = NativeValue::null().to_bits();
        // SAFETY: `raw` and `out` outlive the call; `this` is the live
        // object the bridge resolved for the slot.
        let status = lend(bridge, || unsafe { f(this.as_raw(), raw.as_ptr(), raw.len(), &mut out) });
        if status != 0 {
            return Err(BridgeError::Native {
                kind: "RuntimeError".to_string(),
                message: format!("native method failed with status {}", status),
            });
        }
        Ok(NativeValue::from_bits(out))
    })
}

/// Build [`NativeOps`] from C hooks; `None` hooks are inherited
pub fn c_native_ops(
    destroy: Option<FerruleDestroyFn>,
    type_name: Option<FerruleTypeNameFn>,
    sync_flags: Option<FerruleSyncFlagsFn>,
    slots: usize,
) -> NativeOps {
    NativeOps {
        // SAFETY (all three): the bridge only passes addresses of live
        // objects registered to the class the hooks belong to.
        // The bridge is lent so a destructor may still make virtual calls
        destroy: destroy.map(|f| {
            Rc::new(move |bridge: &mut Bridge, ptr: NativePtr| lend(bridge, || unsafe { f(ptr.as_raw()) })) as _
        }),
        type_name: type_name.map(|f| {
            Rc::new(move |ptr: NativePtr| {
                let name = unsafe { f(ptr.as_raw()) };
                if name.is_null() {
                    return None;
                }
                unsafe { CStr::from_ptr(name) }.to_str().ok().map(str::to_string)
            }) as _
        }),
        sync_flags: sync_flags.map(|f| {
            Rc::new(move |ptr: NativePtr, flags: &OverrideFlags| {
                let bytes = flags.to_bytes(slots);
                unsafe { f(ptr.as_raw(), bytes.as_ptr(), bytes.len()) }
            }) as _
        }),
    }
}
