//! Scoped, stable-address views over CPU-side data handed to the device.
//!
//! A value is staged for exactly one call:
//!
//! ```
//! use cadence_engine::staging;
//!
//! let offsets = [0u64];
//! let len = staging::stage(&offsets[..], |staged| staged.get().len());
//! assert_eq!(len, 1);
//! assert_eq!(staging::live_scopes(), 0);
//! ```
//!
//! The view is passed to the closure by reference, so it cannot outlive the
//! scope:
//!
//! ```compile_fail
//! use cadence_engine::staging;
//!
//! let value = 5u32;
//! let escaped: &u32 = staging::stage(&value, |staged| staged.get());
//! ```
//!
//! Each scope also carries a generation number tracked per thread;
//! `Staged::get` checks it in debug builds and backends or tests can query
//! [`is_live`] to prove nothing is read after release.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::Deref;

use bytemuck::Pod;

#[derive(Debug, Default)]
struct Ledger {
    next_generation: u64,
    live: Vec<u64>,
    opened: u64,
}

thread_local! {
    static LEDGER: RefCell<Ledger> = RefCell::new(Ledger::default());
}

/// Open scope; closes on drop, including during unwinding.
struct ScopeGuard {
    generation: u64,
}

impl ScopeGuard {
    fn open() -> Self {
        let generation = LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            l.next_generation += 1;
            l.opened += 1;
            let generation = l.next_generation;
            l.live.push(generation);
            generation
        });
        Self { generation }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            if let Some(pos) = l.live.iter().rposition(|g| *g == self.generation) {
                l.live.remove(pos);
            }
        });
    }
}

/// A staged value, valid only inside its [`stage`] call.
///
/// Not `Send`: the scope ledger is per thread.
pub struct Staged<'a, T: ?Sized> {
    value: &'a T,
    generation: u64,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Staged<'_, T> {
    #[inline]
    pub fn get(&self) -> &T {
        debug_assert!(is_live(self.generation), "staged value read after its scope closed");
        self.value
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Address of the staged data.
    #[inline]
    pub fn addr(&self) -> *const u8 {
        self.value as *const T as *const u8
    }
}

impl<T: ?Sized> Deref for Staged<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.get()
    }
}

/// Stages `value` for the duration of `call`.
///
/// `call` must work for any scope lifetime, so nothing it returns can borrow
/// from the view.
pub fn stage<T: ?Sized, R>(value: &T, call: impl for<'s> FnOnce(&Staged<'s, T>) -> R) -> R {
    let scope = ScopeGuard::open();
    let staged = Staged {
        value,
        generation: scope.generation,
        _not_send: PhantomData,
    };
    let out = call(&staged);
    drop(staged);
    drop(scope);
    out
}

/// Stages the raw bytes of a plain-old-data value.
pub fn stage_bytes<T: Pod, R>(value: &T, call: impl for<'s> FnOnce(&Staged<'s, [u8]>) -> R) -> R {
    stage(bytemuck::bytes_of(value), call)
}

/// Stages the raw bytes of a slice of plain-old-data values.
pub fn stage_slice_bytes<T: Pod, R>(
    values: &[T],
    call: impl for<'s> FnOnce(&Staged<'s, [u8]>) -> R,
) -> R {
    stage(bytemuck::cast_slice(values), call)
}

/// Collects `items` into a contiguous array owned by the scope and stages it.
pub fn stage_array<T, R>(
    items: impl IntoIterator<Item = T>,
    call: impl for<'s> FnOnce(&Staged<'s, [T]>) -> R,
) -> R {
    let array: Vec<T> = items.into_iter().collect();
    stage(array.as_slice(), call)
}

/// Number of scopes currently open on this thread.
pub fn live_scopes() -> usize {
    LEDGER.with(|l| l.borrow().live.len())
}

/// Whether the scope with `generation` is still open on this thread.
pub fn is_live(generation: u64) -> bool {
    LEDGER.with(|l| l.borrow().live.contains(&generation))
}

/// Total scopes opened on this thread so far.
pub fn scopes_opened() -> u64 {
    LEDGER.with(|l| l.borrow().opened)
}
