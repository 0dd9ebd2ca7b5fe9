// The MIT License (MIT)

// Copyright (c) 2024 sharedstack contributors

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The machine-context primitive: save/restore of a coroutine's execution
//! state, built directly on the host's `ucontext_t` family.
//!
//! This mirrors the C library this crate's design is grounded on bit for bit
//! (see `coroutine_resume`/`mainfunc` in the original source): `getcontext`
//! snapshots the calling context, `makecontext` points a context at an entry
//! function running on a caller-supplied stack, and `swapcontext` performs the
//! actual transfer. The one piece of plumbing this forces on us is that
//! `makecontext`'s trailing arguments are `int`-sized, so a 64-bit pointer has
//! to be split into two 32-bit halves and reassembled on the other side.

use std::mem::MaybeUninit;

use crate::stack::Stack;

/// A saved CPU/stack-pointer snapshot, wrapping `libc::ucontext_t`.
///
/// `#[repr(transparent)]` makes the single-field layout a guarantee rather
/// than an incidental `repr(Rust)` detail: `prepare` hands glibc's
/// `uc_link`/`setcontext` machinery a `*mut Context` cast straight to `*mut
/// libc::ucontext_t`, which is only sound if `Context` is guaranteed to have
/// the same layout as its one field (the same reasoning the teacher's own
/// `Registers` types apply `#[repr(C)]` for).
#[repr(transparent)]
pub(crate) struct Context {
    inner: libc::ucontext_t,
}

impl Context {
    /// An empty context, suitable only as a write target for `getcontext` or
    /// as the `out` side of a `swap`.
    pub(crate) fn empty() -> Context {
        // SAFETY: ucontext_t is a plain-old-data struct; zero is a valid (if
        // meaningless until populated) bit pattern for it.
        Context {
            inner: unsafe { MaybeUninit::zeroed().assume_init() },
        }
    }

    /// Build a context that, when switched into, begins executing `entry` on
    /// `stack`, and falls through to `link` when `entry` returns normally.
    ///
    /// `entry` receives the scheduler pointer reassembled from the two
    /// `u32` halves `arg_lo`/`arg_hi` (see module docs).
    pub(crate) unsafe fn prepare(
        &mut self,
        stack: &Stack,
        link: *mut Context,
        entry: extern "C" fn(u32, u32),
        arg_lo: u32,
        arg_hi: u32,
    ) {
        let rc = libc::getcontext(&mut self.inner);
        assert_eq!(rc, 0, "getcontext failed");

        self.inner.uc_stack.ss_sp = stack.base() as *mut libc::c_void;
        self.inner.uc_stack.ss_size = stack.len();
        self.inner.uc_stack.ss_flags = 0;
        self.inner.uc_link = link as *mut libc::ucontext_t;

        // `makecontext` takes the entry point as a no-argument function
        // pointer and an explicit argc; the actual arguments are appended as
        // varargs and must each fit in an `int`/`u32`. We cast `entry`'s type
        // away here and recover it on the other side of the `ret` inside
        // `entry` itself, exactly like the original C's `(void(*)(void))mainfunc`.
        let entry: extern "C" fn() = std::mem::transmute(entry);
        libc::makecontext(&mut self.inner, entry, 2, arg_lo, arg_hi);
    }

    /// Save the currently-executing context into `out`, then switch into
    /// `into`. Returns when some later `swap` targets `out` again.
    ///
    /// # Safety
    /// `out` and `into` must be valid, non-aliasing contexts associated with
    /// stacks that are still live. Must be called on the stack the context
    /// being switched *away from* is actually running on.
    pub(crate) unsafe fn swap(out: *mut Context, into: *const Context) {
        let rc = libc::swapcontext(
            &mut (*out).inner as *mut libc::ucontext_t,
            &(*into).inner as *const libc::ucontext_t,
        );
        assert_eq!(rc, 0, "swapcontext failed");
    }
}

/// Split a pointer into the low/high 32-bit halves `makecontext` needs.
pub(crate) fn split_ptr(ptr: *mut ()) -> (u32, u32) {
    let bits = ptr as usize as u64;
    (bits as u32, (bits >> 32) as u32)
}

/// Inverse of [`split_ptr`].
pub(crate) fn join_ptr(lo: u32, hi: u32) -> *mut () {
    (((hi as u64) << 32) | lo as u64) as usize as *mut ()
}
