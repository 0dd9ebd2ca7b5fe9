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

//! The single working stack shared by every coroutine in a scheduler.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Page alignment for the working stack allocation. Matches common guard-page
/// granularity; this crate does not itself install a guard page (see
/// [`crate::SchedulerConfig`] docs), but aligning to a page boundary keeps the
/// door open for a caller-side `mprotect` without relayout.
const STACK_ALIGN: usize = 4096;

/// A fixed-size, heap-allocated byte region that every coroutine in a
/// scheduler executes on while running.
///
/// The stack's base address never changes for the lifetime of the `Stack`
/// value: it is allocated once in `new` and freed once in `Drop`. This is the
/// address-stability invariant the whole save/restore scheme depends on
/// (§3/§5 of the spec) — callers must not let a `Stack` be replaced or
/// reallocated while any coroutine exists.
pub(crate) struct Stack {
    base: NonNull<u8>,
    len: usize,
}

impl Stack {
    pub(crate) fn new(len: usize) -> Stack {
        assert!(len > 0, "working stack size must be non-zero");
        let layout = Layout::from_size_align(len, STACK_ALIGN)
            .expect("working stack size overflows a valid allocation layout");
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(ptr).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Stack { base, len }
    }

    /// Low end of the allocated region (lowest valid address).
    #[inline(always)]
    pub(crate) fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One byte past the high end of the allocated region — the stack
    /// "bottom" in the spec's terminology, since the stack grows downward
    /// from here. This is the fixed reference point every save/restore
    /// offset is computed against.
    #[inline(always)]
    pub(crate) fn high_end(&self) -> *mut u8 {
        // SAFETY: offset stays within the one-past-the-end bound of the alloc.
        unsafe { self.base.as_ptr().add(self.len) }
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.len, STACK_ALIGN).unwrap();
        // SAFETY: `base` was allocated by `alloc::alloc` with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
}

// Deliberately not `Send`/`Sync`: `base` is a raw pointer, so the auto traits
// already withhold both, and that propagates to `Scheduler` without needing
// an explicit opt-out (see the module docs on `scheduler.rs`).
