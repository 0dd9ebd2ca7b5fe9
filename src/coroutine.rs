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

//! A single coroutine's record: its status, its machine context, and its
//! saved-stack buffer.

use crate::context::Context;

/// The lifecycle state of a coroutine.
///
/// Discriminants are fixed to match the base spec's nominal values (§6), so
/// that `status as u8` is stable across versions of this crate.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The slot is empty; reported for any id with no live coroutine.
    Dead = 0,
    /// Created but never yet resumed.
    Ready = 1,
    /// Currently executing (there is at most one such coroutine per scheduler).
    Running = 2,
    /// Has yielded at least once and is holding a saved-stack copy.
    Suspend = 3,
}

/// The user coroutine body. A boxed `FnOnce` closure already carries whatever
/// opaque argument it needs in its captured environment, which is the
/// idiomatic stand-in for the base spec's separate `(func, ud)` pair.
///
/// Takes `&SchedulerInner` rather than `&Scheduler`: the inner type is the
/// one whose address is actually stable for the scheduler's lifetime (see
/// `scheduler.rs` module docs), which is what a suspended coroutine's saved
/// stack is relying on when it holds onto this reference across a yield.
pub(crate) type Body = Box<dyn FnOnce(&crate::SchedulerInner) + 'static>;

/// One entry in the scheduler's coroutine table.
///
/// Never constructed directly by users; reached only through
/// [`crate::Scheduler`] operations keyed by id.
pub(crate) struct Coroutine {
    /// Taken (`Option::take`) the moment the trampoline actually invokes it,
    /// so a given body can run at most once even if something were to resume
    /// into an already-running slot (which is itself a contract violation,
    /// but belt-and-suspenders here costs nothing).
    pub(crate) func: Option<Body>,
    pub(crate) ctx: Context,
    pub(crate) status: Status,
    /// Byte-for-byte copy of the working stack's live range at the last
    /// yield. Empty (capacity 0) until the coroutine yields for the first
    /// time.
    pub(crate) saved_stack: Vec<u8>,
}

impl Coroutine {
    pub(crate) fn new(func: Body) -> Coroutine {
        Coroutine {
            func: Some(func),
            ctx: Context::empty(),
            status: Status::Ready,
            saved_stack: Vec::new(),
        }
    }
}
