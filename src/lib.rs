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

//! Minimal asymmetric stackful coroutines that share a single working stack.
//!
//! Unlike a coroutine pool where each coroutine owns its own stack
//! allocation, a [`Scheduler`] here owns exactly one fixed-address working
//! stack. Every coroutine executes on that same memory while it runs; when it
//! yields, only the bytes of the working stack it actually used are copied
//! out into a per-coroutine buffer, and restored back onto the working stack
//! the next time it is resumed. This trades a per-coroutine stack allocation
//! for a per-yield memcpy, which is the right trade when coroutines are
//! short-lived or numerous and rarely all suspended with deep stacks at once.
//!
//! This is a single-threaded, cooperative, asymmetric model: a coroutine can
//! only transfer control back to whichever [`SchedulerInner::resume`] call
//! started it (via [`SchedulerInner::yield_now`] or by returning), never
//! directly to another coroutine. There is no I/O integration, no symmetric
//! transfer, and no coroutine-local storage — see the module-level
//! non-goals in each submodule for the full list.
//!
//! ```
//! use sharedstack::Scheduler;
//!
//! let sched = Scheduler::open();
//! let id = sched.new(|s| {
//!     println!("first half");
//!     s.yield_now();
//!     println!("second half");
//! });
//! sched.resume(id); // prints "first half"
//! sched.resume(id); // prints "second half"
//! ```

mod context;
mod coroutine;
mod options;
mod scheduler;
mod stack;

pub use coroutine::Status;
pub use options::{SchedulerBuilder, SchedulerConfig, DEFAULT_INITIAL_CAPACITY, DEFAULT_STACK_SIZE};
pub use scheduler::{CoroutineId, Scheduler, SchedulerInner};
