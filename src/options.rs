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

//! Scheduler configuration.
//!
//! Mirrors `rustcc-coroutine-rs`'s `Options`/`Builder` pair: a plain
//! `Default`-able config struct for the common case, plus a chainable builder
//! for readability when more than one field is being overridden.

/// Default working-stack size: 1 MiB, per the base spec's `STACK_SIZE`.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Default initial coroutine-table capacity.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Overridable knobs for [`crate::Scheduler::with_config`].
///
/// The base spec fixes these at 1 MiB / 16 but explicitly allows an
/// implementation to make them adjustable at scheduler-open time; this is
/// that adjustability surface.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Size in bytes of the single working stack shared by every coroutine.
    pub stack_size: usize,
    /// Initial capacity of the coroutine table before any doubling growth.
    pub initial_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            stack_size: DEFAULT_STACK_SIZE,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

/// Chainable builder over [`SchedulerConfig`].
///
/// ```
/// use sharedstack::SchedulerBuilder;
///
/// let scheduler = SchedulerBuilder::new()
///     .stack_size(64 * 1024)
///     .initial_capacity(4)
///     .open();
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    pub fn new() -> SchedulerBuilder {
        SchedulerBuilder {
            config: SchedulerConfig::default(),
        }
    }

    /// Set the size of the shared working stack.
    pub fn stack_size(mut self, size: usize) -> SchedulerBuilder {
        self.config.stack_size = size;
        self
    }

    /// Set the coroutine table's initial capacity.
    pub fn initial_capacity(mut self, cap: usize) -> SchedulerBuilder {
        self.config.initial_capacity = cap;
        self
    }

    /// Build the `Scheduler` with the accumulated configuration.
    pub fn open(self) -> crate::Scheduler {
        crate::Scheduler::with_config(self.config)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }
}
