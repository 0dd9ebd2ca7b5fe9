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

//! The scheduler: the shared working stack, the coroutine table, and the
//! resume/yield dispatch that ties them together.

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;

use crate::context::{self, Context};
use crate::coroutine::{Body, Coroutine, Status};
use crate::options::SchedulerConfig;
use crate::stack::Stack;

/// A coroutine id, stable from the matching [`SchedulerInner::new`] call until
/// the coroutine dies and its slot is reused.
pub type CoroutineId = usize;

/// Owning handle to a scheduler.
///
/// This is the value a host constructs with [`Scheduler::open`] and drops (or
/// calls [`Scheduler::close`] on) when done. It is a thin, freely-movable
/// wrapper around a heap-boxed [`SchedulerInner`] and forwards every
/// operation to it through `Deref`. It carries no state of its own precisely
/// so that moving it (`Box::new(sched)`, storing it in a field, returning it
/// by value) can never invalidate anything — see [`SchedulerInner`] for why
/// that matters.
pub struct Scheduler {
    inner: Box<SchedulerInner>,
}

impl Scheduler {
    /// Open a scheduler with the default configuration (1 MiB working stack,
    /// initial table capacity 16).
    pub fn open() -> Scheduler {
        Scheduler::with_config(SchedulerConfig::default())
    }

    /// Open a scheduler with a caller-chosen working-stack size and initial
    /// table capacity.
    pub fn with_config(config: SchedulerConfig) -> Scheduler {
        assert!(
            config.initial_capacity > 0,
            "initial_capacity must be non-zero"
        );

        let mut co_table = Vec::with_capacity(config.initial_capacity);
        co_table.resize_with(config.initial_capacity, || None);

        let inner = Box::new(SchedulerInner {
            working_stack: Stack::new(config.stack_size),
            main_ctx: UnsafeCell::new(Context::empty()),
            co_table: UnsafeCell::new(co_table),
            nco: Cell::new(0),
            running: Cell::new(None),
            _not_send_sync: PhantomData,
        });

        log::debug!(
            "scheduler opened: stack_size={} initial_capacity={}",
            config.stack_size,
            config.initial_capacity
        );

        Scheduler { inner }
    }

    /// Explicit, named counterpart to [`Scheduler::open`]; simply drops the
    /// scheduler; kept because the base spec names `close` as an operation in
    /// its own right, even though ordinary RAII already does the work.
    pub fn close(self) {}
}

impl std::ops::Deref for Scheduler {
    type Target = SchedulerInner;

    fn deref(&self) -> &SchedulerInner {
        &self.inner
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        log::debug!("scheduler closing (nco={})", self.inner.nco.get());
        // Dropping `self.inner` drops `co_table`, which in turn drops every
        // live `Coroutine` (its saved-stack buffer and context). This is
        // `coroutine_close`'s walk-and-free, expressed as ordinary Rust drop
        // glue rather than a manual loop.
    }
}

/// The address-stable body of a scheduler: the working stack, the main
/// context, and the coroutine table.
///
/// Every [`Scheduler`] owns exactly one of these behind a `Box`. A `Box`'s
/// heap allocation does not move when the `Box` handle itself is moved (e.g.
/// by relocating the owning `Scheduler`, or boxing it again), so a pointer to
/// a `SchedulerInner` stays valid for as long as the allocation is alive —
/// unlike a pointer to the `Scheduler` wrapper, which is an ordinary
/// by-value struct with no such guarantee. This is why every coroutine body
/// is handed a `&SchedulerInner` (reconstructed in [`trampoline`] from a
/// pointer captured once, here, rather than from `&Scheduler`): the
/// save/restore scheme's address-stability invariant (§3/§9 of the design)
/// must hold for the handle a suspended coroutine's saved stack embeds, not
/// just for `working_stack`/`main_ctx`/`co_table` themselves.
///
/// All operations take `&self` rather than `&mut self`. A coroutine body only
/// ever sees a shared `&SchedulerInner`, and mutation happens through the
/// interior mutability of its cells — the same pattern
/// `rustcc-coroutine-rs`'s `Environment::current()` uses (a thread-local
/// `UnsafeCell`, unsafely reborrowed as needed). This is sound here because
/// the scheduler enforces single-threaded, non-reentrant access at every
/// entry point: only one logical flow of control (host or the one running
/// coroutine) ever touches the cells at a time, and every internal borrow is
/// scoped to a single call with no two `&mut` views alive simultaneously.
///
/// Neither `Scheduler` nor `SchedulerInner` is `Send` or `Sync`: a scheduler
/// must be used from one host thread for its entire lifetime (§5), and
/// `ucontext_t`'s own OS-level bookkeeping is unsound to hand off between
/// threads regardless.
pub struct SchedulerInner {
    working_stack: Stack,
    main_ctx: UnsafeCell<Context>,
    co_table: UnsafeCell<Vec<Option<Box<Coroutine>>>>,
    nco: Cell<usize>,
    running: Cell<Option<CoroutineId>>,
    _not_send_sync: PhantomData<*const ()>,
}

impl SchedulerInner {
    /// Register a new coroutine body. The coroutine starts `Ready` and is not
    /// run until a matching [`SchedulerInner::resume`].
    ///
    /// `f` stands in for the base spec's separate `(func, ud)` pair: a Rust
    /// closure already carries whatever opaque argument it needs.
    pub fn new<F>(&self, f: F) -> CoroutineId
    where
        F: FnOnce(&SchedulerInner) + 'static,
    {
        let co = Box::new(Coroutine::new(Box::new(f) as Body));

        // SAFETY: scoped borrow, no other live access to co_table.
        let table = unsafe { &mut *self.co_table.get() };
        let nco = self.nco.get();
        let cap = table.len();

        let id = if nco >= cap {
            // Growth: double capacity, place the newcomer at the old boundary.
            let old_cap = cap;
            let new_cap = cap * 2;
            table.resize_with(new_cap, || None);
            table[old_cap] = Some(co);
            old_cap
        } else {
            // Scan starting at `nco % cap`: a heuristic to skip slots that
            // are likely occupied, carried over unchanged from the source.
            let mut found = None;
            for i in 0..cap {
                let slot = (i + nco) % cap;
                if table[slot].is_none() {
                    found = Some(slot);
                    break;
                }
            }
            let id = found.expect(
                "nco < cap but no empty slot was found — co_table is corrupt",
            );
            table[id] = Some(co);
            id
        };

        self.nco.set(nco + 1);
        log::debug!("spawned coroutine {} (nco={}, cap={})", id, nco + 1, table.len());
        id
    }

    /// Switch into coroutine `id`, running until it yields or finishes.
    ///
    /// # Panics
    /// Panics if another coroutine is already running, if `id` is out of
    /// range, or if the targeted coroutine is `Running` (a programmer-contract
    /// violation per §7). Resuming a dead (absent) slot is a silent no-op.
    pub fn resume(&self, id: CoroutineId) {
        assert!(
            self.running.get().is_none(),
            "resume({}) called while coroutine {:?} is already running",
            id,
            self.running.get()
        );

        let cap = unsafe { (*self.co_table.get()).len() };
        assert!(id < cap, "resume({}) out of range (cap={})", id, cap);

        let status = {
            let table = unsafe { &*self.co_table.get() };
            match table[id].as_ref() {
                None => None,
                Some(co) => Some(co.status),
            }
        };

        match status {
            None => {
                log::debug!("resume({}) on a dead slot is a no-op", id);
            }
            Some(Status::Ready) => {
                log::debug!("resume({}): starting fresh coroutine", id);
                self.start_ready(id);
            }
            Some(Status::Suspend) => {
                log::debug!("resume({}): restoring suspended coroutine", id);
                self.restore_and_enter(id);
            }
            Some(bad @ (Status::Running | Status::Dead)) => {
                log::error!("resume({}) called on coroutine in state {:?}", id, bad);
                panic!("cannot resume coroutine {} in state {:?}", id, bad);
            }
        }
    }

    fn start_ready(&self, id: CoroutineId) {
        // `self` is a reference into the heap allocation owned by the
        // enclosing `Scheduler`'s `Box<SchedulerInner>`, which is stable for
        // as long as that allocation lives — unlike the movable `Scheduler`
        // wrapper itself. This is the pointer the trampoline reconstructs.
        let sch_ptr = self as *const SchedulerInner as *mut ();
        let (lo, hi) = context::split_ptr(sch_ptr);

        let table = unsafe { &mut *self.co_table.get() };
        let co = table[id].as_mut().expect("slot checked non-empty by caller");

        let link: *mut Context = self.main_ctx.get();
        // SAFETY: `co.ctx` is freshly created and not currently in use;
        // `working_stack` outlives the scheduler; `link` points at
        // `main_ctx`, which lives inside this same heap-boxed inner struct
        // and is never relocated for the scheduler's lifetime.
        unsafe {
            co.ctx.prepare(&self.working_stack, link, trampoline, lo, hi);
        }
        co.status = Status::Running;
        let co_ctx_ptr: *const Context = &co.ctx;

        self.running.set(Some(id));

        // From here on `co` (and the slot it came from) may be invalidated by
        // the coroutine itself (e.g. it can run to completion and free its
        // own record) before this call returns, so nothing below may touch
        // `co` or `table` again.
        let main_ctx_ptr = self.main_ctx.get();
        unsafe { Context::swap(main_ctx_ptr, co_ctx_ptr) };
    }

    fn restore_and_enter(&self, id: CoroutineId) {
        let table = unsafe { &mut *self.co_table.get() };
        let co = table[id].as_mut().expect("slot checked non-empty by caller");

        let saved_size = co.saved_stack.len();
        let high_end = self.working_stack.high_end();
        // SAFETY: saved_size <= STACK_SIZE is an invariant maintained by
        // `yield_now`; `dest` therefore stays within the working stack.
        let dest = unsafe { high_end.sub(saved_size) };
        unsafe {
            std::ptr::copy_nonoverlapping(co.saved_stack.as_ptr(), dest, saved_size);
        }

        co.status = Status::Running;
        let co_ctx_ptr: *const Context = &co.ctx;

        self.running.set(Some(id));

        let main_ctx_ptr = self.main_ctx.get();
        unsafe { Context::swap(main_ctx_ptr, co_ctx_ptr) };
    }

    /// Suspend the currently-running coroutine, copying its live working-stack
    /// bytes into its own saved buffer, and switch back to whichever
    /// `resume` call is waiting.
    ///
    /// # Panics
    /// Panics if called while no coroutine is running, or if the running
    /// coroutine's live stack usage exceeds the working stack's size.
    pub fn yield_now(&self) {
        let id = self
            .running
            .get()
            .expect("yield_now() called outside of any running coroutine");

        let table = unsafe { &mut *self.co_table.get() };
        let co = table[id]
            .as_mut()
            .expect("running coroutine's slot is unexpectedly empty");

        // A local variable's address marks the live top of the (downward
        // growing) working stack; the fixed high end is the stack's bottom.
        let marker: u8 = 0;
        let live_top = &marker as *const u8;
        let high_end = self.working_stack.high_end();
        let used = high_end as usize - live_top as usize;
        assert!(
            used <= self.working_stack.len(),
            "coroutine {} stack overflow: {} bytes used, {} available",
            id,
            used,
            self.working_stack.len()
        );

        if co.saved_stack.capacity() < used {
            co.saved_stack = Vec::with_capacity(used);
        }
        co.saved_stack.clear();
        unsafe {
            std::ptr::copy_nonoverlapping(live_top, co.saved_stack.as_mut_ptr(), used);
            co.saved_stack.set_len(used);
        }

        co.status = Status::Suspend;
        self.running.set(None);

        let co_ctx_ptr: *mut Context = &mut co.ctx;
        let main_ctx_ptr: *const Context = self.main_ctx.get();

        log::debug!("coroutine {} yielded ({} bytes saved)", id, used);

        // SAFETY: called from within the coroutine currently executing on
        // the working stack; `main_ctx` is valid and was populated by the
        // `resume` call that is waiting for this swap to return into it.
        unsafe { Context::swap(co_ctx_ptr, main_ctx_ptr) };
    }

    /// The status of coroutine `id`. `Dead` for any id whose slot is empty.
    ///
    /// # Panics
    /// Panics if `id` is out of range.
    pub fn status(&self, id: CoroutineId) -> Status {
        let table = unsafe { &*self.co_table.get() };
        assert!(id < table.len(), "status({}) out of range (cap={})", id, table.len());
        match &table[id] {
            None => Status::Dead,
            Some(co) => co.status,
        }
    }

    /// The id of the currently-running coroutine, or `None`.
    pub fn running(&self) -> Option<CoroutineId> {
        self.running.get()
    }

    /// The number of live (non-dead) coroutines.
    pub fn len(&self) -> usize {
        self.nco.get()
    }

    /// Whether there are no live coroutines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entry point for every freshly-`makecontext`'d coroutine.
///
/// Receives the scheduler pointer split into two `u32` halves (see
/// `context.rs`), reassembles it, reads which coroutine is running from the
/// scheduler itself (already set by the `resume` call that is starting us),
/// and invokes that coroutine's body.
extern "C" fn trampoline(lo: u32, hi: u32) {
    let sch_ptr = context::join_ptr(lo, hi) as *const SchedulerInner;
    // SAFETY: `sch_ptr` was produced by `start_ready` from `self`, a
    // `&SchedulerInner` borrowed out of the owning `Scheduler`'s `Box`. That
    // heap allocation outlives every coroutine registered on it, regardless
    // of how the `Scheduler` wrapper itself is subsequently moved.
    let sch: &SchedulerInner = unsafe { &*sch_ptr };

    let id = sch
        .running
        .get()
        .expect("trampoline entered with no coroutine marked running");

    let func = {
        let table = unsafe { &mut *sch.co_table.get() };
        let co = table[id]
            .as_mut()
            .expect("trampoline's coroutine slot is empty");
        co.func
            .take()
            .expect("coroutine body already consumed — trampoline ran twice?")
    };

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| func(sch)));
    if let Err(payload) = result {
        log::error!("coroutine {} panicked: {}", id, panic_message(&payload));
    }

    // Natural return (or a caught panic): tear the slot down exactly as
    // `mainfunc` does in the source this is grounded on.
    let table = unsafe { &mut *sch.co_table.get() };
    table[id] = None;
    sch.nco.set(sch.nco.get() - 1);
    sch.running.set(None);

    log::debug!("coroutine {} finished (nco={})", id, sch.nco.get());

    // Falling through here hands control to `uc_link` (set to `main_ctx` at
    // creation time in `start_ready`), resuming whichever `resume` call
    // started this coroutine — exactly as if it had called `yield_now`, but
    // with the slot already cleared.
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn create_resume_return() {
        let sch = Scheduler::open();
        let id = sch.new(|_| {});
        assert_eq!(sch.status(id), Status::Ready);
        sch.resume(id);
        assert_eq!(sch.status(id), Status::Dead);
        assert_eq!(sch.running(), None);
        assert_eq!(sch.len(), 0);
    }

    #[test]
    fn single_yield_round_trip() {
        let sch = Scheduler::open();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let obs = observed.clone();
        let id = sch.new(move |s| {
            let mut x = 10;
            obs.borrow_mut().push(x);
            s.yield_now();
            obs.borrow_mut().push(x);
            x = 20;
            obs.borrow_mut().push(x);
        });

        sch.resume(id);
        assert_eq!(sch.status(id), Status::Suspend);
        assert_eq!(sch.running(), None);

        sch.resume(id);
        assert_eq!(sch.status(id), Status::Dead);
        assert_eq!(*observed.borrow(), vec![10, 10, 20]);
    }

    #[test]
    fn interleaving_two_coroutines() {
        let sch = Scheduler::open();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_a = log.clone();
        let a = sch.new(move |s| {
            log_a.borrow_mut().push(1);
            s.yield_now();
            log_a.borrow_mut().push(2);
        });

        let log_b = log.clone();
        let b = sch.new(move |s| {
            log_b.borrow_mut().push(10);
            s.yield_now();
            log_b.borrow_mut().push(20);
        });

        sch.resume(a);
        sch.resume(b);
        sch.resume(a);
        sch.resume(b);

        assert_eq!(*log.borrow(), vec![1, 10, 2, 20]);
        assert_eq!(sch.status(a), Status::Dead);
        assert_eq!(sch.status(b), Status::Dead);
        assert_eq!(sch.len(), 0);
    }

    #[test]
    fn capacity_doubles_on_the_17th_coroutine() {
        let sch = Scheduler::open();
        let mut ids = Vec::new();
        for _ in 0..17 {
            ids.push(sch.new(|_| {}));
        }
        assert_eq!(ids[..16], (0..16).collect::<Vec<_>>()[..]);
        assert_eq!(ids[16], 16);
    }

    #[test]
    fn dead_slot_is_reusable() {
        let sch = Scheduler::open();
        let first = sch.new(|_| {});
        sch.resume(first);
        assert_eq!(sch.status(first), Status::Dead);

        let second = sch.new(|_| {});
        assert!(second < 16);
    }

    #[test]
    fn resuming_a_dead_slot_is_a_noop() {
        let sch = Scheduler::open();
        let id = sch.new(|_| {});
        sch.resume(id);
        sch.resume(id); // must not panic
        assert_eq!(sch.status(id), Status::Dead);
    }

    #[test]
    #[should_panic]
    fn resuming_while_running_panics() {
        let sch = Scheduler::open();
        let id = sch.new(|s| {
            s.resume(0);
        });
        sch.resume(id);
    }

    #[test]
    fn panicking_coroutine_becomes_dead() {
        let sch = Scheduler::open();
        let id = sch.new(|_| panic!("boom"));
        sch.resume(id);
        assert_eq!(sch.status(id), Status::Dead);
        assert_eq!(sch.len(), 0);

        // Scheduler stays usable afterwards.
        let other = sch.new(|_| {});
        sch.resume(other);
        assert_eq!(sch.status(other), Status::Dead);
    }

    #[test]
    fn large_stack_survives_a_yield() {
        let sch = Scheduler::open();
        let observed = Rc::new(RefCell::new(0u8));
        let obs = observed.clone();
        let id = sch.new(move |s| {
            let mut locals = [0u8; 64 * 1024];
            for (i, b) in locals.iter_mut().enumerate() {
                *b = (i % 256) as u8;
            }
            s.yield_now();
            *obs.borrow_mut() = locals[1234];
            assert_eq!(locals[1234], (1234 % 256) as u8);
        });
        sch.resume(id);
        sch.resume(id);
        assert_eq!(*observed.borrow(), (1234 % 256) as u8);
    }

    #[test]
    fn scheduler_handle_can_move_without_invalidating_suspended_coroutines() {
        // Regression test for the address-stability bug: relocating the
        // `Scheduler` wrapper (here, by boxing it again) must not disturb a
        // coroutine that is mid-suspend and holds onto the `&SchedulerInner`
        // it was resumed with.
        let sch = Scheduler::open();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let obs = observed.clone();
        let id = sch.new(move |s| {
            obs.borrow_mut().push("before");
            s.yield_now();
            obs.borrow_mut().push("after");
        });

        sch.resume(id);
        assert_eq!(*observed.borrow(), vec!["before"]);

        let relocated = Box::new(sch);
        relocated.resume(id);

        assert_eq!(*observed.borrow(), vec!["before", "after"]);
        assert_eq!(relocated.status(id), Status::Dead);
    }
}
