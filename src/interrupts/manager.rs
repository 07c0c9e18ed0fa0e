//! # Interrupt Manager
//!
//! Owns the dispatch table and routes every vector that reaches the entry
//! stubs.
//!
//! ## Lifecycle
//!
//! ```text
//! Constructed ──activate──▶ Activated ──deactivate──▶ Deactivated
//!                              ▲                          │
//!                              └────────activate──────────┘
//! ```
//!
//! Exactly one manager is active at a time. It is recorded in
//! [`ACTIVE_MANAGER`], which is what the entry stubs consult; activating a
//! manager first deactivates whichever one held the slot.
//!
//! ## Dispatch
//!
//! | Step | Condition                 | Action                                   |
//! |------|---------------------------|------------------------------------------|
//! | 1    | handler registered        | result = handler(state)                  |
//! | 1    | none, not the timer       | report, result = state                   |
//! | 2    | timer vector, tasks exist | result = scheduler.schedule(state)       |
//! | 3    | vector in the IRQ window  | acknowledge the controller               |

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use spin::Mutex;
use x86_64::instructions::interrupts;

use crate::config::HARDWARE_INTERRUPT_LINES;
use crate::interrupts::frame::StatePtr;
use crate::interrupts::gdt::SegmentTable;
use crate::interrupts::idt::{InterruptDispatchTable, VECTOR_COUNT};
use crate::interrupts::pic::{InterruptController, Pic8259};
use crate::registry::Registry;
use crate::task::TaskScheduler;

/// Anything that wants a vector. Receives the interrupted state and returns
/// the state to resume.
pub trait InterruptHandler: Sync {
    fn handle(&self, state: StatePtr) -> StatePtr;
}

impl<F> InterruptHandler for F
where
    F: Fn(StatePtr) -> StatePtr + Sync,
{
    fn handle(&self, state: StatePtr) -> StatePtr {
        self(state)
    }
}

/// Proof of one registration; pass it to [`InterruptManager::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerHandle {
    vector: u8,
    id: u32,
}

impl HandlerHandle {
    pub fn vector(&self) -> u8 {
        self.vector
    }
}

#[derive(Clone, Copy)]
struct Slot<'a> {
    id: u32,
    handler: &'a dyn InterruptHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ManagerState {
    Constructed = 0,
    Activated = 1,
    Deactivated = 2,
}

impl ManagerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ManagerState::Activated,
            2 => ManagerState::Deactivated,
            _ => ManagerState::Constructed,
        }
    }
}

/// The manager the entry stubs route to.
pub static ACTIVE_MANAGER: Registry<InterruptManager<'static>> = Registry::new();

pub struct InterruptManager<'a, C: InterruptController = Pic8259> {
    idt: InterruptDispatchTable,
    handlers: Mutex<[Option<Slot<'a>>; VECTOR_COUNT]>,
    next_id: AtomicU32,
    hardware_offset: u8,
    scheduler: &'a Mutex<TaskScheduler>,
    controller: Mutex<C>,
    ticks: AtomicU64,
    state: AtomicU8,
}

impl<'a, C: InterruptController> InterruptManager<'a, C> {
    /// Builds a gate for every vector, each pointing at its entry stub in
    /// `segments`' code segment. Nothing is loaded until activation.
    pub fn new(
        segments: &SegmentTable,
        entry_points: &[u64; VECTOR_COUNT],
        hardware_offset: u8,
        scheduler: &'a Mutex<TaskScheduler>,
        controller: C,
    ) -> Self {
        Self {
            idt: InterruptDispatchTable::new(segments.code_segment_selector(), entry_points),
            handlers: Mutex::new([None; VECTOR_COUNT]),
            next_id: AtomicU32::new(1),
            hardware_offset,
            scheduler,
            controller: Mutex::new(controller),
            ticks: AtomicU64::new(0),
            state: AtomicU8::new(ManagerState::Constructed as u8),
        }
    }

    /// Installs `handler` for `vector`, replacing any previous one.
    pub fn register_handler(&self, vector: u8, handler: &'a dyn InterruptHandler) -> HandlerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.with_handlers(|handlers| {
            handlers[vector as usize] = Some(Slot { id, handler });
        });
        HandlerHandle { vector, id }
    }

    /// Removes the registration behind `handle`. A later registration on the
    /// same vector is left alone.
    pub fn unregister(&self, handle: HandlerHandle) -> bool {
        self.with_handlers(|handlers| {
            let slot = &mut handlers[handle.vector as usize];
            if slot.is_some_and(|current| current.id == handle.id) {
                *slot = None;
                true
            } else {
                false
            }
        })
    }

    pub fn has_handler(&self, vector: u8) -> bool {
        self.handlers.lock()[vector as usize].is_some()
    }

    pub fn dispatch(&self, vector: u8, state: StatePtr) -> StatePtr {
        let slot = self.handlers.lock()[vector as usize];
        let is_timer = vector == self.timer_vector();

        let mut result = match slot {
            Some(slot) => slot.handler.handle(state),
            None => {
                if !is_timer {
                    println!("UNHANDLED INTERRUPT {:#04x}", vector);
                }
                state
            }
        };

        if is_timer {
            self.ticks.fetch_add(1, Ordering::Relaxed);
            // Held only by boot code, which adds tasks before activation.
            if let Some(mut scheduler) = self.scheduler.try_lock() {
                if scheduler.task_count() > 0 {
                    result = scheduler.schedule(state);
                }
            }
        }

        if let Some(irq) = self.hardware_line(vector) {
            self.controller.lock().end_of_interrupt(irq);
        }

        result
    }

    pub fn timer_vector(&self) -> u8 {
        self.hardware_offset
    }

    pub fn hardware_offset(&self) -> u8 {
        self.hardware_offset
    }

    /// IRQ line behind `vector`, if it is in the remapped window.
    pub fn hardware_line(&self, vector: u8) -> Option<u8> {
        vector
            .checked_sub(self.hardware_offset)
            .filter(|&irq| irq < HARDWARE_INTERRUPT_LINES)
    }

    /// Timer vectors seen so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ManagerState {
        ManagerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn dispatch_table(&self) -> &InterruptDispatchTable {
        &self.idt
    }

    pub fn scheduler(&self) -> &'a Mutex<TaskScheduler> {
        self.scheduler
    }

    fn with_handlers<R>(&self, f: impl FnOnce(&mut [Option<Slot<'a>>; VECTOR_COUNT]) -> R) -> R {
        // Once active, a vector can fire while the slot lock is held.
        if self.state() == ManagerState::Activated {
            interrupts::without_interrupts(|| f(&mut self.handlers.lock()))
        } else {
            f(&mut self.handlers.lock())
        }
    }
}

impl InterruptManager<'static> {
    /// Loads this manager's table, remaps the controller and enables
    /// interrupts. A different active manager is deactivated first.
    pub fn activate(&'static self) {
        interrupts::disable();
        unsafe { self.idt.load() };
        self.controller.lock().initialize();
        self.take_over(&ACTIVE_MANAGER);
        interrupts::enable();
    }

    /// Disables interrupts if this manager is the active one.
    pub fn deactivate(&self) {
        if self.release(&ACTIVE_MANAGER) {
            interrupts::disable();
        }
    }

    /// Claims `registry` and marks the displaced manager, if any, as
    /// deactivated. Returns the displaced manager.
    fn take_over(&'static self, registry: &Registry<Self>) -> Option<&'static Self> {
        let previous = registry
            .install(self)
            .filter(|previous| !core::ptr::eq(*previous, self));
        if let Some(previous) = previous {
            previous.set_state(ManagerState::Deactivated);
        }
        self.set_state(ManagerState::Activated);
        previous
    }

    fn release(&self, registry: &Registry<Self>) -> bool {
        let released = registry.remove(self);
        if released {
            self.set_state(ManagerState::Deactivated);
        }
        released
    }

    fn set_state(&self, state: ManagerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Routes `state` to the active manager. Without one, the state is resumed
/// as is.
pub fn dispatch_active(state: StatePtr) -> StatePtr {
    match ACTIVE_MANAGER.current() {
        Some(manager) => {
            let vector = unsafe { state.as_ref().vector } as u8;
            manager.dispatch(vector, state)
        }
        None => state,
    }
}
