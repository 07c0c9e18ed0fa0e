//! Preemptive Task Scheduling
//!
//! Strict round-robin over registration order, driven by the timer vector.
//!
//! # Task Lifecycle
//! 1. `Task::new(segments, entry)` carves a private stack and places a
//!    `CpuState` at its top that looks exactly like an interrupt taken at
//!    `entry`
//! 2. `scheduler.add_task(task)` appends it; tasks are added before the
//!    interrupt manager is activated
//! 3. Every timer tick, `schedule` saves the interrupted state into the
//!    running task and returns the next task's state for the entry stub to
//!    resume
//!
//! Tasks never finish and are never removed. Their slot index is their
//! identity.

use alloc::alloc::{alloc_zeroed, Layout};
use alloc::boxed::Box;
use arrayvec::ArrayVec;
use core::fmt;
use core::mem::size_of;
use core::ptr::{addr_of_mut, NonNull};

use crate::config::{MAX_TASKS, TASK_STACK_SIZE};
use crate::interrupts::frame::{CpuState, StatePtr, RFLAGS_INTERRUPTS_ENABLED};
use crate::interrupts::gdt::SegmentTable;

/// Entry point of a task. It never returns.
pub type TaskEntry = extern "C" fn() -> !;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    OutOfMemory,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::OutOfMemory => f.write_str("no heap memory left for a task stack"),
        }
    }
}

#[repr(C, align(16))]
pub struct Task {
    stack: [u8; TASK_STACK_SIZE],
    state: StatePtr,
}

// The state pointer only ever points into the task's own stack.
unsafe impl Send for Task {}

impl Task {
    pub fn new(segments: &SegmentTable, entry: TaskEntry) -> Result<Box<Task>, TaskError> {
        let layout = Layout::new::<Task>();
        let raw = unsafe { alloc_zeroed(layout) } as *mut Task;
        if raw.is_null() {
            return Err(TaskError::OutOfMemory);
        }

        unsafe {
            let stack = addr_of_mut!((*raw).stack) as *mut u8;
            let top = stack as usize + TASK_STACK_SIZE;
            let state = ((top - size_of::<CpuState>()) & !0xF) as *mut CpuState;

            let code = segments.code_segment_selector() as u64;
            let data = segments.data_segment_selector() as u64;
            state.write(CpuState {
                es: data,
                ds: data,
                rip: entry as usize as u64,
                cs: code,
                rflags: RFLAGS_INTERRUPTS_ENABLED,
                // Entered like a call: return-address slot below the frame.
                rsp: state as u64 - 8,
                ss: data,
                ..CpuState::default()
            });

            addr_of_mut!((*raw).state).write(NonNull::new_unchecked(state));
            Ok(Box::from_raw(raw))
        }
    }

    /// Saved state to resume this task from.
    pub fn state(&self) -> StatePtr {
        self.state
    }

    pub fn stack_range(&self) -> core::ops::Range<usize> {
        let start = self.stack.as_ptr() as usize;
        start..start + TASK_STACK_SIZE
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack_range();
        f.debug_struct("Task")
            .field("stack", &format_args!("{:#x}..{:#x}", stack.start, stack.end))
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub enum SchedulerError {
    /// The table is full; the rejected task is handed back.
    CapacityExceeded(Box<Task>),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::CapacityExceeded(_) => f.write_str("task table is full"),
        }
    }
}

pub struct TaskScheduler<const N: usize = MAX_TASKS> {
    tasks: ArrayVec<Box<Task>, N>,
    current: Option<usize>,
}

impl<const N: usize> TaskScheduler<N> {
    pub const fn new() -> Self {
        Self {
            tasks: ArrayVec::new_const(),
            current: None,
        }
    }

    pub fn add_task(&mut self, task: Box<Task>) -> Result<TaskId, SchedulerError> {
        self.tasks
            .try_push(task)
            .map_err(|err| SchedulerError::CapacityExceeded(err.element()))?;
        Ok(TaskId(self.tasks.len() - 1))
    }

    /// Saves `state` into the running task and returns the next task's state.
    ///
    /// The first call only selects task 0: the state it receives belongs to
    /// the boot stack, not to a task. With no tasks, `state` comes back as is.
    pub fn schedule(&mut self, state: StatePtr) -> StatePtr {
        if self.tasks.is_empty() {
            return state;
        }

        let next = match self.current {
            Some(index) => {
                self.tasks[index].state = state;
                (index + 1) % self.tasks.len()
            }
            None => 0,
        };
        self.current = Some(next);
        self.tasks[next].state
    }

    /// Task picked by the last `schedule`, `None` before the first tick.
    pub fn selected(&self) -> Option<TaskId> {
        self.current.map(TaskId)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0).map(|task| &**task)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for TaskScheduler<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn idle() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn spawn<const N: usize>(scheduler: &mut TaskScheduler<N>, segments: &SegmentTable) -> TaskId {
        let task = Task::new(segments, idle).expect("task allocation");
        scheduler.add_task(task).expect("capacity")
    }

    #[test]
    fn test_initial_state_looks_like_interrupted_entry() {
        let segments = SegmentTable::new();
        let task = Task::new(&segments, idle).unwrap();
        let state = unsafe { *task.state().as_ptr() };

        assert_eq!(state.rip, idle as usize as u64);
        assert_eq!(state.cs, 0x10);
        assert_eq!(state.ss, 0x18);
        assert_eq!(state.ds, 0x18);
        assert_eq!(state.rflags, 0x202);
        assert_eq!(
            (state.rax, state.rbx, state.rcx, state.rdx, state.rsi, state.rdi, state.rbp),
            (0, 0, 0, 0, 0, 0, 0)
        );
        assert_eq!((state.r8, state.r15, state.error_code), (0, 0, 0));

        let address = task.state().as_ptr() as usize;
        let stack = task.stack_range();
        assert_eq!(address % 16, 0);
        assert!(address >= stack.start && address + size_of::<CpuState>() <= stack.end);
        assert_eq!(state.rsp, address as u64 - 8);
    }

    #[test]
    fn test_no_tasks_returns_state_unchanged() {
        let mut scheduler: TaskScheduler = TaskScheduler::new();
        let mut boot = CpuState::default();
        let state = NonNull::from(&mut boot);

        assert_eq!(scheduler.schedule(state), state);
        assert_eq!(scheduler.schedule(state), state);
        assert_eq!(scheduler.selected(), None);
    }

    #[test]
    fn test_round_robin_order() {
        let segments = SegmentTable::new();
        let mut scheduler: TaskScheduler = TaskScheduler::new();
        let ids = [
            spawn(&mut scheduler, &segments),
            spawn(&mut scheduler, &segments),
            spawn(&mut scheduler, &segments),
        ];
        assert_eq!(ids.map(TaskId::index), [0, 1, 2]);

        let mut boot = CpuState::default();
        let mut state = NonNull::from(&mut boot);
        let mut order = [0usize; 4];
        for slot in order.iter_mut() {
            state = scheduler.schedule(state);
            *slot = scheduler.selected().unwrap().index();
        }
        assert_eq!(order, [0, 1, 2, 0]);
    }

    #[test]
    fn test_first_tick_does_not_store_boot_state() {
        let segments = SegmentTable::new();
        let mut scheduler: TaskScheduler = TaskScheduler::new();
        let id = spawn(&mut scheduler, &segments);
        let initial = scheduler.task(id).unwrap().state();

        let mut boot = CpuState::default();
        let next = scheduler.schedule(NonNull::from(&mut boot));
        assert_eq!(next, initial);
        assert_eq!(scheduler.task(id).unwrap().state(), initial);
    }

    #[test]
    fn test_interrupted_state_is_resumed_next_round() {
        let segments = SegmentTable::new();
        let mut scheduler: TaskScheduler = TaskScheduler::new();
        spawn(&mut scheduler, &segments);
        spawn(&mut scheduler, &segments);

        let mut boot = CpuState::default();
        let mut t0_later = CpuState::default();
        scheduler.schedule(NonNull::from(&mut boot));

        let interrupted = NonNull::from(&mut t0_later);
        scheduler.schedule(interrupted);
        let t1 = scheduler.task(TaskId(1)).unwrap().state();
        assert_eq!(scheduler.schedule(t1), interrupted);
    }

    #[test]
    fn test_capacity_exceeded_hands_task_back() {
        let segments = SegmentTable::new();
        let mut scheduler: TaskScheduler<2> = TaskScheduler::new();
        spawn(&mut scheduler, &segments);
        spawn(&mut scheduler, &segments);

        let extra = Task::new(&segments, idle).unwrap();
        let extra_state = extra.state();
        match scheduler.add_task(extra) {
            Err(SchedulerError::CapacityExceeded(task)) => assert_eq!(task.state(), extra_state),
            Ok(id) => panic!("added past capacity as {:?}", id),
        }
        assert_eq!(scheduler.task_count(), 2);
        assert_eq!(scheduler.capacity(), 2);
    }
}
