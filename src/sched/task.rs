//! Task control blocks and saved CPU state.
//!
//! Grounded on `kernel/scheduler.c`'s `cpu_state_t`/`task_t`. A task's "saved state" here is not
//! a copy of its registers but the address of its own `IsrStack` frame, sitting at a fixed spot
//! on that task's dedicated kernel stack: switching tasks means loading that address into `esp`
//! before `common_stub`'s pop/`iretd` sequence runs, not copying words around (`spec.md` §9's
//! "polymorphic interfaces, not copies" design note applies here too — a task switch is a
//! pointer swap, the same shape as the paging temp-window cursor).

use alloc::boxed::Box;

use crate::interrupts::idt::IsrStack;

/// Opaque handle to a task, stable for its lifetime in the scheduler's task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Stopped,
    Waiting,
}

/// One task's kernel stack, boxed so the scheduler can hand out stable addresses into it.
pub struct Task {
    pub state: TaskState,
    /// Ticks remaining in the current quantum; reloaded to `SCHEDULER_QUANTUM` on switch-in.
    pub ticks: u32,
    /// Address of this task's saved `IsrStack` frame, valid whenever `state != Running` for the
    /// currently executing task (the running task's frame lives wherever the live interrupt
    /// stack currently is, not here).
    saved_esp: u32,
    _stack: Box<[u8]>,
}

impl Task {
    /// Build a new task with a fresh kernel stack, never yet run: `entry` will be the first
    /// thing that executes when the scheduler switches it in. Matches `scheduler_spawn_task`.
    pub fn spawn(entry: extern "C" fn() -> !, stack_size: usize) -> Self {
        let mut stack = alloc::vec![0u8; stack_size].into_boxed_slice();

        let frame_addr = (stack.as_mut_ptr() as usize + stack_size)
            - core::mem::size_of::<IsrStack>();
        debug_assert!(frame_addr % 4 == 0, "task stack must be word-aligned");

        unsafe {
            let frame = frame_addr as *mut IsrStack;
            core::ptr::write_bytes(frame, 0, 1);
            (*frame).eip = entry as u32;
            (*frame).cs = crate::gdt::KERNEL_CODE_SELECTOR as u32;
            (*frame).eflags = crate::x86::eflags::IF;
        }

        Task {
            state: TaskState::Running,
            ticks: crate::config::SCHEDULER_QUANTUM,
            saved_esp: frame_addr as u32,
            _stack: stack,
        }
    }

    pub fn saved_esp(&self) -> u32 {
        self.saved_esp
    }

    pub fn set_saved_esp(&mut self, esp: u32) {
        self.saved_esp = esp;
    }
}
