//! Cooperative/preemptive round-robin scheduler (`spec.md` §4.F).
//!
//! Grounded on `kernel/scheduler.c`'s `scheduler_tick`/`scheduler_yield`: the timer IRQ ticks the
//! current task's quantum down and only switches when it hits zero; a task can also give up the
//! rest of its quantum early via `yield_now`. Both paths funnel through the same `schedule`,
//! which is also what `interrupts::dispatch` calls for the yield syscall — there is exactly one
//! place that picks the next task.

pub mod semaphore;
pub mod task;
pub mod tasklet;

use core::arch::asm;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::config;
use crate::interrupts;
use crate::interrupts::idt::IsrStack;
use crate::interrupts::pic;
use task::{Task, TaskId, TaskState};

struct Scheduler {
    tasks: alloc::vec::Vec<Task>,
    current: usize,
}

static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// Nesting depth of `disable_preemption`/`enable_preemption`; the timer IRQ only switches tasks
/// while this is zero. `memory::heap`'s chunk source holds it across a frame allocation + map, so
/// a page fault taken while servicing an allocation can't itself trigger a switch mid-allocation.
static PREEMPT_DISABLE: AtomicU32 = AtomicU32::new(0);

/// Syscall vector's `eax` value requesting a voluntary yield; the only syscall this core defines.
pub const SYSCALL_YIELD: u32 = 0;

pub fn disable_preemption() {
    PREEMPT_DISABLE.fetch_add(1, Ordering::SeqCst);
}

pub fn enable_preemption() {
    PREEMPT_DISABLE.fetch_sub(1, Ordering::SeqCst);
}

fn preemption_disabled() -> bool {
    PREEMPT_DISABLE.load(Ordering::SeqCst) != 0
}

/// Bring up the scheduler: the caller's own execution context becomes task 0 (`root_entry` is
/// never actually invoked through it — it only backstops the type, matching `Task::spawn`'s
/// shape — since task 0's frame is never switched away from until the first tick), claim the
/// timer IRQ, and unmask it. Interrupts must still be disabled by the caller at this point.
pub fn init(root_entry: extern "C" fn() -> !) {
    let root = Task::spawn(root_entry, 0x1000);
    *SCHEDULER.lock() = Some(Scheduler { tasks: alloc::vec![root], current: 0 });

    interrupts::set_irq_handler(config::IRQ_TIMER, timer_irq);
    pic::unmask(config::IRQ_TIMER);
}

/// Spawn a new task with its own stack, initially `Stopped` (eligible to run, not yet chosen).
pub fn spawn(entry: extern "C" fn() -> !, stack_size: usize) -> TaskId {
    let mut guard = SCHEDULER.lock();
    let scheduler = guard.as_mut().expect("scheduler not initialized");
    let mut task = Task::spawn(entry, stack_size);
    task.state = TaskState::Stopped;
    let id = TaskId(scheduler.tasks.len());
    scheduler.tasks.push(task);
    id
}

pub fn current_id() -> TaskId {
    let guard = SCHEDULER.lock();
    TaskId(guard.as_ref().expect("scheduler not initialized").current)
}

pub fn set_state(id: TaskId, state: TaskState) {
    let mut guard = SCHEDULER.lock();
    let scheduler = guard.as_mut().expect("scheduler not initialized");
    scheduler.tasks[id.0].state = state;
}

/// Voluntarily give up the rest of the current quantum.
pub fn yield_now() {
    unsafe {
        asm!(
            "int {v}",
            v = const config::SYSCALL_VECTOR,
            in("eax") SYSCALL_YIELD,
            options(nostack),
        );
    }
}

/// Pick the next eligible task in round-robin order and return the `esp` the common stub should
/// resume execution on. Called both from the yield syscall and from `timer_irq` once a quantum
/// runs out; a task with no eligible peer (every other task `Waiting`, or no other task at all)
/// keeps running.
pub fn schedule(stack: &mut IsrStack) -> u32 {
    let mut guard = SCHEDULER.lock();
    let scheduler = match guard.as_mut() {
        Some(s) => s,
        None => return stack as *mut IsrStack as u32,
    };

    let frame_addr = stack as *mut IsrStack as u32;
    let current = scheduler.current;
    scheduler.tasks[current].set_saved_esp(frame_addr);
    if scheduler.tasks[current].state == TaskState::Running {
        scheduler.tasks[current].state = TaskState::Stopped;
    }

    let n = scheduler.tasks.len();
    let mut next = current;
    for _ in 0..n {
        next = (next + 1) % n;
        if scheduler.tasks[next].state != TaskState::Waiting {
            break;
        }
    }

    scheduler.tasks[next].state = TaskState::Running;
    scheduler.tasks[next].ticks = config::SCHEDULER_QUANTUM;
    scheduler.current = next;
    scheduler.tasks[next].saved_esp()
}

/// Timer IRQ handler: ticks the PIT, decrements the current task's quantum, and only calls
/// `schedule` once it's exhausted — and never while preemption is disabled. Always EOIs before
/// possibly switching away, since the outgoing task must not re-enter with IRQ1 still pending.
fn timer_irq(stack: &mut IsrStack) -> u32 {
    crate::interrupts::pit::tick();

    let should_switch = {
        let mut guard = SCHEDULER.lock();
        match guard.as_mut() {
            Some(scheduler) if !preemption_disabled() => {
                let current = scheduler.current;
                scheduler.tasks[current].ticks = scheduler.tasks[current].ticks.saturating_sub(1);
                scheduler.tasks[current].ticks == 0
            }
            _ => false,
        }
    };

    pic::eoi(config::IRQ_TIMER);

    if should_switch {
        schedule(stack)
    } else {
        stack as *mut IsrStack as u32
    }
}
