#![no_std]
#![no_main]
#![allow(clippy::empty_loop)]

mod button;
mod led;

use cortex_m_rt::entry;
use rtos_kernel::{
    config::MIN_TASK_STACK_WORDS, kernel_init, kernel_start, task_create, task_yield, Queue,
    QueueMode, SchedulerPolicy,
};

use led::*;

const CORE_CLOCK_HZ: u32 = 16_000_000;
const TICK_PERIOD_MS: u32 = 1;

/// Shared mailbox between `producer_task` and `consumer_task`. Sized past
/// one byte so a short burst of sends never blocks the producer on the
/// consumer's exact cadence.
static MAILBOX: Queue<8> = Queue::new();

static mut PRODUCER_STACK: [u32; MIN_TASK_STACK_WORDS] = [0; MIN_TASK_STACK_WORDS];
static mut CONSUMER_STACK: [u32; MIN_TASK_STACK_WORDS] = [0; MIN_TASK_STACK_WORDS];
static mut HEARTBEAT_STACK: [u32; MIN_TASK_STACK_WORDS] = [0; MIN_TASK_STACK_WORDS];

#[entry]
fn main() -> ! {
    init_led();
    init_user_button();

    kernel_init(SchedulerPolicy::Priority);

    unsafe {
        #[allow(static_mut_refs)]
        task_create(producer_task, &mut PRODUCER_STACK, 50, 20)
            .expect("producer task_create failed");
        #[allow(static_mut_refs)]
        task_create(consumer_task, &mut CONSUMER_STACK, 60, 0)
            .expect("consumer task_create failed");
        #[allow(static_mut_refs)]
        task_create(heartbeat_task, &mut HEARTBEAT_STACK, 10, 250)
            .expect("heartbeat task_create failed");
    }

    kernel_start(TICK_PERIOD_MS, CORE_CLOCK_HZ)
}

/// Sends one byte every 20ms, blocking if the mailbox is ever full.
unsafe extern "C" fn producer_task() -> ! {
    let mut counter: u8 = 0;
    loop {
        MAILBOX.enqueue(&[counter], QueueMode::Blocking);
        counter = counter.wrapping_add(1);
        for _ in 0..2000 {
            task_yield();
        }
    }
}

/// Drains the mailbox as data arrives, toggling an LED per message so the
/// byte-queue handoff is externally observable.
unsafe extern "C" fn consumer_task() -> ! {
    let mut byte = [0u8; 1];
    loop {
        MAILBOX.dequeue(&mut byte, QueueMode::Blocking);
        if byte[0] % 2 == 0 {
            led1_toggle();
        } else {
            led2_toggle();
        }
    }
}

/// Lowest-priority periodic task: blinks a status LED so a human watching
/// the board can tell the scheduler is still alive even when the other two
/// tasks are quiet.
unsafe extern "C" fn heartbeat_task() -> ! {
    loop {
        led3_toggle();
        rtos_kernel::delay_ms(250);
    }
}

#[panic_handler]
fn panic_handler(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
