extern crate rwsem;
use rwsem::{RwSemaphore, WriteGuard};
use std::{sync::Arc, thread};

fn main() {
    let counter = Arc::new(RwSemaphore::<u32>::new(0));

    let thread = thread::spawn({
        let counter = counter.clone();
        move || {
            for i in 0..1000 {
                let mut locked = counter.write();
                *locked += 1;

                if i % 100 == 0 {
                    let locked = WriteGuard::downgrade(locked);
                    println!("writer published {}", *locked);
                }
            }
        }
    });

    for _ in 0..1000 {
        println!("read {}", *counter.read());
    }

    thread.join().unwrap();

    assert_eq!(*counter.read(), 1000);
}
