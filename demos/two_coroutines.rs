use sharedstack::Scheduler;

fn main() {
    env_logger::init();

    let sched = Scheduler::open();

    let a = sched.new(|s| {
        println!("a: 1");
        s.yield_now();
        println!("a: 2");
    });
    let b = sched.new(|s| {
        println!("b: 10");
        s.yield_now();
        println!("b: 20");
    });

    sched.resume(a);
    sched.resume(b);
    sched.resume(a);
    sched.resume(b);

    println!("done: {} coroutines left", sched.len());
}
