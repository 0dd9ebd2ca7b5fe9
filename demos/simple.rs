use sharedstack::Scheduler;

fn main() {
    env_logger::init();

    let sched = Scheduler::open();

    let a = sched.new(|s| {
        println!("1. hello from coroutine a");
        s.yield_now();
        println!("3. a is back");
    });

    sched.resume(a);
    println!("2. back in main");
    sched.resume(a);

    println!("4. a is done, status = {:?}", sched.status(a));
}
