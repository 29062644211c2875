use pretty_assertions::assert_eq;
use quill_vm::{
    Channel, GlobalMemory, Program, ProgramBuilder, VMError, VMFuture, VMIo, Value, VM,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn sum_of_globals() -> Arc<Program> {
    let mut builder = ProgramBuilder::named("sum");
    builder
        .add_get_global_instruction("x")
        .add_get_global_instruction("y")
        .add_add_instruction();
    builder.build()
}

/// Reads one value from the channel in global `c`.
fn reader() -> Arc<Program> {
    let mut builder = ProgramBuilder::named("reader");
    builder
        .asynchronous()
        .define_global("c", 0)
        .add_get_global_instruction("c")
        .add_receive_instruction();
    builder.build()
}

#[test]
fn globals_by_name() {
    let vm = VM::new().unwrap();
    let program = sum_of_globals();
    let globals = GlobalMemory::with_bindings(&program, [("x", 2), ("y", 3)]).unwrap();
    let result = vm.execute(program, globals, VMIo::default(), vec![]);
    assert_eq!(result, Ok(5.into()));
}

#[test]
fn execute_and_submit_agree() {
    let vm = VM::new().unwrap();
    let program = sum_of_globals();
    let bindings = [("x", Value::from("a")), ("y", Value::from("b"))];

    let globals = GlobalMemory::with_bindings(&program, bindings.clone()).unwrap();
    let executed = vm.execute(program.clone(), globals, VMIo::default(), vec![]);

    let globals = GlobalMemory::with_bindings(&program, bindings).unwrap();
    let submitted = vm
        .submit(program, globals, VMIo::default(), vec![])
        .unwrap()
        .get(None);
    assert_eq!(executed, submitted);
    assert_eq!(executed, Ok("ab".into()));
}

#[test]
fn parked_reader_receives_write() {
    let vm = VM::new().unwrap();
    let channel = Channel::new(Some(vm.scheduler().clone()));
    let globals = GlobalMemory::new(1);
    globals.set(0, Value::object(channel.clone()));

    let result = vm
        .submit(reader(), globals.clone(), VMIo::default(), vec![])
        .unwrap();
    wait_until("reader to park", || channel.waiting_readers() == 1);

    let mut writer = ProgramBuilder::named("writer");
    writer
        .asynchronous()
        .define_global("c", 0)
        .add_get_global_instruction("c")
        .add_load_instruction(7.into())
        .add_send_instruction();
    let written = vm.submit(writer.build(), globals, VMIo::default(), vec![]);
    assert_eq!(written.unwrap().get(None), Ok(Value::None));

    assert_eq!(result.get(Some(Duration::from_secs(5))), Ok(7.into()));
}

#[test]
fn closing_releases_every_reader() {
    let vm = VM::new().unwrap();
    let channel = Channel::new(Some(vm.scheduler().clone()));
    let globals = GlobalMemory::new(1);
    globals.set(0, Value::object(channel.clone()));

    let results: Vec<_> = (0..4)
        .map(|_| {
            vm.submit(reader(), globals.clone(), VMIo::default(), vec![])
                .unwrap()
        })
        .collect();
    wait_until("readers to park", || channel.waiting_readers() == 4);
    assert_eq!(channel.close(), 4);

    for r in results {
        assert_eq!(r.get(Some(Duration::from_secs(5))), Ok(Value::EndOfStream));
    }
}

#[test]
fn many_readers_one_channel() {
    let vm = VM::new().unwrap();
    let channel = Channel::new(Some(vm.scheduler().clone()));
    let globals = GlobalMemory::new(1);
    globals.set(0, Value::object(channel.clone()));

    let results: Vec<_> = (0..64)
        .map(|_| {
            vm.submit(reader(), globals.clone(), VMIo::default(), vec![])
                .unwrap()
        })
        .collect();
    let writer = {
        let channel = channel.clone();
        thread::spawn(move || {
            for n in 1..=64 {
                channel.write(n.into()).unwrap();
            }
        })
    };
    writer.join().unwrap();

    let mut received: Vec<i64> = results
        .iter()
        .map(|r| match r.get(Some(Duration::from_secs(5))) {
            Ok(Value::Number(n)) => n.to_int(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    received.sort();
    assert_eq!(received, (1..=64).collect::<Vec<_>>());
}

#[test]
fn every_task_parked_on_a_future_resumes_exactly_once() {
    let vm = VM::new().unwrap();
    let gate = VMFuture::pending();
    let mut builder = ProgramBuilder::named("gated");
    builder
        .asynchronous()
        .add_load_instruction(Value::object(gate.clone()))
        .add_wait_instruction()
        .add_load_instruction(1.into())
        .add_add_instruction();
    let program = builder.build();

    let tasks = 16;
    let results: Vec<_> = (0..tasks)
        .map(|_| {
            vm.submit(program.clone(), GlobalMemory::default(), VMIo::default(), vec![])
                .unwrap()
        })
        .collect();
    let scheduler = vm.scheduler();
    wait_until("tasks to park", || scheduler.stats().suspended == tasks);
    assert_eq!(scheduler.parked_futures(), 1);

    scheduler.complete(&gate, Ok(41.into())).unwrap();
    for r in &results {
        assert_eq!(r.get(Some(Duration::from_secs(5))), Ok(42.into()));
    }
    let stats = scheduler.stats();
    assert_eq!(stats.resumed, tasks);
    assert_eq!(stats.completed, tasks);
    assert_eq!(scheduler.parked_futures(), 0);
}

#[test]
fn concurrent_callers_share_one_cached_computation() {
    let vm = VM::new().unwrap();

    let mut double = ProgramBuilder::named("double");
    double
        .asynchronous()
        .deterministic()
        .parameter("n")
        .add_get_local_instruction("n")
        .add_load_instruction(2.into())
        .add_mul_instruction();
    let double = double.build();

    let mut parent = ProgramBuilder::named("parent");
    parent
        .asynchronous()
        .deterministic()
        .add_load_instruction(5.into())
        .add_call_instruction(double.clone(), 1)
        .add_load_instruction(5.into())
        .add_call_instruction(double, 1)
        .add_await_instruction(2)
        .add_add_instruction();

    assert_eq!(vm.eval(parent.build()), Ok(20.into()));
    // the parent and a single run of double
    assert_eq!(vm.scheduler().stats().submitted, 2);
}

#[test]
fn synchronous_helper_waits_on_asynchronous_child() {
    let vm = VM::new().unwrap();
    let mut child = ProgramBuilder::named("child");
    child.asynchronous().add_load_instruction(1.into());

    let mut helper = ProgramBuilder::named("helper");
    helper
        .add_call_instruction(child.build(), 0)
        .add_load_instruction(1.into())
        .add_add_instruction();
    let helper = helper.build();

    let mut main = ProgramBuilder::named("main");
    main.asynchronous()
        .add_call_instruction(helper.clone(), 0)
        .add_load_instruction(10.into())
        .add_mul_instruction();
    let main = main.build();

    assert_eq!(vm.eval(helper), Ok(2.into()));
    for _ in 0..50 {
        assert_eq!(vm.eval(main.clone()), Ok(20.into()));
    }
}

#[test]
fn synchronous_helper_waits_on_channel() {
    let vm = VM::new().unwrap();
    let channel = Channel::new(Some(vm.scheduler().clone()));
    let globals = GlobalMemory::new(1);
    globals.set(0, Value::object(channel.clone()));

    let mut helper = ProgramBuilder::named("helper");
    helper
        .define_global("c", 0)
        .add_get_global_instruction("c")
        .add_receive_instruction();
    let mut main = ProgramBuilder::named("main");
    main.asynchronous().add_call_instruction(helper.build(), 0);

    let result = vm
        .submit(main.build(), globals, VMIo::default(), vec![])
        .unwrap();
    wait_until("helper to park", || channel.waiting_readers() == 1);
    channel.write("late".into()).unwrap();
    assert_eq!(result.get(Some(Duration::from_secs(5))), Ok("late".into()));
}

#[test]
fn settling_a_host_future_directly_resumes_parked_tasks() {
    let vm = VM::new().unwrap();
    let gate = VMFuture::pending();
    let mut builder = ProgramBuilder::named("gated");
    builder
        .asynchronous()
        .add_load_instruction(Value::object(gate.clone()))
        .add_wait_instruction()
        .add_await_instruction(1);
    let result = vm
        .submit(builder.build(), GlobalMemory::default(), VMIo::default(), vec![])
        .unwrap();
    wait_until("task to park", || vm.scheduler().parked_futures() == 1);

    gate.set_result(5.into()).unwrap();
    assert_eq!(result.get(Some(Duration::from_secs(5))), Ok(5.into()));
    assert_eq!(vm.scheduler().parked_futures(), 0);
}

#[test]
fn settling_while_tasks_park_loses_no_wakeup() {
    let vm = VM::new().unwrap();
    let tasks = 8;
    for round in 0..100 {
        let gate = VMFuture::pending();
        let mut builder = ProgramBuilder::named("gated");
        builder
            .asynchronous()
            .add_load_instruction(Value::object(gate.clone()))
            .add_wait_instruction()
            .add_load_instruction(1.into())
            .add_add_instruction();
        let program = builder.build();

        let settler = {
            let gate = gate.clone();
            let scheduler = vm.scheduler().clone();
            thread::spawn(move || {
                thread::yield_now();
                if round % 2 == 0 {
                    gate.set_result(41.into()).unwrap();
                } else {
                    scheduler.complete(&gate, Ok(41.into())).unwrap();
                }
            })
        };
        let results: Vec<_> = (0..tasks)
            .map(|_| {
                vm.submit(program.clone(), GlobalMemory::default(), VMIo::default(), vec![])
                    .unwrap()
            })
            .collect();
        settler.join().unwrap();
        for r in &results {
            assert_eq!(r.get(Some(Duration::from_secs(5))), Ok(42.into()), "round {round}");
        }
    }
    let stats = vm.scheduler().stats();
    assert_eq!(stats.submitted, 100 * tasks);
    assert_eq!(stats.completed, stats.submitted);
    assert_eq!(stats.resumed, stats.suspended);
    assert_eq!(vm.scheduler().parked_futures(), 0);
}

#[test]
fn failure_trail_crosses_tasks() {
    let vm = VM::new().unwrap();
    let mut inner = ProgramBuilder::named("inner");
    inner
        .asynchronous()
        .source("inner.q")
        .at(4, 2)
        .add_load_instruction(1.into())
        .add_load_instruction(0.into())
        .add_rem_instruction();
    let mut outer = ProgramBuilder::named("outer");
    outer
        .asynchronous()
        .add_call_instruction(inner.build(), 0)
        .add_load_instruction(1.into())
        .add_add_instruction();

    let err = vm.eval(outer.build()).unwrap_err();
    assert!(matches!(err.root_cause(), VMError::UnsupportedOperation(_)));
    let programs: Vec<_> = err.trail().iter().map(|f| f.program.as_str()).collect();
    assert_eq!(programs, vec!["inner", "outer"]);
    assert_eq!(err.trail()[0].to_string(), "at inner (inner.q:4:2) [ip 2]");
}

#[test]
fn abort_is_reported_as_abort() {
    let vm = VM::new().unwrap();
    let mut builder = ProgramBuilder::named("quits");
    builder.asynchronous().add_abort_instruction();
    let err = vm.eval(builder.build()).unwrap_err();
    assert!(err.is_abort());
}

#[test]
fn synchronous_root_runs_asynchronous_children_inline() {
    let vm = VM::new().unwrap();
    let mut child = ProgramBuilder::named("child");
    child
        .asynchronous()
        .parameter("n")
        .add_get_local_instruction("n")
        .add_neg_instruction();
    let mut main = ProgramBuilder::named("main");
    main.add_load_instruction(3.into())
        .add_call_instruction(child.build(), 1);

    assert_eq!(vm.eval(main.build()), Ok((-3).into()));
    assert_eq!(vm.scheduler().stats().submitted, 0);
}

#[test]
fn print_and_read_line() {
    let vm = VM::new().unwrap();
    let mut builder = ProgramBuilder::named("echo");
    builder
        .add_read_line_instruction()
        .add_print_instruction()
        .add_read_line_instruction();
    let (io, out, _) = VMIo::captured("hello\n");
    let program = builder.build();
    let globals = GlobalMemory::for_program(&program);
    let result = vm.execute(program, globals, io, vec![]);
    assert_eq!(result, Ok(Value::EndOfStream));
    assert_eq!(out.contents(), "hello\n");
}
