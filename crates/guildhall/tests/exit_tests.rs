//! Exit protocol tests

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use guildhall::*;
use pretty_assertions::assert_eq;

fn main_ctx() -> ExecContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    GuildRegistry::bootstrap(RuntimeConfig::default()).expect("bootstrap failed")
}

fn wait_retired(ctx: &ExecContext, guild: &Guild) {
    while !ctx.registry().is_retired(guild.id().get()) {
        thread::yield_now();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Normal completion
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_join_returns_result() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |_| Ok(Value::Int(42))).unwrap();

    assert_eq!(guild.join(&main).unwrap(), Value::Int(42));
    assert_eq!(guild.status(), GuildStatus::ExitedOk);
}

#[test]
fn test_result_is_moved_to_joiner() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        let list = ctx.alloc_array(vec![ctx.alloc_str("item")]);
        Ok(list)
    })
    .unwrap();

    let list = guild.join(&main).unwrap();
    assert_eq!(belonging(&list), main.current_id().get());
    let items = main.items(&list).unwrap();
    assert_eq!(belonging(&items[0]), main.current_id().get());
    main.push(&list, Value::Int(2)).unwrap();
}

#[test]
fn test_exited_guild_retires_before_join() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| Ok(ctx.alloc_str("late")))
        .unwrap();
    wait_retired(&main, &guild);

    // Gone from the live table, but its id is still a valid owner
    let id = guild.id().get();
    assert!(!main.registry().is_live(id));
    assert!(main.registry().is_registered(id));
    assert!(!guild.is_delivered());

    let value = guild.join(&main).unwrap();
    assert_eq!(main.string(&value).unwrap(), "late");
    assert!(guild.is_delivered());
}

#[test]
fn test_unjoined_exited_guild_frees_its_slot() {
    let main = GuildRegistry::bootstrap(RuntimeConfig::with_max_live_guilds(2)).unwrap();
    let first = create_guild(&main, SpawnOptions::new(), vec![], |_| Ok(Value::Int(1))).unwrap();
    wait_retired(&main, &first);
    assert_eq!(first.status(), GuildStatus::ExitedOk);

    let second = create_guild(&main, SpawnOptions::new(), vec![], |_| Ok(Value::Int(2))).unwrap();
    assert_eq!(second.join(&main).unwrap(), Value::Int(2));
    assert_eq!(first.join(&main).unwrap(), Value::Int(1));
}

#[test]
fn test_exited_guild_loses_heap_access() {
    let main = main_ctx();
    let (tx, rx) = mpsc::channel();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], move |ctx| {
        let list = ctx.alloc_array(vec![Value::Int(1)]);
        atexit(ctx, list.clone())?;

        let handle = ctx.alloc_handle("File", 9);
        let closed = |r: Result<()>| matches!(r, Err(GuildError::AlreadyTerminated { .. }));
        let pushed = closed(ctx.push(&list, Value::Int(99)));
        let pushed_handle = closed(ctx.push(&list, handle));
        let read = ctx.items(&list).is_err();
        let _ = tx.send((pushed, pushed_handle, read));
        Ok(Value::Nil)
    })
    .unwrap();

    assert_eq!(rx.recv().unwrap(), (true, true, true));
    let list = guild.join(&main).unwrap();
    assert_eq!(belonging(&list), main.current_id().get());
    assert_eq!(main.items(&list).unwrap(), vec![Value::Int(1)]);

    let err = guild.join(&main).unwrap_err();
    assert!(matches!(err, GuildError::Closed { .. }));
}

#[test]
fn test_second_join_is_closed() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |_| Ok(Value::Nil)).unwrap();
    guild.join(&main).unwrap();

    let err = guild.join(&main).unwrap_err();
    assert!(matches!(err, GuildError::Closed { .. }));
}

#[test]
fn test_self_join_is_rejected() {
    let main = main_ctx();
    let err = main.guild().join(&main).unwrap_err();
    assert!(matches!(err, GuildError::SelfJoin { id: 1 }));
}

#[test]
fn test_guild_handle_as_result() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new().name("worker"), vec![], |ctx| {
        Ok(Value::Guild(ctx.guild().clone()))
    })
    .unwrap();

    let reply = guild.join(&main).unwrap();
    assert_eq!(reply, Value::Guild(guild.clone()));
    assert_eq!(reply.as_guild().and_then(|g| g.name()), Some("worker"));
}

// ═══════════════════════════════════════════════════════════════════════
// Failure
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_raised_payload_reaches_joiner() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        let error = ctx.alloc_record(
            Record::new("RuntimeError").with_field("message", ctx.alloc_str("ok")),
        );
        Err(Failure::Raised(error))
    })
    .unwrap();

    let err = guild.join(&main).unwrap_err();
    assert_eq!(guild.status(), GuildStatus::ExitedErr);
    let GuildError::Remote { id, payload } = err else {
        panic!("expected remote error, got {:?}", err);
    };
    assert_eq!(id, guild.id().get());
    assert_eq!(belonging(&payload), main.current_id().get());
    let message = main.field(&payload, "message").unwrap().unwrap();
    assert_eq!(main.string(&message).unwrap(), "ok");
}

#[test]
fn test_guild_error_becomes_failure() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        let s = ctx.alloc_str("abc");
        ctx.freeze(&s)?;
        ctx.append_str(&s, "d")?;
        Ok(s)
    })
    .unwrap();

    let Err(GuildError::Remote { payload, .. }) = guild.join(&main) else {
        panic!("expected remote error");
    };
    assert!(is_shareable(&payload));
    assert_eq!(main.string(&payload).unwrap(), "can not modify frozen String");
}

#[test]
fn test_panic_becomes_failure() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |_| -> BodyResult {
        panic!("boom");
    })
    .unwrap();

    let Err(GuildError::Remote { payload, .. }) = guild.join(&main) else {
        panic!("expected remote error");
    };
    assert_eq!(main.string(&payload).unwrap(), "boom");
    assert_eq!(guild.status(), GuildStatus::ExitedErr);
}

#[test]
fn test_untransferable_result_becomes_failure() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        Ok(ctx.alloc_handle("Thread", 3))
    })
    .unwrap();

    let Err(GuildError::Remote { payload, .. }) = guild.join(&main) else {
        panic!("expected remote error");
    };
    assert!(main.string(&payload).unwrap().contains("native handles"));
    assert_eq!(guild.status(), GuildStatus::ExitedErr);
}

// ═══════════════════════════════════════════════════════════════════════
// Terminal states
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_terminal_state_entered_once() {
    let main = main_ctx();
    let (tx, rx) = mpsc::channel();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], move |ctx| {
        atexit(ctx, Value::Int(1))?;
        let again_ok = atexit(ctx, Value::Int(2));
        let again_err = atexit_exception(ctx, Value::Nil);
        let _ = tx.send((again_ok.is_err(), again_err.is_err()));
        Ok(Value::Int(3))
    })
    .unwrap();

    assert_eq!(rx.recv().unwrap(), (true, true));
    assert_eq!(guild.join(&main).unwrap(), Value::Int(1));
    assert_eq!(guild.status(), GuildStatus::ExitedOk);
}

#[test]
fn test_atexit_rejects_untransferable_result_and_stays_running() {
    let main = main_ctx();
    let (tx, rx) = mpsc::channel();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], move |ctx| {
        let handle = ctx.alloc_handle("File", 5);
        let rejected = matches!(
            atexit(ctx, handle),
            Err(GuildError::NotTransferable { .. })
        );
        let _ = tx.send((rejected, ctx.guild().status()));
        Ok(Value::Nil)
    })
    .unwrap();

    assert_eq!(rx.recv().unwrap(), (true, GuildStatus::Running));
    assert_eq!(guild.join(&main).unwrap(), Value::Nil);
}

// ═══════════════════════════════════════════════════════════════════════
// Select
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_select_collects_every_guild() {
    let main = main_ctx();
    let mut pending: Vec<Arc<Guild>> = (0..30)
        .map(|i| {
            create_guild(&main, SpawnOptions::new().params(["i"]), vec![Value::Int(i)], |ctx| {
                let i = ctx.env().get("i").cloned().unwrap_or(Value::Nil);
                Ok(ctx.alloc_array(vec![i]))
            })
            .unwrap()
        })
        .collect();

    let mut seen = Vec::new();
    while !pending.is_empty() {
        let (done, value) = select(&main, &pending).unwrap();
        assert_eq!(belonging(&value), main.current_id().get());
        seen.push(main.items(&value).unwrap()[0].as_int().unwrap());
        pending.retain(|g| !Arc::ptr_eq(g, &done));
    }
    seen.sort();
    assert_eq!(seen, (0..30).collect::<Vec<i64>>());
}

#[test]
fn test_select_skips_delivered_guilds() {
    let main = main_ctx();
    let done = create_guild(&main, SpawnOptions::new(), vec![], |_| Ok(Value::Int(1))).unwrap();
    done.join(&main).unwrap();

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let late = create_guild(&main, SpawnOptions::new(), vec![], move |_| {
        let _ = release_rx.recv();
        Ok(Value::Int(2))
    })
    .unwrap();
    release_tx.send(()).unwrap();

    let (winner, value) = select(&main, &[done.clone(), late.clone()]).unwrap();
    assert!(Arc::ptr_eq(&winner, &late));
    assert_eq!(value, Value::Int(2));

    let err = select(&main, &[done, late]).unwrap_err();
    assert!(matches!(err, GuildError::Closed { .. }));
}

#[test]
fn test_select_reports_remote_failure() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        Err(Failure::Raised(ctx.alloc_str("select me")))
    })
    .unwrap();

    let Err(GuildError::Remote { id, payload }) = select(&main, &[guild.clone()]) else {
        panic!("expected remote error");
    };
    assert_eq!(id, guild.id().get());
    assert_eq!(belonging(&payload), main.current_id().get());
    assert_eq!(main.string(&payload).unwrap(), "select me");
}

#[test]
fn test_select_argument_errors() {
    let main = main_ctx();
    assert!(matches!(select(&main, &[]), Err(GuildError::EmptySelect)));
    assert!(matches!(
        select(&main, &[main.guild().clone()]),
        Err(GuildError::SelfJoin { id: 1 })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Shutdown
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_shutdown_waits_for_guilds() {
    let main = main_ctx();
    let guilds: Vec<_> = (0..3)
        .map(|i| {
            create_guild(&main, SpawnOptions::new(), vec![Value::Int(i)], |_| {
                thread::sleep(Duration::from_millis(20));
                Ok(Value::Nil)
            })
            .unwrap()
        })
        .collect();

    main.registry().shutdown(&main).unwrap();

    for guild in &guilds {
        assert!(guild.status().is_terminal());
    }
    assert!(main.registry().is_shut_down());
    assert_eq!(main.registry().live_count(), 0);

    let err = create_guild(&main, SpawnOptions::new(), vec![], |_| Ok(Value::Nil)).unwrap_err();
    assert!(matches!(err, GuildError::ShutDown));
}

#[test]
fn test_shutdown_requires_main_guild() {
    let main = main_ctx();
    let guild = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        let refused = matches!(
            ctx.registry().shutdown(ctx),
            Err(GuildError::NotMainGuild(_))
        );
        Ok(Value::Bool(refused))
    })
    .unwrap();

    assert_eq!(guild.join(&main).unwrap(), Value::Bool(true));
}
