//! End-to-end ownership scenarios across guilds

use std::sync::mpsc;

use guildhall::*;
use pretty_assertions::assert_eq;

fn main_ctx() -> ExecContext {
    main_guild_bootstrap().expect("bootstrap failed")
}

#[test]
fn test_spawned_guild_owns_moved_record() {
    let main = main_ctx();
    assert_eq!(main.current_id().get(), 1);

    let x = main.alloc_record(Record::new("Point").with_field("x", Value::Int(1)));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let g1 = create_guild(&main, SpawnOptions::new().params(["x"]), vec![x.clone()], move |ctx| {
        let _ = release_rx.recv();
        let x = ctx.env().get("x").cloned().unwrap_or(Value::Nil);
        ctx.set_field(&x, "x", Value::Int(2))?;
        Ok(Value::Nil)
    })
    .unwrap();

    assert_eq!(g1.id().get(), 2);
    assert_eq!(belonging(&x), 2);
    let violation = verify_belonging(&x, main.current_id()).unwrap_err();
    assert_eq!(violation.stored_owner, 2);

    release_tx.send(()).unwrap();
    assert_eq!(g1.join(&main).unwrap(), Value::Nil);

    // The moved record stays with the exited guild, whose id is reserved
    let registry = main.registry();
    assert_eq!(belonging(&x), 2);
    assert!(!registry.is_live(2));
    assert!(registry.is_registered(2));
    assert_eq!(registry.retired_status(2), Some(GuildStatus::ExitedOk));
}

#[test]
fn test_deeply_frozen_result_is_shared() -> anyhow::Result<()> {
    let main = main_ctx();
    let g2 = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        let r = ctx.alloc_array(vec![ctx.alloc_str("a"), ctx.alloc_str("b"), Value::Int(3)]);
        make_shareable(ctx, &r)?;
        Ok(r)
    })?;

    let r = g2.join(&main)?;
    assert_eq!(belonging(&r), 0);

    // Any guild may read it
    assert_eq!(main.items(&r)?.len(), 3);
    let reader = create_guild(&main, SpawnOptions::new(), vec![r.clone()], |ctx| {
        let r = ctx.env().params()[0].clone();
        let first = ctx.items(&r)?[0].clone();
        Ok(Value::Bool(ctx.string(&first)? == "a"))
    })?;
    assert_eq!(reader.join(&main)?, Value::Bool(true));
    Ok(())
}

#[test]
fn test_spawn_with_third_party_object_fails() {
    let main = main_ctx();
    let third = main.registry().register(Some("third".into())).unwrap();
    let theirs = main.alloc_str("theirs");
    tag(theirs.as_object().unwrap(), third.id());

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let err = create_guild(&main, SpawnOptions::new(), vec![theirs.clone()], move |_| {
        let _ = started_tx.send(());
        Ok(Value::Nil)
    })
    .unwrap_err();

    assert!(matches!(
        err,
        GuildError::NotTransferable {
            blocker: TransferBlocker::ForeignOwner { owner, sender: 1 },
            ..
        } if owner == third.id().get()
    ));
    // The body was dropped without running and nothing was re-tagged
    assert!(started_rx.recv().is_err());
    assert_eq!(belonging(&theirs), third.id().get());
    assert_eq!(main.registry().live_count(), 2);
}

#[test]
fn test_failing_guild_is_observed_as_failure() {
    let main = main_ctx();
    let g = create_guild(&main, SpawnOptions::new(), vec![], |ctx| {
        let _partial = ctx.alloc_str("work in progress");
        Err(Failure::Raised(ctx.alloc_str("mid-execution failure")))
    })
    .unwrap();

    let outcome = g.join(&main);
    assert_eq!(g.status(), GuildStatus::ExitedErr);
    match outcome {
        Err(GuildError::Remote { id, payload }) => {
            assert_eq!(id, g.id().get());
            assert_eq!(main.string(&payload).unwrap(), "mid-execution failure");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_many_guilds_return_distinct_results() {
    let main = main_ctx();
    let guilds: Vec<_> = (0..16)
        .map(|i| {
            create_guild(&main, SpawnOptions::new().params(["i"]), vec![Value::Int(i)], |ctx| {
                let i = ctx.env().get("i").and_then(Value::as_int).unwrap_or(-1);
                Ok(ctx.alloc_str(format!("r{}", i)))
            })
            .unwrap()
        })
        .collect();

    let mut results: Vec<String> = guilds
        .iter()
        .map(|g| {
            let v = g.join(&main).unwrap();
            main.string(&v).unwrap()
        })
        .collect();
    results.sort();

    let mut expected: Vec<String> = (0..16).map(|i| format!("r{}", i)).collect();
    expected.sort();
    assert_eq!(results, expected);
    assert_eq!(main.registry().live_count(), 1);
}
