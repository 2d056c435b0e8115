//! Authorizer hook behaviour against a real in-memory SQLite database.

use sqlite_hooks::{
    AuthorizerAction, AuthorizerDecision, DatabaseErrorKind, Error, HookConfig, HookFailure,
    HookKind, SqliteConnection, TraceFlags,
};
use std::sync::{Arc, Mutex};

fn establish_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    conn.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT)")
        .unwrap();
    conn.exec("INSERT INTO users (name, email) VALUES ('John Doe', 'john@example.com')")
        .unwrap();
    conn
}

fn assert_not_authorized(result: sqlite_hooks::QueryResult<()>) {
    match result {
        Err(Error::DatabaseError(DatabaseErrorKind::NotAuthorized, _)) => {}
        other => panic!("expected an authorization error, got {other:?}"),
    }
}

type Calls = Arc<Mutex<Vec<(AuthorizerAction, Option<String>, Option<String>, Option<String>)>>>;

#[test]
fn deny_all_blocks_the_statement() {
    let conn = &mut establish_connection();
    conn.on_authorize(|_| AuthorizerDecision::Deny).unwrap();

    assert_not_authorized(conn.exec("SELECT * FROM users"));
    assert_not_authorized(conn.exec("DELETE FROM users"));

    conn.remove_authorizer().unwrap();
    conn.exec("DELETE FROM users").unwrap();
}

#[test]
fn callback_receives_action_and_arguments() {
    let conn = &mut establish_connection();
    let calls = Calls::default();
    let sink = calls.clone();
    conn.on_authorize(move |ctx| {
        sink.lock().unwrap().push((
            ctx.action,
            ctx.arg1.map(str::to_owned),
            ctx.arg2.map(str::to_owned),
            ctx.db_name.map(str::to_owned),
        ));
        AuthorizerDecision::Allow
    })
    .unwrap();

    conn.exec("SELECT name FROM users").unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0], (AuthorizerAction::Select, None, None, None));
    assert!(calls.contains(&(
        AuthorizerAction::Read,
        Some("users".to_owned()),
        Some("name".to_owned()),
        Some("main".to_owned()),
    )));
}

#[test]
fn ignore_on_read_hides_the_column() {
    let conn = &mut establish_connection();
    conn.on_authorize(|ctx| match (ctx.action, ctx.arg2) {
        (AuthorizerAction::Read, Some("email")) => AuthorizerDecision::Ignore,
        _ => AuthorizerDecision::Allow,
    })
    .unwrap();

    // An ignored column reads as NULL, so the filter matches no row.
    conn.exec("CREATE TABLE found AS SELECT id FROM users WHERE email IS NOT NULL")
        .unwrap();
    conn.remove_authorizer().unwrap();

    let rows = Arc::new(Mutex::new(0usize));
    let sink = rows.clone();
    conn.on_trace(TraceFlags::ROW, move |_| *sink.lock().unwrap() += 1);
    conn.exec("SELECT id FROM found").unwrap();
    assert_eq!(*rows.lock().unwrap(), 0);

    conn.exec("SELECT id FROM users WHERE email IS NOT NULL")
        .unwrap();
    assert_eq!(*rows.lock().unwrap(), 1);
}

#[test]
fn removed_authorizer_is_never_called_again() {
    let conn = &mut establish_connection();
    let calls = Arc::new(Mutex::new(0usize));
    let sink = calls.clone();
    conn.on_authorize(move |_| {
        *sink.lock().unwrap() += 1;
        AuthorizerDecision::Allow
    })
    .unwrap();

    conn.exec("SELECT 1").unwrap();
    let before = *calls.lock().unwrap();
    assert!(before > 0);

    conn.remove_authorizer().unwrap();
    conn.exec("SELECT * FROM users").unwrap();
    conn.exec("UPDATE users SET name = 'Jane'").unwrap();

    assert_eq!(*calls.lock().unwrap(), before);
}

#[test]
fn latest_authorizer_wins() {
    let conn = &mut establish_connection();
    let first = Arc::new(Mutex::new(0usize));
    let sink = first.clone();
    conn.on_authorize(move |_| {
        *sink.lock().unwrap() += 1;
        AuthorizerDecision::Deny
    })
    .unwrap();
    conn.on_authorize(|_| AuthorizerDecision::Allow).unwrap();

    conn.exec("SELECT * FROM users").unwrap();
    assert_eq!(*first.lock().unwrap(), 0);
}

#[test]
fn removing_without_registration_is_a_noop() {
    let conn = &mut establish_connection();
    conn.remove_authorizer().unwrap();
    conn.exec("SELECT * FROM users").unwrap();
}

#[test]
fn panicking_authorizer_allows_by_default() {
    let conn = &mut establish_connection();
    conn.on_authorize(|ctx| {
        if ctx.action == AuthorizerAction::Delete {
            panic!("no deletes today");
        }
        AuthorizerDecision::Allow
    })
    .unwrap();

    conn.exec("DELETE FROM users").unwrap();

    let failures = conn.take_hook_failures();
    assert_eq!(
        failures,
        vec![HookFailure::CallbackPanic {
            hook: HookKind::Authorizer,
            message: "no deletes today".to_owned(),
        }]
    );
}

#[test]
fn panicking_authorizer_uses_configured_fallback() {
    let config = HookConfig::default().with_authorizer_fallback(AuthorizerDecision::Deny);
    let conn = &mut SqliteConnection::establish_with_config(":memory:", config).unwrap();
    conn.exec("CREATE TABLE t (id INTEGER)").unwrap();
    conn.on_authorize(|ctx| {
        if ctx.action == AuthorizerAction::Insert {
            panic!("inserts are broken");
        }
        AuthorizerDecision::Allow
    })
    .unwrap();

    assert_not_authorized(conn.exec("INSERT INTO t VALUES (1)"));
    conn.exec("SELECT * FROM t").unwrap();
    assert_eq!(conn.hook_failures().len(), 1);
    assert_eq!(conn.hook_failures()[0].hook(), HookKind::Authorizer);
}

#[test]
fn user_data_is_owned_by_the_registration() {
    let conn = &mut establish_connection();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    conn.on_authorize_with(0u32, move |calls, ctx| {
        *calls += 1;
        if ctx.action == AuthorizerAction::Select {
            sink.lock().unwrap().push(*calls);
        }
        AuthorizerDecision::Allow
    })
    .unwrap();

    conn.exec("SELECT 1").unwrap();
    conn.exec("SELECT 2").unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0] < seen[1]);
}
