use pocketdb::collection::{BatchResult, Hook, HookEvent, HookOutcome, IdMode};
use pocketdb::database::Database;
use pocketdb::doc;
use pocketdb::errors::ErrorKind;
use pocketdb::filter::{all, field};
use pocketdb::serde_json::json;
use pocketdb::Document;
use pocketdb_int_test::test_util::{
    cleanup, create_encrypted_test_context, create_test_context, run_test, sha256, Recorder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_round_trip_adds_only_identifier() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            let original = doc! {
                "name": "Alice",
                "age": 25,
                "score": 9.5,
                "active": true,
                "tags": ["a", "b"],
                "address": { "city": "Boston", "zip": "02101" },
                "nickname": null
            };
            let id = users.insert(original.clone())?.id().cloned().unwrap_or_default();
            assert!(id.is_string());

            let mut stored = users.find_one(field("_id").eq(id.clone()))?.unwrap_or_default();
            assert_eq!(stored.remove("_id"), Some(id));
            assert_eq!(stored, original);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_encrypted_records_are_opaque() {
    run_test(
        create_encrypted_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            assert!(users.is_encrypted()?);
            users.insert(doc! { "_id": "u1", "name": "Alice", "secret": "hunter2" })?;
            users.insert(doc! { "_id": "u2", "name": "Bob", "secret": "swordfish" })?;

            for plaintext in ["Alice", "hunter2", "secret", "swordfish"] {
                let leaked = db.execute_scalar(&format!(
                    "SELECT COUNT(*) FROM users WHERE instr(document, '{}') > 0",
                    plaintext
                ))?;
                assert_eq!(leaked, 0, "{} leaked", plaintext);
            }
            let wrapped = db.execute_scalar(
                "SELECT COUNT(*) FROM users WHERE json_extract(document, '$.encrypted_data') IS NOT NULL \
                 AND json_extract(document, '$.iv') IS NOT NULL",
            )?;
            assert_eq!(wrapped, 2);
            let readable_ids = db.execute_scalar(
                "SELECT COUNT(*) FROM users WHERE json_extract(document, '$._id') = 'u1'",
            )?;
            assert_eq!(readable_ids, 1);

            let alice = users.find_one(field("name").eq("Alice"))?.unwrap_or_default();
            assert_eq!(alice, doc! { "name": "Alice", "secret": "hunter2", "_id": "u1" });
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_wrong_key_reads_nothing() {
    run_test(
        create_encrypted_test_context,
        |ctx| {
            let db = ctx.db();
            db.collection("users")?
                .insert(doc! { "_id": "u1", "name": "Alice" })?;
            let path = db.path().to_string();

            let wrong = Database::builder().encryption_key("not the key").open(&path)?;
            assert!(wrong.collection("users")?.find(all())?.to_array()?.is_empty());
            wrong.close()?;

            let keyless = Database::open(&path)?;
            assert!(keyless.collection("users")?.find(all())?.to_array()?.is_empty());
            keyless.close()?;
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_collection_key_overrides_database() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let vault = db.collection("vault")?;
            assert!(!vault.is_encrypted()?);
            vault.set_encryption_key(Some("vault key"));
            assert!(vault.is_encrypted()?);
            vault.insert(doc! { "_id": "v1", "pin": "1234" })?;

            let leaked = db.execute_scalar("SELECT COUNT(*) FROM vault WHERE instr(document, '1234') > 0")?;
            assert_eq!(leaked, 0);
            assert_eq!(vault.find(field("pin").eq("1234"))?.to_array()?.len(), 1);

            vault.set_encryption_key(None);
            assert!(vault.find(all())?.to_array()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_save_is_idempotent() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            users.save(doc! { "_id": "u1", "name": "Alice", "age": 25 })?;
            users.save(doc! { "_id": "u1", "name": "Alice", "age": 26 })?;
            users.save(doc! { "_id": "u1", "name": "Alice", "age": 26 })?;

            let rows = db.execute_scalar(
                "SELECT COUNT(*) FROM users WHERE json_extract(document, '$._id') = 'u1'",
            )?;
            assert_eq!(rows, 1);
            let alice = users.find_one(field("_id").eq("u1"))?.unwrap_or_default();
            assert_eq!(alice.get("age"), Some(&json!(26)));

            let fresh = users.save(doc! { "name": "Bob" })?;
            assert!(fresh.id().is_some());
            assert_eq!(users.count(all())?, 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_save_refreshes_searchable_columns() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            users.set_searchable_fields(&["email"], false)?;
            users.save(doc! { "_id": "u1", "email": "old@y.com" })?;
            users.save(doc! { "_id": "u1", "email": "new@y.com" })?;

            assert!(users.find_one(field("email").eq("old@y.com"))?.is_none());
            assert!(users.find_one(field("email").eq("new@y.com"))?.is_some());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_batch_insert_commits_all() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            users.set_id_mode_prefix("U")?;
            let after = Arc::new(AtomicUsize::new(0));
            let fired = after.clone();
            users.on(Hook::after_insert(move |_, _| {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));

            let docs: Vec<Document> = (0..10).map(|i| doc! { "index": i }).collect();
            let result = users.insert_many(docs)?;
            assert_eq!(result.count(), 10);
            assert_eq!(result.ids()[0], json!("U-000001"));
            assert_eq!(result.ids()[9], json!("U-000010"));
            assert_eq!(users.count(all())?, 10);
            assert_eq!(after.load(Ordering::SeqCst), 10);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_batch_insert_veto_rolls_back() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            users.on(Hook::before_insert(|doc| {
                Ok(if doc.get("name") == Some(&json!("Mallory")) {
                    HookOutcome::Veto
                } else {
                    HookOutcome::Continue
                })
            }));
            let after = Arc::new(AtomicUsize::new(0));
            let fired = after.clone();
            users.on(Hook::after_insert(move |_, _| {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));

            let result = users.insert_many(vec![
                doc! { "name": "Alice" },
                doc! { "name": "Mallory" },
                doc! { "name": "Bob" },
            ])?;
            assert_eq!(result, BatchResult::Vetoed(1));
            assert_eq!(users.count(all())?, 0);
            assert_eq!(after.load(Ordering::SeqCst), 0);

            users.insert(doc! { "name": "Carol" })?;
            assert_eq!(users.count(all())?, 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_batch_insert_error_rolls_back() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            users.set_id_mode_manual();
            let err = users
                .insert_many(vec![doc! { "_id": "a" }, doc! { "name": "no id" }])
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidId);
            assert_eq!(users.count(all())?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_manual_mode_requires_identifier() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            users.set_id_mode_manual();
            assert_eq!(users.id_mode(), IdMode::Manual);
            let err = users.insert(doc! { "name": "Alice" }).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidId);

            let result = users.insert(doc! { "_id": 7, "name": "Alice" })?;
            assert_eq!(result.id(), Some(&json!(7)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_prefix_counter_resumes_after_stored_ids() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            users.insert(doc! { "_id": "USR-000007" })?;
            users.insert(doc! { "_id": "USR-000003" })?;
            users.insert(doc! { "_id": "OTHER-000099" })?;

            users.set_id_mode_prefix("USR")?;
            let next = users.insert(doc! { "name": "Alice" })?;
            assert_eq!(next.id(), Some(&json!("USR-000008")));

            users.set_id_mode_auto();
            users.insert(doc! { "name": "Bob" })?;
            users.set_id_mode_prefix("USR")?;
            let next = users.insert(doc! { "name": "Carol" })?;
            assert_eq!(next.id(), Some(&json!("USR-000009")));

            assert_eq!(
                users.set_id_mode_prefix("").unwrap_err().kind(),
                &ErrorKind::InvalidId
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_remove_veto_keeps_only_vetoed_row() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            for name in ["Alice", "Bob", "Carol"] {
                users.insert(doc! { "name": name, "active": false })?;
            }
            users.on(Hook::before_remove(|doc| {
                Ok(if doc.get("name") == Some(&json!("Bob")) {
                    HookOutcome::Veto
                } else {
                    HookOutcome::Continue
                })
            }));
            let removed = Recorder::default();
            let recorder = removed.clone();
            users.on(Hook::after_remove(move |doc| {
                recorder.push(doc);
                Ok(())
            }));

            assert_eq!(users.remove(json!({ "active": false }))?, 2);
            let left = users.find(all())?.to_array()?;
            assert_eq!(left.len(), 1);
            assert_eq!(left[0].get("name"), Some(&json!("Bob")));
            assert_eq!(removed.documents().len(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_remove_hooks_see_identifier_of_unreadable_rows() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let vault = db.collection("vault")?;
            vault.set_encryption_key(Some("old key"));
            vault.insert(doc! { "_id": "keep", "pin": "1" })?;
            vault.insert(doc! { "_id": "drop", "pin": "2" })?;
            vault.set_encryption_key(Some("new key"));

            let seen = Recorder::default();
            let recorder = seen.clone();
            vault.on(Hook::before_remove(move |doc| {
                recorder.push(doc);
                Ok(if doc.id() == Some(&json!("keep")) {
                    HookOutcome::Veto
                } else {
                    HookOutcome::Continue
                })
            }));

            assert_eq!(vault.remove(all())?, 1);
            assert_eq!(
                seen.documents(),
                vec![doc! { "_id": "keep" }, doc! { "_id": "drop" }]
            );
            assert_eq!(db.execute_scalar("SELECT COUNT(*) FROM vault")?, 1);
            vault.set_encryption_key(Some("old key"));
            assert_eq!(vault.find_one(all())?.and_then(|d| d.get("pin").cloned()), Some(json!("1")));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_hooks() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            users.insert(doc! { "name": "Alice", "age": 25 })?;
            users.insert(doc! { "name": "Bob", "age": 30 })?;

            users.on(Hook::before_update(|_, data| {
                data.put("touched", true);
                Ok(())
            }));
            let updated = Recorder::default();
            let recorder = updated.clone();
            users.on(Hook::after_update(move |original, after| {
                assert!(original.get("touched").is_none());
                recorder.push(after);
                Ok(())
            }));

            assert_eq!(users.update(field("age").gte(25), doc! { "city": "Boston" })?, 2);
            let seen = updated.documents();
            assert_eq!(seen.len(), 2);
            assert!(seen.iter().all(|d| d.get("touched") == Some(&json!(true))));
            assert_eq!(users.count(json!({ "touched": true }))?, 2);

            assert_eq!(users.off(HookEvent::BeforeUpdate, None), 1);
            assert_eq!(users.update(field("name").eq("Nobody"), doc! { "x": 1 })?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_after_hook_errors_are_swallowed() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.db().collection("users")?;
            users.on(Hook::after_insert(|_, _| {
                Err(pocketdb::PocketError::new("listener failed", ErrorKind::InternalError))
            }));
            assert!(users.insert(doc! { "name": "Alice" })?.is_written());
            assert_eq!(users.count(all())?, 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_searchable_fields_reindex_and_drop() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            users.insert(doc! { "email": "a@y.com", "tags": ["x", "y"] })?;
            users.set_searchable_fields(&["email", "tags"], false)?;
            let by_name = db.create_json_index("users", "name", None)?;
            let by_email = users.create_index("email", None)?;

            assert_eq!(
                db.execute_scalar("SELECT COUNT(*) FROM users WHERE si_email = 'a@y.com'")?,
                1
            );
            assert_eq!(
                db.execute_scalar("SELECT COUNT(*) FROM users WHERE si_tags = 'x,y'")?,
                1
            );

            assert!(users.remove_searchable_field("email", true)?);
            assert!(!users.remove_searchable_field("email", true)?);
            assert_eq!(
                db.execute_scalar(
                    "SELECT COUNT(*) FROM pragma_table_info('users') WHERE name = 'si_email'"
                )?,
                0
            );
            let index_count = |name: &str| {
                db.execute_scalar(&format!(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = '{}'",
                    name
                ))
            };
            assert_eq!(index_count(&by_name)?, 1);
            assert_eq!(index_count(&by_email)?, 0);
            assert_eq!(users.find(all())?.to_array()?.len(), 1);
            assert_eq!(users.count(field("email").eq("a@y.com"))?, 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_hashed_searchable_field_on_encrypted_collection() {
    run_test(
        create_encrypted_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            users.set_searchable_fields(&["email"], true)?;
            users.insert(doc! { "email": "x@y.com", "name": "X" })?;

            assert_eq!(
                db.execute_scalar(&format!(
                    "SELECT COUNT(*) FROM users WHERE si_email = '{}'",
                    sha256("x@y.com")
                ))?,
                1
            );
            let found = users.find_one(field("email").eq("x@y.com"))?.unwrap_or_default();
            assert_eq!(found.get("name"), Some(&json!("X")));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_rename_and_indexes() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            users.insert(doc! { "name": "Alice" })?;
            db.collection("taken")?;

            assert!(!users.rename("taken")?);
            assert!(users.rename("people")?);
            assert_eq!(users.name(), "people");
            assert!(db.has_collection("people")?);
            assert!(!db.has_collection("users")?);
            assert_eq!(users.count(all())?, 1);

            let index = users.create_index("name", None)?;
            assert_eq!(
                db.execute_scalar(&format!(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = '{}'",
                    index
                ))?,
                1
            );
            db.drop_index(&index)?;
            assert_eq!(
                db.execute_scalar(&format!(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = '{}'",
                    index
                ))?,
                0
            );

            users.drop()?;
            assert!(!db.has_collection("people")?);
            Ok(())
        },
        cleanup,
    )
}
