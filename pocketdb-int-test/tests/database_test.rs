use pocketdb::client::Client;
use pocketdb::database::Database;
use pocketdb::doc;
use pocketdb::errors::{ErrorKind, PocketError};
use pocketdb::filter::{all, field};
use pocketdb::serde_json::json;
use pocketdb_int_test::test_util::{
    cleanup, create_memory_context, create_test_context, run_test,
};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_collection_catalog() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            db.collection("users")?.insert(doc! { "name": "Alice" })?;
            db.create_collection("orders")?;
            db.collection("archive")?;

            assert_eq!(db.list_collection_names()?, vec!["archive", "orders", "users"]);
            assert_eq!(db.list_collections()?.len(), 3);
            assert!(db.has_collection("orders")?);

            db.drop_collection("orders")?;
            assert!(!db.has_collection("orders")?);
            assert_eq!(db.list_collection_names()?, vec!["archive", "users"]);

            let err = db.collection("bad name").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidName);
            let err = db.collection("users; DROP TABLE users").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidName);
            assert_eq!(db.quote_identifier("users")?, "\"users\"");
            assert!(db.quote_identifier("a\"b").is_err());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_json_index_is_used_for_queries() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let users = db.collection("users")?;
            for i in 0..20 {
                users.insert(doc! { "address": { "city": (format!("city{}", i % 4)) } })?;
            }
            let name = db.create_json_index("users", "address.city", None)?;
            assert_eq!(name, "idx_users_address_city");
            assert_eq!(users.count(field("address.city").eq("city1"))?, 5);
            db.vacuum()?;
            assert_eq!(users.count(all())?, 20);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_attach_once_detaches() {
    run_test(
        create_test_context,
        |ctx| {
            let archive_path = ctx.file("archive");
            {
                let archive = Database::open(&archive_path)?;
                let orders = archive.collection("orders")?;
                orders.insert(doc! { "total": 10 })?;
                orders.insert(doc! { "total": 20 })?;
                archive.close()?;
            }

            let db = ctx.db();
            let total = db.attach_once(&archive_path, "archive", |db, alias| {
                db.execute_scalar(&format!(
                    "SELECT SUM(json_extract(document, '$.total')) FROM {}.orders",
                    db.quote_identifier(alias)?
                ))
            })?;
            assert_eq!(total, 30);
            assert!(db.execute_scalar("SELECT COUNT(*) FROM archive.orders").is_err());

            let result: Result<i64, PocketError> = db.attach_once(&archive_path, "archive", |_, _| {
                Err(PocketError::new("boom", ErrorKind::InternalError))
            });
            assert_eq!(result.unwrap_err().message(), "boom");
            assert!(db.execute_scalar("SELECT COUNT(*) FROM archive.orders").is_err());

            let err = db
                .attach_once(ctx.path(), "broken", |_, _| Ok(()))
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::BackendError);
            assert_eq!(
                db.attach(&archive_path, "bad alias").unwrap_err().kind(),
                &ErrorKind::InvalidName
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_registered_criteria_in_sql() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let people = db.collection("people")?;
            people.insert(doc! { "name": "Alice", "age": 25 })?;
            people.insert(doc! { "name": "Bob", "age": 31 })?;

            let registration = db.register_criteria(field("age").gt(30))?;
            let id = registration.id().to_string();
            assert!(db.call_criteria(&id, &doc! { "age": 40 }));
            assert!(!db.call_criteria(&id, &doc! { "age": 20 }));

            let sql = format!(
                "SELECT COUNT(*) FROM people WHERE document_criteria('{}', document)",
                id
            );
            assert_eq!(db.execute_scalar(&sql)?, 1);

            drop(registration);
            assert!(!db.call_criteria(&id, &doc! { "age": 40 }));
            assert_eq!(db.execute_scalar(&sql)?, 0);
            assert_eq!(
                db.execute_scalar(
                    "SELECT COUNT(*) FROM people WHERE document_criteria('unknown', document)"
                )?,
                0
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_closing_releases_criteria() {
    run_test(
        create_memory_context,
        |ctx| {
            let db = ctx.db();
            let registration = db.register_criteria(json!({ "age": { "$gt": 30 } }))?;
            let id = registration.id().to_string();
            assert!(db.call_criteria(&id, &doc! { "age": 40 }));

            db.close()?;
            assert!(db.is_closed());
            assert!(!db.call_criteria(&id, &doc! { "age": 40 }));
            assert_eq!(
                db.collection("people").unwrap_err().kind(),
                &ErrorKind::DatabaseClosed
            );
            db.close()?;
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_builder_validation_and_drop() {
    run_test(
        create_test_context,
        |ctx| {
            let err = Database::builder()
                .journal_mode("SOMETIMES")
                .open_in_memory()
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
            let err = Database::builder().page_size(1000).open_in_memory().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);

            let path = ctx.file("scratch");
            let scratch = Database::builder()
                .journal_mode("wal")
                .synchronous("normal")
                .open(&path)?;
            assert_eq!(scratch.config().journal_mode(), "WAL");
            scratch.collection("things")?.insert(doc! { "a": 1 })?;
            assert!(std::path::Path::new(&path).exists());
            scratch.drop()?;
            assert!(!std::path::Path::new(&path).exists());
            assert!(!std::path::Path::new(&format!("{}-wal", path)).exists());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_client_selects_and_lists_databases() {
    run_test(
        create_test_context,
        |ctx| {
            let client = ctx.client()?;
            let shop = client.select_db("shop")?;
            shop.collection("users")?.insert(doc! { "name": "Alice" })?;
            client.select_db("archive-2024")?;

            assert_eq!(client.list_dbs()?, vec!["archive-2024", "shop", "test"]);
            let again = client.select_collection("shop", "users")?;
            assert_eq!(again.count(all())?, 1);
            assert!(shop.client().is_some());
            assert_eq!(
                client.select_db("no/slashes").unwrap_err().kind(),
                &ErrorKind::InvalidName
            );

            client.close()?;
            assert!(shop.is_closed());
            let reopened = client.select_collection("shop", "users")?;
            assert_eq!(reopened.count(all())?, 1);
            client.close()?;
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_memory_client() {
    let client = Client::open(":memory:").unwrap();
    client.select_db("one").unwrap();
    client.select_db("two").unwrap();
    assert_eq!(client.list_dbs().unwrap(), vec!["one", "two"]);
    assert!(client.select_db("one").unwrap().is_in_memory());
    client.close().unwrap();
    assert!(client.list_dbs().unwrap().is_empty());
}
