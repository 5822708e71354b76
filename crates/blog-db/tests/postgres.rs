//! Repository and transaction behavior against a live PostgreSQL.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p blog-db -- --ignored`.
//! Each test works on its own freshly created table.

use blog_db::{
    record_fields, CrudStore, Database, DatabaseConfig, Field, Filter, IsolationLevel, QueryContext,
    Record, Repository, RepositoryError, SetMap, SqlValue, TxOptions, TxState,
};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
struct Author {
    id: Option<Uuid>,
    first_name: Option<String>,
    last_name: Option<String>,
    score: Option<f64>,
}

impl Record for Author {
    const NAME: &'static str = "Author";

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: &[Field<Author>] = record_fields!(Author {
            id => "id",
            first_name => "first_name",
            last_name => "last_name",
            score => "score",
        });
        FIELDS
    }
}

fn author(first: &str, last: &str) -> Author {
    Author {
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        ..Default::default()
    }
}

struct Fixture {
    db: Database,
    table: String,
}

impl Fixture {
    async fn new() -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
        let db = Database::connect(&DatabaseConfig::with_url(url))
            .await
            .expect("connect");
        let table = format!("authors_{}", Uuid::new_v4().simple());

        sqlx::query(&format!(
            "CREATE TABLE {} (
                id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
                first_name text,
                last_name text,
                score double precision,
                status boolean NOT NULL DEFAULT true,
                updated_at timestamptz
            )",
            table
        ))
        .execute(db.pool())
        .await
        .expect("create table");

        Self { db, table }
    }

    fn repo(&self) -> Repository<Author> {
        self.db.repository(&self.table)
    }

    async fn status_of(&self, id: Uuid) -> bool {
        sqlx::query_scalar(&format!("SELECT status FROM {} WHERE id = $1", self.table))
            .bind(id)
            .fetch_one(self.db.pool())
            .await
            .expect("status")
    }

    async fn teardown(self) {
        sqlx::query(&format!("DROP TABLE {}", self.table))
            .execute(self.db.pool())
            .await
            .expect("drop table");
        self.db.close().await;
    }
}

#[tokio::test]
#[ignore]
async fn insert_then_find_one_round_trips() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    let mut id = SqlValue::Null;
    repo.insert(&ctx, &author("Ada", "Lovelace"), Some(&mut id)).await.unwrap();
    let id = id.as_uuid().expect("generated uuid");

    let found = repo.find_one(&ctx, &Filter::eq("id", id)).await.unwrap();
    assert_eq!(found.id, Some(id));
    assert_eq!(found.first_name.as_deref(), Some("Ada"));
    assert_eq!(found.last_name.as_deref(), Some("Lovelace"));
    assert_eq!(found.score, None);

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn ada_scenario() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    repo.insert(&ctx, &author("Ada", "Lovelace"), None).await.unwrap();
    repo.insert(&ctx, &author("Grace", "Hopper"), None).await.unwrap();
    assert_eq!(repo.count(&ctx, None).await.unwrap(), 2);

    let ada = Filter::eq("first_name", "Ada");
    assert_eq!(repo.count(&ctx, Some(&ada)).await.unwrap(), 1);
    let id = repo.find_one(&ctx, &ada).await.unwrap().id.unwrap();

    let mut set = SetMap::new();
    set.insert("score".to_string(), SqlValue::Float(9.5));
    assert_eq!(repo.update(&ctx, &set, &Filter::eq("id", id)).await.unwrap(), 1);
    assert_eq!(
        repo.find_one(&ctx, &Filter::eq("id", id)).await.unwrap().score,
        Some(9.5)
    );

    // soft delete keeps the row
    assert_eq!(repo.remove(&ctx, &Filter::eq("id", id), false).await.unwrap(), 1);
    assert!(!fx.status_of(id).await);
    assert_eq!(repo.count(&ctx, None).await.unwrap(), 2);

    assert_eq!(repo.remove(&ctx, &Filter::eq("id", id), true).await.unwrap(), 1);
    assert_eq!(repo.count(&ctx, None).await.unwrap(), 1);
    assert_eq!(repo.find_all(&ctx).await.unwrap().len(), 1);

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn update_of_missing_row_affects_nothing() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    let mut set = SetMap::new();
    set.insert("score".to_string(), SqlValue::Float(1.0));
    let affected = repo
        .update(&ctx, &set, &Filter::eq("id", Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(affected, 0);

    let err = repo
        .find_one(&ctx, &Filter::eq("id", Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Scan { .. }));

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn committed_writes_become_visible() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    let handle = repo.begin_transaction(&ctx, TxOptions::default()).await.unwrap();
    let tx_repo = repo.with_transaction(&handle);
    tx_repo.insert(&ctx, &author("Ada", "Lovelace"), None).await.unwrap();

    assert_eq!(tx_repo.count(&ctx, None).await.unwrap(), 1);
    assert_eq!(repo.count(&ctx, None).await.unwrap(), 0);

    handle.commit().await.unwrap();
    assert_eq!(handle.state().await, TxState::Committed);
    assert_eq!(repo.count(&ctx, None).await.unwrap(), 1);

    let err = tx_repo.count(&ctx, None).await.unwrap_err();
    assert!(matches!(err, RepositoryError::TransactionState { .. }));
    assert!(handle.commit().await.is_err());

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn rolled_back_writes_disappear() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    let options = TxOptions {
        isolation: Some(IsolationLevel::Serializable),
        read_only: false,
    };
    let handle = repo.begin_transaction(&ctx, options).await.unwrap();
    let tx_repo = repo.with_transaction(&handle);
    tx_repo.insert(&ctx, &author("Ada", "Lovelace"), None).await.unwrap();

    handle.rollback().await.unwrap();
    assert_eq!(repo.count(&ctx, None).await.unwrap(), 0);
    assert!(handle.rollback().await.is_err());

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn read_only_transaction_rejects_writes() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    let options = TxOptions {
        isolation: None,
        read_only: true,
    };
    let handle = repo.begin_transaction(&ctx, options).await.unwrap();
    let err = repo
        .with_transaction(&handle)
        .insert(&ctx, &author("Ada", "Lovelace"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Execution { .. }));
    handle.rollback().await.unwrap();

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn update_to_null_clears_a_typed_column() {
    let fx = Fixture::new().await;
    let repo = fx.repo();
    let ctx = QueryContext::background();

    let mut id = SqlValue::Null;
    let ada = Author {
        score: Some(9.5),
        ..author("Ada", "Lovelace")
    };
    repo.insert(&ctx, &ada, Some(&mut id)).await.unwrap();
    let id = id.as_uuid().expect("generated uuid");

    let mut set = SetMap::new();
    set.insert("score".to_string(), SqlValue::Null);
    assert_eq!(repo.update(&ctx, &set, &Filter::eq("id", id)).await.unwrap(), 1);
    assert_eq!(repo.find_one(&ctx, &Filter::eq("id", id)).await.unwrap().score, None);

    // NULL literals inside IN keep later placeholders numbered correctly
    let filter = Filter::in_list("score", vec![SqlValue::Null, SqlValue::Float(1.0)]).and(Filter::eq("id", id));
    assert_eq!(repo.count(&ctx, Some(&filter)).await.unwrap(), 0);

    fx.teardown().await;
}

#[tokio::test]
#[ignore]
async fn unmapped_columns_of_other_types_are_ignored() {
    let fx = Fixture::new().await;
    sqlx::query(&format!(
        "ALTER TABLE {} ADD COLUMN rating numeric DEFAULT 1.5, ADD COLUMN born date DEFAULT '1815-12-10',
            ADD COLUMN grade char(2) DEFAULT 'a', ADD COLUMN aliases text[], ADD COLUMN portrait bytea",
        fx.table
    ))
    .execute(fx.db.pool())
    .await
    .expect("alter table");

    let repo = fx.repo();
    let ctx = QueryContext::background();
    repo.insert(&ctx, &author("Ada", "Lovelace"), None).await.unwrap();

    let all = repo.find_all(&ctx).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].first_name.as_deref(), Some("Ada"));

    let found = repo.find(&ctx, &Filter::eq("last_name", "Lovelace")).await.unwrap();
    assert_eq!(found, all);

    fx.teardown().await;
}
