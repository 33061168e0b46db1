use super::*;
use crate::config::ClientConfig;
use crate::log::SqlLogger;
use crate::testing::{MockExecutor, fk, row};
use serde_json::json;

fn blog_fks() -> Vec<FkInfo> {
    vec![
        fk("posts_author_id_fkey", "posts", "author_id", "profiles", "id"),
        fk("posts_editor_id_fkey", "posts", "editor_id", "profiles", "id"),
        fk("comments_post_id_fkey", "comments", "post_id", "posts", "id"),
        fk("comments_author_id_fkey", "comments", "author_id", "profiles", "id"),
    ]
}

fn join(select: &str) -> JoinRef {
    parse_select(select).joins.remove(0)
}

fn blog() -> MockExecutor {
    MockExecutor::new()
        .with_table(
            "profiles",
            (1..=5)
                .map(|id| json!({"id": id, "username": format!("user{id}"), "email": "x"}))
                .collect(),
        )
        .with_table(
            "comments",
            vec![
                json!({"id": 10, "post_id": 1, "author_id": 2, "body": "first"}),
                json!({"id": 11, "post_id": 1, "author_id": 3, "body": "second"}),
                json!({"id": 12, "post_id": 2, "author_id": 2, "body": "third"}),
            ],
        )
}

fn posts(n: i64) -> Vec<JsonRow> {
    (1..=n)
        .map(|id| row(json!({"id": id, "title": format!("post {id}"), "author_id": (id - 1) % 5 + 1})))
        .collect()
}

/// Resolve `select` against `rows` as if they were the main rows of `source`.
async fn resolve_on(
    exec: &MockExecutor,
    config: &ClientConfig,
    source: &str,
    select: &str,
    rows: &mut Vec<JsonRow>,
) {
    let logger = SqlLogger::default();
    let fks: Arc<[FkInfo]> = blog_fks().into();
    let parsed = parse_select(select);
    let mut planned = plan_joins(&fks, &parsed.joins, source, config.fk_name_fallback);
    let projection = projection(&parsed, &required_columns(&planned)).unwrap();
    projection.bind(&mut planned);
    let ctx = JoinContext {
        runner: Runner::new(exec, config, &logger),
        fks,
        foreign_orders: Vec::new(),
    };
    resolve_joins(&ctx, rows, &planned, &projection.added).await;
}

// ==================== resolve_fk ====================

#[test]
fn explicit_constraint_decides_direction() {
    let fks = blog_fks();
    let plan = resolve_fk(&fks, &join("author:profiles!posts_author_id_fkey(*)"), "posts").unwrap();
    assert_eq!(
        plan,
        FkPlan {
            direction: Direction::ManyToOne,
            local_column: "author_id".into(),
            foreign_column: "id".into(),
            foreign_table: "profiles".into(),
        }
    );

    let plan = resolve_fk(&fks, &join("posts!posts_author_id_fkey(*)"), "profiles").unwrap();
    assert_eq!(plan.direction, Direction::OneToMany);
    assert_eq!(plan.local_column, "id");
    assert_eq!(plan.foreign_column, "author_id");
    assert_eq!(plan.foreign_table, "posts");
}

#[test]
fn constraint_name_convention_without_schema() {
    let plan = resolve_fk(&[], &join("reviewer:users!posts_reviewer_id_fkey(*)"), "posts").unwrap();
    assert_eq!(plan.direction, Direction::ManyToOne);
    assert_eq!(plan.local_column, "reviewer_id");
    assert_eq!(plan.foreign_table, "users");

    let plan = resolve_fk(&[], &join("likes!likes_post_id_fkey(*)"), "posts").unwrap();
    assert_eq!(plan.direction, Direction::OneToMany);
    assert_eq!(plan.local_column, "id");
    assert_eq!(plan.foreign_column, "post_id");
}

#[test]
fn table_pair_prefers_alias_column() {
    let fks = blog_fks();
    let plan = resolve_fk(&fks, &join("editor:profiles(*)"), "posts").unwrap();
    assert_eq!(plan.local_column, "editor_id");

    let plan = resolve_fk(&fks, &join("profiles(*)"), "posts").unwrap();
    assert_eq!(plan.local_column, "author_id");

    let plan = resolve_fk(&fks, &join("comments(*)"), "posts").unwrap();
    assert_eq!(plan.direction, Direction::OneToMany);
    assert_eq!(plan.foreign_column, "post_id");
}

#[test]
fn naming_fallback_can_be_disabled() {
    let plan = resolve_fk(&[], &join("studio:studios(*)"), "games").unwrap();
    assert_eq!(plan.direction, Direction::ManyToOne);
    assert_eq!(plan.local_column, "studio_id");
    assert_eq!(plan.foreign_column, "id");

    assert!(resolve(&[], &join("studio:studios(*)"), "games", false).is_none());
}

// ==================== projection ====================

#[test]
fn projection_adds_and_reports_join_columns() {
    let parsed = parse_select("id, title, author:profiles(username)");
    let projection = projection(&parsed, &["author_id", "id"]).unwrap();
    assert_eq!(projection.sql, r#""id", "title", "author_id""#);
    assert_eq!(projection.added, vec!["author_id".to_string()]);

    let star = projection_of("*, author:profiles(*)", &["author_id"]);
    assert_eq!(star.sql, "*");
    assert!(star.added.is_empty());

    let same_name = projection_of("author_id:author_id, author:profiles(*)", &["author_id"]);
    assert!(same_name.added.is_empty());
    assert_eq!(same_name.key_for("author_id"), "author_id");
}

#[test]
fn renamed_output_does_not_stand_in_for_join_column() {
    let renamed = projection_of("author_id:writer, author:profiles(*)", &["author_id"]);
    assert_eq!(
        renamed.sql,
        r#""writer" AS "author_id", "author_id" AS "__pgrest_author_id""#
    );
    assert_eq!(renamed.added, vec!["__pgrest_author_id".to_string()]);
    assert_eq!(renamed.key_for("author_id"), "__pgrest_author_id");

    let cast = projection_of("*, author_id::text, author:profiles(*)", &["author_id"]);
    assert_eq!(cast.key_for("author_id"), "__pgrest_author_id");
}

fn projection_of(select: &str, required: &[&str]) -> Projection {
    projection(&parse_select(select), required).unwrap()
}

// ==================== batched resolution ====================

#[tokio::test]
async fn fifty_rows_cost_one_query() {
    let exec = blog();
    let mut rows = posts(50);
    resolve_on(
        &exec,
        &ClientConfig::default(),
        "posts",
        "id, title, author_id, author:profiles(username)",
        &mut rows,
    )
    .await;

    assert_eq!(exec.statements().len(), 1);
    let call = &exec.calls()[0];
    assert_eq!(
        call.sql,
        r#"SELECT "username", "id" FROM "profiles" WHERE "id" IN ($1, $2, $3, $4, $5)"#
    );
    assert_eq!(call.params, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);

    assert_eq!(rows.len(), 50);
    assert_eq!(rows[0]["author"], json!({"username": "user1"}));
    assert_eq!(rows[6]["author"], json!({"username": "user2"}));
}

#[tokio::test]
async fn join_reads_real_column_behind_alias() {
    let exec = blog().with_table(
        "posts",
        vec![json!({"id": 1, "title": "t", "author_id": 4, "editor_id": 2})],
    );
    let config = ClientConfig::default();
    let logger = SqlLogger::default();
    let fks: Arc<[FkInfo]> = blog_fks().into();
    let parsed = parse_select("id, author_id:editor_id, author:profiles!posts_author_id_fkey(username)");
    let mut planned = plan_joins(&fks, &parsed.joins, "posts", true);
    let projection = projection(&parsed, &required_columns(&planned)).unwrap();
    projection.bind(&mut planned);

    let runner = Runner::new(&exec, &config, &logger);
    let sql = format!("SELECT {} FROM \"posts\"", projection.sql);
    let mut rows = runner.rows(StatementKind::Select, &sql, &[]).await.unwrap();
    let ctx = JoinContext {
        runner,
        fks,
        foreign_orders: Vec::new(),
    };
    resolve_joins(&ctx, &mut rows, &planned, &projection.added).await;

    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([{"id": 1, "author_id": 2, "author": {"username": "user4"}}])
    );
}

#[tokio::test]
async fn one_to_many_groups_and_defaults_to_empty() {
    let exec = blog();
    let mut rows = posts(3);
    resolve_on(&exec, &ClientConfig::default(), "posts", "*, comments(body)", &mut rows).await;

    assert_eq!(rows[0]["comments"], json!([{"body": "first"}, {"body": "second"}]));
    assert_eq!(rows[1]["comments"], json!([{"body": "third"}]));
    assert_eq!(rows[2]["comments"], json!([]));
    assert!(rows[0].get("post_id").is_none());
}

#[tokio::test]
async fn null_keys_skip_the_query() {
    let exec = blog();
    let mut rows = vec![row(json!({"id": 1, "author_id": null}))];
    resolve_on(&exec, &ClientConfig::default(), "posts", "*, author:profiles(*)", &mut rows).await;
    assert_eq!(rows[0]["author"], Value::Null);
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn failing_join_is_isolated() {
    let exec = blog().failing("\"comments\"");
    let mut rows = vec![
        row(json!({"id": 1, "author_id": 1})),
        row(json!({"id": 2, "author_id": 2})),
    ];
    resolve_on(
        &exec,
        &ClientConfig::default(),
        "posts",
        "id, author:profiles(username), comments(body)",
        &mut rows,
    )
    .await;

    assert_eq!(rows[0]["comments"], json!([]));
    assert_eq!(rows[1]["comments"], json!([]));
    assert_eq!(rows[0]["author"], json!({"username": "user1"}));
    // author_id was only fetched for the join.
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "author", "comments"]);
}

#[tokio::test]
async fn inner_join_drops_unmatched_parents() {
    let exec = blog();
    let mut rows = posts(3);
    resolve_on(&exec, &ClientConfig::default(), "posts", "id, comments!inner(id)", &mut rows).await;
    let ids: Vec<&Value> = rows.iter().map(|r| &r["id"]).collect();
    assert_eq!(ids, vec![&json!(1), &json!(2)]);
}

#[tokio::test]
async fn nested_references_resolve_on_related_rows() {
    let exec = blog();
    let mut rows = posts(1);
    resolve_on(
        &exec,
        &ClientConfig::default(),
        "posts",
        "id, comments(body, author:profiles(username))",
        &mut rows,
    )
    .await;

    assert_eq!(
        rows[0]["comments"],
        json!([
            {"body": "first", "author": {"username": "user2"}},
            {"body": "second", "author": {"username": "user3"}},
        ])
    );
    assert_eq!(exec.count_matching("FROM \"profiles\""), 1);
}

#[tokio::test]
async fn keys_are_chunked_by_batch_size() {
    let exec = blog();
    let mut rows = posts(5);
    resolve_on(
        &exec,
        &ClientConfig::default().join_batch_size(2),
        "posts",
        "*, author:profiles(username)",
        &mut rows,
    )
    .await;
    assert_eq!(exec.count_matching("FROM \"profiles\""), 3);
    assert!(rows.iter().all(|r| r["author"].is_object()));
}

#[tokio::test]
async fn unresolvable_reference_yields_null() {
    let exec = blog();
    let mut rows = posts(1);
    resolve_on(
        &exec,
        &ClientConfig::default().no_fk_name_fallback(),
        "posts",
        "*, studio:studios(*)",
        &mut rows,
    )
    .await;
    assert_eq!(rows[0]["studio"], Value::Null);
    assert!(exec.statements().is_empty());
}

#[test]
fn value_keys_distinguish_types() {
    assert_ne!(value_key(&json!(1)), value_key(&json!("1")));
    assert_eq!(value_key(&Value::Null), None);
    let rows = vec![
        row(json!({"k": 1})),
        row(json!({"k": 1})),
        row(json!({"k": null})),
        row(json!({"k": 2})),
    ];
    assert_eq!(distinct_keys(&rows, "k"), vec![json!(1), json!(2)]);
}
