//! Integration tests for the qb module.

use crate::condition::{Connective, Op};
use crate::dialect::Dialect;
use crate::error::DbError;
use crate::qb::{create, delete, retrieve, update, ExprGroup, SqlQb};
use crate::value::SqlValue;
use chrono::NaiveDate;

#[test]
fn test_select_basic() {
    let qb = retrieve("users");
    assert_eq!(qb.build().unwrap(), "SELECT * FROM users");
}

#[test]
fn test_select_with_conditions() {
    let qb = retrieve("users")
        .eq("status", "active")
        .gt("age", 18)
        .limit(10);

    assert_eq!(
        qb.build().unwrap(),
        "SELECT * FROM users WHERE status = 'active' AND age > 18 LIMIT 10"
    );

    let built = qb.build_prepared_for(Dialect::Postgres).unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM users WHERE status = $1 AND age > $2 LIMIT 10"
    );
    assert_eq!(
        built.params.values(),
        &[SqlValue::from("active"), SqlValue::Int(18)]
    );
}

#[test]
fn test_insert_basic() {
    let qb = create("users")
        .set("username", "alice")
        .set("email", "alice@example.com");

    assert_eq!(
        qb.build().unwrap(),
        "INSERT INTO users (username, email) VALUES ('alice', 'alice@example.com')"
    );
    assert_eq!(
        qb.build_prepared().unwrap().sql,
        "INSERT INTO users (username, email) VALUES (?, ?)"
    );
}

#[test]
fn test_insert_parameter_order_matches_columns() {
    let qb = create("t")
        .set("a", 1)
        .set("b", "x")
        .set("c", SqlValue::Null);

    let built = qb.build_prepared().unwrap();
    assert_eq!(built.sql, "INSERT INTO t (a, b, c) VALUES (?, ?, ?)");
    assert_eq!(built.sql.matches('?').count(), 3);
    assert_eq!(
        built.params.into_values(),
        vec![SqlValue::Int(1), SqlValue::from("x"), SqlValue::Null]
    );
}

#[test]
fn test_insert_set_twice_keeps_position() {
    let qb = create("t").set("a", 1).set("b", 2).set("a", 3);
    assert_eq!(qb.build().unwrap(), "INSERT INTO t (a, b) VALUES (3, 2)");
}

#[test]
fn test_insert_values_init_replaces() {
    let qb = create("t")
        .set("a", 1)
        .values_init([("x", 9), ("y", 8)]);
    assert_eq!(qb.build().unwrap(), "INSERT INTO t (x, y) VALUES (9, 8)");
}

#[test]
fn test_insert_without_columns_fails() {
    assert!(matches!(
        create("t").build(),
        Err(DbError::Validation(_))
    ));
}

#[test]
fn test_update_basic() {
    let qb = update("users").set("status", "inactive").eq("id", 1i64);

    assert_eq!(
        qb.build().unwrap(),
        "UPDATE users SET status = 'inactive' WHERE id = 1"
    );
    assert_eq!(
        qb.build_prepared_for(Dialect::Postgres).unwrap().sql,
        "UPDATE users SET status = $1 WHERE id = $2"
    );
}

#[test]
fn test_update_raw_and_increment() {
    let qb = update("posts")
        .set_raw("updated_at", "NOW()")
        .increment("views", 1)
        .eq("id", 7);

    assert_eq!(
        qb.build().unwrap(),
        "UPDATE posts SET updated_at = NOW(), views = views + 1 WHERE id = 7"
    );
    let built = qb.build_prepared_for(Dialect::Postgres).unwrap();
    assert_eq!(
        built.sql,
        "UPDATE posts SET updated_at = NOW(), views = views + $1 WHERE id = $2"
    );
    assert_eq!(built.params.len(), 2);
}

#[test]
fn test_update_without_where_is_rejected() {
    let err = update("users").set("status", "x").build().unwrap_err();
    assert!(err.is_unsafe_statement());
    let err = update("users").set("status", "x").build_prepared().unwrap_err();
    assert!(err.is_unsafe_statement());
}

#[test]
fn test_delete_basic() {
    let qb = delete("users").eq("id", 1i64);
    assert_eq!(qb.build().unwrap(), "DELETE FROM users WHERE id = 1");
}

#[test]
fn test_delete_without_where_is_rejected() {
    let err = delete("users").build().unwrap_err();
    assert!(err.is_unsafe_statement());
    let err = delete("users").build_prepared().unwrap_err();
    assert!(err.is_unsafe_statement());
}

#[test]
fn test_delete_reset_clears_where() {
    let mut qb = delete("users").eq("id", 1);
    assert!(qb.build().is_ok());
    qb.reset();
    assert!(qb.build().unwrap_err().is_unsafe_statement());
}

#[test]
fn test_paging_mysql() {
    assert_eq!(
        retrieve("t").paging(1, 10).build().unwrap(),
        "SELECT * FROM t LIMIT 0,10"
    );
    assert_eq!(
        retrieve("t").paging(2, 10).build().unwrap(),
        "SELECT * FROM t LIMIT 10,10"
    );
}

#[test]
fn test_paging_offsets() {
    for p in 1..=5u64 {
        for s in 1..=4u64 {
            let sql = retrieve("t")
                .dialect(Dialect::Postgres)
                .paging(p, s)
                .build()
                .unwrap();
            assert_eq!(sql, format!("SELECT * FROM t LIMIT {s} OFFSET {}", (p - 1) * s));
        }
    }
}

#[test]
fn test_paging_offset_saturates() {
    assert_eq!(
        retrieve("t").paging(u64::MAX, 2).build().unwrap(),
        format!("SELECT * FROM t LIMIT {},2", u64::MAX)
    );
    assert_eq!(
        retrieve("t")
            .dialect(Dialect::Postgres)
            .paging(u64::MAX, u64::MAX)
            .build()
            .unwrap(),
        format!("SELECT * FROM t LIMIT {0} OFFSET {0}", u64::MAX)
    );
}

#[test]
fn test_paging_clamps_zero() {
    assert_eq!(
        retrieve("t").paging(0, 0).build().unwrap(),
        "SELECT * FROM t LIMIT 0,1"
    );
}

#[test]
fn test_select_with_join() {
    let qb = retrieve("users u")
        .select("u.*, COUNT(o.id) AS order_count")
        .left_join("orders o", "u.id = o.user_id")
        .eq("u.status", "active")
        .group_by("u.id")
        .having("COUNT(o.id)", Op::Gt, 5i64)
        .order_by_desc("order_count")
        .limit(10);

    let built = qb.build_prepared_for(Dialect::Postgres).unwrap();
    assert_eq!(
        built.sql,
        "SELECT u.*, COUNT(o.id) AS order_count FROM users u \
         LEFT OUTER JOIN orders o ON u.id = o.user_id \
         WHERE u.status = $1 GROUP BY u.id HAVING COUNT(o.id) > $2 \
         ORDER BY order_count DESC LIMIT 10"
    );
    assert_eq!(built.params.len(), 2);
}

#[test]
fn test_join_kinds() {
    let sql = retrieve("a")
        .inner_join("b", "a.id = b.a_id")
        .right_join("c", "a.id = c.a_id")
        .build()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM a INNER JOIN b ON a.id = b.a_id RIGHT OUTER JOIN c ON a.id = c.a_id"
    );
}

#[test]
fn test_order_by_multi_column() {
    let sql = retrieve("t")
        .order_by_asc("a")
        .order_by_desc("b")
        .build()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM t ORDER BY a ASC, b DESC");

    let sql = retrieve("t")
        .order_by_asc("a")
        .order_init("c", true)
        .build()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM t ORDER BY c DESC");
}

#[test]
fn test_count_plain() {
    let qb = retrieve("users").eq("status", "active").paging(3, 10);
    assert_eq!(
        qb.build_count().unwrap(),
        "SELECT COUNT(*) FROM users WHERE status = 'active'"
    );
}

#[test]
fn test_count_grouped_wraps_derived_table() {
    let qb = retrieve("orders")
        .select("user_id, SUM(total)")
        .group_by("user_id")
        .having("SUM(total)", Op::Gt, 100);
    assert_eq!(
        qb.build_count().unwrap(),
        "SELECT COUNT(*) FROM (SELECT user_id, SUM(total) FROM orders GROUP BY user_id HAVING SUM(total) > 100) AS t"
    );
}

#[test]
fn test_count_grouped_keeps_having_alias() {
    let qb = retrieve("orders")
        .select("user_id, COUNT(*) AS cnt")
        .group_by("user_id")
        .having("cnt", Op::Gt, 1);
    assert_eq!(
        qb.build_count().unwrap(),
        "SELECT COUNT(*) FROM (SELECT user_id, COUNT(*) AS cnt FROM orders GROUP BY user_id HAVING cnt > 1) AS t"
    );
    let built = qb.build_count_prepared_for(Dialect::Postgres).unwrap();
    assert_eq!(
        built.sql(),
        "SELECT COUNT(*) FROM (SELECT user_id, COUNT(*) AS cnt FROM orders GROUP BY user_id HAVING cnt > $1) AS t"
    );
}

#[test]
fn test_count_and_select_share_filter() {
    let qb = retrieve("users").eq("status", "active").limit(5);
    let count = qb.build_count_prepared_for(Dialect::Postgres).unwrap();
    let page = qb.build_prepared_for(Dialect::Postgres).unwrap();
    assert_eq!(count.params, page.params);
    assert!(page.sql.starts_with("SELECT * FROM users WHERE status = $1"));
}

#[test]
fn test_where_group_and_or() {
    let qb = retrieve("users").eq("status", "active").where_group(
        Connective::And,
        ExprGroup::new()
            .and("role", Op::Eq, "admin")
            .or("role", Op::Eq, "owner"),
    );
    assert_eq!(
        qb.build().unwrap(),
        "SELECT * FROM users WHERE status = 'active' AND (role = 'admin' OR role = 'owner')"
    );
}

#[test]
fn test_or_where_and_where_init() {
    let qb = retrieve("t").eq("a", 1).or_where("b", Op::Eq, 2);
    assert_eq!(qb.build().unwrap(), "SELECT * FROM t WHERE a = 1 OR b = 2");

    let qb = qb.where_init("c", Op::Ne, 3);
    assert_eq!(qb.build().unwrap(), "SELECT * FROM t WHERE c <> 3");
}

#[test]
fn test_in_values_and_between() {
    let qb = retrieve("t")
        .in_values("id", [1, 2, 3])
        .between("score", 10, 20);
    assert_eq!(
        qb.build().unwrap(),
        "SELECT * FROM t WHERE id IN (1,2,3) AND score BETWEEN 10 AND 20"
    );
    let built = qb.build_prepared_for(Dialect::Postgres).unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM t WHERE id IN ($1,$2,$3) AND score BETWEEN $4 AND $5"
    );
}

#[test]
fn test_temporal_condition_in_builder() {
    let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let sql = retrieve("events").ge("happened", day).build().unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM events WHERE DATE_FORMAT(happened,'%Y%m%d%H%i%s') >= '20240229000000'"
    );
}

#[test]
fn test_invalid_condition_surfaces_from_build() {
    let err = retrieve("t").like("age", 5).build().unwrap_err();
    assert!(matches!(err, DbError::InvalidCondition { .. }));
}

#[test]
fn test_distinct_select_and_count() {
    let qb = retrieve("t").select("city").distinct();
    assert_eq!(qb.build().unwrap(), "SELECT DISTINCT city FROM t");
    assert_eq!(
        qb.build_count().unwrap(),
        "SELECT COUNT(*) FROM (SELECT DISTINCT city FROM t) AS t"
    );
}

#[test]
fn test_retrieve_reset() {
    let mut qb = retrieve("t").select("a").eq("a", 1).order_by_asc("a").limit(3);
    qb.reset();
    assert_eq!(qb.build().unwrap(), "SELECT * FROM t");
}

#[test]
fn test_postgres_placeholders_span_set_and_where() {
    let built = update("t")
        .dialect(Dialect::Postgres)
        .set("a", 1)
        .set("b", 2)
        .eq("id", 3)
        .or_where("id", Op::In, vec![4, 5])
        .build_prepared()
        .unwrap();
    assert_eq!(
        built.sql,
        "UPDATE t SET a = $1, b = $2 WHERE id = $3 OR id IN ($4,$5)"
    );
    assert_eq!(built.params.len(), 5);
}

#[test]
fn test_postgres_literal_escaping() {
    let sql = create("t")
        .dialect(Dialect::Postgres)
        .set("name", "O'Neil")
        .set("ok", true)
        .build()
        .unwrap();
    assert_eq!(sql, "INSERT INTO t (name, ok) VALUES ('O''Neil', TRUE)");
}
