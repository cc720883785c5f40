//! RemoteSQL output: one fresh connection per dispatch, no shared pool
//! (spec §4.B.5).

use std::collections::BTreeMap;

use sqlx::{Connection, Executor, PgConnection};

use re_core::rule::Output;
use re_core::value::Value;

pub async fn dispatch(output: &Output, mapping: &BTreeMap<String, Value>) -> Result<(), String> {
    let Output::RemoteSql {
        host,
        port,
        user,
        password,
        database,
        table,
        ..
    } = output
    else {
        return Err("dispatch::sql::dispatch called with a non-RemoteSql output".to_string());
    };

    if mapping.is_empty() {
        return Err("remote sql mapping is empty".to_string());
    }

    let url = format!("postgres://{user}:{password}@{host}:{port}/{database}");
    let mut conn = PgConnection::connect(&url)
        .await
        .map_err(|e| format!("connect failed: {e}"))?;

    conn.execute("SELECT 1")
        .await
        .map_err(|e| format!("ping failed: {e}"))?;

    let columns: Vec<&String> = mapping.keys().collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        placeholders.join(", "),
    );

    let mut query = sqlx::query(&sql);
    for column in &columns {
        query = bind_value(query, &mapping[*column]);
    }

    let result = query.execute(&mut conn).await;
    let _ = conn.close().await;

    result
        .map(|_| ())
        .map_err(|e| format!("insert into {table} failed: {e}"))
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Nil => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => query.bind(*n),
        Value::Text(s) => query.bind(s.as_str()),
        Value::List(_) | Value::Mapping(_) => query.bind(value.to_json()),
    }
}
