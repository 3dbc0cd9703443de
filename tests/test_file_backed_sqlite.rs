mod common;

use common::clear_thread_transaction;
use pooled_datasource::{ConnectionProperties, DataSource, PoolConfigBuilder, SqliteDriver};

/// Unlike the in-memory tests elsewhere in this suite, a file-backed
/// database is durable across independent `DataSource`s pointed at the same
/// path, which is what actually exercises `SqliteDriver`'s file-open branch.
#[test]
fn file_backed_database_persists_across_datasources() {
    clear_thread_transaction();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pooled.db");
    let props = ConnectionProperties {
        url: path.to_str().unwrap().to_string(),
        ..Default::default()
    };
    let config = PoolConfigBuilder::new().pool_size(1).finish().unwrap();

    {
        let ds = DataSource::new(SqliteDriver, props.clone(), config.clone());
        let mut conn = ds.get_connection().unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)").unwrap();
        conn.execute("INSERT INTO t (v) VALUES (7)").unwrap();
    }

    let ds = DataSource::new(SqliteDriver, props, config);
    let mut conn = ds.get_connection().unwrap();
    let v = conn.query_scalar_i64("SELECT v FROM t").unwrap();
    assert_eq!(v, 7);
}
