use pi_core::{
    Clock, Database, DataLayer, FixedClock, MemoryCache, PiConfig, UserDataRecord, UserValue,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::NamedTempFile;

const T0: i64 = 1_700_000_000;

fn open(path: &std::path::Path, clock: Arc<FixedClock>) -> anyhow::Result<DataLayer> {
    let mut config = PiConfig::default();
    config.database.path = path.to_path_buf();
    config.module.default = "user".into();
    Ok(DataLayer::assemble(
        Database::open(path)?,
        Arc::new(MemoryCache::new()),
        &config,
        clock,
    )?)
}

#[test]
fn values_persist_across_connections() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    let clock = Arc::new(FixedClock::at(T0));
    {
        let layer = open(file.path(), clock.clone())?;
        assert!(layer.user_data.set(1, "visits", 3, None, 0));
        assert!(layer.user_data.set(1, "prefs", json!({"lang": "en"}), None, 0));
        assert!(layer.user_data.set(1, "motto", "carpe diem", Some("profile"), 0));
    }

    let layer = open(file.path(), clock)?;
    let store = &layer.user_data;
    assert_eq!(store.get(1, "visits", None)?, Some(UserValue::Int(3)));
    assert_eq!(
        store.get(1, "prefs", None)?,
        Some(UserValue::Structured(json!({"lang": "en"})))
    );
    assert_eq!(
        store.get(1, "motto", Some("profile"))?,
        Some(UserValue::Scalar("carpe diem".into()))
    );
    assert_eq!(store.get(1, "motto", None)?, None);
    Ok(())
}

#[test]
fn ttl_expiry_and_gc() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    let clock = Arc::new(FixedClock::at(T0));
    let layer = open(file.path(), clock.clone())?;
    let store = &layer.user_data;

    assert!(store.set_record(&UserDataRecord {
        uid: 5,
        name: "session".into(),
        value: UserValue::Scalar("abc".into()),
        module: None,
        ttl: 30,
    }));
    assert!(store.increment(5, "strikes", 1, None, 0));
    assert!(store.increment(5, "strikes", 1, None, 0));

    clock.advance(31);
    assert_eq!(clock.now(), T0 + 31);
    assert_eq!(store.get(5, "session", None)?, None);
    assert_eq!(store.get(5, "strikes", None)?, Some(UserValue::Int(2)));

    assert_eq!(store.gc()?, 1);
    assert_eq!(store.gc()?, 0);
    Ok(())
}

#[test]
fn bulk_reads_and_deletes() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    let layer = open(file.path(), Arc::new(FixedClock::at(T0)))?;
    let store = &layer.user_data;
    for uid in 1..=4 {
        assert!(store.set_int(uid, "score", uid * 10, None, 0));
    }

    let scores = store.get_many(&[1, 2, 3, 9], "score", None)?;
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[&2], UserValue::Int(20));

    assert!(store.delete(&[1, 2], "score", None));
    let left = store.get_many(&[1, 2, 3, 4], "score", None)?;
    assert_eq!(left.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
    Ok(())
}

#[test]
fn gc_sweeps_more_rows_than_one_statement_can_bind() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    let layer = open(file.path(), Arc::new(FixedClock::at(T0)))?;
    let expired = 40_000_i64;
    layer.db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO user_data (uid, module, name, expire, value_int)
                 VALUES (?1, 'user', 'token', ?2, 1)",
            )?;
            for uid in 0..expired {
                stmt.execute(rusqlite::params![uid, T0 - 10])?;
            }
        }
        tx.commit()?;
        Ok(())
    })?;
    assert!(layer.user_data.set(expired, "token", 1, None, 0));

    assert_eq!(layer.user_data.gc()?, expired as usize);
    assert_eq!(layer.user_data.get(expired, "token", None)?, Some(UserValue::Int(1)));
    Ok(())
}
