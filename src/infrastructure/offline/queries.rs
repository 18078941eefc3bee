pub const SELECT_RECORD: &str = r#"
    SELECT payload FROM offline_records
    WHERE collection = ?1 AND record_key = ?2
"#;

// 既存キーは seq を保ったまま上書きする
pub const UPSERT_RECORD: &str = r#"
    INSERT INTO offline_records (collection, record_key, payload, updated_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(collection, record_key) DO UPDATE SET
        payload = excluded.payload,
        updated_at = excluded.updated_at
"#;

pub const DELETE_RECORD: &str = r#"
    DELETE FROM offline_records
    WHERE collection = ?1 AND record_key = ?2
"#;

pub const SELECT_COLLECTION: &str = r#"
    SELECT payload FROM offline_records
    WHERE collection = ?1
    ORDER BY seq ASC
"#;

pub const COUNT_COLLECTION: &str = r#"
    SELECT COUNT(*) FROM offline_records
    WHERE collection = ?1
"#;

pub const COUNT_BY_FLAG: &str = r#"
    SELECT COUNT(*) FROM offline_records
    WHERE collection = ?1
      AND COALESCE(json_extract(payload, '$.' || ?2), 0) = ?3
"#;
