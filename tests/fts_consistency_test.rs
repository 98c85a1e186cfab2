mod helpers;

use rusqlite::params;

/// The lexical index must stay in 1:1 correspondence with its base table
/// through arbitrary insert/update/delete interleavings — the triggers do
/// all the work, so this drives them with a deterministic random walk.
#[test]
fn fts_rows_track_base_rows_through_random_ops() {
    let conn = recollect::db::open_memory_database().unwrap();

    let mut live_ids: Vec<i64> = Vec::new();
    let mut seed = 0xC0FFEEu64;

    for step in 0..500 {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let roll = seed % 100;

        if roll < 50 || live_ids.is_empty() {
            conn.execute(
                "INSERT INTO decisions (created_at, decision, project) VALUES (?1, ?2, ?3)",
                params![
                    "2026-03-01T10:00:00Z",
                    format!("decision text step {step} token{}", seed % 1000),
                    format!("proj{}", seed % 5),
                ],
            )
            .unwrap();
            live_ids.push(conn.last_insert_rowid());
        } else if roll < 75 {
            let id = live_ids[(seed as usize / 100) % live_ids.len()];
            conn.execute(
                "UPDATE decisions SET decision = ?1 WHERE id = ?2",
                params![format!("rewritten at step {step} token{}", seed % 1000), id],
            )
            .unwrap();
        } else {
            let idx = (seed as usize / 100) % live_ids.len();
            let id = live_ids.swap_remove(idx);
            conn.execute("DELETE FROM decisions WHERE id = ?1", params![id])
                .unwrap();
        }

        let base: i64 = conn
            .query_row("SELECT COUNT(*) FROM decisions", [], |r| r.get(0))
            .unwrap();
        let indexed: i64 = conn
            .query_row("SELECT COUNT(*) FROM decisions_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(base, indexed, "divergence at step {step}");
    }

    // Every live row is still findable through MATCH, none of the dead ones
    for &id in &live_ids {
        let text: String = conn
            .query_row(
                "SELECT decision FROM decisions WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .unwrap();
        let token = text.split_whitespace().last().unwrap();
        let found: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM decisions_fts WHERE decisions_fts MATCH ?1 AND rowid = ?2",
                params![format!("\"{token}\""), id],
                |r| r.get(0),
            )
            .unwrap();
        assert!(found >= 1, "row {id} missing from index");
    }
}

/// Same correspondence for messages across a session cascade delete.
#[test]
fn cascade_leaves_no_orphan_index_rows() {
    let mut conn = recollect::db::open_memory_database().unwrap();
    helpers::seed_session(&mut conn, "s1", Some("demo"), 10);
    helpers::seed_session(&mut conn, "s2", Some("demo"), 7);

    recollect::repo::sessions::delete_session_cascade(&mut conn, "s1").unwrap();

    let base: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
        .unwrap();
    let indexed: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages_fts", [], |r| r.get(0))
        .unwrap();
    assert_eq!(base, 7);
    assert_eq!(indexed, 7);

    let s1_hits: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE session_ref = 's1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(s1_hits, 0);
}
