//! Many writers at once: per-player serialization, no lost updates, no torn reads.

use std::sync::Arc;
use std::thread;

use arcade_index::{level_for_xp, InMemoryStore, SharedStore};

use crate::support::{key, registration, submission, Harness};

const PLAYERS: usize = 6;
const SUBMISSIONS: usize = 50;

pub fn concurrent_writes_lose_nothing(store: SharedStore) {
    let h = Arc::new(Harness::new(store));
    for p in 0..PLAYERS {
        h.register(&format!("player{p}"), &format!("player{p}"));
    }

    let mut writers = Vec::new();
    // two writers per player so same-key writes really race
    for p in 0..PLAYERS * 2 {
        let h = Arc::clone(&h);
        writers.push(thread::spawn(move || {
            let identity = format!("player{}", p % PLAYERS);
            for i in 0..SUBMISSIONS {
                h.gateway
                    .submit_score(&submission(&identity, "SPEED_CLICKER", i as i64, 7))
                    .unwrap();
            }
        }));
    }

    let reader = {
        let h = Arc::clone(&h);
        thread::spawn(move || {
            for _ in 0..100 {
                for entry in h.engine.global_leaderboard(PLAYERS).unwrap() {
                    assert_eq!(entry.level, level_for_xp(entry.total_xp));
                }
            }
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();

    let per_player = (2 * SUBMISSIONS) as u64;
    for p in 0..PLAYERS {
        let player = h
            .engine
            .directory()
            .get_player(&key(&format!("player{p}")))
            .unwrap();
        assert_eq!(player.games_played, per_player);
        assert_eq!(player.total_xp, per_player * 7);
    }
    let stats = h.engine.global_stats().unwrap();
    assert_eq!(stats.total_games_played, PLAYERS as u64 * per_player);
    assert_eq!(stats.total_xp_earned, PLAYERS as u64 * per_player * 7);
}

pub fn concurrent_registration_counts_once(store: SharedStore) {
    let h = Arc::new(Harness::new(store));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                h.gateway
                    .register_player(&registration("Same_Player", &format!("name_{i}")))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let stats = h.engine.global_stats().unwrap();
    assert_eq!(stats.total_players, 1);
    assert_eq!(h.engine.directory().list_all().unwrap().len(), 1);
}

#[test]
fn memory_concurrent_writes_lose_nothing() {
    concurrent_writes_lose_nothing(Arc::new(InMemoryStore::new()));
}

#[test]
fn memory_concurrent_registration_counts_once() {
    concurrent_registration_counts_once(Arc::new(InMemoryStore::new()));
}
