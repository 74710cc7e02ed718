use std::sync::Arc;

use arcade_index::{
    AggregationEngine, IdentityKey, ManualClock, PlayerDirectory, Registration, ScoreMirror,
    ScoreSubmission, SharedStore, SyncGateway, TrustRelay,
};

/// Gateway and engine sharing one store and one hand-driven clock.
pub struct Harness {
    pub store: SharedStore,
    pub clock: Arc<ManualClock>,
    pub gateway: SyncGateway,
    pub engine: AggregationEngine,
}

impl Harness {
    pub fn new(store: SharedStore) -> Self {
        let clock = Arc::new(ManualClock::new(1_000));
        let gateway = SyncGateway::with_parts(store.clone(), clock.clone(), Arc::new(TrustRelay));
        let engine = AggregationEngine::new(
            store.clone(),
            PlayerDirectory::new(store.clone()),
            ScoreMirror::new(store.clone()),
        );
        Harness {
            store,
            clock,
            gateway,
            engine,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(arcade_index::InMemoryStore::new()))
    }

    pub fn register(&self, identity: &str, name: &str) {
        self.gateway.register_player(&registration(identity, name)).unwrap();
    }

    pub fn submit(&self, identity: &str, game: &str, raw: i64, xp: i64) {
        self.gateway.submit_score(&submission(identity, game, raw, xp)).unwrap();
        self.clock.advance(1);
    }
}

pub fn key(raw: &str) -> IdentityKey {
    IdentityKey::parse(raw).unwrap()
}

pub fn registration(identity: &str, name: &str) -> Registration {
    Registration {
        identity: identity.to_string(),
        display_name: name.to_string(),
        shard_ref: None,
    }
}

pub fn submission(identity: &str, game: &str, raw: i64, xp: i64) -> ScoreSubmission {
    ScoreSubmission {
        identity: identity.to_string(),
        game_type: game.to_string(),
        raw_score: raw,
        xp_earned: xp,
        bonus_data: None,
        shard_ref: None,
        submission_id: None,
    }
}
