use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::blog::Flash;
use crate::db::models::UserId;

/// Identity attached to an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
}

struct SessionEntry {
    user: Option<SessionUser>,
    flashes: Vec<Flash>,
    expires_at: Instant,
    /// Creation order, for evicting the oldest anonymous session
    seq: u64,
}

/// Anonymous sessions only carry flashes between a redirect and the next page.
const ANONYMOUS_TTL: Duration = Duration::from_secs(5 * 60);

/// Cap on flash-only sessions; the oldest is evicted past this.
pub const MAX_ANONYMOUS_SESSIONS: usize = 256;

/// In-memory session table. Lives exactly as long as the process, so every
/// session is invalidated on restart. Tokens are 256-bit random values that
/// mean nothing outside this table.
pub struct SessionStore {
    sessions: HashMap<String, SessionEntry>,
    ttl: Duration,
    next_seq: u64,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
            next_seq: 0,
        }
    }

    /// Start a session, authenticated or anonymous. Returns the token.
    pub fn create(&mut self, user: Option<SessionUser>) -> String {
        self.clear_stale();

        let ttl = if user.is_some() {
            self.ttl
        } else {
            self.evict_anonymous_overflow();
            self.ttl.min(ANONYMOUS_TTL)
        };

        let seq = self.next_seq;
        self.next_seq += 1;

        let token = generate_token();
        self.sessions.insert(
            token.clone(),
            SessionEntry {
                user,
                flashes: Vec::new(),
                expires_at: Instant::now() + ttl,
                seq,
            },
        );
        token
    }

    /// Whether `token` names a live session.
    pub fn is_valid(&self, token: &str) -> bool {
        self.live(token).is_some()
    }

    pub fn user(&self, token: &str) -> Option<SessionUser> {
        self.live(token).and_then(|entry| entry.user.clone())
    }

    /// Queue a flash on an existing session. Returns false if the token is
    /// unknown or expired.
    pub fn push_flash(&mut self, token: &str, flash: Flash) -> bool {
        match self.sessions.get_mut(token) {
            Some(entry) if Instant::now() < entry.expires_at => {
                entry.flashes.push(flash);
                true
            }
            _ => false,
        }
    }

    /// Drain queued flashes. An anonymous session has nothing left once
    /// drained, so it is dropped.
    pub fn take_flashes(&mut self, token: &str) -> Vec<Flash> {
        let Some(entry) = self.sessions.get_mut(token) else {
            return Vec::new();
        };
        if Instant::now() >= entry.expires_at {
            return Vec::new();
        }

        let flashes = std::mem::take(&mut entry.flashes);
        if entry.user.is_none() {
            self.sessions.remove(token);
        }
        flashes
    }

    pub fn remove(&mut self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn live(&self, token: &str) -> Option<&SessionEntry> {
        self.sessions
            .get(token)
            .filter(|entry| Instant::now() < entry.expires_at)
    }

    fn evict_anonymous_overflow(&mut self) {
        let anonymous = self
            .sessions
            .values()
            .filter(|entry| entry.user.is_none())
            .count();
        if anonymous < MAX_ANONYMOUS_SESSIONS {
            return;
        }

        let oldest = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.user.is_none())
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(token, _)| token.clone());
        if let Some(token) = oldest {
            tracing::debug!("Evicting oldest anonymous session");
            self.sessions.remove(&token);
        }
    }

    fn clear_stale(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, entry| now < entry.expires_at);
    }
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
