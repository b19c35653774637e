//! Identity state machine.
//!
//! [`IdentityRoster`] is the single source of truth for who is in the
//! session. It is mutated exclusively by the channel actor reacting to
//! gossip messages; everything here is synchronous and pure so the
//! reconciliation semantics can be tested without any runtime.

use std::collections::HashMap;

/// One identity bound to a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallUser {
    /// Stable, process-generated identity token.
    pub user_id: String,
    /// Name chosen at join time.
    pub display_name: String,
    /// Numeric handle assigned by the transport session at join time.
    pub transport_id: u32,
}

/// The identity roster plus session metadata, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    /// Known identities, keyed by user id.
    pub users: HashMap<String, CallUser>,
    /// Soft participant capacity (enforced by the join guard, not here).
    pub max_users: usize,
    /// Earliest session start observed across all announces, epoch
    /// milliseconds. Monotonically non-increasing once set; absent again
    /// only when the roster empties.
    pub session_start_time: Option<i64>,
}

impl ChannelState {
    /// Create an empty state with the given capacity.
    #[must_use]
    pub fn new(max_users: usize) -> Self {
        Self {
            users: HashMap::new(),
            max_users,
            session_start_time: None,
        }
    }

    /// Number of identities currently in the session.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Whether the soft admission limit still has room.
    #[must_use]
    pub fn can_join(&self) -> bool {
        self.users.len() < self.max_users
    }

    /// Resolve a transport id to its identity, if one is bound.
    #[must_use]
    pub fn user_by_transport_id(&self, transport_id: u32) -> Option<&CallUser> {
        self.users.values().find(|u| u.transport_id == transport_id)
    }
}

/// The local peer's own transport binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBinding {
    pub transport_id: u32,
    pub display_name: String,
    /// When the local peer joined, epoch milliseconds.
    pub joined_at: i64,
}

/// Identity state machine.
///
/// Duplicate joins are idempotent overwrites; leaves for unknown users
/// are no-ops. A transport id maps to at most one user id at a time -
/// concurrent claims resolve last-write-wins.
#[derive(Debug)]
pub struct IdentityRoster {
    local_user_id: String,
    state: ChannelState,
    transport_to_user: HashMap<u32, String>,
    local: Option<LocalBinding>,
}

impl IdentityRoster {
    /// Create an empty roster for the given local identity.
    #[must_use]
    pub fn new(local_user_id: String, max_users: usize) -> Self {
        Self {
            local_user_id,
            state: ChannelState::new(max_users),
            transport_to_user: HashMap::new(),
            local: None,
        }
    }

    /// Current published state.
    #[must_use]
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// The local peer's transport binding, if it has joined.
    #[must_use]
    pub fn local(&self) -> Option<&LocalBinding> {
        self.local.as_ref()
    }

    /// Whether the local peer currently holds a transport binding.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.local.is_some()
    }

    /// A peer (possibly the local one, echoed) joined the transport.
    ///
    /// Sets the session start time only if currently absent: joins carry
    /// the joiner's clock, and the earliest observed start wins via
    /// announces, not joins.
    pub fn apply_joined(
        &mut self,
        user_id: &str,
        display_name: &str,
        transport_id: u32,
        timestamp: i64,
    ) {
        self.transport_to_user
            .insert(transport_id, user_id.to_string());

        if user_id == self.local_user_id {
            self.local = Some(LocalBinding {
                transport_id,
                display_name: display_name.to_string(),
                joined_at: timestamp,
            });
        }

        self.state.users.insert(
            user_id.to_string(),
            CallUser {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                transport_id,
            },
        );
        self.state.session_start_time = self.state.session_start_time.or(Some(timestamp));
    }

    /// A peer left the transport. Unknown users are a no-op; an empty
    /// resulting roster resets the whole state - the room ends when empty.
    pub fn apply_left(&mut self, user_id: &str, transport_id: Option<u32>) {
        if user_id == self.local_user_id {
            self.local = None;
        }

        if let Some(tid) = transport_id {
            self.transport_to_user.remove(&tid);
        }

        self.state.users.remove(user_id);
        if self.state.users.is_empty() {
            self.state = ChannelState::new(self.state.max_users);
        }
    }

    /// A peer announced its view in response to a state request.
    ///
    /// Same upsert as a join, but the session start merges as the minimum
    /// of both views: announces arrive from independent peers with
    /// different clocks and different histories.
    pub fn apply_state_announce(
        &mut self,
        user_id: &str,
        display_name: &str,
        transport_id: u32,
        session_start_time: Option<i64>,
    ) {
        self.transport_to_user
            .insert(transport_id, user_id.to_string());

        self.state.users.insert(
            user_id.to_string(),
            CallUser {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                transport_id,
            },
        );
        self.state.session_start_time = match (self.state.session_start_time, session_start_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    /// Translate a transport-layer offline signal into a synthetic leave.
    ///
    /// Returns `false` when the transport id has no identity mapping; the
    /// miss is silently ignored because the identity channel either never
    /// knew the peer or already processed its leave.
    pub fn apply_remote_offline(&mut self, transport_id: u32) -> bool {
        let Some(user_id) = self.transport_to_user.get(&transport_id).cloned() else {
            return false;
        };
        self.apply_left(&user_id, Some(transport_id));
        true
    }

    /// Drop all state, local binding included. Invoked on channel
    /// disconnect so the next connection starts clean.
    pub fn reset(&mut self) {
        self.state = ChannelState::new(self.state.max_users);
        self.transport_to_user.clear();
        self.local = None;
    }
}
