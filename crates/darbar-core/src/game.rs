use std::collections::{HashMap, VecDeque};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::room::UserId;
use crate::time::epoch_secs;

/// Points awarded per round. Raja and Mantri always score; Chor keeps his
/// haul only when the Sipahi misses; the Sipahi is paid only for a catch.
pub const RAJA_POINTS: i64 = 1000;
pub const MANTRI_POINTS: i64 = 800;
pub const CHOR_POINTS: i64 = 500;
pub const SIPAHI_POINTS: i64 = 600;

/// The log keeps only the most recent entries.
pub const LOG_CAPACITY: usize = 50;

/// The four roles, reshuffled every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Raja,
    Mantri,
    Chor,
    Sipahi,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Raja, Role::Mantri, Role::Chor, Role::Sipahi];

    pub fn label(self) -> &'static str {
        match self {
            Role::Raja => "raja",
            Role::Mantri => "mantri",
            Role::Chor => "chor",
            Role::Sipahi => "sipahi",
        }
    }
}

/// Round phase. Advances role-assignment → guess-made → round-end, then a
/// fresh round restarts the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GamePhase {
    RoleAssignment,
    GuessMade,
    RoundEnd,
}

impl GamePhase {
    pub fn label(self) -> &'static str {
        match self {
            GamePhase::RoleAssignment => "role-assignment",
            GamePhase::GuessMade => "guess-made",
            GamePhase::RoundEnd => "round-end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    System,
    Chat,
}

/// One entry in the room's capped system/chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub text: String,
    pub at: u64,
}

/// A seat in the running game. Fixed for the game's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePlayer {
    pub user_id: UserId,
    pub display_name: String,
}

/// What `end_round` resolved, for the reveal broadcast.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub round: u32,
    pub roles: HashMap<UserId, Role>,
    pub guess: Option<UserId>,
    pub guess_correct: bool,
    pub scores: HashMap<UserId, i64>,
}

/// Role-visibility-safe view of the game, embedded in broadcast snapshots.
/// The role map appears only once the round has been revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicGameState {
    pub phase: GamePhase,
    pub round: u32,
    pub guess: Option<UserId>,
    pub guess_correct: Option<bool>,
    pub revealed: bool,
    pub roles: Option<HashMap<UserId, Role>>,
    pub scores: HashMap<UserId, i64>,
    pub log: Vec<LogEntry>,
}

/// The round state machine for one in-progress room.
///
/// Pure state: every method is synchronous and either applies a full
/// transition or rejects with a typed error leaving the state untouched.
/// Timers, persistence, and broadcasting live in the room actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub phase: GamePhase,
    pub round: u32,
    players: Vec<GamePlayer>,
    roles: HashMap<UserId, Role>,
    guess: Option<UserId>,
    guess_correct: bool,
    revealed: bool,
    scores: HashMap<UserId, i64>,
    log: VecDeque<LogEntry>,
}

impl GameState {
    /// Start a game for exactly four seated players and deal round 1.
    pub fn new(players: Vec<GamePlayer>, rng: &mut impl Rng) -> Self {
        debug_assert_eq!(players.len(), 4);
        let scores = players.iter().map(|p| (p.user_id.clone(), 0)).collect();
        let mut game = Self {
            phase: GamePhase::RoleAssignment,
            round: 0,
            players,
            roles: HashMap::new(),
            guess: None,
            guess_correct: false,
            revealed: false,
            scores,
            log: VecDeque::new(),
        };
        game.begin_round(1, rng);
        game
    }

    pub fn players(&self) -> &[GamePlayer] {
        &self.players
    }

    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        self.roles.get(user_id).copied()
    }

    pub fn scores(&self) -> &HashMap<UserId, i64> {
        &self.scores
    }

    /// Deal roles for round `n`: an unbiased shuffle of the four roles over
    /// the same four seats. `SliceRandom::shuffle` is Fisher–Yates.
    pub fn begin_round(&mut self, n: u32, rng: &mut impl Rng) {
        let mut deck = Role::ALL;
        deck.shuffle(rng);
        self.roles = self
            .players
            .iter()
            .zip(deck)
            .map(|(p, role)| (p.user_id.clone(), role))
            .collect();
        self.round = n;
        self.guess = None;
        self.guess_correct = false;
        self.revealed = false;
        self.phase = GamePhase::RoleAssignment;
        self.push_system(format!("Round {n}: roles have been dealt"));
    }

    /// Record the Sipahi's guess and resolve it against the Chor's seat.
    /// Roles stay hidden; a second guess before the reveal overwrites the
    /// first.
    pub fn sipahi_guess(&mut self, requester: &str, suspect: &str) -> Result<(), DomainError> {
        if self.role_of(requester) != Some(Role::Sipahi) {
            return Err(DomainError::NotSipahi);
        }
        if self.phase == GamePhase::RoundEnd {
            return Err(DomainError::InvalidPhase {
                action: "sipahi-guess",
                phase: self.phase.label(),
            });
        }
        if self.role_of(suspect).is_none() {
            return Err(DomainError::NotMember);
        }

        self.guess_correct = self.role_of(suspect) == Some(Role::Chor);
        self.guess = Some(suspect.to_string());
        self.phase = GamePhase::GuessMade;
        Ok(())
    }

    /// Score the round and reveal the roles. Only the room host or the seat
    /// holding Raja may end a round; a missing guess counts as a miss.
    pub fn end_round(&mut self, requester: &str, host_id: &str) -> Result<RoundOutcome, DomainError> {
        if requester != host_id && self.role_of(requester) != Some(Role::Raja) {
            return Err(DomainError::NotAuthorizedToEndRound);
        }
        if self.phase == GamePhase::RoundEnd {
            return Err(DomainError::InvalidPhase {
                action: "end-round",
                phase: self.phase.label(),
            });
        }

        for (user_id, role) in &self.roles {
            let delta = match role {
                Role::Raja => RAJA_POINTS,
                Role::Mantri => MANTRI_POINTS,
                Role::Chor if !self.guess_correct => CHOR_POINTS,
                Role::Sipahi if self.guess_correct => SIPAHI_POINTS,
                _ => 0,
            };
            *self.scores.entry(user_id.clone()).or_insert(0) += delta;
        }

        self.revealed = true;
        self.phase = GamePhase::RoundEnd;

        let verdict = match (&self.guess, self.guess_correct) {
            (None, _) => "the sipahi never guessed",
            (Some(_), true) => "the sipahi caught the chor",
            (Some(_), false) => "the sipahi accused the wrong player",
        };
        self.push_system(format!("Round {} over: {verdict}", self.round));

        Ok(RoundOutcome {
            round: self.round,
            roles: self.roles.clone(),
            guess: self.guess.clone(),
            guess_correct: self.guess_correct,
            scores: self.scores.clone(),
        })
    }

    /// Append a chat line. Legal in any phase.
    pub fn chat(&mut self, user_id: &str, user_name: &str, text: String) {
        self.push_log(LogEntry {
            kind: LogKind::Chat,
            user_id: Some(user_id.to_string()),
            user_name: Some(user_name.to_string()),
            text,
            at: epoch_secs(),
        });
    }

    pub fn push_system(&mut self, text: String) {
        self.push_log(LogEntry {
            kind: LogKind::System,
            user_id: None,
            user_name: None,
            text,
            at: epoch_secs(),
        });
    }

    fn push_log(&mut self, entry: LogEntry) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(entry);
    }

    /// Build the broadcast-safe view. Roles and guess correctness are
    /// withheld until the round-end reveal.
    pub fn to_public(&self) -> PublicGameState {
        PublicGameState {
            phase: self.phase,
            round: self.round,
            guess: self.guess.clone(),
            guess_correct: self.revealed.then_some(self.guess_correct),
            revealed: self.revealed,
            roles: self.revealed.then(|| self.roles.clone()),
            scores: self.scores.clone(),
            log: self.log.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seats() -> Vec<GamePlayer> {
        ["a", "b", "c", "d"]
            .iter()
            .map(|id| GamePlayer {
                user_id: id.to_string(),
                display_name: id.to_uppercase(),
            })
            .collect()
    }

    fn game(seed: u64) -> GameState {
        GameState::new(seats(), &mut StdRng::seed_from_u64(seed))
    }

    fn holder(game: &GameState, role: Role) -> String {
        game.players()
            .iter()
            .map(|p| p.user_id.clone())
            .find(|id| game.role_of(id) == Some(role))
            .unwrap()
    }

    #[test]
    fn roles_are_a_bijection_every_round() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut game = GameState::new(seats(), &mut rng);
        for round in 2..20 {
            game.begin_round(round, &mut rng);
            let mut seen: Vec<Role> = game
                .players()
                .iter()
                .map(|p| game.role_of(&p.user_id).unwrap())
                .collect();
            seen.sort_by_key(|r| r.label());
            let mut all = Role::ALL;
            all.sort_by_key(|r| r.label());
            assert_eq!(seen, all, "round {round} lost the role bijection");
        }
    }

    #[test]
    fn correct_guess_pays_sipahi_not_chor() {
        let mut game = game(1);
        let sipahi = holder(&game, Role::Sipahi);
        let chor = holder(&game, Role::Chor);
        let raja = holder(&game, Role::Raja);
        let mantri = holder(&game, Role::Mantri);

        game.sipahi_guess(&sipahi, &chor).unwrap();
        let outcome = game.end_round(&raja, "host-external").unwrap();

        assert!(outcome.guess_correct);
        assert_eq!(outcome.scores[&raja], RAJA_POINTS);
        assert_eq!(outcome.scores[&mantri], MANTRI_POINTS);
        assert_eq!(outcome.scores[&chor], 0);
        assert_eq!(outcome.scores[&sipahi], SIPAHI_POINTS);
    }

    #[test]
    fn wrong_guess_pays_chor_not_sipahi() {
        let mut game = game(2);
        let sipahi = holder(&game, Role::Sipahi);
        let chor = holder(&game, Role::Chor);
        let mantri = holder(&game, Role::Mantri);

        game.sipahi_guess(&sipahi, &mantri).unwrap();
        let outcome = game.end_round(&holder(&game, Role::Raja), "host").unwrap();

        assert!(!outcome.guess_correct);
        assert_eq!(outcome.scores[&chor], CHOR_POINTS);
        assert_eq!(outcome.scores[&sipahi], 0);
    }

    #[test]
    fn absent_guess_counts_as_a_miss() {
        let mut game = game(3);
        let chor = holder(&game, Role::Chor);
        let sipahi = holder(&game, Role::Sipahi);

        let outcome = game.end_round("host", "host").unwrap();
        assert!(!outcome.guess_correct);
        assert!(outcome.guess.is_none());
        assert_eq!(outcome.scores[&chor], CHOR_POINTS);
        assert_eq!(outcome.scores[&sipahi], 0);
    }

    #[test]
    fn score_deltas_differ_between_correct_and_incorrect_rounds() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut game = GameState::new(seats(), &mut rng);

        // Round 1: correct guess.
        let sipahi = holder(&game, Role::Sipahi);
        let chor = holder(&game, Role::Chor);
        game.sipahi_guess(&sipahi, &chor).unwrap();
        game.end_round("host", "host").unwrap();
        let after_round1 = game.scores().clone();

        // Round 2: incorrect guess.
        game.begin_round(2, &mut rng);
        let sipahi2 = holder(&game, Role::Sipahi);
        let chor2 = holder(&game, Role::Chor);
        let wrong = game
            .players()
            .iter()
            .map(|p| p.user_id.clone())
            .find(|id| *id != chor2 && *id != sipahi2)
            .unwrap();
        game.sipahi_guess(&sipahi2, &wrong).unwrap();
        game.end_round("host", "host").unwrap();

        let delta = |id: &str| game.scores()[id] - after_round1.get(id).copied().unwrap_or(0);
        assert_eq!(delta(&holder(&game, Role::Raja)), RAJA_POINTS);
        assert_eq!(delta(&holder(&game, Role::Mantri)), MANTRI_POINTS);
        assert_eq!(delta(&chor2), CHOR_POINTS);
        assert_eq!(delta(&sipahi2), 0);
    }

    #[test]
    fn non_sipahi_guess_is_rejected_and_state_unchanged() {
        let mut game = game(5);
        let raja = holder(&game, Role::Raja);
        let chor = holder(&game, Role::Chor);
        let before = game.to_public();

        assert_eq!(
            game.sipahi_guess(&raja, &chor),
            Err(DomainError::NotSipahi)
        );
        assert_eq!(game.to_public(), before);
    }

    #[test]
    fn reguess_overwrites_before_reveal() {
        let mut game = game(6);
        let sipahi = holder(&game, Role::Sipahi);
        let chor = holder(&game, Role::Chor);
        let other = game
            .players()
            .iter()
            .map(|p| p.user_id.clone())
            .find(|id| *id != chor && *id != sipahi)
            .unwrap();

        game.sipahi_guess(&sipahi, &other).unwrap();
        game.sipahi_guess(&sipahi, &chor).unwrap();
        let outcome = game.end_round("host", "host").unwrap();
        assert!(outcome.guess_correct);
        assert_eq!(outcome.guess.as_deref(), Some(chor.as_str()));
    }

    #[test]
    fn guess_after_reveal_is_a_phase_error() {
        let mut game = game(7);
        let sipahi = holder(&game, Role::Sipahi);
        game.end_round("host", "host").unwrap();

        let err = game.sipahi_guess(&sipahi, "a").unwrap_err();
        assert!(matches!(err, DomainError::InvalidPhase { .. }));
    }

    #[test]
    fn end_round_requires_host_or_raja() {
        let mut game = game(8);
        let chor = holder(&game, Role::Chor);
        assert_eq!(
            game.end_round(&chor, "someone-else").unwrap_err(),
            DomainError::NotAuthorizedToEndRound
        );
        assert_eq!(game.phase, GamePhase::RoleAssignment);

        // The raja can end it without being host.
        let raja = holder(&game, Role::Raja);
        assert!(game.end_round(&raja, "someone-else").is_ok());
    }

    #[test]
    fn double_end_round_is_rejected() {
        let mut game = game(9);
        game.end_round("host", "host").unwrap();
        let err = game.end_round("host", "host").unwrap_err();
        assert!(matches!(err, DomainError::InvalidPhase { .. }));
    }

    #[test]
    fn public_view_hides_roles_until_reveal() {
        let mut game = game(10);
        let public = game.to_public();
        assert!(public.roles.is_none());
        assert!(public.guess_correct.is_none());

        let sipahi = holder(&game, Role::Sipahi);
        let chor = holder(&game, Role::Chor);
        game.sipahi_guess(&sipahi, &chor).unwrap();
        // Guess is visible, its correctness is not.
        let public = game.to_public();
        assert_eq!(public.guess.as_deref(), Some(chor.as_str()));
        assert!(public.guess_correct.is_none());

        game.end_round("host", "host").unwrap();
        let public = game.to_public();
        assert_eq!(public.roles.as_ref().map(|r| r.len()), Some(4));
        assert_eq!(public.guess_correct, Some(true));
    }

    #[test]
    fn log_is_capped() {
        let mut game = game(11);
        for i in 0..(LOG_CAPACITY + 20) {
            game.chat("a", "A", format!("line {i}"));
        }
        let public = game.to_public();
        assert_eq!(public.log.len(), LOG_CAPACITY);
        assert_eq!(public.log.last().unwrap().text, "line 69");
        // Oldest entries (including the round-1 system line) have rolled off.
        assert_eq!(public.log.first().unwrap().text, "line 20");
    }

    #[test]
    fn blob_roundtrip_preserves_hidden_roles() {
        let mut game = game(12);
        let sipahi = holder(&game, Role::Sipahi);
        game.sipahi_guess(&sipahi, "a").ok();

        let blob = serde_json::to_value(&game).unwrap();
        let restored: GameState = serde_json::from_value(blob).unwrap();
        assert_eq!(restored.phase, game.phase);
        assert_eq!(restored.round, game.round);
        for p in game.players() {
            assert_eq!(restored.role_of(&p.user_id), game.role_of(&p.user_id));
        }
    }
}
