use thiserror::Error;

/// Typed rejections for coordinator and game operations.
///
/// Every variant except `Storage` is a strict no-op on room state: the
/// operation is refused before anything is mutated. `Storage` wraps a
/// persistence failure and is the only variant a caller may retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("room not found")]
    RoomNotFound,
    #[error("game already in progress")]
    GameInProgress,
    #[error("room is full")]
    RoomFull,
    #[error("room is private")]
    PrivateRoomDenied,
    #[error("not authorized to act for this player")]
    Unauthorized,
    #[error("only the host can do that")]
    NotHost,
    #[error("a game needs exactly {expected} players, room has {actual}")]
    WrongPlayerCount { expected: usize, actual: usize },
    #[error("all players must be ready")]
    PlayersNotReady,
    #[error("only the sipahi can guess")]
    NotSipahi,
    #[error("only the host or the raja can end the round")]
    NotAuthorizedToEndRound,
    #[error("no game is active in this room")]
    GameNotActive,
    #[error("{action} is not valid in the {phase} phase")]
    InvalidPhase {
        action: &'static str,
        phase: &'static str,
    },
    #[error("player is not a member of this room")]
    NotMember,
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Whether a client may usefully retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
