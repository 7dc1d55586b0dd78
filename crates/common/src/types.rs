//! Common data types for Connectivity Broker components.
//!
//! Game and user identifiers come from the upstream lobby system, which
//! issues plain numeric ids; they are aliased rather than wrapped so that
//! repository queries and wire messages use them directly.

/// Identifier of a game as issued by the lobby system.
pub type GameId = i64;

/// Identifier of a player as issued by the lobby system.
pub type UserId = i64;

/// Authorization context extracted from the caller's token by the web layer.
///
/// `game_id` is `None` for legacy lobby tokens that carry no game scope;
/// such tokens may join any game. Tokens minted per game carry the scoped
/// id and may only join that game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameClaims {
    /// The authenticated user.
    pub user_id: UserId,
    /// Game scope of the token, if any.
    pub game_id: Option<GameId>,
}

impl GameClaims {
    /// Claims scoped to a single game.
    #[must_use]
    pub fn scoped(user_id: UserId, game_id: GameId) -> Self {
        Self {
            user_id,
            game_id: Some(game_id),
        }
    }

    /// Claims of a legacy token without a game scope.
    #[must_use]
    pub fn unscoped(user_id: UserId) -> Self {
        Self {
            user_id,
            game_id: None,
        }
    }
}
