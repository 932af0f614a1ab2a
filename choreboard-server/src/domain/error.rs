/// Error taxonomy for all core operations. The web layer maps each variant
/// to exactly one HTTP status; the core itself never retries and never
/// leaves partial effects (every multi-step mutation runs in one
/// transaction).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Malformed input: empty title, negative points, unknown enum value,
    /// empty assignee set, non-CHILD assignee. (400)
    #[error("{0}")]
    Validation(String),

    /// Wrong or missing credentials. Message is uniform so the response
    /// never reveals whether a username exists. (401)
    #[error("invalid credentials")]
    Unauthorized,

    /// Actor role lacks permission, or a CHILD actor is outside their own
    /// scope. (403)
    #[error("not allowed")]
    Forbidden,

    /// Operation attempted from a status that does not permit it. (400)
    #[error("{0}")]
    InvalidState(String),

    /// Referenced entity does not exist. (404)
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation, e.g. duplicate username. (409)
    #[error("{0}")]
    Conflict(String),

    /// Redemption policy: balance below reward cost. (400)
    #[error("not enough points")]
    InsufficientFunds,

    /// Redemption policy: weekly redemption cap reached. (400)
    #[error("weekly limit reached")]
    LimitExceeded,

    /// A state the transition invariants should make impossible, e.g. a
    /// DONE_PENDING chore without a pending actor. (500)
    #[error("internal inconsistency: {0}")]
    Inconsistency(String),

    /// Underlying Diesel failure; aborts the enclosing transaction. (500)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// bcrypt failure while hashing or verifying a password. (500)
    #[error("password hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl DomainError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state<T: Into<String>>(msg: T) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
}
