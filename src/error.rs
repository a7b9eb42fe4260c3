//! Error types for vocab-assist.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lexical store and theme registry errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The whole write batch is rejected; nothing is silently dropped.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Distinguish "no such record" from real failures (callers map this to 404).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Task orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    NotFound { id: Uuid },

    #[error("Task {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: crate::tasks::TaskState,
        to: crate::tasks::TaskState,
    },

    #[error("Task {id} was already started")]
    AlreadyStarted { id: Uuid },

    #[error("Task {id} job panicked: {message}")]
    Panicked { id: Uuid, message: String },
}

/// Errors from external collaborators, caught at the job-body boundary.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Could not find article content at {url}")]
    ArticleStructure { url: String },

    #[error("Model request failed: {0}")]
    Model(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Audio synthesis failed for '{lemma}': {reason}")]
    Synthesis { lemma: String, reason: String },

    #[error("Cannot connect to AnkiConnect: {0}")]
    DeckConnection(String),

    #[error("Deck sync error: {0}")]
    Deck(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
