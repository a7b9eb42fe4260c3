//! External collaborators behind trait seams.
//!
//! Each collaborator (article fetcher, vocabulary model, speech synthesizer,
//! deck synchronizer) is a trait so job bodies can be exercised against fakes
//! in tests while production wires in the HTTP-backed implementations.

pub mod deck;
pub mod extractor;
pub mod fetcher;
pub mod synthesizer;

pub use deck::{AnkiConnectClient, DeckSynchronizer, SyncOutcome};
pub use extractor::{AnthropicModel, VocabularyModel};
pub use fetcher::{ArticleFetcher, HttpFetcher};
pub use synthesizer::{GoogleTts, SpeechSynthesizer, Synthesis};
