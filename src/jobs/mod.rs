//! Job bodies executed by the task orchestrator.
//!
//! Each job is an async function returning the JSON payload stored as the
//! task result. Collaborators arrive through [`JobDeps`] so tests can swap
//! in fakes.

pub mod audio;
pub mod extract;
pub mod sync;
pub mod theme;

use std::sync::Arc;

use crate::collaborators::{
    ArticleFetcher, DeckSynchronizer, SpeechSynthesizer, VocabularyModel,
};
use crate::store::{ThemeRegistry, VocabStore};

/// Everything a job body may need.
#[derive(Clone)]
pub struct JobDeps {
    pub fetcher: Arc<dyn ArticleFetcher>,
    pub model: Arc<dyn VocabularyModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub deck: Arc<dyn DeckSynchronizer>,
    pub vocab: Arc<VocabStore>,
    pub themes: Arc<ThemeRegistry>,
    pub source_lang: String,
    pub target_lang: String,
}
