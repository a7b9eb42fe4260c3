//! Lexical store — deduplicated vocabulary entries plus the theme registry.

pub mod db;
pub mod themes;
pub mod vocab;

pub use db::LexiconDb;
pub use themes::{sanitize_theme_name, Theme, ThemeRegistry, MAIN_THEME};
pub use vocab::{NewWord, VocabEntry, VocabStats, VocabStore, MAX_EXAMPLES};
