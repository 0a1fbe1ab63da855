//! Text recognition for results screenshots.

pub mod engine;
pub mod extract;
pub mod players;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, TesseractEngine};
