//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `amap` - Signed REST client for the map/places provider
//! - `deepseek` - Chat-completion client for the domestic LLM
//! - `gemini` - generateContent client for the multimodal LLM
//! - `json_extract` - JSON embedded in free-form LLM text
//! - `speech` - Headless transcript speech engine

pub mod amap;
pub mod deepseek;
pub mod gemini;
pub mod json_extract;
pub mod speech;

// Re-export commonly used types
pub use amap::{AmapClient, AmapSdk};
pub use deepseek::DeepSeekClient;
pub use gemini::GeminiClient;
pub use speech::{NoopUnlock, TranscriptSpeech};
