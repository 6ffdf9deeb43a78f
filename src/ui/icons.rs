//! Shared UI icons.
//!
//! Each icon falls back to a plain-text marker on terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Pipeline indicators
pub static DNA: Emoji<'_, '_> = Emoji("🧬 ", "[Q]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "[ZIP]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
