//! Shared UI icons.
//!
//! Each icon falls back to plain ASCII on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[i] ");

// Deploy stages
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
