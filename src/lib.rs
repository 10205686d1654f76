//! # Skyloft 🦋
//!
//! A terminal client and companion service for Bluesky.
//!
//! ## Overview
//!
//! Skyloft reads and writes Bluesky from the terminal. Besides the usual
//! timeline, posting and search, it keeps bookmarks and long-form articles
//! as records in the user's own repository, renders embeds (quotes, images,
//! link cards) to a fixed depth, and talks to a small companion HTTP service
//! for writing assistance, view counts and paid verification badges.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     App (TUI) / CLI                         │
//! │   Event loop, rendering, subcommands                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │   Bookmarks &   │ │       API       │ │  Embed & rich   │
//! │    Articles     │ │                 │ │      text       │
//! │ • App records   │ │ • XRPC + session│ │ • Facets        │
//! │ • Hydration     │ │ • Public API    │ │ • Quote depth   │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │                   │                   │
//!          └───────────────────┴───────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │    Database     │ │      Auth       │ │     Server      │
//! │ • Accounts      │ │ • App passwords │ │ • Bluesky proxy │
//! │ • Post cache    │ │ • Sessions      │ │ • LLM, PayPal   │
//! │ • Drafts        │ │ • AES-GCM file  │ │ • View counts   │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`]: XRPC client, Bluesky session client, public API, app records
//! - [`app`]: TUI application state and event loop
//! - [`articles`]: Long-form articles stored as records
//! - [`assist`]: Writing assistance through an LLM
//! - [`auth`]: Encrypted credential storage
//! - [`bookmarks`]: Bookmarks stored as records
//! - [`companion`]: Client for the companion service
//! - [`config`]: Configuration and secrets
//! - [`db`]: `SQLite` database for accounts, cache, drafts
//! - [`embed`]: Embed model and rendering
//! - [`models`]: Data models (Post, Account, Profile)
//! - [`richtext`]: Facet detection and segmentation
//! - [`server`]: The companion HTTP service
//! - [`theme`]: Theme support via ratatui-themes
//! - [`verification`]: Paid verification badges
//!
//! ## Example
//!
//! ```no_run
//! use skyloft::{Config, app};
//!
//! fn main() -> anyhow::Result<()> {
//!     app::run(Config::load()?)
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/skyloft/0.2.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::similar_names)]
#![allow(clippy::if_same_then_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::branches_sharing_code)]
#![allow(clippy::wrong_self_convention)]
#![allow(clippy::return_self_not_must_use)]

pub mod api;
pub mod app;
pub mod articles;
pub mod assist;
pub mod auth;
pub mod bookmarks;
pub mod companion;
pub mod config;
pub mod db;
pub mod embed;
pub mod models;
pub mod paths;
pub mod richtext;
pub mod server;
pub mod theme;
pub mod verification;

#[cfg(test)]
mod testutil;

// Re-export main types for convenience
pub use app::AppState;
pub use config::{Config, Secrets};
pub use db::Database;
pub use models::{Account, Post};
pub use theme::{Theme, ThemeColors};

// Re-export theme types from ratatui-themes crate
pub use ratatui_themes::{ThemeName, ThemePalette};

/// ASCII logo for the application
pub const LOGO: &str = r"
       __        __       ______
  ___ / /____ __/ /__  __/ _/ /_
 (_-</  '_/ // / / _ \/ _ \/ _/ __/
/___/_/\_\\_, /_/\___/\___/_/ \__/
         /___/
";

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository URL
pub const REPO_URL: &str = "https://github.com/skyloft-social/skyloft";
