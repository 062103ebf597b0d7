//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Category | The category forest | `category add`, `category move`, `category tree` |
//! | Ad | Listings and their lifecycle | `ad add`, `ad publish`, `ad expire` |
//! | Tag | Free-form labels | `tag add`, `tag popular`, `tag related` |
//! | Cache | The SQLite index | `cache status`, `cache rebuild` |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON; failures print
//!   `{"success": false, "code": ..., "error": ...}`
//!
//! ## Acting User
//!
//! Mutations are recorded against the configured user; `--as <user>`
//! overrides it for one command. Only an ad's owner may change it.
//!
//! ## Logging
//!
//! Logs go to stderr. Use `--verbose` (or `-v`) for debug output, or set
//! `ADBOARD_LOG` to an `EnvFilter` directive:
//! ```bash
//! ADBOARD_LOG=adboard=debug adboard ad expire
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod category;
mod ad;
mod tag;
mod cache_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
