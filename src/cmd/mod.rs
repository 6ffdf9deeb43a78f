//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `run`           | `Run`                                              |
//! | `config`        | `Config`                                           |
//! | `history`       | `History`                                          |

pub mod config;
pub mod history;
pub mod run;

pub use config::cmd_config;
pub use history::cmd_history;
pub use run::cmd_run;
