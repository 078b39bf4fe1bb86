//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module        | Commands handled                             |
//! |---------------|----------------------------------------------|
//! | `id`          | `Id`                                         |
//! | `lock`        | `Lock`                                       |
//! | `session`     | `Session`                                    |
//! | `reviewer`    | `Reviewer`                                   |
//! | `applicator`  | `Applicator`                                 |
//! | `config`      | `Config`                                     |
//!
//! `context` turns the shared session flags into a store; `output` prints results.

pub mod applicator;
pub mod config;
pub mod context;
pub mod id;
pub mod lock;
pub mod output;
pub mod reviewer;
pub mod session;

pub use applicator::cmd_applicator;
pub use config::cmd_config;
pub use id::cmd_id;
pub use lock::cmd_lock;
pub use reviewer::cmd_reviewer;
pub use session::cmd_session;
