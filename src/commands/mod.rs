//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod init_db;
pub mod login;
pub mod status;
pub mod sync;

pub use login::run as login_run;
pub use status::run as status_run;
pub use sync::run as sync_run;
