// ABOUTME: Command module aggregator for the deployctl CLI.
// ABOUTME: One handler per subcommand, sharing the runtime connection helper.

mod clean;
mod deploy;
mod logs;
mod rollback;
mod runtime_connection;
mod status;
mod stop;
mod validate;

pub use clean::clean;
pub use deploy::deploy;
pub use logs::logs;
pub use rollback::rollback;
pub use status::status;
pub use stop::stop;
pub use validate::validate;
