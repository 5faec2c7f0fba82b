//! Command-line subcommands other than `run`.

pub mod test_notification;

pub use test_notification::TestNotificationArgs;
