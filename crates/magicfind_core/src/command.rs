//! Administrative `/magicfind` command.

use crate::config::ConfigStore;

/// Permission required for every subcommand.
pub const ADMIN_PERMISSION: &str = "magicfind.admin";

const DENIED_MESSAGE: &str = "\u{a7}cYou don't have permission to use this command!";
const USAGE_MESSAGE: &str = "\u{a7}eUsage: /magicfind reload";
const RELOADED_MESSAGE: &str = "\u{a7}aMagicFindDrops reloaded!";
const UNKNOWN_MESSAGE: &str = "\u{a7}cUnknown subcommand!";

/// Whoever issued the command.
pub trait CommandSender {
    /// Whether the sender holds `permission`.
    fn has_permission(&self, permission: &str) -> bool;

    /// Replies to the sender.
    fn send_message(&self, message: &str);
}

/// What a command invocation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The config was reloaded.
    Reloaded,
    /// The sender lacks [`ADMIN_PERMISSION`].
    Denied,
    /// No subcommand given.
    Usage,
    /// Unrecognized subcommand.
    Unknown,
}

/// Runs `/magicfind <args>` and replies to the sender.
pub fn handle_command(
    sender: &dyn CommandSender,
    args: &[&str],
    store: &ConfigStore,
) -> CommandOutcome {
    if !sender.has_permission(ADMIN_PERMISSION) {
        sender.send_message(DENIED_MESSAGE);
        return CommandOutcome::Denied;
    }

    let Some(subcommand) = args.first() else {
        sender.send_message(USAGE_MESSAGE);
        return CommandOutcome::Usage;
    };

    if subcommand.eq_ignore_ascii_case("reload") {
        store.reload();
        sender.send_message(RELOADED_MESSAGE);
        CommandOutcome::Reloaded
    } else {
        sender.send_message(UNKNOWN_MESSAGE);
        CommandOutcome::Unknown
    }
}
