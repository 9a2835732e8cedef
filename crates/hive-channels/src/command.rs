/// Slash commands every chat adapter understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Drop the chat's session and start a fresh one
    New,
    /// Forget the chat's history but keep the session
    Clear,
    Help,
    Unknown(String),
}

impl ChannelCommand {
    /// Parse `<prefix><name> [args]`. Returns `None` for ordinary chat text.
    ///
    /// A `@botname` suffix on the command (as Telegram sends in groups) is
    /// ignored.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix(prefix)?;
        let name = rest.split_whitespace().next()?;
        let name = name.split('@').next().unwrap_or(name).to_lowercase();

        Some(match name.as_str() {
            "new" => ChannelCommand::New,
            "clear" => ChannelCommand::Clear,
            "help" | "start" => ChannelCommand::Help,
            _ => ChannelCommand::Unknown(name),
        })
    }
}

pub const HELP_TEXT: &str = "Commands:\n\
    new - start a new conversation\n\
    clear - clear conversation history\n\
    help - show this message\n\
    \n\
    Just send a message to chat.";
