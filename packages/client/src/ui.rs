//! Terminal output for the interactive client.

use std::io::Write;

use crate::{
    dto::{ChatMessage, GroupMessage, TypingNotice},
    formatter::MessageFormatter,
    handler::EventHandler,
    types::{GroupId, UserId},
};

/// Redisplay the prompt after printing asynchronous output
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}

/// Prompt shown by the interactive client
pub fn prompt_for(user_id: UserId) -> String {
    format!("user {}> ", user_id)
}

/// Handler printing inbound events to stdout
pub struct ConsoleHandler {
    user_id: UserId,
    prompt: String,
}

impl ConsoleHandler {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            prompt: prompt_for(user_id),
        }
    }

    fn print(&self, text: &str) {
        print!("{}", text);
        redisplay_prompt(&self.prompt);
    }
}

impl EventHandler for ConsoleHandler {
    fn on_message_received(&self, message: ChatMessage) {
        self.print(&MessageFormatter::format_direct_message(
            &message,
            self.user_id,
        ));
    }

    fn on_group_message_received(&self, group_id: GroupId, messages: Vec<GroupMessage>) {
        self.print(&MessageFormatter::format_group_update(group_id, &messages));
    }

    fn on_typing_received(&self, typing: TypingNotice) {
        self.print(&MessageFormatter::format_typing(&typing));
    }
}
