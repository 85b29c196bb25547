//! Rolling conversation memory fed back to the model each round.

use slothtop_core::message::{ConversationState, Message, Speaker};
use std::collections::VecDeque;

/// The last `window` user and assistant messages.
///
/// Tool traffic from earlier turns is not kept; only what was said.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    window: usize,
    messages: VecDeque<Message>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            messages: VecDeque::with_capacity(window),
        }
    }

    /// Memory holding the tail of an existing transcript.
    pub fn seeded(conversation: &ConversationState, window: usize) -> Self {
        let mut memory = Self::new(window);
        for turn in conversation.tail(window) {
            let msg = match turn.speaker {
                Speaker::User => Message::user(&turn.text),
                Speaker::Assistant => Message::assistant(&turn.text),
            };
            memory.push(msg);
        }
        memory
    }

    /// Remember one completed exchange.
    pub fn record(&mut self, input: &str, output: &str) {
        self.push(Message::user(input));
        self.push(Message::assistant(output));
    }

    fn push(&mut self, msg: Message) {
        if self.window == 0 {
            return;
        }
        while self.messages.len() >= self.window {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slothtop_core::message::Role;

    #[test]
    fn seeded_from_transcript_tail() {
        let mut conv = ConversationState::new();
        for i in 0..5 {
            conv.push_user("You", format!("q{i}"));
            conv.push_assistant("Slothtop", format!("a{i}"));
        }
        let memory = ConversationMemory::seeded(&conv, 4);
        let contents: Vec<String> = memory.messages().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["q3", "a3", "q4", "a4"]);
        assert_eq!(memory.messages()[0].role, Role::User);
    }

    #[test]
    fn window_rolls() {
        let mut memory = ConversationMemory::new(3);
        memory.record("one", "uno");
        memory.record("two", "dos");
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.messages()[0].content, "uno");
    }

    #[test]
    fn zero_window_remembers_nothing() {
        let mut memory = ConversationMemory::new(0);
        memory.record("hi", "hello");
        assert!(memory.is_empty());
    }
}
