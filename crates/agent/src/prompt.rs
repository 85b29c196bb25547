//! The system prompt.

use slothtop_core::message::Message;

const NAME_PLACEHOLDER: &str = "{name}";

/// Instructional text with an optional `{name}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The system text for an agent called `name`. Templates that never
    /// mention the name get it as a leading sentence.
    pub fn render(&self, name: &str) -> String {
        if self.template.contains(NAME_PLACEHOLDER) {
            self.template.replace(NAME_PLACEHOLDER, name)
        } else {
            format!("Your name is {name}. {}", self.template)
        }
    }

    /// System prompt, then prior conversation, then the new user input.
    pub fn messages(&self, name: &str, history: &[Message], input: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.render(name)));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(input));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slothtop_core::message::Role;

    #[test]
    fn placeholder_substitution() {
        let t = PromptTemplate::new("You are {name}, a desktop helper. {name} is polite.");
        assert_eq!(t.render("Sloth"), "You are Sloth, a desktop helper. Sloth is polite.");
    }

    #[test]
    fn name_prepended_when_absent() {
        let t = PromptTemplate::new("Be brief.");
        assert_eq!(t.render("Slothtop"), "Your name is Slothtop. Be brief.");
    }

    #[test]
    fn message_order() {
        let t = PromptTemplate::new("Hi {name}");
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let msgs = t.messages("S", &history, "now");
        let roles: Vec<Role> = msgs.iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(msgs[3].content, "now");
    }
}
