use std::time::Duration;

pub const TYPE_DELAY: Duration = Duration::from_millis(100);
pub const HOLD_DELAY: Duration = Duration::from_millis(2000);
pub const ERASE_DELAY: Duration = Duration::from_millis(50);

pub const PROMPTS: &[&str] = &[
    "Cooking recipe",
    "Help in homework",
    "Why is this happening?",
    "Write me code...",
    "Talk to me...",
    "What's up...",
    "Tell me a fun fact",
    "Best movies to watch",
    "Explain AI in simple words",
    "Suggest me a project idea",
    "Motivate me today",
    "What can I learn new?",
    "Tell me a joke",
    "Give me life advice",
    "What's trending today?",
    "Translate this to French",
    "Summarize this article",
    "Is time travel possible?",
    "Teach me something cool",
    "Debug this error",
    "Write a poem",
    "Generate a startup idea",
    "Tell me about black holes",
    "Create a story with me",
    "Give me a workout plan",
    "Make a to-do list",
    "What's the future of AI?",
    "Best places to travel",
    "Write an email for me",
    "How do I start coding?",
    "Plan my day",
    "Give me a fun quiz",
    "What is quantum computing?",
    "Give me a random fact",
    "How do I stay focused?",
    "How to meditate?",
    "Write a motivational quote",
    "What are dreams made of?",
    "Let's play a game",
    "Build a website for me",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Typing,
    Erasing,
}

/// Typewriter animation for the message entry placeholder: types a prompt,
/// holds it, erases it, then moves on to the next one.
#[derive(Debug, Clone)]
pub struct TypingPlaceholder {
    prompts: &'static [&'static str],
    index: usize,
    shown: usize,
    phase: Phase,
}

impl Default for TypingPlaceholder {
    fn default() -> Self {
        Self::new(PROMPTS)
    }
}

impl TypingPlaceholder {
    pub fn new(prompts: &'static [&'static str]) -> Self {
        Self {
            prompts,
            index: 0,
            shown: 0,
            phase: Phase::Typing,
        }
    }

    fn current(&self) -> &'static str {
        self.prompts.get(self.index).copied().unwrap_or("")
    }

    pub fn text(&self) -> String {
        self.current().chars().take(self.shown).collect()
    }

    /// Advances one step and returns how long to wait before the next one.
    pub fn tick(&mut self) -> Duration {
        let len = self.current().chars().count();
        match self.phase {
            Phase::Typing => {
                if self.shown < len {
                    self.shown += 1;
                }
                if self.shown >= len {
                    self.phase = Phase::Erasing;
                    HOLD_DELAY
                } else {
                    TYPE_DELAY
                }
            }
            Phase::Erasing => {
                self.shown = self.shown.saturating_sub(1);
                if self.shown == 0 {
                    self.phase = Phase::Typing;
                    if !self.prompts.is_empty() {
                        self.index = (self.index + 1) % self.prompts.len();
                    }
                }
                ERASE_DELAY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: &[&str] = &["hé", "yo!"];

    #[test]
    fn types_holds_erases_and_advances() {
        let mut p = TypingPlaceholder::new(TWO);
        assert_eq!(p.text(), "");

        assert_eq!(p.tick(), TYPE_DELAY);
        assert_eq!(p.text(), "h");
        assert_eq!(p.tick(), HOLD_DELAY);
        assert_eq!(p.text(), "hé");

        assert_eq!(p.tick(), ERASE_DELAY);
        assert_eq!(p.text(), "h");
        assert_eq!(p.tick(), ERASE_DELAY);
        assert_eq!(p.text(), "");

        p.tick();
        assert_eq!(p.text(), "y");
    }

    #[test]
    fn wraps_to_first_prompt() {
        let mut p = TypingPlaceholder::new(TWO);
        // "hé": 2 type + 2 erase, "yo!": 3 type + 3 erase
        for _ in 0..10 {
            p.tick();
        }
        assert_eq!(p.text(), "");
        p.tick();
        assert_eq!(p.text(), "h");
    }

    #[test]
    fn empty_prompt_list_is_inert() {
        let mut p = TypingPlaceholder::new(&[]);
        p.tick();
        p.tick();
        assert_eq!(p.text(), "");
    }

    #[test]
    fn default_prompts_are_non_empty() {
        assert!(PROMPTS.iter().all(|p| !p.is_empty()));
        assert_eq!(TypingPlaceholder::default().text(), "");
    }
}
