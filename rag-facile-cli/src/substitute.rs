//! Literal-to-placeholder substitution.
//!
//! All literals are matched in a single left-to-right pass. Where several
//! literals match at the same position, the one declared first wins.
//! Inserted placeholders are never rescanned.

use regex::{Captures, Regex};

use crate::error::CliResult;

pub struct Substitution {
    pattern: Option<Regex>,
    replacements: Vec<String>,
}

impl Substitution {
    /// Build from ordered `(literal, placeholder)` pairs. Empty literals are ignored.
    pub fn new<L, P>(mappings: impl IntoIterator<Item = (L, P)>) -> CliResult<Self>
    where
        L: AsRef<str>,
        P: Into<String>,
    {
        let mut alternatives = Vec::new();
        let mut replacements = Vec::new();
        for (literal, placeholder) in mappings {
            let literal = literal.as_ref();
            if literal.is_empty() {
                continue;
            }
            // Leftmost-first alternation gives declaration-order priority
            alternatives.push(format!("({})", regex::escape(literal)));
            replacements.push(placeholder.into());
        }

        let pattern = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&alternatives.join("|"))?)
        };

        Ok(Self {
            pattern,
            replacements,
        })
    }

    pub fn apply(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };

        pattern
            .replace_all(text, |caps: &Captures| {
                (1..caps.len())
                    .find(|&i| caps.get(i).is_some())
                    .map(|i| self.replacements[i - 1].clone())
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declared_mapping_wins() {
        let sub = Substitution::new([
            ("chainlit-chat", "{{ project_name }}"),
            ("chainlit", "{{ framework }}"),
        ])
        .unwrap();
        assert_eq!(
            sub.apply("name = \"chainlit-chat\" # uses chainlit"),
            "name = \"{{ project_name }}\" # uses {{ framework }}"
        );

        // Reversed order: the shorter literal now shadows the longer one
        let sub = Substitution::new([
            ("chainlit", "{{ framework }}"),
            ("chainlit-chat", "{{ project_name }}"),
        ])
        .unwrap();
        assert_eq!(sub.apply("chainlit-chat"), "{{ framework }}-chat");
    }

    #[test]
    fn test_replacements_are_not_rescanned() {
        let sub = Substitution::new([("a", "ab"), ("b", "X")]).unwrap();
        assert_eq!(sub.apply("ab"), "abX");
    }

    #[test]
    fn test_case_sensitive_and_special_characters() {
        let sub = Substitution::new([("You are a helpful assistant.", "{{ system_prompt }}")])
            .unwrap();
        assert_eq!(
            sub.apply("you are a helpful assistant. You are a helpful assistant."),
            "you are a helpful assistant. {{ system_prompt }}"
        );
        // The dot is literal
        assert_eq!(
            sub.apply("You are a helpful assistant!"),
            "You are a helpful assistant!"
        );
    }

    #[test]
    fn test_multibyte_literals() {
        let sub = Substitution::new([("Welcome to Chainlit! 🚀🤖", "{{ welcome_message }}")])
            .unwrap();
        assert_eq!(
            sub.apply("# Welcome to Chainlit! 🚀🤖\n"),
            "# {{ welcome_message }}\n"
        );
    }

    #[test]
    fn test_no_mappings_is_identity() {
        let sub = Substitution::new(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(sub.apply("unchanged"), "unchanged");
    }
}
