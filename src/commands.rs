//! Slash-command parsing for the terminal front end.
//!
//! Anything that does not start with `/` is a send on the active session.
//! Parsing is separate from execution so the grammar is testable on its own;
//! execution lives in the event loop.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bare text: send on the active session.
    Send(String),
    NewSession,
    /// Close the active session, or tab `N` from the `/tabs` listing.
    Close(Option<usize>),
    /// Switch to tab `N`; overflow sessions are promoted.
    Switch(usize),
    /// Move visible tab `N` to the overflow list.
    Move(usize),
    Tabs,
    Models,
    SetModel(String),
    Attach(Vec<PathBuf>),
    Unattach(u64),
    Rename(String),
    Stop,
    Log(Option<String>),
    Help,
    Quit,
    /// Blank line.
    Noop,
    Unknown(String),
    /// Recognized command with a malformed argument.
    Invalid { usage: &'static str },
}

pub fn parse_input(input: &str) -> Command {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Command::Noop;
    }
    if !trimmed.starts_with('/') {
        return Command::Send(trimmed.to_string());
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match command {
        "/new" => Command::NewSession,
        "/close" => match rest.first() {
            None => Command::Close(None),
            Some(arg) => match parse_tab_number(arg) {
                Some(n) => Command::Close(Some(n)),
                None => Command::Invalid {
                    usage: "/close [tab-number]",
                },
            },
        },
        "/switch" => match rest.first().and_then(|arg| parse_tab_number(arg)) {
            Some(n) => Command::Switch(n),
            None => Command::Invalid {
                usage: "/switch <tab-number>",
            },
        },
        "/move" => match rest.first().and_then(|arg| parse_tab_number(arg)) {
            Some(n) => Command::Move(n),
            None => Command::Invalid {
                usage: "/move <tab-number>",
            },
        },
        "/tabs" => Command::Tabs,
        "/models" => Command::Models,
        "/model" => {
            if rest.is_empty() {
                Command::Invalid {
                    usage: "/model <model-id>",
                }
            } else {
                Command::SetModel(rest.join(" "))
            }
        }
        "/attach" => {
            if rest.is_empty() {
                Command::Invalid {
                    usage: "/attach <file> [...]",
                }
            } else {
                Command::Attach(rest.iter().map(PathBuf::from).collect())
            }
        }
        "/unattach" => match rest.first().and_then(|arg| arg.parse::<u64>().ok()) {
            Some(id) => Command::Unattach(id),
            None => Command::Invalid {
                usage: "/unattach <file-id>",
            },
        },
        "/rename" => {
            if rest.is_empty() {
                Command::Invalid {
                    usage: "/rename <title>",
                }
            } else {
                Command::Rename(rest.join(" "))
            }
        }
        "/stop" => Command::Stop,
        "/log" => Command::Log(rest.first().map(|s| s.to_string())),
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

/// Tab numbers are 1-based in the `/tabs` listing.
fn parse_tab_number(arg: &str) -> Option<usize> {
    arg.parse::<usize>().ok().filter(|&n| n > 0)
}

pub const HELP_TEXT: &str = "\
Commands:
  <text>              Send a message in the active session
  /new                Open a new session
  /close [N]          Close the active session (or tab N)
  /switch N           Switch to tab N (promotes overflow sessions)
  /move N             Move visible tab N to the overflow list
  /tabs               List visible and overflow sessions
  /models             List available models
  /model <id>         Set the active session's model
  /attach <file> ...  Attach files to the next message
  /unattach <id>      Remove a staged attachment
  /rename <title>     Rename the active session
  /stop               Cancel the in-flight response
  /log [file]         Enable transcript logging, or toggle pause
  /quit               Exit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_text_is_a_send() {
        assert_eq!(
            parse_input("  hello there  "),
            Command::Send("hello there".to_string())
        );
        assert_eq!(parse_input("   "), Command::Noop);
    }

    #[test]
    fn tab_commands_take_one_based_numbers() {
        assert_eq!(parse_input("/switch 2"), Command::Switch(2));
        assert_eq!(parse_input("/move 1"), Command::Move(1));
        assert_eq!(parse_input("/close"), Command::Close(None));
        assert_eq!(parse_input("/close 3"), Command::Close(Some(3)));

        assert!(matches!(parse_input("/switch 0"), Command::Invalid { .. }));
        assert!(matches!(parse_input("/switch x"), Command::Invalid { .. }));
        assert!(matches!(parse_input("/switch"), Command::Invalid { .. }));
    }

    #[test]
    fn attach_collects_every_path() {
        assert_eq!(
            parse_input("/attach a.png b.pdf"),
            Command::Attach(vec![PathBuf::from("a.png"), PathBuf::from("b.pdf")])
        );
        assert!(matches!(parse_input("/attach"), Command::Invalid { .. }));
    }

    #[test]
    fn rename_and_model_join_their_arguments() {
        assert_eq!(
            parse_input("/rename Trip planning notes"),
            Command::Rename("Trip planning notes".to_string())
        );
        assert_eq!(
            parse_input("/model anthropic/claude-3.5-sonnet"),
            Command::SetModel("anthropic/claude-3.5-sonnet".to_string())
        );
    }

    #[test]
    fn log_with_and_without_file() {
        assert_eq!(parse_input("/log"), Command::Log(None));
        assert_eq!(
            parse_input("/log chat.md"),
            Command::Log(Some("chat.md".to_string()))
        );
    }

    #[test]
    fn unknown_commands_are_reported_not_sent() {
        assert_eq!(
            parse_input("/frobnicate now"),
            Command::Unknown("/frobnicate".to_string())
        );
    }
}
