//! Parsing of terminal input lines.
//!
//! Lines starting with `/` are commands; everything else is chat text.

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text to send to the room.
    Say(String),
    /// Pin the n-th visible message (1-based).
    Pin(usize),
    Unpin,
    Leave,
    /// Join the last room again, e.g. after a failure.
    Rejoin,
    Quit,
    Help,
    /// Blank line; nothing to do.
    Empty,
    /// A `/command` that is not recognised or has bad arguments.
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  /pin <n>   pin message number n
  /unpin     clear the pinned message
  /leave     leave the room
  /rejoin    join the last room again
  /quit      exit
anything else is sent to the room";

pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Say(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (name, arg) {
        ("pin", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Input::Pin(n),
            _ => Input::Invalid(format!("/pin expects a message number, got {n:?}")),
        },
        ("pin", None) => Input::Invalid("/pin expects a message number".to_string()),
        ("unpin", _) => Input::Unpin,
        ("leave", _) => Input::Leave,
        ("rejoin", _) => Input::Rejoin,
        ("quit" | "exit", _) => Input::Quit,
        ("help" | "?", _) => Input::Help,
        (other, _) => Input::Invalid(format!("unknown command /{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_said_verbatim() {
        assert_eq!(parse_input("  hello there\n"), Input::Say("  hello there".to_string()));
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert_eq!(parse_input("   \t"), Input::Empty);
    }

    #[test]
    fn test_pin_parses_positive_index() {
        assert_eq!(parse_input("/pin 3"), Input::Pin(3));
        assert!(matches!(parse_input("/pin 0"), Input::Invalid(_)));
        assert!(matches!(parse_input("/pin x"), Input::Invalid(_)));
        assert!(matches!(parse_input("/pin"), Input::Invalid(_)));
    }

    #[test]
    fn test_session_commands() {
        assert_eq!(parse_input("/unpin"), Input::Unpin);
        assert_eq!(parse_input("/leave"), Input::Leave);
        assert_eq!(parse_input("/rejoin"), Input::Rejoin);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/help"), Input::Help);
    }

    #[test]
    fn test_unknown_command_is_invalid() {
        assert_eq!(
            parse_input("/dance"),
            Input::Invalid("unknown command /dance".to_string())
        );
    }
}
