//! Bot command tokenization: dotted command name, `-x` flags, quoted
//! free-text arguments.

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Dotted name with the `mochi.` prefix stripped, e.g. `whitelist.add`.
    pub name: String,
    pub flags: Vec<String>,
    pub args: Vec<String>,
}

/// Parse one command line. Returns `None` when the input is not a
/// `mochi.*` command at all.
pub fn parse(input: &str) -> Option<ParsedCommand> {
    let mut tokens = tokenize(input).into_iter();
    let head = tokens.next()?;
    let name = head
        .strip_prefix("mochi.")
        .or_else(|| head.strip_prefix("/mochi."))?
        .to_string();
    if name.is_empty() {
        return None;
    }

    let mut flags = Vec::new();
    let mut args = Vec::new();
    for token in tokens {
        if let Some(flag) = token.strip_prefix('-')
            && !flag.is_empty()
            && !flag.chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            flags.push(flag.to_string());
        } else {
            args.push(token);
        }
    }
    Some(ParsedCommand {
        name: resolve_alias(&name),
        flags,
        args,
    })
}

/// Operator-friendly shorthands for the canonical dotted names.
fn resolve_alias(name: &str) -> String {
    match name {
        "wl.add" => "whitelist.add",
        "wl.remove" | "whitelist.rm" | "wl.rm" => "whitelist.remove",
        "wl.list" | "wl" => "whitelist.list",
        "servers" => "server.list",
        "status" => "server.status",
        "kick" => "player.kick",
        "players" => "player.list",
        "cmd" | "exec" => "command.execute",
        other => other,
    }
    .to_string()
}

/// Split on whitespace, honoring double-quoted segments.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.trim().chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                if !in_quotes && current.is_empty() {
                    // Preserve explicitly-empty quoted args.
                    tokens.push(String::new());
                }
            },
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            },
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn basic_command() {
        let cmd = parse("mochi.whitelist.add survival Alice").unwrap();
        assert_eq!(cmd.name, "whitelist.add");
        assert_eq!(cmd.args, vec!["survival", "Alice"]);
        assert!(cmd.flags.is_empty());
    }

    #[test]
    fn non_mochi_input_ignored() {
        assert_eq!(parse("hello there"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("mochi."), None);
    }

    #[test]
    fn slash_prefix_accepted() {
        let cmd = parse("/mochi.server.list").unwrap();
        assert_eq!(cmd.name, "server.list");
    }

    #[test]
    fn flags_are_split_out() {
        let cmd = parse("mochi.token -r survival").unwrap();
        assert_eq!(cmd.name, "token");
        assert_eq!(cmd.flags, vec!["r"]);
        assert_eq!(cmd.args, vec!["survival"]);
    }

    #[test]
    fn negative_numbers_are_not_flags() {
        let cmd = parse("mochi.cmd survival effect give @a speed -1").unwrap();
        assert!(cmd.flags.is_empty());
        assert!(cmd.args.contains(&"-1".to_string()));
    }

    #[test]
    fn quoted_display_names() {
        let cmd = parse(r#"mochi.server.register survival "生存服 Main" Java paper"#).unwrap();
        assert_eq!(cmd.args[1], "生存服 Main");
        assert_eq!(cmd.args.len(), 4);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(parse("mochi.wl.add s A").unwrap().name, "whitelist.add");
        assert_eq!(parse("mochi.servers").unwrap().name, "server.list");
        assert_eq!(parse("mochi.cmd s say hi").unwrap().name, "command.execute");
    }
}
