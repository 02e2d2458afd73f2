//! Comment directives.
//!
//! `//ctxflow:ignore [checker,...] [- reason]` suppresses findings on its own
//! line and on the next one. `//ctxflow:spawner` directly above a function
//! declaration registers the function as a spawner. Directives are line
//! comments with no space after `//`.

use ctxflow_diag::Category;

const PREFIX: &str = "//ctxflow:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Ignore {
        /// `None` suppresses every checker.
        checkers: Option<Vec<Category>>,
        /// Names that are not checkers.
        unknown: Vec<String>,
    },
    Spawner,
}

/// Parse a comment, including its delimiters. Returns `None` for ordinary
/// comments and for unrecognized `//ctxflow:` verbs.
pub fn parse_directive(comment: &str) -> Option<Directive> {
    let rest = comment.trim_end().strip_prefix(PREFIX)?;
    let (verb, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    match verb {
        "spawner" => Some(Directive::Spawner),
        "ignore" => Some(parse_ignore(args)),
        _ => None,
    }
}

fn parse_ignore(args: &str) -> Directive {
    let mut checkers = Vec::new();
    let mut unknown = Vec::new();
    let names = args
        .split_whitespace()
        .take_while(|word| !word.starts_with('-') && !word.starts_with("//"))
        .flat_map(|word| word.split(','))
        .filter(|name| !name.is_empty());
    for name in names {
        match Category::parse(name) {
            Some(category) if category.is_checker() => {
                if !checkers.contains(&category) {
                    checkers.push(category);
                }
            }
            _ => unknown.push(name.to_string()),
        }
    }
    Directive::Ignore {
        checkers: (!checkers.is_empty() || !unknown.is_empty()).then_some(checkers),
        unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ignore_covers_everything() {
        assert_eq!(
            parse_directive("//ctxflow:ignore"),
            Some(Directive::Ignore {
                checkers: None,
                unknown: Vec::new()
            })
        );
        assert_eq!(
            parse_directive("//ctxflow:ignore - fire and forget"),
            Some(Directive::Ignore {
                checkers: None,
                unknown: Vec::new()
            })
        );
    }

    #[test]
    fn checker_lists_accept_commas_and_spaces() {
        assert_eq!(
            parse_directive("//ctxflow:ignore goroutine,errgroup conc - legacy"),
            Some(Directive::Ignore {
                checkers: Some(vec![Category::Goroutine, Category::Errgroup, Category::Conc]),
                unknown: Vec::new()
            })
        );
    }

    #[test]
    fn unknown_names_are_kept() {
        assert_eq!(
            parse_directive("//ctxflow:ignore goroutine,gorotine"),
            Some(Directive::Ignore {
                checkers: Some(vec![Category::Goroutine]),
                unknown: vec!["gorotine".to_string()]
            })
        );
        assert_eq!(
            parse_directive("//ctxflow:ignore syntax"),
            Some(Directive::Ignore {
                checkers: Some(Vec::new()),
                unknown: vec!["syntax".to_string()]
            })
        );
    }

    #[test]
    fn other_comments_are_not_directives() {
        assert_eq!(parse_directive("// ctxflow:ignore"), None);
        assert_eq!(parse_directive("//ctxflow:ignored"), None);
        assert_eq!(parse_directive("/* ctxflow:ignore */"), None);
        assert_eq!(parse_directive("//ctxflow:spawner"), Some(Directive::Spawner));
    }
}
