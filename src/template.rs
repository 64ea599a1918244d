use regex::{Captures, Regex};
use std::collections::HashMap;

/// Named values available to `{name}` placeholders.
pub(crate) type Values<'a> = HashMap<&'a str, String>;

/// Shell quoting in effect where a placeholder appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Quoting {
    Unquoted,
    Single,
    Double,
}

impl Quoting {
    /// The quoting in effect after `text`, starting from `self`.
    fn after(self, text: &str) -> Self {
        let mut quoting = self;
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            quoting = match (quoting, c) {
                (Quoting::Unquoted | Quoting::Double, '\\') => {
                    chars.next();
                    quoting
                }
                (Quoting::Unquoted, '\'') => Quoting::Single,
                (Quoting::Unquoted, '"') => Quoting::Double,
                (Quoting::Single, '\'') | (Quoting::Double, '"') => Quoting::Unquoted,
                _ => quoting,
            };
        }
        quoting
    }
}

fn placeholder() -> Regex {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regular expression")
}

/** Substitute `{name}` placeholders in a template.

Each placeholder whose name is a key of `values` is replaced by the value.
Every other brace-enclosed text is left exactly as written so that shell
syntax such as `${HOME}` or `{a,b}` survives for the shell to expand when
the job runs.
*/
pub(crate) fn substitute(template: &str, values: &Values<'_>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Substitute placeholders with values that depend on the surrounding quoting.
///
/// `replace` receives the placeholder name and the shell quoting in effect
/// where it appears. Placeholders for which it returns `None` are left as
/// written.
///
/// # Errors
/// The first error returned by `replace`.
///
pub(crate) fn try_substitute_quoted<F, E>(template: &str, mut replace: F) -> Result<String, E>
where
    F: FnMut(&str, Quoting) -> Result<Option<String>, E>,
{
    let mut result = String::with_capacity(template.len());
    let mut quoting = Quoting::Unquoted;
    let mut last = 0;

    for caps in placeholder().captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let before = &template[last..whole.start()];
        quoting = quoting.after(before);
        result.push_str(before);

        match replace(&caps[1], quoting)? {
            Some(value) => result.push_str(&value),
            None => result.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    result.push_str(&template[last..]);

    Ok(result)
}
