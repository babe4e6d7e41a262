use crate::utils::env::HostEnv;
use std::path::{Path, PathBuf};

/// Expand tilde (~) in paths to actual home directories.
///
/// Supports:
/// - `~` or `~/path` - expands to the home directory from `env`
/// - `~username/path` - expands to the specified user's home directory (Unix)
///
/// Returns `None` when the home directory cannot be determined.
pub fn expand_tilde<P: AsRef<Path>>(path: P, env: &HostEnv) -> Option<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_str()?;

    if !path_str.starts_with('~') {
        return Some(path.to_path_buf());
    }

    let after_tilde = &path_str[1..];

    if after_tilde.is_empty() || after_tilde.starts_with('/') || after_tilde.starts_with('\\') {
        let home = env.home()?;
        let rest = after_tilde.trim_start_matches(['/', '\\']);
        return Some(if rest.is_empty() { home } else { home.join(rest) });
    }

    let username_end = after_tilde.find('/').unwrap_or(after_tilde.len());
    let username = &after_tilde[..username_end];
    let rest = after_tilde[username_end..].trim_start_matches('/');

    user_home(username).map(|home| home.join(rest))
}

#[cfg(unix)]
fn user_home(username: &str) -> Option<PathBuf> {
    use uzers::os::unix::UserExt;

    let user = uzers::get_user_by_name(username)?;
    Some(user.home_dir().to_path_buf())
}

#[cfg(not(unix))]
fn user_home(_username: &str) -> Option<PathBuf> {
    None
}

/// Expand `$VAR`, `${VAR}` and `%VAR%` references.
///
/// Unknown variables are left as written, mirroring shell behaviour for
/// paths copied out of documentation.
pub fn expand_vars(input: &str, env: &HostEnv) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '$' if i + 1 < chars.len() && chars[i + 1] == '{' => {
                if let Some(close) = chars[i + 2..].iter().position(|c| *c == '}') {
                    let name: String = chars[i + 2..i + 2 + close].iter().collect();
                    match env.var(&name) {
                        Some(value) => out.push_str(value),
                        None => out.extend(&chars[i..i + 3 + close]),
                    }
                    i += 3 + close;
                    continue;
                }
            }
            '$' => {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .collect();
                if !name.is_empty() {
                    match env.var(&name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('$');
                            out.push_str(&name);
                        }
                    }
                    i += 1 + name.chars().count();
                    continue;
                }
            }
            '%' => {
                if let Some(close) = chars[i + 1..].iter().position(|c| *c == '%') {
                    let name: String = chars[i + 1..i + 1 + close].iter().collect();
                    if !name.is_empty() && !name.contains(char::is_whitespace) {
                        if let Some(value) = env.var(&name) {
                            out.push_str(value);
                            i += 2 + close;
                            continue;
                        }
                    }
                }
            }
            _ => {}
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// Expand variables then tilde, as a user would expect from a shell
pub fn expand_user_path(input: &str, env: &HostEnv) -> PathBuf {
    let expanded = expand_vars(input, env);
    expand_tilde(&expanded, env).unwrap_or_else(|| PathBuf::from(expanded))
}
