/// Quote a single argument for display, only when it needs it.
///
/// The installer never goes through a shell; this is used to print the
/// package-manager commands it runs so they can be copied and re-run by hand.
///
/// # Examples
///
/// ```
/// use batoms_install::utils::shell::quote;
///
/// assert_eq!(quote("pip"), "pip");
/// assert_eq!(quote("ase>=3.21.0"), "'ase>=3.21.0'");
/// assert_eq!(quote("it's"), "'it'\\''s'");
/// ```
pub fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Render a program and its arguments as one copy-pasteable line
pub fn display_command(program: &str, args: &[impl AsRef<str>]) -> String {
    std::iter::once(quote(program))
        .chain(args.iter().map(|arg| quote(arg.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}
