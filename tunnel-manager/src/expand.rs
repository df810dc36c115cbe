//! Environment and home-directory expansion for tunnel command lines
//!
//! Mirrors shell semantics closely enough for log paths and
//! `$MAHIMAHI_BASE`: `$NAME` and `${NAME}` are replaced when the variable is
//! set and left untouched otherwise.

const LOG_FLAGS: [&str; 2] = ["--ingress-log", "--egress-log"];

/// Expand `$NAME` / `${NAME}` references using `lookup`
pub fn expand_vars_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

/// Expand variables from the process environment
pub fn expand_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

/// Expand a leading `~` to `home`
pub fn expand_home_with(path: &str, home: Option<&str>) -> String {
    match (path, home) {
        ("~", Some(home)) => home.to_string(),
        (p, Some(home)) if p.starts_with("~/") => format!("{}{}", home.trim_end_matches('/'), &p[1..]),
        (p, _) => p.to_string(),
    }
}

/// Expand the arguments of a tunnel endpoint command: variables everywhere,
/// the home directory in the values of the log-path flags
pub fn expand_tunnel_args(args: &[String]) -> Vec<String> {
    let home = std::env::var("HOME").ok();
    args.iter()
        .map(|arg| expand_tunnel_arg(&expand_vars(arg), home.as_deref()))
        .collect()
}

fn expand_tunnel_arg(arg: &str, home: Option<&str>) -> String {
    if let Some((flag, value)) = arg.split_once('=') {
        if LOG_FLAGS.iter().any(|f| flag.contains(f)) {
            return format!("{flag}={}", expand_home_with(value, home));
        }
    }
    arg.to_string()
}
