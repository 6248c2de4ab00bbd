//! Command-line construction from per-player argument templates.

/// Placeholder replaced by the files to play.
pub const FILES_PLACEHOLDER: &str = "{files}";

/// Split a template into tokens, honoring double quotes.
pub fn split_template(template: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in template.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

/// Quote each file and join with spaces.
pub fn quoted_files(files: &[String]) -> String {
    files
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the argv for a launch.
///
/// A standalone `{files}` token becomes one argument per file. When the
/// placeholder is embedded in a larger token it is replaced by the quoted,
/// space-joined file list.
pub fn build_args(template: &str, files: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    for token in split_template(template) {
        if token == FILES_PLACEHOLDER {
            args.extend(files.iter().cloned());
        } else if token.contains(FILES_PLACEHOLDER) {
            args.push(token.replace(FILES_PLACEHOLDER, &quoted_files(files)));
        } else {
            args.push(token);
        }
    }
    args
}

/// Render an argv for logs, quoting arguments that contain whitespace.
pub fn display_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|a| {
            if a.chars().any(char::is_whitespace) {
                format!("\"{a}\"")
            } else {
                a.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
