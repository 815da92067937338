//! Import flattening for multi-file Solidity projects
//!
//! Downloaded sources are written into a single directory, so every import
//! has to point at `./<file name>` of its target. Statements may span lines;
//! the path is rewritten on whichever line of the statement carries it.

/// Rewrites all import statements of a source file
///
/// Lines are re-terminated with `\n`.
pub fn rewrite_imports(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut in_statement = false;
    let mut depth = 0usize;

    for line in source.lines() {
        if in_statement || is_import_start(line) {
            if !in_statement {
                depth = 0;
            }
            out.push_str(&rewrite_import_line(line));
            depth = (depth + line.matches('{').count()).saturating_sub(line.matches('}').count());
            // the path is the last part of every import form
            in_statement =
                !line.contains(';') && quoted_span(line).is_none() && awaits_more(line, depth);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    out
}

/// Rewrites the quoted path on a single line to `./<file name>`
///
/// Lines without a quoted literal are returned unchanged.
pub fn rewrite_import_line(line: &str) -> String {
    let Some((start, end)) = quoted_span(line) else {
        return line.to_string();
    };

    let path = &line[start..end];
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    if file_name.is_empty() {
        return line.to_string();
    }

    format!("{}./{}{}", &line[..start], file_name, &line[end..])
}

fn is_import_start(line: &str) -> bool {
    line.trim_start()
        .strip_prefix("import")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '{' | '*'))
}

/// Whether an unterminated statement continues on the next line
fn awaits_more(line: &str, depth: usize) -> bool {
    let trimmed = line.trim_end();
    depth > 0
        || trimmed.ends_with(['{', ',', '*'])
        || matches!(trimmed.split_whitespace().last(), Some("import" | "from" | "as"))
}

/// Byte range of the contents of the first quoted literal
fn quoted_span(line: &str) -> Option<(usize, usize)> {
    let open = line.find(['"', '\''])?;
    let quote = line[open..].chars().next()?;
    let close = line[open + 1..].find(quote)? + open + 1;
    Some((open + 1, close))
}
