use super::NEWLINE;
use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Separator {
    Newline,
    Sequence,
    And,
    Or,
    Pipe,
}

impl From<&str> for Separator {
    fn from(s: &str) -> Self {
        match s {
            "&&" => Separator::And,
            "||" => Separator::Or,
            "|" => Separator::Pipe,
            "&" => Separator::Sequence,
            _ => Separator::Newline,
        }
    }
}

impl Separator {
    fn joiner(self) -> &'static str {
        match self {
            Separator::Newline => NEWLINE,
            Separator::Sequence => " & ",
            Separator::And => " && ",
            Separator::Or => " || ",
            Separator::Pipe => " | ",
        }
    }
}

/// Stitches the kept statements of a command line back together.
#[derive(Debug, Default)]
pub(crate) struct Renderer {
    output: String,
    pending: Option<Separator>,
}

impl Renderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a separator seen in the source. Only the one that precedes the
    /// next emitted statement is written, a newline outranks the others.
    pub(crate) fn separator(&mut self, separator: Separator) {
        if self.pending != Some(Separator::Newline) {
            self.pending = Some(separator);
        }
    }

    pub(crate) fn emit(&mut self, statement: &str) {
        let statement = statement.trim();
        if statement.is_empty() {
            return;
        }
        if let Some(separator) = self.pending.take() {
            if !self.output.is_empty() {
                self.output.push_str(separator.joiner());
            }
        }
        self.output.push_str(statement);
    }

    pub(crate) fn finish(self, config: &Config) -> String {
        if config.raw {
            self.output
        } else {
            wrap_long_lines(&self.output, config.wrap_width)
        }
    }
}

/// Breaks lines longer than `width` after every ` && `, continuation lines
/// indented by two spaces.
pub(crate) fn wrap_long_lines(text: &str, width: usize) -> String {
    let mut lines = Vec::new();
    for line in text.split(NEWLINE) {
        if line.chars().count() <= width || !line.contains(" && ") {
            lines.push(line.to_string());
            continue;
        }

        let parts: Vec<&str> = line.split(" && ").collect();
        let last = parts.len() - 1;
        for (i, part) in parts.iter().enumerate() {
            let line = match i {
                0 => format!("{} &&", part),
                i if i == last => format!("  {}", part),
                _ => format!("  {} &&", part),
            };
            lines.push(line);
        }
    }
    lines.join(NEWLINE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators() {
        let mut renderer = Renderer::new();
        renderer.separator(Separator::And);
        renderer.emit(" echo a ");
        renderer.separator(Separator::Sequence);
        renderer.emit("");
        renderer.separator(Separator::And);
        renderer.emit("echo b");
        renderer.separator(Separator::Newline);
        renderer.emit("  ");
        renderer.separator(Separator::Pipe);
        renderer.emit("echo c");
        assert_eq!(renderer.finish(&Config::default()), "echo a && echo b\necho c");
    }

    #[test]
    fn wrapping() {
        let line = format!("{} && {} && {}", "a".repeat(50), "b".repeat(50), "c".repeat(50));
        assert_eq!(
            wrap_long_lines(&line, 120),
            format!("{} &&\n  {} &&\n  {}", "a".repeat(50), "b".repeat(50), "c".repeat(50))
        );
        assert_eq!(wrap_long_lines("short && line", 120), "short && line");
        assert_eq!(wrap_long_lines(&"x".repeat(200), 120), "x".repeat(200));
    }
}
