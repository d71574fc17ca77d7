//! Indented text output for the program, AST and expression printers.

/// Collects lines at a nesting depth and joins them on [`finish`](Self::finish).
///
/// Text passed to [`writeln`](Self::writeln) may span several lines; each
/// one is indented to the current depth.
#[derive(Debug, Clone)]
pub struct CodeFormatter {
    lines: Vec<(usize, String)>,
    depth: usize,
    unit: String,
}

impl CodeFormatter {
    pub fn new(unit: &str) -> Self {
        Self { lines: Vec::new(), depth: 0, unit: unit.to_string() }
    }

    /// Two spaces per level.
    pub fn default_indent() -> Self {
        Self::new("  ")
    }

    pub fn writeln(&mut self, text: &str) {
        let depth = self.depth;
        self.lines.extend(text.lines().map(|line| (depth, line.to_string())));
    }

    /// `header {`, then whatever `body` writes one level deeper, then `}`.
    pub fn block<F: FnOnce(&mut Self)>(&mut self, header: &str, body: F) {
        self.writeln(&format!("{} {{", header));
        self.depth += 1;
        body(self);
        self.depth -= 1;
        self.writeln("}");
    }

    pub fn finish(self) -> String {
        let mut out = String::new();
        for (depth, line) in &self.lines {
            if !line.is_empty() {
                out.push_str(&self.unit.repeat(*depth));
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.block("for (c0 = 0; c0 <= N - 1; c0 += 1)", |f| {
            f.block("if (c0 >= 2)", |f| f.writeln("S(c0);"));
            f.writeln("T(c0);\nU(c0);");
        });
        assert_eq!(
            fmt.finish(),
            "for (c0 = 0; c0 <= N - 1; c0 += 1) {\n  if (c0 >= 2) {\n    S(c0);\n  }\n  T(c0);\n  U(c0);\n}\n"
        );
    }

    #[test]
    fn test_custom_unit() {
        let mut fmt = CodeFormatter::new("\t");
        fmt.block("Program", |f| f.writeln("x = relu(a)"));
        assert_eq!(fmt.finish(), "Program {\n\tx = relu(a)\n}\n");
    }
}
