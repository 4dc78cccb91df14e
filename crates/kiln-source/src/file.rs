/// A source file handed to the compiler.
///
/// The file never exists on disk; `name` is the virtual file name used in
/// diagnostics and to pick the language mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    contents: String,
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        let line_starts = std::iter::once(0)
            .chain(contents.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            contents,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Returns the 1-based line and column of a byte offset.
    ///
    /// Offsets past the end of the text clamp to the last position.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = self.contents[self.line_starts[line]..offset].chars().count() + 1;
        (line + 1, column)
    }

    /// Returns `true` when the file name selects C (rather than C++) mode.
    pub fn is_c_source(&self) -> bool {
        self.name.ends_with(".c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_tracks_newlines() {
        let file = SourceFile::new("code.cpp", "int a;\nint b;\n  x");
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(4), (1, 5));
        assert_eq!(file.line_col(7), (2, 1));
        assert_eq!(file.line_col(16), (3, 3));
        assert_eq!(file.line_col(1000), (3, 4));
    }

    #[test]
    fn language_mode_follows_extension() {
        assert!(SourceFile::new("a.c", "").is_c_source());
        assert!(!SourceFile::new("a.cpp", "").is_c_source());
        assert!(!SourceFile::new("code", "").is_c_source());
    }
}
