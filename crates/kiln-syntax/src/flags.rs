//! Clang-style command line flags.

use kiln_source::{Diagnostic, Diagnostics, OptLevel};

/// Source language of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cxx,
}

/// What happens to warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WarningMode {
    #[default]
    Report,
    Suppress,
    Promote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub language: Language,
    pub opt_level: Option<OptLevel>,
    /// `-D` and `-U` in command line order; `None` undefines.
    pub macros: Vec<(String, Option<String>)>,
    pub include_dirs: Vec<String>,
    pub std: Option<String>,
    pub warnings: WarningMode,
}

impl CompileOptions {
    pub fn for_file(file_name: &str) -> Self {
        let language = if file_name.ends_with(".c") {
            Language::C
        } else {
            Language::Cxx
        };
        Self {
            language,
            opt_level: None,
            macros: Vec::new(),
            include_dirs: Vec::new(),
            std: None,
            warnings: WarningMode::Report,
        }
    }
}

const C_STANDARDS: &[&str] = &[
    "c89", "c90", "c99", "c11", "c17", "c18", "gnu89", "gnu99", "gnu11", "gnu17",
];
const CXX_STANDARDS: &[&str] = &[
    "c++98", "c++03", "c++11", "c++14", "c++17", "c++20", "gnu++98", "gnu++11", "gnu++14",
    "gnu++17", "gnu++20",
];

/// Parses compiler flags.
///
/// Never fails outright: problems come back as diagnostics next to the
/// options, and any error among them is fatal for the compilation.
pub fn parse_flags<S: AsRef<str>>(file_name: &str, flags: &[S]) -> (CompileOptions, Diagnostics) {
    let mut options = CompileOptions::for_file(file_name);
    let mut diagnostics = Diagnostics::new();
    let mut iter = flags.iter().map(|f| f.as_ref().trim());

    while let Some(flag) = iter.next() {
        if flag.is_empty() {
            continue;
        }
        if !flag.starts_with('-') {
            diagnostics.push(Diagnostic::error(format!(
                "no such file or directory: '{flag}'"
            )));
            continue;
        }

        // Flags whose value may be glued on or passed as the next argument.
        let mut joined = |prefix: &str| -> Option<Option<String>> {
            let rest = flag.strip_prefix(prefix)?;
            if rest.is_empty() {
                Some(iter.next().map(str::to_string))
            } else {
                Some(Some(rest.to_string()))
            }
        };

        if let Some(value) = joined("-isystem") {
            match value {
                Some(dir) => options.include_dirs.push(dir),
                None => diagnostics.push(missing_value(flag)),
            }
            continue;
        }
        if let Some(value) = joined("-I").or_else(|| joined("-F")) {
            match value {
                Some(dir) => options.include_dirs.push(dir),
                None => diagnostics.push(missing_value(flag)),
            }
            continue;
        }
        if let Some(value) = joined("-D") {
            match value {
                Some(def) => {
                    let (name, body) = match def.split_once('=') {
                        Some((name, body)) => (name.to_string(), body.to_string()),
                        None => (def.clone(), "1".to_string()),
                    };
                    options.macros.push((name, Some(body)));
                }
                None => diagnostics.push(missing_value(flag)),
            }
            continue;
        }
        if let Some(value) = joined("-U") {
            match value {
                Some(name) => options.macros.push((name, None)),
                None => diagnostics.push(missing_value(flag)),
            }
            continue;
        }
        if let Some(value) = joined("-x") {
            match value.as_deref() {
                Some("c") => options.language = Language::C,
                Some("c++") => options.language = Language::Cxx,
                Some(other) => diagnostics.push(Diagnostic::error(format!(
                    "language not recognized: '{other}'"
                ))),
                None => diagnostics.push(missing_value(flag)),
            }
            continue;
        }

        if let Some(std) = flag
            .strip_prefix("--std=")
            .or_else(|| flag.strip_prefix("-std="))
        {
            options.std = Some(std.to_string());
            continue;
        }

        match flag {
            "-O0" => options.opt_level = Some(OptLevel::None),
            "-O" | "-O1" | "-O2" | "-O3" | "-Ofast" => options.opt_level = Some(OptLevel::Speed),
            "-Os" | "-Oz" => options.opt_level = Some(OptLevel::SpeedAndSize),
            "-w" => options.warnings = WarningMode::Suppress,
            "-Werror" => {
                if options.warnings != WarningMode::Suppress {
                    options.warnings = WarningMode::Promote;
                }
            }
            "-Wno-error" => {
                if options.warnings == WarningMode::Promote {
                    options.warnings = WarningMode::Report;
                }
            }
            "-c" | "-pedantic" => {}
            _ if flag.starts_with("-W") => {}
            _ if flag.starts_with("-f") || flag.starts_with("-m") || flag.starts_with("-g") => {
                diagnostics.push(Diagnostic::warning(format!(
                    "argument unused during compilation: '{flag}'"
                )));
            }
            _ => diagnostics.push(Diagnostic::error(format!("unknown argument: '{flag}'"))),
        }
    }

    if let Some(std) = options.std.clone() {
        check_standard(&std, options.language, &mut diagnostics);
    }
    log::trace!("parsed {} flags into {:?}", flags.len(), options);
    (options, diagnostics)
}

fn check_standard(std: &str, language: Language, diagnostics: &mut Diagnostics) {
    let is_c = C_STANDARDS.contains(&std);
    let is_cxx = CXX_STANDARDS.contains(&std);
    match (language, is_c, is_cxx) {
        (_, false, false) => {
            diagnostics.push(Diagnostic::error(format!(
                "invalid value '{std}' in '-std={std}'"
            )));
        }
        (Language::Cxx, true, _) => diagnostics.push(Diagnostic::error(format!(
            "invalid argument '-std={std}' not allowed with 'C++'"
        ))),
        (Language::C, _, true) => diagnostics.push(Diagnostic::error(format!(
            "invalid argument '-std={std}' not allowed with 'C'"
        ))),
        _ => {}
    }
}

fn missing_value(flag: &str) -> Diagnostic {
    Diagnostic::error(format!("argument to '{flag}' is missing (expected 1 value)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_follows_file_name_and_x() {
        let (opts, diags) = parse_flags::<&str>("kernel.c", &[]);
        assert_eq!(opts.language, Language::C);
        assert!(diags.is_empty());

        let (opts, _) = parse_flags("kernel.c", &["-x", "c++"]);
        assert_eq!(opts.language, Language::Cxx);

        let (opts, _) = parse_flags("code.cpp", &["-xc"]);
        assert_eq!(opts.language, Language::C);
    }

    #[test]
    fn macros_keep_order() {
        let (opts, diags) = parse_flags("code.cpp", &["-DFAST", "-D", "N=4", "-UFAST"]);
        assert!(diags.is_empty());
        assert_eq!(
            opts.macros,
            vec![
                ("FAST".to_string(), Some("1".to_string())),
                ("N".to_string(), Some("4".to_string())),
                ("FAST".to_string(), None),
            ]
        );
    }

    #[test]
    fn optimisation_levels() {
        let (opts, _) = parse_flags("code.cpp", &["-O3"]);
        assert_eq!(opts.opt_level, Some(OptLevel::Speed));
        let (opts, _) = parse_flags("code.cpp", &["-O2", "-O0"]);
        assert_eq!(opts.opt_level, Some(OptLevel::None));
        let (opts, _) = parse_flags("code.cpp", &["-Oz"]);
        assert_eq!(opts.opt_level, Some(OptLevel::SpeedAndSize));
    }

    #[test]
    fn include_paths_in_all_spellings() {
        let (opts, diags) = parse_flags(
            "code.cpp",
            &["-I/usr/include", "-isystem", "/opt/jdk/include", "-F/Library/Frameworks"],
        );
        assert!(diags.is_empty());
        assert_eq!(opts.include_dirs.len(), 3);
    }

    #[test]
    fn unknown_flag_and_stray_word_are_errors() {
        let (_, diags) = parse_flags("code.cpp", &["-frobnicate-harder", "--bogus", "main.cpp"]);
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "argument unused during compilation: '-frobnicate-harder'",
                "unknown argument: '--bogus'",
                "no such file or directory: 'main.cpp'",
            ]
        );
        assert_eq!(diags.error_count(), 2);
    }

    #[test]
    fn standard_must_match_language() {
        let (opts, diags) = parse_flags("code.cpp", &["--std=c++11"]);
        assert!(diags.is_empty());
        assert_eq!(opts.std.as_deref(), Some("c++11"));

        let (_, diags) = parse_flags("code.cpp", &["-std=c99"]);
        assert!(diags.has_errors());

        let (_, diags) = parse_flags("code.c", &["-std=c11"]);
        assert!(diags.is_empty());

        let (_, diags) = parse_flags("code.c", &["-std=c++98000"]);
        assert!(diags.has_errors());
    }

    #[test]
    fn warning_modes() {
        let (opts, _) = parse_flags("code.cpp", &["-Wall", "-Werror"]);
        assert_eq!(opts.warnings, WarningMode::Promote);
        let (opts, _) = parse_flags("code.cpp", &["-Werror", "-w"]);
        assert_eq!(opts.warnings, WarningMode::Suppress);
        let (opts, _) = parse_flags("code.cpp", &["-Werror", "-Wno-error"]);
        assert_eq!(opts.warnings, WarningMode::Report);
    }

    #[test]
    fn missing_value_is_reported() {
        let (_, diags) = parse_flags("code.cpp", &["-I"]);
        assert_eq!(
            diags.iter().next().map(|d| d.message.as_str()),
            Some("argument to '-I' is missing (expected 1 value)")
        );
    }
}
