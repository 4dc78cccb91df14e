//! The Kiln compiler front-end.
//!
//! Turns C or C++ source text plus clang-style flags into a checked
//! [`IntermediateUnit`]. The pipeline is:
//!
//! 1. [`flags`]: validate the command line, pick the language
//! 2. [`preprocess`]: resolve directives and built-in headers
//! 3. [`lexer`]: tokenise with `logos`, expanding object-like macros
//! 4. [`parser`]: build the syntax tree
//! 5. [`lower`]: check types and lower into the intermediate unit, decorating
//!    C++ names on the way
//!
//! Source problems never surface as a Rust error from
//! [`compile_to_unit`]; they come back as [`Diagnostics`].

pub mod ast;
pub mod error;
pub mod flags;
pub mod lexer;
pub mod lower;
pub mod mangle;
pub mod parser;
pub mod prelude;
pub mod preprocess;

pub use error::{SyntaxError, SyntaxResult};
pub use flags::{parse_flags, CompileOptions, Language, WarningMode};

use kiln_ir::IntermediateUnit;
use kiln_source::Diagnostics;
use preprocess::Header;

/// Compiles `source` into an intermediate unit.
///
/// On success the returned diagnostics hold any warnings. On failure they
/// hold at least one error. `-w` and `-Werror` are applied to both.
pub fn compile_to_unit<S: AsRef<str>>(
    file_name: &str,
    source: &str,
    flags: &[S],
) -> Result<(IntermediateUnit, Diagnostics), Diagnostics> {
    let (options, mut diagnostics) = parse_flags(file_name, flags);
    if diagnostics.has_errors() {
        return Err(finish(diagnostics, options.warnings));
    }

    let (pre, found) = preprocess::preprocess(source, &options);
    diagnostics.extend(found);
    if diagnostics.has_errors() {
        return Err(finish(diagnostics, options.warnings));
    }

    let parsed = lexer::lex(&pre).and_then(|tokens| {
        let mut parser = parser::Parser::new(&tokens, options.language, &pre.headers, source.len());
        parser.parse_translation_unit()
    });
    let tu = match parsed {
        Ok(tu) => tu,
        Err(err) => {
            log::debug!("{file_name}: {err}");
            diagnostics.push(err.into_diagnostic());
            return Err(finish(diagnostics, options.warnings));
        }
    };

    let mut unit = lower::lower(
        &tu,
        options.language,
        pre.includes(Header::Jni),
        file_name,
        &mut diagnostics,
    );
    unit.opt_level = options.opt_level;

    let diagnostics = finish(diagnostics, options.warnings);
    if diagnostics.has_errors() {
        log::debug!(
            "{file_name}: {} error(s), {} warning(s)",
            diagnostics.error_count(),
            diagnostics.warning_count()
        );
        return Err(diagnostics);
    }
    log::debug!(
        "{file_name}: compiled {} function(s) with {} warning(s)",
        unit.functions.len(),
        diagnostics.warning_count()
    );
    Ok((unit, diagnostics))
}

fn finish(mut diagnostics: Diagnostics, mode: WarningMode) -> Diagnostics {
    match mode {
        WarningMode::Report => {}
        WarningMode::Suppress => diagnostics.suppress_warnings(),
        WarningMode::Promote => diagnostics.promote_warnings(),
    }
    diagnostics
}
