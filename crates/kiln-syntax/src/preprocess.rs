//! A line-oriented preprocessor for the directives Kiln sources use.
//!
//! Directive lines and lines in inactive conditional regions are blanked
//! with spaces rather than removed, so byte offsets in the output are the
//! offsets of the original text and spans need no remapping. Macro
//! definitions do not rewrite text here; they are recorded as
//! [`MacroEvent`]s that the lexer replays in source order.

use crate::flags::{CompileOptions, Language};
use kiln_source::{Diagnostic, Diagnostics, SourceSpan};
use rustc_hash::FxHashMap;

/// Headers the preprocessor knows without a search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Header {
    Jni,
    StdInt,
    StdDef,
    StdBool,
}

impl Header {
    pub fn from_name(name: &str) -> Option<Header> {
        match name {
            "jni.h" => Some(Header::Jni),
            "stdint.h" | "cstdint" => Some(Header::StdInt),
            "stddef.h" | "cstddef" => Some(Header::StdDef),
            "stdbool.h" => Some(Header::StdBool),
            _ => None,
        }
    }

    fn macros(self, language: Language) -> Vec<(&'static str, &'static str)> {
        let null = match language {
            Language::C => "((void*)0)",
            Language::Cxx => "nullptr",
        };
        match self {
            Header::Jni => vec![
                ("JNIEXPORT", ""),
                ("JNICALL", ""),
                ("JNI_FALSE", "0"),
                ("JNI_TRUE", "1"),
                ("JNI_OK", "0"),
                ("JNI_ERR", "(-1)"),
                ("JNI_VERSION_1_8", "0x00010008"),
                ("NULL", null),
            ],
            Header::StdDef => vec![("NULL", null)],
            Header::StdInt => vec![
                ("INT8_MIN", "(-128)"),
                ("INT8_MAX", "127"),
                ("UINT8_MAX", "255"),
                ("INT16_MIN", "(-32767-1)"),
                ("INT16_MAX", "32767"),
                ("UINT16_MAX", "65535"),
                ("INT32_MIN", "(-2147483647-1)"),
                ("INT32_MAX", "2147483647"),
                ("UINT32_MAX", "4294967295U"),
                ("INT64_MIN", "(-9223372036854775807L-1)"),
                ("INT64_MAX", "9223372036854775807L"),
                ("UINT64_MAX", "18446744073709551615UL"),
            ],
            Header::StdBool => vec![("__bool_true_false_are_defined", "1")],
        }
    }
}

/// A `#define` (with a body) or `#undef` (without), effective from `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroEvent {
    pub offset: usize,
    pub name: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    /// Same length as the input; directives and skipped regions blanked.
    pub text: String,
    pub events: Vec<MacroEvent>,
    pub headers: Vec<Header>,
}

impl Preprocessed {
    pub fn includes(&self, header: Header) -> bool {
        self.headers.contains(&header)
    }
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    /// This branch's lines are kept.
    active: bool,
    /// Some branch of this group was taken already.
    taken: bool,
    /// The enclosing region is active.
    parent_active: bool,
    seen_else: bool,
    span: SourceSpan,
}

struct Preprocessor<'o> {
    options: &'o CompileOptions,
    defined: FxHashMap<String, String>,
    events: Vec<MacroEvent>,
    headers: Vec<Header>,
    stack: Vec<Conditional>,
    diagnostics: Diagnostics,
    fatal: bool,
}

/// Runs the preprocessor over `source`.
///
/// Errors are reported through the returned diagnostics. A missing header
/// is fatal and stops processing at that line, like a real compiler.
pub fn preprocess(source: &str, options: &CompileOptions) -> (Preprocessed, Diagnostics) {
    let mut pp = Preprocessor {
        options,
        defined: FxHashMap::default(),
        events: Vec::new(),
        headers: Vec::new(),
        stack: Vec::new(),
        diagnostics: Diagnostics::new(),
        fatal: false,
    };
    pp.predefine();

    let mut out = Vec::with_capacity(source.len());
    let mut offset = 0;
    let mut continued = false;
    let mut directive = String::new();
    let mut directive_start = 0;

    for line in source.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        if pp.fatal {
            blank(line, &mut out);
            continue;
        }

        let body = line.trim_end_matches(['\n', '\r']);
        let is_directive = continued || body.trim_start().starts_with('#');
        if !is_directive {
            if pp.is_active() {
                out.extend_from_slice(line.as_bytes());
            } else {
                blank(line, &mut out);
            }
            continue;
        }

        blank(line, &mut out);
        if !continued {
            directive.clear();
            directive_start = start;
        }
        match body.strip_suffix('\\') {
            Some(head) => {
                directive.push_str(head);
                directive.push(' ');
                continued = true;
            }
            None => {
                directive.push_str(body);
                continued = false;
                let span = SourceSpan::from((directive_start, offset - directive_start));
                let text = std::mem::take(&mut directive);
                pp.directive(&text, span, start);
            }
        }
    }

    if let Some(open) = pp.stack.last() {
        if !pp.fatal {
            let span = open.span;
            pp.error("unterminated conditional directive", span);
        }
    }

    let text = String::from_utf8_lossy(&out).into_owned();
    debug_assert_eq!(text.len(), source.len());
    let preprocessed = Preprocessed {
        text,
        events: pp.events,
        headers: pp.headers,
    };
    (preprocessed, pp.diagnostics)
}

fn blank(line: &str, out: &mut Vec<u8>) {
    out.extend(
        line.bytes()
            .map(|b| if b == b'\n' || b == b'\r' { b } else { b' ' }),
    );
}

impl<'o> Preprocessor<'o> {
    fn predefine(&mut self) {
        match self.options.language {
            Language::Cxx => {
                let version = match self.options.std.as_deref() {
                    Some("c++98" | "c++03" | "gnu++98") => "199711L",
                    Some("c++14" | "gnu++14") => "201402L",
                    Some("c++17" | "gnu++17") => "201703L",
                    Some("c++20" | "gnu++20") => "202002L",
                    _ => "201103L",
                };
                self.define(0, "__cplusplus", version);
            }
            Language::C => {
                self.define(0, "__STDC_VERSION__", "201112L");
            }
        }
        self.define(0, "__STDC__", "1");
        let options = self.options;
        for (name, body) in &options.macros {
            match body {
                Some(body) => self.define(0, name, body),
                None => self.undefine(0, name),
            }
        }
    }

    fn define(&mut self, offset: usize, name: &str, body: &str) {
        self.defined.insert(name.to_string(), body.to_string());
        self.events.push(MacroEvent {
            offset,
            name: name.to_string(),
            body: Some(body.to_string()),
        });
    }

    fn undefine(&mut self, offset: usize, name: &str) {
        self.defined.remove(name);
        self.events.push(MacroEvent {
            offset,
            name: name.to_string(),
            body: None,
        });
    }

    fn is_active(&self) -> bool {
        self.stack.last().map_or(true, |c| c.active)
    }

    fn error(&mut self, message: impl Into<String>, span: SourceSpan) {
        self.diagnostics
            .push(Diagnostic::error(message).with_span(span).with_code("kiln_syntax::preprocess"));
    }

    fn directive(&mut self, text: &str, span: SourceSpan, line_start: usize) {
        let text = strip_line_comment(text.trim_start().trim_start_matches('#').trim());
        let (name, rest) = match text.find(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
            Some(split) => (&text[..split], text[split..].trim()),
            None => (text, ""),
        };
        log::trace!("directive #{name} {rest:?}");

        // Conditionals are tracked even inside inactive regions.
        match name {
            "ifdef" | "ifndef" => {
                let macro_name = rest.split_whitespace().next().unwrap_or("");
                if macro_name.is_empty() {
                    self.error("macro name missing", span);
                }
                let defined = self.defined.contains_key(macro_name);
                self.open_group(defined == (name == "ifdef"), span);
                return;
            }
            "if" => {
                let value = self.is_active() && self.evaluate(rest, span);
                self.open_group(value, span);
                return;
            }
            "elif" => {
                let parent_active = match self.stack.last() {
                    Some(group) if !group.seen_else => group.parent_active && !group.taken,
                    Some(_) => {
                        self.error("#elif after #else", span);
                        return;
                    }
                    None => {
                        self.error("#elif without #if", span);
                        return;
                    }
                };
                let value = parent_active && self.evaluate(rest, span);
                if let Some(group) = self.stack.last_mut() {
                    group.active = value;
                    group.taken |= value;
                }
                return;
            }
            "else" => {
                match self.stack.last_mut() {
                    Some(group) if !group.seen_else => {
                        group.active = group.parent_active && !group.taken;
                        group.taken = true;
                        group.seen_else = true;
                    }
                    Some(_) => self.error("#else after #else", span),
                    None => self.error("#else without #if", span),
                }
                return;
            }
            "endif" => {
                if self.stack.pop().is_none() {
                    self.error("#endif without #if", span);
                }
                return;
            }
            _ => {}
        }

        if !self.is_active() {
            return;
        }

        match name {
            "" => {}
            "include" => self.include(rest, span),
            "define" => {
                let (macro_name, body) = match rest.find(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
                    Some(split) => (&rest[..split], &rest[split..]),
                    None => (rest, ""),
                };
                if macro_name.is_empty() {
                    self.error("macro name missing", span);
                } else if body.starts_with('(') {
                    self.error("function-like macros are not supported", span);
                } else {
                    self.define(line_start, macro_name, body.trim());
                }
            }
            "undef" => {
                let macro_name = rest.split_whitespace().next().unwrap_or("");
                if macro_name.is_empty() {
                    self.error("macro name missing", span);
                } else {
                    self.undefine(line_start, macro_name);
                }
            }
            "pragma" => {}
            "error" => self.error(rest.to_string(), span),
            "warning" => self.diagnostics.push(
                Diagnostic::warning(rest.to_string())
                    .with_span(span)
                    .with_code("kiln_syntax::preprocess"),
            ),
            _ => self.error("invalid preprocessing directive", span),
        }
    }

    fn open_group(&mut self, value: bool, span: SourceSpan) {
        let parent_active = self.is_active();
        let active = parent_active && value;
        self.stack.push(Conditional {
            active,
            taken: active,
            parent_active,
            seen_else: false,
            span,
        });
    }

    fn include(&mut self, rest: &str, span: SourceSpan) {
        let name = match (rest.chars().next(), rest.chars().last()) {
            (Some('<'), Some('>')) | (Some('"'), Some('"')) if rest.len() >= 2 => {
                &rest[1..rest.len() - 1]
            }
            _ => {
                self.error("expected \"FILENAME\" or <FILENAME>", span);
                return;
            }
        };
        match Header::from_name(name) {
            Some(header) => {
                if !self.headers.contains(&header) {
                    let offset = span.offset();
                    for (macro_name, body) in header.macros(self.options.language) {
                        self.define(offset, macro_name, body);
                    }
                    self.headers.push(header);
                }
            }
            None => {
                self.error(format!("'{name}' file not found"), span);
                self.fatal = true;
            }
        }
    }

    fn evaluate(&mut self, expr: &str, span: SourceSpan) -> bool {
        let mut eval = CondEval {
            chars: expr.chars().collect(),
            pos: 0,
            defined: &self.defined,
            depth: 0,
        };
        match eval.parse_or() {
            Some(value) if eval.at_end() => value != 0,
            _ => {
                self.error("invalid expression in preprocessor conditional", span);
                false
            }
        }
    }
}

fn strip_line_comment(text: &str) -> &str {
    match text.find("//") {
        Some(index) => text[..index].trim_end(),
        None => text,
    }
}

/// Evaluator for `#if` conditions: integer literals, macro names,
/// `defined`, `!`, unary minus, comparisons, `&&`, `||` and parentheses.
struct CondEval<'m> {
    chars: Vec<char>,
    pos: usize,
    defined: &'m FxHashMap<String, String>,
    depth: usize,
}

impl CondEval<'_> {
    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, s: &str) -> bool {
        self.skip_ws();
        let n = s.chars().count();
        let matches = self.chars[self.pos.min(self.chars.len())..]
            .iter()
            .take(n)
            .copied()
            .eq(s.chars());
        if matches {
            self.pos += n;
        }
        matches
    }

    fn parse_or(&mut self) -> Option<i64> {
        let mut value = self.parse_and()?;
        while self.eat("||") {
            let rhs = self.parse_and()?;
            value = ((value != 0) || (rhs != 0)) as i64;
        }
        Some(value)
    }

    fn parse_and(&mut self) -> Option<i64> {
        let mut value = self.parse_cmp()?;
        while self.eat("&&") {
            let rhs = self.parse_cmp()?;
            value = ((value != 0) && (rhs != 0)) as i64;
        }
        Some(value)
    }

    fn parse_cmp(&mut self) -> Option<i64> {
        let lhs = self.parse_unary()?;
        let ops: [(&str, fn(i64, i64) -> bool); 6] = [
            ("==", |a, b| a == b),
            ("!=", |a, b| a != b),
            ("<=", |a, b| a <= b),
            (">=", |a, b| a >= b),
            ("<", |a, b| a < b),
            (">", |a, b| a > b),
        ];
        for (op, f) in ops {
            if self.eat(op) {
                let rhs = self.parse_unary()?;
                return Some(f(lhs, rhs) as i64);
            }
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<i64> {
        if self.eat("!") {
            return Some((self.parse_unary()? == 0) as i64);
        }
        if self.eat("-") {
            return Some(self.parse_unary()?.wrapping_neg());
        }
        if self.eat("(") {
            let value = self.parse_or()?;
            return self.eat(")").then_some(value);
        }
        self.skip_ws();
        let c = *self.chars.get(self.pos)?;
        if c.is_ascii_digit() {
            let start = self.pos;
            while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_alphanumeric()) {
                self.pos += 1;
            }
            let literal: String = self.chars[start..self.pos].iter().collect();
            return parse_pp_number(&literal);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let name = self.identifier();
            if name == "defined" {
                let parens = self.eat("(");
                self.skip_ws();
                let target = self.identifier();
                if target.is_empty() || (parens && !self.eat(")")) {
                    return None;
                }
                return Some(self.defined.contains_key(&target) as i64);
            }
            return match self.defined.get(&name) {
                Some(body) if self.depth < 16 => {
                    let mut inner = CondEval {
                        chars: body.chars().collect(),
                        pos: 0,
                        defined: self.defined,
                        depth: self.depth + 1,
                    };
                    let value = inner.parse_or()?;
                    inner.at_end().then_some(value)
                }
                Some(_) => None,
                None => Some(0),
            };
        }
        None
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn parse_pp_number(literal: &str) -> Option<i64> {
    let digits = literal.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Preprocessed, Diagnostics) {
        preprocess(source, &CompileOptions::for_file("code.cpp"))
    }

    fn events_named<'p>(pre: &'p Preprocessed, name: &str) -> Vec<&'p MacroEvent> {
        pre.events.iter().filter(|e| e.name == name).collect()
    }

    #[test]
    fn directives_are_blanked_in_place() {
        let source = "#include <jni.h>\nint x;\n";
        let (pre, diags) = run(source);
        assert!(diags.is_empty());
        assert_eq!(pre.text.len(), source.len());
        assert_eq!(pre.text, "                \nint x;\n");
        assert!(pre.includes(Header::Jni));
        assert_eq!(events_named(&pre, "JNIEXPORT").len(), 1);
    }

    #[test]
    fn unknown_header_is_fatal() {
        let (pre, diags) = run("#include <stdio.h>\nint a;\n#bogus\n");
        assert_eq!(diags.len(), 1);
        let first = diags.iter().next().map(|d| d.message.clone());
        assert_eq!(first.as_deref(), Some("'stdio.h' file not found"));
        assert!(pre.text.trim().is_empty());
    }

    #[test]
    fn defines_and_undefs_are_recorded_at_their_line() {
        let (pre, diags) = run("int a;\n#define N 4\n#undef N\n");
        assert!(diags.is_empty());
        let events = events_named(&pre, "N");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].offset, 7);
        assert_eq!(events[0].body.as_deref(), Some("4"));
        assert_eq!(events[1].body, None);
    }

    #[test]
    fn conditionals_select_lines() {
        let source = "#define A\n#ifdef A\nyes\n#else\nno\n#endif\n#ifndef A\nnope\n#endif\n";
        let (pre, diags) = run(source);
        assert!(diags.is_empty());
        assert!(pre.text.contains("yes"));
        assert!(!pre.text.contains("no\n"));
        assert!(!pre.text.contains("nope"));
    }

    #[test]
    fn if_expressions() {
        let source = "#define V 3\n#if V > 2 && defined(V)\none\n#elif 1\ntwo\n#endif\n#if 0\nthree\n#elif !defined V\nfour\n#else\nfive\n#endif\n";
        let (pre, diags) = run(source);
        assert!(diags.is_empty());
        assert!(pre.text.contains("one"));
        assert!(!pre.text.contains("two"));
        assert!(!pre.text.contains("three"));
        assert!(!pre.text.contains("four"));
        assert!(pre.text.contains("five"));
    }

    #[test]
    fn command_line_macros_come_first() {
        let mut options = CompileOptions::for_file("code.cpp");
        options.macros.push(("FAST".into(), Some("1".into())));
        let (pre, _) = preprocess("#ifdef FAST\nfast\n#endif\n", &options);
        assert!(pre.text.contains("fast"));
        assert_eq!(events_named(&pre, "FAST")[0].offset, 0);
        assert!(!events_named(&pre, "__cplusplus").is_empty());
    }

    #[test]
    fn malformed_directives_are_errors() {
        let (_, diags) = run("#frobnicate\n#endif\n#ifdef X\n");
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "invalid preprocessing directive",
                "#endif without #if",
                "unterminated conditional directive",
            ]
        );
    }

    #[test]
    fn pragma_is_ignored_and_continuations_join() {
        let (pre, diags) = run("#pragma once\n#define LONG 1 + \\\n 2\nLONG\n");
        assert!(diags.is_empty());
        assert_eq!(events_named(&pre, "LONG")[0].body.as_deref(), Some("1 +   2"));
    }

    #[test]
    fn function_like_macros_are_rejected() {
        let (_, diags) = run("#define SQ(x) ((x)*(x))\n");
        assert!(diags.has_errors());
    }
}
