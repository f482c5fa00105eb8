#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::java::diagnostics::Severity;

/// One line of javac's human readable output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JavacLine {
    /// `path:line: error: message`, with the 1-indexed line javac prints.
    Located {
        /// path as javac echoed it
        path:     String,
        /// line number as printed
        line:     u32,
        /// error or warning
        severity: Severity,
        /// first line of the message
        message:  String,
    },
    /// `error: message` with no source attached.
    Bare {
        /// error or warning
        severity: Severity,
        /// the message
        message:  String,
    },
    /// The caret marker under an echoed source line; holds its 0-indexed
    /// column.
    Caret(u32),
    /// `N errors` / `N warnings` trailers.
    Summary,
    /// `Note: ...` lines.
    Note,
}

/// Status printed at the end of a test feed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Test started.
    Started,
    /// Test or container finished successfully.
    Successful,
    /// Test or container failed.
    Failed,
    /// Test was aborted (failed assumption).
    Aborted,
    /// Test or container was skipped.
    Skipped,
}

peg::parser! {
    /// includes some useful grammars for parsing javac and JUnit outputs.
    pub grammar parser() for str {
        /// matches any sequence of 1 or more numbers
        rule number() -> u32
            = n:$(['0'..='9']+) {? n.parse().or(Err("u32")) }

        /// matches spaces and tabs
        rule blank() = quiet!{[' ' | '\t']+}

        /// matches "error" or "warning"
        rule severity() -> Severity
            = "error" { Severity::Error }
            / "warning" { Severity::Warning }

        /// matches line numbers between colons (eg. :23:)
        rule line_number() -> u32
            = ":" n:number() ":" { n }

        /// matches a path, which is anything up to the first `:<digits>:`
        rule path() -> &'input str
            = $((!(line_number() " " severity() ":") [_])+)

        /// matches anything, placed where the message should be
        rule message() -> String
            = m:$([_]*) { m.trim_end().to_string() }

        /// parses a javac diagnostic header with a source location
        pub rule located() -> JavacLine
            = p:path() l:line_number() " " s:severity() ":" blank()? m:message()
            {
                JavacLine::Located {
                    path: p.to_string(),
                    line: l,
                    severity: s,
                    message: m,
                }
            }

        /// parses a javac diagnostic header without a source location
        pub rule bare() -> JavacLine
            = s:severity() ":" blank()? m:message()
            { JavacLine::Bare { severity: s, message: m } }

        /// parses the caret line javac prints under the offending source
        pub rule caret() -> JavacLine
            = lead:$([' ' | '\t']*) "^" blank()?
            { JavacLine::Caret(lead.chars().count() as u32) }

        /// parses trailers like `1 error` or `3 warnings`
        pub rule summary() -> JavacLine
            = number() " " ("error" / "warning") "s"? blank()?
            { JavacLine::Summary }

        /// parses javac notes
        pub rule note() -> JavacLine
            = "Note:" [_]*
            { JavacLine::Note }

        /// parses any javac line that carries meaning
        pub rule javac_line() -> JavacLine
            = located() / bare() / caret() / summary() / note()

        /// matches a test feed status keyword
        rule feed_status() -> FeedStatus
            = "STARTED" { FeedStatus::Started }
            / "SUCCESSFUL" { FeedStatus::Successful }
            / "FAILED" { FeedStatus::Failed }
            / "ABORTED" { FeedStatus::Aborted }
            / "SKIPPED" { FeedStatus::Skipped }

        /// parses one frame line of a Java stack trace, including `Caused by:`
        /// and `Suppressed:` headers and `... N more` elisions
        pub rule trace_line()
            = [' ' | '\t']* ("at " / "... " / "Caused by: " / "Suppressed: ") [_]*

        /// parses a JUnit test feed event: `Engine > Class > test() :: STATUS`
        pub rule feed_event() -> (String, FeedStatus)
            = name:$((!(" :: " feed_status() blank()? ![_]) [_])+) " :: " s:feed_status() blank()?
            { (name.to_string(), s) }
    }
}
