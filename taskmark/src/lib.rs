//! Task-markup domain library for note documents.
//! A note's content is a single text blob that may embed checkbox tasks as
//! inline `[TASK:...]` tokens; the document string is the sole source of
//! truth and task records are a derived view recomputed on every read.

pub mod core {
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /* ------------------------------- IDs ------------------------------- */

    /// Opaque task identifier. Assigned at creation, stable across edits,
    /// never reused, and never contains the `:` field delimiter.
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TaskId(pub String);

    impl TaskId {
        /// Generate a fresh id: base-36 milliseconds since the epoch plus a
        /// random suffix drawn from a v4 UUID. Both halves use `:`-free
        /// alphabets.
        pub fn generate() -> Self {
            let millis = Utc::now().timestamp_millis().max(0) as u64;
            let entropy = Uuid::new_v4().as_simple().to_string();
            Self(format!("{}{}", to_base36(millis), &entropy[..10]))
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl From<&str> for TaskId {
        fn from(s: &str) -> Self {
            Self(s.to_string())
        }
    }

    impl std::fmt::Display for TaskId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    fn to_base36(mut n: u64) -> String {
        const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        if n == 0 {
            return "0".to_string();
        }
        let mut buf = Vec::new();
        while n > 0 {
            buf.push(DIGITS[(n % 36) as usize] as char);
            n /= 36;
        }
        buf.iter().rev().collect()
    }

    /* --------------------------- Source ranges --------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceRange {
        pub start: usize,
        pub end: usize,
    }

    impl SourceRange {
        pub fn slice<'a>(&self, source: &'a str) -> &'a str {
            &source[self.start..self.end]
        }
    }

    /* ------------------------------ Entities ------------------------------ */

    /// A single embedded checkbox item, decoded from its token.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Task {
        pub id: TaskId,

        /// Label with field escaping removed.
        pub text: String,

        /// Assigned at creation as the then-current task count; used only as
        /// a tie-break within a completion bucket, never renumbered on
        /// deletion.
        pub order: u32,

        pub completed: bool,

        /// Byte span of the originating token in the document; `None` for a
        /// task not yet written anywhere.
        #[serde(skip_serializing, skip_deserializing)]
        pub source: Option<SourceRange>,
    }

    impl Task {
        pub fn new(id: TaskId, text: impl Into<String>, order: u32) -> Self {
            Self {
                id,
                text: text.into(),
                order,
                completed: false,
                source: None,
            }
        }
    }

    /// Result of parsing a note document: the derived task list in document
    /// order, and the content with every task token stripped.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ParsedNote {
        #[serde(default)]
        pub tasks: Vec<Task>,
        #[serde(default)]
        pub display_content: String,
    }
}

pub mod parser {
    //! Token scanner built on `nom`.
    //!
    //! The document-level scan is deliberately lenient: any `[TASK:` that
    //! fails the grammar is prose and stays put, so parsing is total over
    //! arbitrary text. `decode_token` is the strict counterpart used for
    //! diagnostics and tests.

    use crate::core::{ParsedNote, SourceRange, Task, TaskId};
    use crate::format::decode_text;
    use nom::{
        IResult,
        bytes::complete::{tag, take_while},
        character::complete::{char, digit1, one_of},
        error::{VerboseError, VerboseErrorKind},
    };

    pub(crate) const TOKEN_OPEN: &str = "[TASK:";

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /// One matched token with its raw field slices. Mutations rebuild from
    /// these so untouched fields survive byte-for-byte (a stored order of
    /// `007` stays `007`, a stray `%` in a stored label is not re-encoded).
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct RawToken<'a> {
        pub span: SourceRange,
        pub id: &'a str,
        pub text: &'a str,
        pub order_raw: &'a str,
        pub order: u32,
        pub completed: bool,
    }

    impl RawToken<'_> {
        pub fn to_task(&self) -> Task {
            Task {
                id: TaskId(self.id.to_string()),
                text: decode_text(self.text),
                order: self.order,
                completed: self.completed,
                source: Some(self.span),
            }
        }
    }

    fn err_ctx<'a, T>(i: &'a str, ctx: &'static str) -> PResult<'a, T> {
        Err(nom::Err::Error(VerboseError {
            errors: vec![(i, VerboseErrorKind::Context(ctx))],
        }))
    }

    fn field(i: &str) -> PResult<'_, &str> {
        // Any run of characters except the delimiter, newlines included.
        take_while(|c: char| c != ':')(i)
    }

    /// `[TASK:` id `:` text `:` digits `:` t|f `]`
    fn token_body(i: &str) -> PResult<'_, (&str, &str, &str, u32, bool)> {
        let (i, _) = tag(TOKEN_OPEN)(i)?;
        let (i, id) = field(i)?;
        let (i, _) = char(':')(i)?;
        let (i, text) = field(i)?;
        let (i, _) = char(':')(i)?;
        let (i, order_raw) = digit1(i)?;
        let order = match order_raw.parse::<u32>() {
            Ok(n) => n,
            Err(_) => return err_ctx(i, "order-overflow"),
        };
        let (i, _) = char(':')(i)?;
        let (i, flag) = one_of("tf")(i)?;
        let (i, _) = char(']')(i)?;
        Ok((i, (id, text, order_raw, order, flag == 't')))
    }

    /// All non-overlapping token matches in document order. A failed
    /// candidate only advances the search by one byte, so a token nested
    /// behind a malformed prefix is still found.
    pub(crate) fn scan_raw(document: &str) -> Vec<RawToken<'_>> {
        let mut out = Vec::new();
        let mut search = 0usize;
        while let Some(found) = document[search..].find(TOKEN_OPEN) {
            let start = search + found;
            match token_body(&document[start..]) {
                Ok((rest, (id, text, order_raw, order, completed))) => {
                    let end = document.len() - rest.len();
                    out.push(RawToken {
                        span: SourceRange { start, end },
                        id,
                        text,
                        order_raw,
                        order,
                        completed,
                    });
                    search = end;
                }
                Err(_) => search = start + 1,
            }
        }
        out
    }

    /// All well-formed tasks in document order, sources set.
    pub fn scan_tokens(document: &str) -> Vec<Task> {
        scan_raw(document).iter().map(RawToken::to_task).collect()
    }

    /// Parse a note document into its derived task list and display content.
    ///
    /// Display content is the document with every matched token removed,
    /// runs of two-or-more newlines collapsed to a single blank line, and
    /// leading/trailing whitespace trimmed. Re-parsing the display content
    /// yields no tasks.
    pub fn parse_note(document: &str) -> ParsedNote {
        let raw = scan_raw(document);
        let tasks: Vec<Task> = raw.iter().map(RawToken::to_task).collect();

        let mut stripped = String::with_capacity(document.len());
        let mut cursor = 0usize;
        for tok in &raw {
            stripped.push_str(&document[cursor..tok.span.start]);
            cursor = tok.span.end;
        }
        stripped.push_str(&document[cursor..]);

        let display_content = collapse_blank_runs(&stripped).trim().to_string();
        ParsedNote {
            tasks,
            display_content,
        }
    }

    fn collapse_blank_runs(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut chars = s.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\n' {
                out.push(c);
                continue;
            }
            let mut run = 1usize;
            while chars.peek() == Some(&'\n') {
                chars.next();
                run += 1;
            }
            out.push('\n');
            if run >= 2 {
                out.push('\n');
            }
        }
        out
    }

    /* --------------------------- Strict decoding --------------------------- */

    /// Why a `[TASK:` candidate failed strict decoding.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum TokenError {
        #[error("not a task token")]
        NotAToken,
        #[error("missing closing `]`")]
        Unterminated,
        #[error("expected 4 fields, found {0}")]
        FieldCount(usize),
        #[error("order field `{0}` is not a decimal integer")]
        InvalidOrder(String),
        #[error("flag field `{0}` is not `t` or `f`")]
        InvalidFlag(String),
    }

    /// Strict single-token decoder: the whole input must be exactly one
    /// well-formed token. The lenient scanner never needs this; `lint_note`
    /// uses it to say *why* a candidate was skipped.
    pub fn decode_token(s: &str) -> Result<Task, TokenError> {
        let body = s.strip_prefix(TOKEN_OPEN).ok_or(TokenError::NotAToken)?;
        let body = body.strip_suffix(']').ok_or(TokenError::Unterminated)?;
        let fields: Vec<&str> = body.split(':').collect();
        if fields.len() != 4 {
            return Err(TokenError::FieldCount(fields.len()));
        }
        let order_raw = fields[2];
        if order_raw.is_empty() || !order_raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::InvalidOrder(order_raw.to_string()));
        }
        let order: u32 = order_raw
            .parse()
            .map_err(|_| TokenError::InvalidOrder(order_raw.to_string()))?;
        let completed = match fields[3] {
            "t" => true,
            "f" => false,
            other => return Err(TokenError::InvalidFlag(other.to_string())),
        };
        Ok(Task {
            id: TaskId(fields[0].to_string()),
            text: decode_text(fields[1]),
            order,
            completed,
            source: None,
        })
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LintIssue {
        pub span: SourceRange,
        pub error: TokenError,
    }

    /// Report every `[TASK:` occurrence the scanner did not match. The
    /// candidate extent runs through the next `]`, or to the end of the line
    /// (or input) when none closes it.
    pub fn lint_note(document: &str) -> Vec<LintIssue> {
        let matched: Vec<SourceRange> = scan_raw(document).iter().map(|t| t.span).collect();
        let mut out = Vec::new();
        let mut search = 0usize;
        while let Some(found) = document[search..].find(TOKEN_OPEN) {
            let start = search + found;
            if let Some(span) = matched.iter().find(|r| r.start == start) {
                search = span.end;
                continue;
            }
            let tail = &document[start..];
            let end = match tail.find(']') {
                Some(idx) => start + idx + 1,
                None => start + tail.find('\n').unwrap_or(tail.len()),
            };
            let error = decode_token(&document[start..end])
                .err()
                .unwrap_or(TokenError::NotAToken);
            out.push(LintIssue {
                span: SourceRange { start, end },
                error,
            });
            search = start + 1;
        }
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn round_trip_parse_and_strip() {
            let doc = "Intro\n[TASK:a1:Write docs:0:f]\nMiddle\n[TASK:b2:Ship it:1:t]\nEnd";
            let parsed = parse_note(doc);
            assert_eq!(parsed.tasks.len(), 2);
            assert_eq!(parsed.tasks[0].id.as_str(), "a1");
            assert_eq!(parsed.tasks[0].text, "Write docs");
            assert_eq!(parsed.tasks[0].order, 0);
            assert!(!parsed.tasks[0].completed);
            assert!(parsed.tasks[1].completed);
            assert_eq!(parsed.display_content, "Intro\n\nMiddle\n\nEnd");

            let reparsed = parse_note(&parsed.display_content);
            assert!(reparsed.tasks.is_empty());
        }

        #[test]
        fn malformed_tokens_are_prose() {
            // Non-digit order.
            let parsed = parse_note("[TASK:abc:hello:x:t]");
            assert!(parsed.tasks.is_empty());
            assert_eq!(parsed.display_content, "[TASK:abc:hello:x:t]");

            // Bad flag, missing field.
            assert!(parse_note("[TASK:abc:hello:1:z]").tasks.is_empty());
            assert!(parse_note("[TASK:abc:1:t]").tasks.is_empty());
        }

        #[test]
        fn blank_runs_collapse_around_removed_tokens() {
            let parsed = parse_note("Hello\n\n\n[TASK:1:Task:0:f]\n\nWorld");
            assert_eq!(parsed.tasks.len(), 1);
            assert_eq!(parsed.display_content, "Hello\n\nWorld");
        }

        #[test]
        fn scan_records_token_spans() {
            let doc = "x[TASK:i:t:1:f]y";
            let tasks = scan_tokens(doc);
            assert_eq!(tasks.len(), 1);
            let span = tasks[0].source.expect("span");
            assert_eq!(span.slice(doc), "[TASK:i:t:1:f]");
            assert_eq!(span.start, 1);
        }

        #[test]
        fn token_behind_malformed_prefix_is_found() {
            let tasks = scan_tokens("[TASK:[TASK:a:b:1:t]");
            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].id.as_str(), "a");
        }

        #[test]
        fn strict_decode_classifies_failures() {
            assert_eq!(decode_token("hello"), Err(TokenError::NotAToken));
            assert_eq!(
                decode_token("[TASK:a:b:1:t"),
                Err(TokenError::Unterminated)
            );
            assert_eq!(
                decode_token("[TASK:a:b:t]"),
                Err(TokenError::FieldCount(3))
            );
            assert_eq!(
                decode_token("[TASK:a:b:x:t]"),
                Err(TokenError::InvalidOrder("x".to_string()))
            );
            assert_eq!(
                decode_token("[TASK:a:b:1:q]"),
                Err(TokenError::InvalidFlag("q".to_string()))
            );

            let task = decode_token("[TASK:a:b:1:t]").expect("decode");
            assert_eq!(task.id.as_str(), "a");
            assert!(task.completed);
        }

        #[test]
        fn lint_reports_unmatched_candidates() {
            let doc = "ok [TASK:a:b:1:t] bad [TASK:q:r:x:t] tail";
            let issues = lint_note(doc);
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].span.slice(doc), "[TASK:q:r:x:t]");
            assert_eq!(issues[0].error, TokenError::InvalidOrder("x".to_string()));

            assert!(lint_note("no tokens here").is_empty());
            assert!(lint_note("[TASK:a:b:1:t]").is_empty());
        }
    }
}

pub mod edit {
    //! Document mutations. Every operation takes the full document and
    //! returns a new one; a missing id is a no-op, never an error. Callers
    //! own persistence and the serialization of concurrent edits.

    use crate::core::{SourceRange, Task, TaskId};
    use crate::format::{encode_text, format_token};
    use crate::parser::{RawToken, scan_raw};

    fn splice(document: &str, span: SourceRange, replacement: &str) -> String {
        let mut out =
            String::with_capacity(document.len() - (span.end - span.start) + replacement.len());
        out.push_str(&document[..span.start]);
        out.push_str(replacement);
        out.push_str(&document[span.end..]);
        out
    }

    fn rebuild_token(id: &str, text_field: &str, order_field: &str, completed: bool) -> String {
        format!(
            "[TASK:{}:{}:{}:{}]",
            id,
            text_field,
            order_field,
            if completed { 't' } else { 'f' }
        )
    }

    fn find_token<'a>(tokens: &'a [RawToken<'a>], id: &TaskId) -> Option<&'a RawToken<'a>> {
        tokens.iter().find(|t| t.id == id.as_str())
    }

    /// Rewrite the flag of the first token whose id matches; text and order
    /// are untouched.
    pub fn set_completed(document: &str, id: &TaskId, completed: bool) -> String {
        let tokens = scan_raw(document);
        match find_token(&tokens, id) {
            Some(tok) => splice(
                document,
                tok.span,
                &rebuild_token(tok.id, tok.text, tok.order_raw, completed),
            ),
            None => document.to_string(),
        }
    }

    /// Flip the completion flag of the matching token.
    pub fn toggle_task(document: &str, id: &TaskId) -> String {
        let tokens = scan_raw(document);
        match find_token(&tokens, id) {
            Some(tok) => splice(
                document,
                tok.span,
                &rebuild_token(tok.id, tok.text, tok.order_raw, !tok.completed),
            ),
            None => document.to_string(),
        }
    }

    /// Rewrite the label of the matching token; id, order and flag are
    /// untouched. The new text is field-escaped.
    pub fn set_text(document: &str, id: &TaskId, new_text: &str) -> String {
        let tokens = scan_raw(document);
        match find_token(&tokens, id) {
            Some(tok) => splice(
                document,
                tok.span,
                &rebuild_token(tok.id, &encode_text(new_text), tok.order_raw, tok.completed),
            ),
            None => document.to_string(),
        }
    }

    /// Remove the matching token plus at most one immediately-following
    /// newline; every other character stays.
    pub fn remove_task(document: &str, id: &TaskId) -> String {
        let tokens = scan_raw(document);
        match find_token(&tokens, id) {
            Some(tok) => {
                let mut end = tok.span.end;
                if document[end..].starts_with('\n') {
                    end += 1;
                }
                splice(
                    document,
                    SourceRange {
                        start: tok.span.start,
                        end,
                    },
                    "",
                )
            }
            None => document.to_string(),
        }
    }

    /// Append a new pending task on its own line at the end of the document.
    pub fn append_task(document: &str, existing_count: u32, text: &str) -> (String, Task) {
        let task = new_task(document, existing_count, text);
        let token = format_token(&task);
        let mut out = String::with_capacity(document.len() + token.len() + 2);
        out.push_str(document);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&token);
        out.push('\n');
        (out, task)
    }

    /// Insert a new pending task at a byte offset (clamped to the document
    /// and floored to a char boundary), on its own line.
    pub fn insert_task_at(
        document: &str,
        offset: usize,
        existing_count: u32,
        text: &str,
    ) -> (String, Task) {
        let task = new_task(document, existing_count, text);
        let token = format_token(&task);

        let mut at = offset.min(document.len());
        while at > 0 && !document.is_char_boundary(at) {
            at -= 1;
        }

        let mut out = String::with_capacity(document.len() + token.len() + 2);
        out.push_str(&document[..at]);
        if at > 0 && !document[..at].ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&token);
        out.push('\n');
        out.push_str(&document[at..]);
        (out, task)
    }

    /// Fresh pending task with a document-unique id; regenerates on the
    /// (remote) chance of a collision.
    fn new_task(document: &str, order: u32, text: &str) -> Task {
        let mut id = TaskId::generate();
        while document.contains(&format!("[TASK:{}:", id.as_str())) {
            id = TaskId::generate();
        }
        Task::new(id, text, order)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::parser::parse_note;

        #[test]
        fn created_task_is_found_on_reparse() {
            let (doc, task) = append_task("", 0, "Buy milk");
            let parsed = parse_note(&doc);
            assert_eq!(parsed.tasks.len(), 1);
            assert_eq!(parsed.tasks[0].id, task.id);
            assert_eq!(parsed.tasks[0].text, "Buy milk");
            assert_eq!(parsed.tasks[0].order, 0);
            assert!(!parsed.tasks[0].completed);
        }

        #[test]
        fn append_separates_with_a_newline() {
            let (doc, _) = append_task("Line", 1, "Next");
            assert!(doc.starts_with("Line\n[TASK:"));
            assert!(doc.ends_with("]\n"));
        }

        #[test]
        fn toggle_round_trips() {
            let doc = "Note\n[TASK:t1:Call:2:f]\n";
            let id = TaskId::from("t1");
            let done = set_completed(doc, &id, true);
            assert!(parse_note(&done).tasks[0].completed);

            let undone = set_completed(&done, &id, false);
            let task = &parse_note(&undone).tasks[0];
            assert!(!task.completed);
            assert_eq!(task.text, "Call");
            assert_eq!(task.order, 2);
        }

        #[test]
        fn flag_rewrite_preserves_raw_fields() {
            let doc = "[TASK:a:b:007:f]";
            let updated = set_completed(doc, &TaskId::from("a"), true);
            assert_eq!(updated, "[TASK:a:b:007:t]");
        }

        #[test]
        fn set_text_keeps_order_and_flag() {
            let doc = "[TASK:a:Old:3:t]";
            let updated = set_text(doc, &TaskId::from("a"), "New: better");
            let task = &parse_note(&updated).tasks[0];
            assert_eq!(task.text, "New: better");
            assert_eq!(task.order, 3);
            assert!(task.completed);
        }

        #[test]
        fn remove_leaves_siblings_intact() {
            let doc = "[TASK:idA:One:0:f]\n[TASK:idB:Two:1:f]\n";
            let updated = remove_task(doc, &TaskId::from("idA"));
            assert_eq!(updated, "[TASK:idB:Two:1:f]\n");
            let parsed = parse_note(&updated);
            assert_eq!(parsed.tasks.len(), 1);
            assert_eq!(parsed.tasks[0].id.as_str(), "idB");
            assert_eq!(parsed.tasks[0].text, "Two");
        }

        #[test]
        fn missing_id_is_a_no_op() {
            let doc = "Prose [TASK:a:b:1:f] more";
            assert_eq!(set_completed(doc, &TaskId::from("nope"), true), doc);
            assert_eq!(set_text(doc, &TaskId::from("nope"), "x"), doc);
            assert_eq!(remove_task(doc, &TaskId::from("nope")), doc);
        }

        #[test]
        fn insert_lands_on_its_own_line() {
            let (doc, task) = insert_task_at("Hello World", 5, 0, "Split");
            let parsed = parse_note(&doc);
            assert_eq!(parsed.tasks.len(), 1);
            assert_eq!(parsed.tasks[0].id, task.id);
            assert!(doc.starts_with("Hello\n[TASK:"));
            assert!(doc.ends_with("\n World"));
        }

        #[test]
        fn insert_clamps_offset_to_char_boundaries() {
            // Offset 2 falls inside the two-byte `é`; it floors to 1.
            let (doc, _) = insert_task_at("héllo", 2, 0, "x");
            assert_eq!(parse_note(&doc).tasks.len(), 1);

            let (doc, _) = insert_task_at("abc", 999, 0, "x");
            assert!(doc.starts_with("abc\n[TASK:"));
        }
    }
}

pub mod format {
    //! Token serialization, field escaping, and the plain-text rendering
    //! surface consumed by read-only note views.

    use crate::core::{ParsedNote, Task};
    use crate::projectors::task_list_projector;

    /// Percent-encode a label for storage in the `:`-delimited text field:
    /// `%` -> `%25`, `:` -> `%3A`. Everything else passes through.
    pub fn encode_text(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            match c {
                '%' => out.push_str("%25"),
                ':' => out.push_str("%3A"),
                _ => out.push(c),
            }
        }
        out
    }

    /// Reverse of `encode_text`. Only `%3A` and `%25` are recognized; any
    /// other `%` is literal.
    pub fn decode_text(encoded: &str) -> String {
        let mut out = String::with_capacity(encoded.len());
        let mut rest = encoded;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("%3A") {
                out.push(':');
                rest = after;
            } else if let Some(after) = tail.strip_prefix("%25") {
                out.push('%');
                rest = after;
            } else {
                out.push('%');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Serialize a task to its wire token.
    pub fn format_token(task: &Task) -> String {
        format!(
            "[TASK:{}:{}:{}:{}]",
            task.id.as_str(),
            encode_text(&task.text),
            task.order,
            if task.completed { 't' } else { 'f' }
        )
    }

    /// Render the view a note surface shows: display content first, then the
    /// grouped task list with its progress summary.
    pub fn render_note(note: &ParsedNote) -> String {
        let mut out = String::new();
        if !note.display_content.is_empty() {
            out.push_str(&note.display_content);
            out.push('\n');
        }
        if note.tasks.is_empty() {
            return out;
        }

        let view = task_list_projector::project(&note.tasks);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "Tasks: {} pending, {} completed ({}% complete)\n",
            view.progress.pending, view.progress.completed, view.progress.percent_complete
        ));
        for task in view.pending.iter().chain(view.completed.iter()) {
            out.push_str(&format!(
                "  [{}] {}\n",
                if task.completed { 'x' } else { ' ' },
                task.text
            ));
        }
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::TaskId;
        use crate::parser::parse_note;

        #[test]
        fn token_serialization_is_exact() {
            let task = Task::new(TaskId::from("k1"), "Buy milk", 3);
            assert_eq!(format_token(&task), "[TASK:k1:Buy milk:3:f]");

            let mut done = task;
            done.completed = true;
            assert_eq!(format_token(&done), "[TASK:k1:Buy milk:3:t]");
        }

        #[test]
        fn escaping_round_trips_delimiters() {
            assert_eq!(encode_text("a:b%c"), "a%3Ab%25c");
            assert_eq!(decode_text("a%3Ab%25c"), "a:b%c");
            // Unrecognized escapes are literal.
            assert_eq!(decode_text("100%"), "100%");
            assert_eq!(decode_text("%zz"), "%zz");
        }

        #[test]
        fn colon_labels_survive_storage() {
            let task = Task::new(TaskId::from("c1"), "call: mom at 5%", 0);
            let token = format_token(&task);
            let parsed = parse_note(&token);
            assert_eq!(parsed.tasks.len(), 1);
            assert_eq!(parsed.tasks[0].text, "call: mom at 5%");
        }

        #[test]
        fn rendered_note_groups_and_summarizes() {
            let note = parse_note("Plans\n[TASK:a:First:0:f]\n[TASK:b:Done one:1:t]\n");
            let rendered = render_note(&note);
            assert!(rendered.starts_with("Plans\n"));
            assert!(rendered.contains("Tasks: 1 pending, 1 completed (50% complete)"));
            assert!(rendered.contains("  [ ] First"));
            assert!(rendered.contains("  [x] Done one"));

            let empty = render_note(&parse_note(""));
            assert!(empty.is_empty());
        }
    }
}

pub mod projectors {
    pub mod task_list_projector {
        //! Read models over parsed tasks: display ordering, the grouped view
        //! a renderer shows, and id lookup for interactive callers.

        use crate::core::Task;
        use indexmap::IndexMap;
        use serde::{Deserialize, Serialize};

        /// Pending before completed; ascending `order` inside each bucket;
        /// equal orders keep their document position (stable sort).
        pub fn sort_for_display(tasks: &[Task]) -> Vec<Task> {
            let mut out = tasks.to_vec();
            out.sort_by_key(|t| (t.completed, t.order));
            out
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub struct TaskProgress {
            pub pending: usize,
            pub completed: usize,
            pub total: usize,
            pub percent_complete: u32,
        }

        impl TaskProgress {
            pub fn of(tasks: &[Task]) -> Self {
                let total = tasks.len();
                let completed = tasks.iter().filter(|t| t.completed).count();
                let percent_complete = if total == 0 {
                    0
                } else {
                    ((completed as f64 / total as f64) * 100.0).round() as u32
                };
                Self {
                    pending: total - completed,
                    completed,
                    total,
                    percent_complete,
                }
            }
        }

        /// The grouped view a rendering surface consumes.
        #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub struct TaskListView {
            pub pending: Vec<Task>,
            pub completed: Vec<Task>,
            pub progress: TaskProgress,
        }

        pub fn project(tasks: &[Task]) -> TaskListView {
            let sorted = sort_for_display(tasks);
            let (completed, pending): (Vec<_>, Vec<_>) =
                sorted.into_iter().partition(|t| t.completed);
            TaskListView {
                pending,
                completed,
                progress: TaskProgress::of(tasks),
            }
        }

        /// Id -> task in document order. First occurrence wins if a document
        /// carries duplicate ids (unsupported input).
        pub fn task_index(tasks: Vec<Task>) -> IndexMap<String, Task> {
            let mut index = IndexMap::with_capacity(tasks.len());
            for task in tasks {
                index.entry(task.id.as_str().to_string()).or_insert(task);
            }
            index
        }

        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum IdLookup<'a> {
            Found(&'a Task),
            Ambiguous(Vec<&'a str>),
            Missing,
        }

        /// Resolve a user-supplied id against an index: exact match wins,
        /// otherwise a unique prefix.
        pub fn resolve_id<'a>(index: &'a IndexMap<String, Task>, needle: &str) -> IdLookup<'a> {
            if let Some(task) = index.get(needle) {
                return IdLookup::Found(task);
            }
            let hits: Vec<&'a String> = index.keys().filter(|k| k.starts_with(needle)).collect();
            match hits.as_slice() {
                [] => IdLookup::Missing,
                [one] => match index.get(one.as_str()) {
                    Some(task) => IdLookup::Found(task),
                    None => IdLookup::Missing,
                },
                many => IdLookup::Ambiguous(many.iter().map(|k| k.as_str()).collect()),
            }
        }

    }
}

pub use format::{format_token, render_note};
pub use parser::{parse_note, scan_tokens};
