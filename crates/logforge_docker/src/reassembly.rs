//! Multi-line log reassembly (spec.md §4.6): a container that logs
//! stack traces or other multi-line records can tag itself with
//! `imdocker.startregex=<ERE>`. Any line *not* matching that regex is
//! treated as a continuation of the previous line rather than a new
//! record.

use regex::Regex;

pub struct Reassembler {
    start_regex: Option<Regex>,
    pending: Option<String>,
}

impl Reassembler {
    pub fn new(start_regex: Option<&str>) -> Self {
        let start_regex = start_regex.and_then(|pat| match Regex::new(pat) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = pat, error = %e, "invalid imdocker.startregex, ignoring");
                None
            }
        });
        Self {
            start_regex,
            pending: None,
        }
    }

    /// Feed one newline-delimited line from the container's stream.
    /// Returns a completed record if this line starts a new one and a
    /// previous record was pending; otherwise buffers and returns
    /// `None`.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        let Some(re) = &self.start_regex else {
            return Some(line.to_string());
        };

        if re.is_match(line) {
            let completed = self.pending.take();
            self.pending = Some(line.to_string());
            completed
        } else {
            match &mut self.pending {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(line);
                    None
                }
                None => {
                    // continuation line with nothing to attach to yet
                    self.pending = Some(line.to_string());
                    None
                }
            }
        }
    }

    /// Flush whatever is pending, e.g. when the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_regex_every_line_is_its_own_record() {
        let mut r = Reassembler::new(None);
        assert_eq!(r.feed("line one").as_deref(), Some("line one"));
        assert_eq!(r.feed("line two").as_deref(), Some("line two"));
    }

    #[test]
    fn continuation_lines_are_joined_to_the_prior_record() {
        let mut r = Reassembler::new(Some(r"^\d{4}-\d{2}-\d{2}"));
        assert_eq!(r.feed("2026-01-01 starting"), None);
        assert_eq!(r.feed("  at frame 1"), None);
        let completed = r.feed("2026-01-01 next record");
        assert_eq!(completed.as_deref(), Some("2026-01-01 starting\n  at frame 1"));
    }

    #[test]
    fn finish_flushes_the_trailing_record() {
        let mut r = Reassembler::new(Some(r"^\d{4}"));
        r.feed("2026 hello");
        assert_eq!(r.finish().as_deref(), Some("2026 hello"));
        assert_eq!(r.finish(), None);
    }
}
